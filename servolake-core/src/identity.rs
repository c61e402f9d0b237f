use std::{fmt, str::FromStr};

use crate::wire::{WireError, WireStream};

/// Object identity: a name plus an optional category used for locator dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub name: String,
    pub category: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Identity {
            name: name.into(),
            category: category.into(),
        }
    }

    /// Identity without a category.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }

    pub fn read(is: &mut WireStream) -> Result<Self, WireError> {
        let name = is.read_string()?;
        let category = is.read_string()?;
        Ok(Identity { name, category })
    }

    pub fn write(&self, os: &mut WireStream) {
        os.write_string(&self.name);
        os.write_string(&self.category);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.category.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}/{}", self.category, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("identity has an empty name: {0:?}")]
pub struct IdentityParseError(String);

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let identity = match s.split_once('/') {
            Some((category, name)) => Identity::new(name, category),
            None => Identity::named(s),
        };
        if identity.name.is_empty() {
            return Err(IdentityParseError(s.to_owned()));
        }
        Ok(identity)
    }
}
