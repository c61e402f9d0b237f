use std::collections::BTreeMap;

use crate::{
    identity::Identity,
    wire::{WireError, WireStream},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationMode {
    #[default]
    Normal = 0,
    Nonmutating = 1,
    Idempotent = 2,
}

impl TryFrom<u8> for OperationMode {
    type Error = WireError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(OperationMode::Normal),
            1 => Ok(OperationMode::Nonmutating),
            2 => Ok(OperationMode::Idempotent),
            other => Err(WireError::InvalidOperationMode(other)),
        }
    }
}

/// Decoded target and operation of one request.
///
/// Built fresh for every request and never mutated after decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub id: Identity,
    pub facet: String,
    pub operation: String,
    pub mode: OperationMode,
    pub context: Option<BTreeMap<String, String>>,
}

impl RequestDescriptor {
    pub fn new(id: Identity, operation: impl Into<String>) -> Self {
        RequestDescriptor {
            id,
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn with_facet(mut self, facet: impl Into<String>) -> Self {
        self.facet = facet.into();
        self
    }

    pub fn with_mode(mut self, mode: OperationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Decode the descriptor that precedes the argument encapsulation.
    pub fn read(is: &mut WireStream) -> Result<Self, WireError> {
        let id = Identity::read(is)?;
        let facet = read_facet_path(is)?;
        let operation = is.read_string()?;
        let mode = OperationMode::try_from(is.read_byte()?)?;
        let context = match is.read_size()? {
            0 => None,
            n => {
                let mut map = BTreeMap::new();
                for _ in 0..n {
                    let key = is.read_string()?;
                    let value = is.read_string()?;
                    map.insert(key, value);
                }
                Some(map)
            }
        };
        Ok(RequestDescriptor {
            id,
            facet,
            operation,
            mode,
            context,
        })
    }

    pub fn write(&self, os: &mut WireStream) {
        self.id.write(os);
        write_facet_path(os, &self.facet);
        os.write_string(&self.operation);
        os.write_byte(self.mode as u8);
        match &self.context {
            Some(map) => {
                os.write_size(map.len());
                for (k, v) in map {
                    os.write_string(k);
                    os.write_string(v);
                }
            }
            None => os.write_size(0),
        }
    }
}

/// Facets travel as a sequence holding zero or one element.
pub fn read_facet_path(is: &mut WireStream) -> Result<String, WireError> {
    let mut path = is.read_string_seq()?;
    match path.len() {
        0 => Ok(String::new()),
        1 => Ok(path.swap_remove(0)),
        n => Err(WireError::MalformedFacetPath(n)),
    }
}

pub fn write_facet_path(os: &mut WireStream, facet: &str) {
    if facet.is_empty() {
        os.write_size(0);
    } else {
        os.write_string_seq(&[facet]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_roundtrip() {
        let descriptor = RequestDescriptor::new(Identity::new("root", "fs"), "list")
            .with_facet("admin")
            .with_mode(OperationMode::Idempotent)
            .with_context("trace", "1");
        let mut os = WireStream::new();
        descriptor.write(&mut os);

        let mut is = WireStream::from_bytes(os.as_bytes());
        assert_eq!(RequestDescriptor::read(&mut is).unwrap(), descriptor);
        assert_eq!(is.remaining(), 0);
    }

    #[test]
    fn test_defaults_are_empty_facet_and_no_context() {
        let descriptor = RequestDescriptor::new(Identity::named("hello"), "sayHello");
        let mut os = WireStream::new();
        descriptor.write(&mut os);
        let decoded = RequestDescriptor::read(&mut WireStream::from_bytes(os.as_bytes())).unwrap();
        assert_eq!(decoded.facet, "");
        assert_eq!(decoded.context, None);
        assert_eq!(decoded.mode, OperationMode::Normal);
    }

    #[test]
    fn test_facet_path_with_two_elements_is_rejected() {
        let mut os = WireStream::new();
        Identity::named("x").write(&mut os);
        os.write_string_seq(&["a", "b"]);
        os.write_string("op");
        os.write_byte(0);
        os.write_size(0);
        assert_eq!(
            RequestDescriptor::read(&mut WireStream::from_bytes(os.as_bytes())),
            Err(WireError::MalformedFacetPath(2))
        );
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        let mut os = WireStream::new();
        Identity::named("x").write(&mut os);
        os.write_size(0);
        os.write_string("op");
        os.write_byte(3);
        os.write_size(0);
        assert_eq!(
            RequestDescriptor::read(&mut WireStream::from_bytes(os.as_bytes())),
            Err(WireError::InvalidOperationMode(3))
        );
    }
}
