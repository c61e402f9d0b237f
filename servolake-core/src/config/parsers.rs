use std::path::Path;

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// Pick the format from the file extension, falling back on the first non-blank byte.
    pub fn detect(path: Option<&Path>, raw: &[u8]) -> Self {
        let by_extension = path
            .and_then(|p| p.extension())
            .and_then(|ext| ext.to_str())
            .and_then(|ext| match ext.to_ascii_lowercase().as_str() {
                "json" => Some(ConfigFormat::Json),
                "toml" => Some(ConfigFormat::Toml),
                _ => None,
            });
        by_extension.unwrap_or_else(|| {
            match raw.iter().find(|b| !b.is_ascii_whitespace()) {
                Some(b'{') => ConfigFormat::Json,
                _ => ConfigFormat::Toml,
            }
        })
    }
}

pub fn parse<T: DeserializeOwned>(format: ConfigFormat, raw: &[u8]) -> Result<T> {
    match format {
        ConfigFormat::Json => match serde_json::from_slice::<T>(raw) {
            Ok(t) => Ok(t),
            Err(e) => bail!(e),
        },
        ConfigFormat::Toml => {
            let content = std::str::from_utf8(raw)?;
            match toml::from_str(content) {
                Ok(t) => Ok(t),
                Err(e) => bail!(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(
            ConfigFormat::detect(Some(Path::new("a.JSON")), b"x = 1"),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::detect(Some(Path::new("a.toml")), b"{"),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::detect(Some(Path::new("a.conf")), b"\n  {}"),
            ConfigFormat::Json
        );
        assert_eq!(ConfigFormat::detect(None, b"[runtime]"), ConfigFormat::Toml);
    }
}
