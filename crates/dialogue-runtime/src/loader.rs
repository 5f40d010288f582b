//! `ConfigLoader`: reads a [`Config`] from a file path or an in-memory
//! string.
//!
//! This is a thin convenience around `serde_yaml` — no include directives,
//! no environment-variable expansion, just parse-then-validate.

use std::path::Path;

use crate::config::Config;
use crate::error::ConfigError;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse `Config` from a YAML string already in memory.
    pub fn from_str(yaml: &str) -> Result<Config, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse `Config` from a file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_str(&content)
    }
}
