//! Allowlist configuration file
//!
//! The proxy's allow-set lives in a small YAML document:
//!
//! ```yaml
//! allowlist:
//!   - example.com          # any port
//!   - api.github.com:443   # this port only
//! ```
//!
//! The same document is produced by `logs-to-config` from a discovery log.

use egress_policy::{AllowlistIndex, PolicyError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Header written above generated allowlist files
pub const GENERATED_HEADER: &str = "# Allowlist configuration generated from discovery logs\n# Format: hostname:port or just hostname (allows any port)\n";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse allowlist YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to access allowlist file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid allowlist: {0}")]
    Policy(#[from] PolicyError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllowlistDocument {
    #[serde(default)]
    pub allowlist: Vec<String>,
}

impl AllowlistDocument {
    pub fn new(allowlist: Vec<String>) -> Self {
        Self { allowlist }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let document: Self = serde_yaml::from_str(content)?;
        debug!("Parsed allowlist with {} entries", document.allowlist.len());
        Ok(document)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Validate the entries and build the lookup index
    pub fn into_index(self) -> Result<AllowlistIndex, ConfigError> {
        Ok(AllowlistIndex::build(self.allowlist)?)
    }

    /// Render as YAML preceded by the generated-file header
    pub fn render(&self) -> Result<String, ConfigError> {
        let body = serde_yaml::to_string(self)?;
        Ok(format!("{}{}", GENERATED_HEADER, body))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.render()?)?;
        Ok(())
    }
}
