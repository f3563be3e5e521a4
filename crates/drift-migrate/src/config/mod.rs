//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable overriding `source.password`.
pub const SOURCE_PASSWORD_ENV: &str = "DRIFT_SOURCE_PASSWORD";
/// Environment variable overriding `target.password`.
pub const TARGET_PASSWORD_ENV: &str = "DRIFT_TARGET_PASSWORD";

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Passwords set in the environment replace those in the file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration.
    ///
    /// Passwords are blanked first so the hash can be logged and compared
    /// between runs.
    pub fn hash(&self) -> String {
        let mut redacted = self.clone();
        redacted.source.password.clear();
        redacted.target.password.clear();
        let yaml = serde_yaml::to_string(&redacted).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(password) = std::env::var(SOURCE_PASSWORD_ENV) {
            self.source.password = password;
        }
        if let Ok(password) = std::env::var(TARGET_PASSWORD_ENV) {
            self.target.password = password;
        }
    }
}

impl DatabaseConfig {
    /// `host:port/database`, for log lines and error messages.
    pub fn display_name(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}
