//! Configuration file loading for fnbox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::language::{CODE_PLACEHOLDER, SOURCE_PLACEHOLDER};
use crate::config::profile::MAX_TIMEOUT_SECS;
use crate::config::{Config, ConfigError};

/// Prefix for environment overrides (e.g., `FNBOX_TIMEOUTS__COLD=20`)
const ENV_PREFIX: &str = "FNBOX";

impl Config {
    /// Load configuration from a file, layered with `FNBOX_*` environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("warm", self.timeouts.warm),
            ("cold", self.timeouts.cold),
        ] {
            if !(value > 0.0 && value <= MAX_TIMEOUT_SECS) {
                return Err(ConfigError::Invalid(format!(
                    "timeouts.{name} must be between 0 and {MAX_TIMEOUT_SECS} seconds"
                )));
            }
        }
        if !(self.timeouts.grace >= 0.0 && self.timeouts.grace <= MAX_TIMEOUT_SECS) {
            return Err(ConfigError::Invalid(format!(
                "timeouts.grace must be between 0 and {MAX_TIMEOUT_SECS} seconds"
            )));
        }
        if self.runtimes.standard.is_empty() || self.runtimes.sandboxed.is_empty() {
            return Err(ConfigError::Invalid("runtime names must not be empty".to_owned()));
        }

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
            if lang.image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty image"
                )));
            }
            if !lang.run.iter().any(|arg| arg.contains(SOURCE_PLACEHOLDER)) {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' run command must reference {SOURCE_PLACEHOLDER}"
                )));
            }
            if !lang.inline.iter().any(|arg| arg.contains(CODE_PLACEHOLDER)) {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' inline command must reference {CODE_PLACEHOLDER}"
                )));
            }
            if let Some(ref warm) = lang.warm
                && warm.keep_alive.is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty warm keep_alive command"
                )));
            }
        }

        for (name, function) in &self.functions {
            if !self.languages.contains_key(&function.language) {
                return Err(ConfigError::Invalid(format!(
                    "function '{name}' uses unknown language '{}'",
                    function.language
                )));
            }
        }

        Ok(())
    }
}
