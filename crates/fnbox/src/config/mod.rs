use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{FileExtension, Language, WarmConfig};
pub use crate::config::profile::{BackendKind, RuntimeProfile, Runtimes, Timeouts};
use crate::types::ContainerLimits;

pub mod language;
mod loader;
mod profile;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../fnbox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("language '{0}' has no warm container configured")]
    NoWarmContainer(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Check if the error means the language cannot run in the requested mode
    pub fn is_unsupported_language(&self) -> bool {
        matches!(
            self,
            ConfigError::LanguageNotFound(_) | ConfigError::NoWarmContainer(_)
        )
    }
}

/// A function registered at startup
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfig {
    /// HTTP route the function is served under
    #[serde(default)]
    pub route: Option<String>,

    /// Language ID
    pub language: String,

    /// Timeout in seconds advertised for the function
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Config for fnbox
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the container engine CLI (uses `docker` from PATH if not specified).
    #[serde(default)]
    pub engine_path: Option<PathBuf>,

    /// Host directory for per-request workspaces (system temp dir if not specified).
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Mount point of the workspace inside cold containers
    #[serde(default = "default_container_workdir")]
    pub container_workdir: String,

    /// SQLite database for invocation metrics
    #[serde(default = "default_metrics_db")]
    pub metrics_db: PathBuf,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default)]
    pub runtimes: Runtimes,

    /// Container limits applied to every cold run.
    /// Overridden per language by `languages.<id>.limits`.
    #[serde(default)]
    pub default_limits: ContainerLimits,

    /// Language configurations keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,

    /// Functions registered at startup, keyed by name
    #[serde(default)]
    pub functions: HashMap<String, FunctionConfig>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            engine_path: None,
            workspace_root: None,
            container_workdir: default_container_workdir(),
            metrics_db: default_metrics_db(),
            timeouts: Timeouts::default(),
            runtimes: Runtimes::default(),
            default_limits: ContainerLimits::default(),
            languages: HashMap::new(),
            functions: HashMap::new(),
        }
    }

    /// Get a language by ID
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Get the path to the container engine binary
    pub fn engine_binary(&self) -> PathBuf {
        self.engine_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("docker"))
    }

    /// Container limits for a cold run of `language`
    pub fn effective_limits(&self, language: &Language) -> ContainerLimits {
        match language.limits {
            Some(ref limits) => self.default_limits.with_overrides(limits),
            None => self.default_limits.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_container_workdir() -> String {
    "/usr/src/app".to_owned()
}

fn default_metrics_db() -> PathBuf {
    PathBuf::from("fnbox-metrics.db")
}
