//! Runtime profiles
//!
//! Maps a [`RuntimeMode`] to the backend, isolation technology, image and
//! time bound used to serve it.

use std::time::Duration;

use serde::Deserialize;

use crate::config::{Config, ConfigError};
use crate::types::RuntimeMode;

/// Largest accepted time bound, one day
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Time bounds in seconds
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Timeouts {
    /// Exec into a warm container
    #[serde(default = "default_warm_timeout")]
    pub warm: f64,

    /// Cold container run
    #[serde(default = "default_cold_timeout")]
    pub cold: f64,

    /// Extra time granted to the engine to report its own timeout
    #[serde(default = "default_grace")]
    pub grace: f64,

    /// Kill timed-out warm execs inside the container as well
    #[serde(default = "default_true")]
    pub exec_kill_inside: bool,
}

impl Timeouts {
    pub fn warm(&self) -> Duration {
        seconds(self.warm)
    }

    pub fn cold(&self) -> Duration {
        seconds(self.cold)
    }

    pub fn grace(&self) -> Duration {
        seconds(self.grace)
    }
}

/// Convert seconds, capped at [`MAX_TIMEOUT_SECS`]; negative or NaN is zero
fn seconds(value: f64) -> Duration {
    if value > MAX_TIMEOUT_SECS {
        return Duration::from_secs_f64(MAX_TIMEOUT_SECS);
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            warm: default_warm_timeout(),
            cold: default_cold_timeout(),
            grace: default_grace(),
            exec_kill_inside: true,
        }
    }
}

fn default_warm_timeout() -> f64 {
    5.0
}

fn default_cold_timeout() -> f64 {
    10.0
}

fn default_grace() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// OCI runtime names for the cold profiles
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Runtimes {
    #[serde(default = "default_standard_runtime")]
    pub standard: String,

    #[serde(default = "default_sandboxed_runtime")]
    pub sandboxed: String,

    /// Degrade cold-sandboxed to the standard runtime when the sandboxed one is missing
    #[serde(default)]
    pub sandbox_fallback: bool,
}

impl Default for Runtimes {
    fn default() -> Self {
        Self {
            standard: default_standard_runtime(),
            sandboxed: default_sandboxed_runtime(),
            sandbox_fallback: false,
        }
    }
}

fn default_standard_runtime() -> String {
    "runc".to_owned()
}

fn default_sandboxed_runtime() -> String {
    "runsc".to_owned()
}

/// How a request reaches the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Exec inline code in a running container
    ExecIntoRunning,
    /// Run a staged workspace in a fresh container
    EphemeralRun,
}

/// Resolved execution profile for a mode and language
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeProfile {
    pub mode: RuntimeMode,
    pub backend: BackendKind,
    /// `--runtime` for cold runs; warm containers keep the runtime they were started with
    pub isolation: Option<String>,
    pub image: String,
    pub timeout: Duration,
}

impl Config {
    /// Resolve the profile serving `mode` for `language_id`
    ///
    /// Warm mode for a language without a warm container is an error; there is
    /// no implicit fallback to a cold profile.
    pub fn profile(
        &self,
        mode: RuntimeMode,
        language_id: &str,
    ) -> Result<RuntimeProfile, ConfigError> {
        let language = self.get_language(language_id)?;

        let profile = match mode {
            RuntimeMode::Warm => RuntimeProfile {
                mode,
                backend: BackendKind::ExecIntoRunning,
                isolation: None,
                image: language
                    .warm_image()
                    .ok_or_else(|| ConfigError::NoWarmContainer(language_id.to_owned()))?
                    .to_owned(),
                timeout: self.timeouts.warm(),
            },
            RuntimeMode::ColdStandard => RuntimeProfile {
                mode,
                backend: BackendKind::EphemeralRun,
                isolation: Some(self.runtimes.standard.clone()),
                image: language.image.clone(),
                timeout: self.timeouts.cold(),
            },
            RuntimeMode::ColdSandboxed => RuntimeProfile {
                mode,
                backend: BackendKind::EphemeralRun,
                isolation: Some(self.runtimes.sandboxed.clone()),
                image: language.image.clone(),
                timeout: self.timeouts.cold(),
            },
        };

        Ok(profile)
    }
}
