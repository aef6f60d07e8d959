use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit code reported when the submitted program never produced one
/// (timeout, engine failure, or a request rejected before reaching the engine)
pub const SENTINEL_EXIT_CODE: i32 = -1;

/// Function name recorded for invocations that match no registered function
pub const UNKNOWN_FUNCTION: &str = "unknown";

/// Error message recorded when an invocation exceeds its time bound
pub const TIMEOUT_MESSAGE: &str = "Execution timed out";

/// Caller-selected strategy deciding which backend handles a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeMode {
    /// Exec into a long-lived per-language container
    #[serde(rename = "warm")]
    Warm,

    /// Fresh single-use container with the standard runtime
    #[serde(rename = "cold-standard")]
    ColdStandard,

    /// Fresh single-use container with the sandboxed runtime
    #[serde(rename = "cold-sandboxed")]
    ColdSandboxed,
}

impl RuntimeMode {
    pub const ALL: [RuntimeMode; 3] = [
        RuntimeMode::Warm,
        RuntimeMode::ColdStandard,
        RuntimeMode::ColdSandboxed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeMode::Warm => "warm",
            RuntimeMode::ColdStandard => "cold-standard",
            RuntimeMode::ColdSandboxed => "cold-sandboxed",
        }
    }

    /// Check if the mode runs in a fresh per-request container
    #[must_use]
    pub fn is_cold(&self) -> bool {
        !matches!(self, RuntimeMode::Warm)
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown runtime mode '{0}' (expected warm, cold-standard or cold-sandboxed)")]
pub struct UnknownRuntimeMode(pub String);

impl FromStr for RuntimeMode {
    type Err = UnknownRuntimeMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuntimeMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownRuntimeMode(s.to_owned()))
    }
}

/// A request to run submitted code
///
/// Requests are never mutated once handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Source code of the function
    pub code: String,

    /// Language ID as configured (e.g., "python")
    pub language: String,

    /// Backend selection
    pub runtime_mode: RuntimeMode,

    /// Registered function name used for metric attribution
    #[serde(default)]
    pub function: Option<String>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: impl Into<String>, mode: RuntimeMode) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            runtime_mode: mode,
            function: None,
        }
    }

    /// Attribute the invocation to a registered function
    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }
}

/// Resource usage measured around one backend call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Wall clock time in seconds
    pub duration: f64,

    /// CPU usage of the orchestrating process over the call, in percent
    pub cpu_percent: f64,

    /// Resident memory of the orchestrating process in megabytes
    pub memory_mb: f64,

    /// Failure description, `None` on a clean exit
    pub error: Option<String>,
}

/// Failure class of a normalized result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidRequest,
    UnsupportedLanguage,
    PoolStartFailed,
    Timeout,
    EngineUnavailable,
    EngineFailed,
    Workspace,
    /// The program ran and exited non-zero
    NonZeroExit,
}

/// Normalized outcome of an invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Standard output of the program, trimmed
    pub stdout: String,

    /// Standard error of the program, trimmed
    pub stderr: String,

    /// Exit code of the program, or [`SENTINEL_EXIT_CODE`]
    pub exit_code: i32,

    pub metrics: ExecutionMetrics,

    /// Failure class, `None` on success
    #[serde(default)]
    pub failure: Option<FailureKind>,

    /// Runtime the program actually ran under (cold modes only)
    #[serde(default)]
    pub isolation: Option<String>,
}

impl ExecutionResult {
    /// Check if the program ran and exited with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && self.exit_code == 0
    }

    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: SENTINEL_EXIT_CODE,
            metrics: ExecutionMetrics::default(),
            failure: None,
            isolation: None,
        }
    }
}

/// One persisted row per invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub function_name: String,
    pub duration: f64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Build a sample stamped with the current time
    pub fn from_metrics(function_name: impl Into<String>, metrics: &ExecutionMetrics) -> Self {
        Self {
            function_name: function_name.into(),
            duration: metrics.duration,
            cpu_percent: metrics.cpu_percent,
            memory_mb: metrics.memory_mb,
            error: metrics.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-container limits passed to the engine for cold runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerLimits {
    /// Memory limit in megabytes
    #[serde(default)]
    pub memory_mb: Option<u64>,

    /// CPU quota in cores
    #[serde(default)]
    pub cpus: Option<f64>,

    /// Maximum number of processes/threads
    #[serde(default)]
    pub pids: Option<u32>,

    /// Network mode (e.g., "none")
    #[serde(default)]
    pub network: Option<String>,
}

impl ContainerLimits {
    /// Create limits with all fields set to None
    pub fn none() -> Self {
        Self {
            memory_mb: None,
            cpus: None,
            pids: None,
            network: None,
        }
    }

    pub fn with_memory_mb(mut self, mb: u64) -> Self {
        self.memory_mb = Some(mb);
        self
    }

    pub fn with_cpus(mut self, cpus: f64) -> Self {
        self.cpus = Some(cpus);
        self
    }

    pub fn with_pids(mut self, pids: u32) -> Self {
        self.pids = Some(pids);
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Apply overrides from another ContainerLimits, preferring values from `overrides`
    pub fn with_overrides(&self, overrides: &ContainerLimits) -> ContainerLimits {
        ContainerLimits {
            memory_mb: overrides.memory_mb.or(self.memory_mb),
            cpus: overrides.cpus.or(self.cpus),
            pids: overrides.pids.or(self.pids),
            network: overrides.network.clone().or_else(|| self.network.clone()),
        }
    }
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            memory_mb: Some(256),
            cpus: Some(1.0),
            pids: Some(64),
            network: Some("none".to_owned()),
        }
    }
}

/// Bind mount from the host into a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Source path on the host
    pub source: String,

    /// Target path in the container
    pub target: String,

    /// Whether the mount is read-write (default: read-only)
    #[serde(default)]
    pub writable: bool,
}
