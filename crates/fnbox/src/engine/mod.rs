//! Container engine boundary
//!
//! The dispatcher talks to the isolation substrate only through
//! [`ContainerEngine`]. [`CliEngine`] implements it on top of an OCI engine CLI
//! (docker or podman), building argument vectors with [`EngineCommand`].
//!
//! References for the CLI arguments:
//! - https://docs.docker.com/reference/cli/docker/container/run/
//! - https://docs.docker.com/reference/cli/docker/container/exec/

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::engine::cli::CliEngine;
pub use crate::engine::command::{EngineAction, EngineCommand};
pub use crate::engine::guard::InstanceGuard;
pub use crate::engine::process::run_engine_command;
use crate::types::{ContainerLimits, MountConfig};

mod cli;
mod command;
mod guard;
mod process;
#[cfg(test)]
mod testing;

/// Label attached to every cold instance so leftovers can be found after a crash
pub const COLD_LABEL: &str = "fnbox.role=cold";

/// Prefix of cold instance names
pub const COLD_NAME_PREFIX: &str = "fnbox-cold-";

/// Exit code `docker run` uses when the engine itself failed to start the container
const RUN_FAILURE_EXIT_CODE: i32 = 125;

/// Errors that occur while talking to the container engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("container engine unavailable: {0}")]
    Unavailable(String),

    #[error("container '{0}' is not running")]
    NotRunning(String),

    #[error("engine command failed with exit code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("failed to spawn engine process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured output of a program run by the engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl EngineOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A single-use container run
#[derive(Debug, Clone)]
pub struct EphemeralRun {
    /// Instance name, tracked for cleanup
    pub name: String,
    pub image: String,
    /// OCI runtime (`--runtime`)
    pub runtime: Option<String>,
    /// Working directory inside the container
    pub workdir: String,
    /// Per-request workspace mount
    pub mount: MountConfig,
    pub limits: ContainerLimits,
    pub command: Vec<String>,
}

/// Operations the execution core needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync + std::fmt::Debug {
    /// Check if a container with this exact name is running
    async fn is_running(&self, name: &str) -> Result<bool, EngineError>;

    /// Start a detached long-lived container, replacing a dead one with the same name
    async fn start_detached(
        &self,
        name: &str,
        image: &str,
        keep_alive: &[String],
    ) -> Result<(), EngineError>;

    /// Run a command inside a running container
    async fn exec_in(
        &self,
        name: &str,
        command: &[String],
        timeout: Duration,
    ) -> Result<EngineOutput, EngineError>;

    /// Run a command in a fresh container that is removed on exit or timeout
    async fn run_ephemeral(
        &self,
        run: &EphemeralRun,
        timeout: Duration,
    ) -> Result<EngineOutput, EngineError>;

    /// Check if the engine knows an OCI runtime by this name
    async fn runtime_available(&self, runtime: &str) -> Result<bool, EngineError>;

    /// Remove cold instances left behind by a previous process
    async fn reap_orphans(&self) -> Result<usize, EngineError>;
}

/// Map engine CLI stderr to a failure of the engine itself, if it is one
///
/// Returns `None` when the output belongs to the program that ran.
pub fn engine_failure(output: &EngineOutput, container: Option<&str>) -> Option<EngineError> {
    let stderr = output.stderr.trim();
    let lower = stderr.to_lowercase();

    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
        || lower.contains("cannot connect to podman")
    {
        return Some(EngineError::Unavailable(stderr.to_owned()));
    }

    let daemon_error = lower.starts_with("error response from daemon")
        || lower.starts_with("error: no such container")
        || lower.starts_with("error: no container with name or id");
    if let Some(name) = container
        && daemon_error
        && (lower.contains("no such container")
            || lower.contains("no container with name")
            || lower.contains("is not running"))
    {
        return Some(EngineError::NotRunning(name.to_owned()));
    }

    if daemon_error {
        return Some(EngineError::CommandFailed {
            code: output.exit_code,
            stderr: stderr.to_owned(),
        });
    }

    None
}

/// [`engine_failure`] for a `run` that creates its own container
///
/// `exec` passes the program's exit code through untouched, so 125 only
/// means an engine failure here, and only with an engine-prefixed message.
pub fn run_failure(output: &EngineOutput) -> Option<EngineError> {
    if let Some(err) = engine_failure(output, None) {
        return Some(err);
    }

    let stderr = output.stderr.trim();
    let lower = stderr.to_lowercase();
    if output.exit_code == RUN_FAILURE_EXIT_CODE
        && (lower.starts_with("docker:") || lower.starts_with("podman:"))
    {
        return Some(EngineError::CommandFailed {
            code: output.exit_code,
            stderr: stderr.to_owned(),
        });
    }

    None
}
