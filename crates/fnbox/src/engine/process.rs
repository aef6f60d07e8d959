//! Process spawning and I/O for the engine CLI
//!
//! Runs engine commands, captures their output and enforces time bounds.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::engine::{EngineError, EngineOutput};
use crate::types::SENTINEL_EXIT_CODE;

/// Run an engine command and capture its output
///
/// With a `timeout`, the engine CLI process is killed when the bound expires
/// and [`EngineError::Timeout`] is returned. Killing the CLI does not stop a
/// container it created; callers remove the instance themselves.
#[instrument(skip(args), fields(program = args.first().map(String::as_str)))]
pub async fn run_engine_command(
    args: Vec<String>,
    timeout: Option<Duration>,
) -> Result<EngineOutput, EngineError> {
    let program = args
        .first()
        .ok_or_else(|| EngineError::CommandFailed {
            code: SENTINEL_EXIT_CODE,
            stderr: "empty command arguments".to_string(),
        })?;

    debug!(?args, "running engine command");

    let child = Command::new(program)
        .args(&args[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                EngineError::Unavailable(format!("engine binary '{program}' not found"))
            }
            _ => EngineError::SpawnFailed(e),
        })?;

    // Dropping the wait future on timeout drops the child, which kills it
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| EngineError::Timeout(limit))??,
        None => child.wait_with_output().await?,
    };

    let result = EngineOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(SENTINEL_EXIT_CODE),
    };

    debug!(exit_code = result.exit_code, "engine command complete");

    Ok(result)
}
