//! Maps every backend outcome to an [`ExecutionResult`]

use crate::engine::EngineOutput;
use crate::metrics::ResourceUsage;
use crate::runner::ExecutionError;
use crate::types::{
    ExecutionMetrics, ExecutionResult, FailureKind, SENTINEL_EXIT_CODE, TIMEOUT_MESSAGE,
};

/// Build the result for a finished (or failed) invocation
///
/// Program output is trimmed. A program that exits non-zero is reported with
/// its stderr as the error; anything that kept the program from producing an
/// exit code yields empty output and [`SENTINEL_EXIT_CODE`].
pub fn normalize(
    outcome: Result<EngineOutput, ExecutionError>,
    usage: ResourceUsage,
    isolation: Option<String>,
) -> ExecutionResult {
    let mut metrics = ExecutionMetrics {
        duration: usage.duration,
        cpu_percent: usage.cpu_percent,
        memory_mb: usage.memory_mb,
        error: None,
    };

    match outcome {
        Ok(output) => {
            let stdout = output.stdout.trim().to_owned();
            let stderr = output.stderr.trim().to_owned();
            let failure = if output.success() {
                None
            } else {
                metrics.error = Some(if stderr.is_empty() {
                    format!("exit code {}", output.exit_code)
                } else {
                    stderr.clone()
                });
                Some(FailureKind::NonZeroExit)
            };

            ExecutionResult {
                stdout,
                stderr,
                exit_code: output.exit_code,
                metrics,
                failure,
                isolation,
            }
        }
        Err(err) => {
            let kind = err.kind();
            metrics.error = Some(match kind {
                FailureKind::Timeout => TIMEOUT_MESSAGE.to_owned(),
                _ => err.to_string(),
            });

            ExecutionResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: SENTINEL_EXIT_CODE,
                metrics,
                failure: Some(kind),
                isolation,
            }
        }
    }
}

/// Result for a request rejected before any backend call
pub fn rejected(err: ExecutionError) -> ExecutionResult {
    normalize(Err(err), ResourceUsage::default(), None)
}
