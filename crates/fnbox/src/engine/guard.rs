//! Cleanup tracking for single-use container instances

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::engine::command::{EngineAction, EngineCommand};

/// Tracks a cold instance until its run has been accounted for
///
/// Call [`disarm()`](Self::disarm) once the instance is known to be gone
/// (exited with `--rm`, or removed explicitly). If the guard is dropped while
/// still armed, e.g. because the request future was cancelled mid-run, it
/// force-removes the instance from a spawned thread. That cleanup is
/// best-effort and may not complete before process exit; leftovers carry the
/// cold label and are collected by `reap_orphans`.
#[derive(Debug)]
pub struct InstanceGuard {
    engine_path: PathBuf,
    name: String,
    armed: bool,
}

impl InstanceGuard {
    pub fn new(engine_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            engine_path: engine_path.into(),
            name: name.into(),
            armed: true,
        }
    }

    /// Name of the tracked instance
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop tracking the instance
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        warn!(
            instance = %self.name,
            "cold instance abandoned mid-run, attempting best-effort removal"
        );

        let args = EngineCommand::new(&self.engine_path)
            .action(EngineAction::Remove)
            .name(self.name.clone())
            .build();
        let name = self.name.clone();

        std::thread::spawn(move || {
            if let Some(program) = args.first() {
                match std::process::Command::new(program)
                    .args(&args[1..])
                    .output()
                {
                    Ok(output) if output.status.success() => {
                        debug!(instance = %name, "best-effort removal succeeded");
                    }
                    Ok(output) => {
                        let stderr = String::from_utf8_lossy(&output.stderr);
                        warn!(instance = %name, stderr = %stderr, "best-effort removal failed");
                    }
                    Err(e) => {
                        warn!(instance = %name, error = %e, "best-effort removal spawn failed");
                    }
                }
            }
        });
    }
}
