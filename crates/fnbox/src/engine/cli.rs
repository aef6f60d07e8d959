//! [`ContainerEngine`] over a docker-compatible CLI

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::engine::command::{EngineAction, EngineCommand};
use crate::engine::guard::InstanceGuard;
use crate::engine::process::run_engine_command;
use crate::engine::{
    COLD_LABEL, ContainerEngine, EngineError, EngineOutput, EphemeralRun, engine_failure,
    run_failure,
};

/// Bound for engine bookkeeping calls (inspect, rm, info, ps)
const CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Container engine driven through its command-line interface
#[derive(Debug, Clone)]
pub struct CliEngine {
    /// Path to the engine binary
    engine_path: PathBuf,

    /// Wrap execs in `timeout -s KILL` inside the container
    kill_inside: bool,
}

impl CliEngine {
    /// Create an engine driving the binary at `engine_path`
    pub fn new(engine_path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: engine_path.into(),
            kill_inside: true,
        }
    }

    /// Enable or disable the in-container kill wrapper for execs
    pub fn with_exec_kill_inside(mut self, enable: bool) -> Self {
        self.kill_inside = enable;
        self
    }

    /// Get the path to the engine binary
    pub fn engine_path(&self) -> &Path {
        &self.engine_path
    }

    fn command(&self) -> EngineCommand {
        EngineCommand::new(&self.engine_path)
    }

    /// Run a bookkeeping command and fail on any non-zero exit
    async fn control(
        &self,
        args: Vec<String>,
        container: Option<&str>,
    ) -> Result<EngineOutput, EngineError> {
        let output = run_engine_command(args, Some(CONTROL_TIMEOUT)).await?;
        if let Some(err) = engine_failure(&output, container) {
            return Err(err);
        }
        if !output.success() {
            return Err(EngineError::CommandFailed {
                code: output.exit_code,
                stderr: output.stderr.trim().to_owned(),
            });
        }
        Ok(output)
    }

    /// Force-remove a container by name
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<(), EngineError> {
        let args = self
            .command()
            .action(EngineAction::Remove)
            .name(name)
            .build();
        self.control(args, None).await.map(|_| ())
    }

    /// Prefix `command` with an in-container kill after `timeout` plus one second
    fn exec_command(&self, command: &[String], timeout: Duration) -> Vec<String> {
        if !self.kill_inside {
            return command.to_vec();
        }
        let bound = timeout.as_secs() + 1;
        let mut wrapped = vec![
            "timeout".to_owned(),
            "-s".to_owned(),
            "KILL".to_owned(),
            bound.to_string(),
        ];
        wrapped.extend_from_slice(command);
        wrapped
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    #[instrument(skip(self))]
    async fn is_running(&self, name: &str) -> Result<bool, EngineError> {
        let args = self
            .command()
            .action(EngineAction::Inspect)
            .format("{{.State.Running}}")
            .name(name)
            .build();

        let output = run_engine_command(args, Some(CONTROL_TIMEOUT)).await?;
        if output.success() {
            return Ok(output.stdout.trim() == "true");
        }

        // Unknown containers are simply not running
        match engine_failure(&output, Some(name)) {
            Some(err @ EngineError::Unavailable(_)) => Err(err),
            _ if output.stderr.to_lowercase().contains("no such") => Ok(false),
            Some(err) => Err(err),
            None => Err(EngineError::CommandFailed {
                code: output.exit_code,
                stderr: output.stderr.trim().to_owned(),
            }),
        }
    }

    #[instrument(skip(self, keep_alive))]
    async fn start_detached(
        &self,
        name: &str,
        image: &str,
        keep_alive: &[String],
    ) -> Result<(), EngineError> {
        // A stopped container keeps its name reserved
        if let Err(e) = self.remove(name).await {
            debug!(error = %e, "no previous container to remove");
        }

        let args = self
            .command()
            .action(EngineAction::Run)
            .detach(true)
            .name(name)
            .image(image)
            .command(keep_alive.iter().cloned())
            .build();

        self.control(args, None).await?;
        info!(name, image, "started detached container");
        Ok(())
    }

    #[instrument(skip(self, command))]
    async fn exec_in(
        &self,
        name: &str,
        command: &[String],
        timeout: Duration,
    ) -> Result<EngineOutput, EngineError> {
        let args = self
            .command()
            .action(EngineAction::Exec)
            .name(name)
            .command(self.exec_command(command, timeout))
            .build();

        let output = run_engine_command(args, Some(timeout)).await?;
        match engine_failure(&output, Some(name)) {
            Some(err) => Err(err),
            None => Ok(output),
        }
    }

    #[instrument(skip(self, run), fields(name = %run.name, image = %run.image))]
    async fn run_ephemeral(
        &self,
        run: &EphemeralRun,
        timeout: Duration,
    ) -> Result<EngineOutput, EngineError> {
        let mut guard = InstanceGuard::new(&self.engine_path, &run.name);

        let args = self
            .command()
            .action(EngineAction::Run)
            .remove_on_exit(true)
            .name(&run.name)
            .runtime(run.runtime.clone())
            .label(COLD_LABEL)
            .limits(run.limits.clone())
            .mount(run.mount.clone())
            .working_dir(&run.workdir)
            .image(&run.image)
            .command(run.command.iter().cloned())
            .build();

        let outcome = run_engine_command(args, Some(timeout)).await;

        if let Err(EngineError::Timeout(_)) = outcome {
            warn!(instance = %run.name, "cold run timed out, removing instance");
            match self.remove(&run.name).await {
                Ok(()) => guard.disarm(),
                Err(e) => warn!(instance = %run.name, error = %e, "failed to remove timed-out instance"),
            }
            return outcome;
        }

        guard.disarm();
        let output = outcome?;
        match run_failure(&output) {
            Some(err) => Err(err),
            None => Ok(output),
        }
    }

    #[instrument(skip(self))]
    async fn runtime_available(&self, runtime: &str) -> Result<bool, EngineError> {
        let args = self
            .command()
            .action(EngineAction::Info)
            .format("{{json .Runtimes}}")
            .build();

        let output = self.control(args, None).await?;
        Ok(output.stdout.contains(&format!("\"{runtime}\"")))
    }

    #[instrument(skip(self))]
    async fn reap_orphans(&self) -> Result<usize, EngineError> {
        let args = self
            .command()
            .action(EngineAction::List)
            .filter(format!("label={COLD_LABEL}"))
            .build();

        let output = self.control(args, None).await?;
        let ids: Vec<String> = output
            .stdout
            .split_whitespace()
            .map(str::to_owned)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        let args = self
            .command()
            .action(EngineAction::Remove)
            .command(ids)
            .build();
        self.control(args, None).await?;

        info!(count, "removed orphaned cold instances");
        Ok(count)
    }
}
