//! Command builder for the container engine CLI
//!
//! Builds command-line arguments for docker-compatible engines.

use std::path::{Path, PathBuf};

use crate::types::{ContainerLimits, MountConfig};

/// Builder for engine command-line arguments
#[derive(Debug)]
pub struct EngineCommand {
    /// Path to the engine binary
    engine_path: PathBuf,
    action: EngineAction,
    /// --name, or the target container for exec/inspect/rm
    name: Option<String>,
    image: Option<String>,
    /// --runtime
    runtime: Option<String>,
    limits: ContainerLimits,
    /// -v
    mounts: Vec<MountConfig>,
    /// --label
    labels: Vec<String>,
    /// -w
    working_dir: Option<String>,
    /// -d
    detach: bool,
    /// --rm
    remove_on_exit: bool,
    /// --format
    format: Option<String>,
    /// --filter
    filters: Vec<String>,
    command: Vec<String>,
}

impl EngineCommand {
    /// Create a new engine command builder
    pub fn new(engine_path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: engine_path.into(),
            action: EngineAction::Run,
            name: None,
            image: None,
            runtime: None,
            limits: ContainerLimits::none(),
            mounts: Vec::new(),
            labels: Vec::new(),
            working_dir: None,
            detach: false,
            remove_on_exit: false,
            format: None,
            filters: Vec::new(),
            command: Vec::new(),
        }
    }

    /// Set the action to perform
    pub fn action(mut self, action: EngineAction) -> Self {
        self.action = action;
        self
    }

    /// Set the container name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the image to run
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the OCI runtime
    pub fn runtime(mut self, runtime: Option<String>) -> Self {
        self.runtime = runtime;
        self
    }

    /// Set container limits
    pub fn limits(mut self, limits: ContainerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Add a bind mount
    pub fn mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Add a `key=value` label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Set the working directory inside the container
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Run detached
    pub fn detach(mut self, enable: bool) -> Self {
        self.detach = enable;
        self
    }

    /// Remove the container when it exits
    pub fn remove_on_exit(mut self, enable: bool) -> Self {
        self.remove_on_exit = enable;
        self
    }

    /// Set the Go template for inspect/info/ps output
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Add a ps filter
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Set the command to run
    pub fn command(mut self, cmd: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = cmd.into_iter().map(Into::into).collect();
        self
    }

    /// Build the command-line arguments
    ///
    /// Consumes self to avoid cloning the command vector.
    pub fn build(self) -> Vec<String> {
        let mut args = vec![self.engine_path.to_string_lossy().into_owned()];

        match self.action {
            EngineAction::Run => {
                args.push("run".to_string());

                if self.remove_on_exit {
                    args.push("--rm".to_string());
                }
                if self.detach {
                    args.push("-d".to_string());
                }
                if let Some(ref name) = self.name {
                    args.push(format!("--name={name}"));
                }
                if let Some(ref runtime) = self.runtime {
                    args.push(format!("--runtime={runtime}"));
                }
                for label in &self.labels {
                    args.push(format!("--label={label}"));
                }

                // Limits
                if let Some(memory) = self.limits.memory_mb {
                    args.push(format!("--memory={memory}m"));
                }
                if let Some(cpus) = self.limits.cpus {
                    args.push(format!("--cpus={cpus}"));
                }
                if let Some(pids) = self.limits.pids {
                    args.push(format!("--pids-limit={pids}"));
                }
                if let Some(ref network) = self.limits.network {
                    args.push(format!("--network={network}"));
                }

                // Mounts
                for mount in &self.mounts {
                    let mode = if mount.writable { "rw" } else { "ro" };
                    args.push("-v".to_string());
                    args.push(format!("{}:{}:{mode}", mount.source, mount.target));
                }

                if let Some(ref dir) = self.working_dir {
                    args.push(format!("--workdir={dir}"));
                }

                if let Some(image) = self.image {
                    args.push(image);
                }
                args.extend(self.command);
            }
            EngineAction::Exec => {
                args.push("exec".to_string());
                if let Some(ref dir) = self.working_dir {
                    args.push(format!("--workdir={dir}"));
                }
                if let Some(name) = self.name {
                    args.push(name);
                }
                args.extend(self.command);
            }
            EngineAction::Inspect => {
                args.push("inspect".to_string());
                if let Some(ref format) = self.format {
                    args.push(format!("--format={format}"));
                }
                if let Some(name) = self.name {
                    args.push(name);
                }
            }
            EngineAction::Remove => {
                args.push("rm".to_string());
                args.push("--force".to_string());
                if let Some(name) = self.name {
                    args.push(name);
                }
                args.extend(self.command);
            }
            EngineAction::List => {
                args.push("ps".to_string());
                args.push("--all".to_string());
                args.push("--quiet".to_string());
                for filter in &self.filters {
                    args.push(format!("--filter={filter}"));
                }
            }
            EngineAction::Info => {
                args.push("info".to_string());
                if let Some(ref format) = self.format {
                    args.push(format!("--format={format}"));
                }
            }
        }

        args
    }

    /// Get the engine binary path
    pub fn engine_path(&self) -> &Path {
        &self.engine_path
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    /// Create and start a container
    Run,
    /// Run a command in a running container
    Exec,
    /// Query container state
    Inspect,
    /// Force-remove containers (name, then any ids given as the command)
    Remove,
    /// List container ids
    List,
    /// Query engine-wide information
    Info,
}
