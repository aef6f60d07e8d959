//! Per-request workspaces for cold runs

use std::path::Path;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::COLD_NAME_PREFIX;
use crate::types::MountConfig;

/// Prefix of workspace directories on the host
pub const WORKSPACE_PREFIX: &str = "fnbox-";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("language '{0}' is not configured")]
    UnsupportedLanguage(String),

    #[error("failed to prepare workspace: {0}")]
    Io(#[from] std::io::Error),
}

/// Staged source plus the command that runs it
///
/// Owns its workspace directory. The directory is removed when the context is
/// dropped, whichever way the request ends.
#[derive(Debug)]
pub struct ExecutionContext {
    workspace: TempDir,
    source_name: String,
    command: Vec<String>,
    instance_name: String,
}

impl ExecutionContext {
    /// Stage `code` for a cold run of `language_id`
    ///
    /// The language is resolved before anything touches the filesystem.
    #[instrument(skip(config, code), fields(len = code.len()))]
    pub async fn build(
        config: &Config,
        language_id: &str,
        code: &str,
    ) -> Result<Self, ContextError> {
        let language = config
            .languages
            .get(language_id)
            .ok_or_else(|| ContextError::UnsupportedLanguage(language_id.to_owned()))?;

        let id = Uuid::new_v4().simple().to_string();
        let source_name = language.source_name(&format!("fn_{id}"));
        let command = language.run_command(&source_name);

        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let workspace = match config.workspace_root {
            Some(ref root) => {
                tokio::fs::create_dir_all(root).await?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        tokio::fs::write(workspace.path().join(&source_name), code).await?;

        debug!(workspace = %workspace.path().display(), source_name, "staged source");

        Ok(Self {
            workspace,
            source_name,
            command,
            instance_name: format!("{COLD_NAME_PREFIX}{id}"),
        })
    }

    /// Host path of the workspace
    pub fn path(&self) -> &Path {
        self.workspace.path()
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Command to run inside the container, relative to the mount point
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Name for the cold instance serving this request
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Read-write mount of the workspace at `target`
    pub fn mount(&self, target: &str) -> MountConfig {
        MountConfig {
            source: self.path().to_string_lossy().into_owned(),
            target: target.to_owned(),
            writable: true,
        }
    }

    /// Remove the workspace, logging failures
    pub fn close(self) {
        let path = self.path().to_path_buf();
        if let Err(e) = self.workspace.close() {
            warn!(workspace = %path.display(), error = %e, "failed to remove workspace");
        }
    }
}
