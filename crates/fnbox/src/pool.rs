//! Warm container pool
//!
//! One long-lived container per language with a warm section in the config.
//! Entries are created up front and never removed; a dead container is
//! restarted in place by the next [`WarmPool::ensure_running`] call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::engine::{ContainerEngine, EngineError};

/// Errors that occur while keeping warm containers alive
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("container engine unavailable: {0}")]
    Unavailable(#[source] EngineError),

    #[error("failed to start warm container '{name}' for {language}: {source}")]
    StartFailed {
        language: String,
        name: String,
        #[source]
        source: EngineError,
    },
}

/// Last state the pool observed for a warm container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Unknown,
    Starting,
    Running,
    Dead,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Unknown => "unknown",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// Pool entry for one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmPoolEntry {
    pub language: String,
    pub container_name: String,
    pub image: String,
    pub keep_alive: Vec<String>,
    pub state: ContainerState,
}

/// Keeps exactly one warm container running per configured language
#[derive(Debug)]
pub struct WarmPool {
    engine: Arc<dyn ContainerEngine>,

    /// Per-language entries; each lock covers the check-then-start sequence
    entries: HashMap<String, Mutex<WarmPoolEntry>>,
}

impl WarmPool {
    /// Build the pool from every language with a warm section
    pub fn new(config: &Config, engine: Arc<dyn ContainerEngine>) -> Self {
        let entries = config
            .languages
            .iter()
            .filter_map(|(id, language)| {
                let warm = language.warm.as_ref()?;
                let image = language.warm_image()?.to_owned();
                let entry = WarmPoolEntry {
                    language: id.clone(),
                    container_name: warm.container_name(id),
                    image,
                    keep_alive: warm.keep_alive.clone(),
                    state: ContainerState::Unknown,
                };
                Some((id.clone(), Mutex::new(entry)))
            })
            .collect();

        Self { engine, entries }
    }

    /// Check if the language has a warm container
    pub fn supports(&self, language: &str) -> bool {
        self.entries.contains_key(language)
    }

    /// Make sure the warm container for `language` is running
    ///
    /// Returns the container name, or `None` when the language has no warm
    /// container. Concurrent callers for the same language are serialized, so
    /// at most one start is issued.
    #[instrument(skip(self))]
    pub async fn ensure_running(&self, language: &str) -> Result<Option<String>, PoolError> {
        let Some(slot) = self.entries.get(language) else {
            debug!("no warm container configured");
            return Ok(None);
        };

        let mut entry = slot.lock().await;

        match self.engine.is_running(&entry.container_name).await {
            Ok(true) => {
                entry.state = ContainerState::Running;
                return Ok(Some(entry.container_name.clone()));
            }
            Ok(false) => {}
            Err(e @ EngineError::Unavailable(_)) => {
                entry.state = ContainerState::Unknown;
                return Err(PoolError::Unavailable(e));
            }
            Err(e) => {
                warn!(container = %entry.container_name, error = %e, "state query failed, restarting");
            }
        }

        entry.state = ContainerState::Starting;
        let started = self
            .engine
            .start_detached(&entry.container_name, &entry.image, &entry.keep_alive)
            .await;

        match started {
            Ok(()) => {
                entry.state = ContainerState::Running;
                info!(container = %entry.container_name, image = %entry.image, "warm container running");
                Ok(Some(entry.container_name.clone()))
            }
            Err(e @ EngineError::Unavailable(_)) => {
                entry.state = ContainerState::Dead;
                Err(PoolError::Unavailable(e))
            }
            Err(source) => {
                entry.state = ContainerState::Dead;
                Err(PoolError::StartFailed {
                    language: entry.language.clone(),
                    name: entry.container_name.clone(),
                    source,
                })
            }
        }
    }

    /// Start every warm container, logging failures
    ///
    /// Returns the languages whose container is running afterwards.
    pub async fn ensure_all(&self) -> Vec<String> {
        let mut languages: Vec<&String> = self.entries.keys().collect();
        languages.sort();

        let mut running = Vec::new();
        for language in languages {
            match self.ensure_running(language).await {
                Ok(Some(_)) => running.push(language.clone()),
                Ok(None) => {}
                Err(e) => warn!(language = %language, error = %e, "warm container not started"),
            }
        }
        running
    }

    /// Record that the warm container for `language` has gone away
    pub async fn mark_dead(&self, language: &str) {
        if let Some(slot) = self.entries.get(language) {
            let mut entry = slot.lock().await;
            warn!(container = %entry.container_name, "warm container reported missing");
            entry.state = ContainerState::Dead;
        }
    }

    /// Current view of all entries, sorted by language
    pub async fn snapshot(&self) -> Vec<WarmPoolEntry> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for slot in self.entries.values() {
            entries.push(slot.lock().await.clone());
        }
        entries.sort_by(|a, b| a.language.cmp(&b.language));
        entries
    }
}
