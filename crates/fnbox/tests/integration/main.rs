//! Integration tests for fnbox
//!
//! These tests drive a real container engine (docker by default, or the
//! binary named by `FNBOX_TEST_ENGINE`).
//! Run with: cargo test -p fnbox --features integration-tests
//!
//! Tests that need a running engine are marked `#[ignore]`. To include them:
//!    cargo test -p fnbox --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::path::PathBuf;
use std::sync::Arc;

use fnbox::config::Config;
use fnbox::{CliEngine, Dispatcher, InMemoryRegistry, MemoryMetricsStore, MetricsRecorder};
use tempfile::TempDir;

mod config_loading;

/// Engine binary under test
pub(crate) fn engine_path() -> PathBuf {
    std::env::var_os("FNBOX_TEST_ENGINE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("docker"))
}

/// Default config pointed at the engine under test, workspaces in `root`
pub(crate) fn test_config(root: &TempDir) -> Config {
    let mut config = Config::default();
    config.engine_path = Some(engine_path());
    config.workspace_root = Some(root.path().to_path_buf());
    // Image pulls on a cold cache can take a while
    config.timeouts.cold = 60.0;
    config
}

pub(crate) fn test_dispatcher(config: Config) -> (Dispatcher, Arc<MemoryMetricsStore>) {
    let engine = Arc::new(
        CliEngine::new(config.engine_binary())
            .with_exec_kill_inside(config.timeouts.exec_kill_inside),
    );
    let store = Arc::new(MemoryMetricsStore::new());
    let registry = Arc::new(InMemoryRegistry::from_config(&config));
    let dispatcher = Dispatcher::new(config, engine)
        .with_recorder(MetricsRecorder::new(store.clone()))
        .with_registry(registry);
    (dispatcher, store)
}
