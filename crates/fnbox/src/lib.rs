//! A library for running untrusted function code in containers.
//!
//! fnbox dispatches submitted code either into a long-lived per-language
//! ("warm") container or into a fresh single-use ("cold") container, bounds
//! every run in time, and records duration, CPU and memory for each invocation.
//! The containers themselves are provided by an OCI engine such as docker or
//! podman.
//!
//! # Features
//!
//! - **Three runtime modes**: `warm`, `cold-standard` and `cold-sandboxed`
//!   (e.g. gVisor's `runsc`), with an explicit capability check for the latter.
//! - **Self-healing warm pool**: one container per language, started at most once under concurrent requests.
//! - **Scoped workspaces**: cold runs stage code in a temporary directory removed on every exit path.
//! - **Structured results**: failures, timeouts included, come back as an [`ExecutionResult`], never as a panic or error.
//! - **Metrics**: per-invocation samples in memory or SQLite.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fnbox::{CliEngine, Config, Dispatcher, ExecutionRequest, RuntimeMode};
//!
//! # async fn run() {
//! let config = Config::default();
//! let engine = Arc::new(CliEngine::new(config.engine_binary()));
//! let dispatcher = Dispatcher::new(config, engine);
//!
//! let request = ExecutionRequest::new("print('hi')", "python", RuntimeMode::ColdStandard);
//! let result = dispatcher.execute(&request).await;
//! println!("{} (exit {})", result.stdout, result.exit_code);
//! # }
//! ```

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use engine::{CliEngine, ContainerEngine, EngineError, EngineOutput, EphemeralRun};
pub use metrics::{
    Aggregate, MemoryMetricsStore, MetricsError, MetricsRecorder, MetricsStore,
    SqliteMetricsStore,
};
pub use pool::{ContainerState, PoolError, WarmPool, WarmPoolEntry};
pub use registry::{FunctionLookup, FunctionMetadata, FunctionRegistry, InMemoryRegistry};
pub use runner::{ContextError, Dispatcher, ExecutionContext, ExecutionError};
pub use types::{
    ContainerLimits, ExecutionMetrics, ExecutionRequest, ExecutionResult, FailureKind,
    MetricSample, MountConfig, RuntimeMode,
};

pub mod config;
pub mod engine;
pub mod metrics;
pub mod pool;
pub mod registry;
pub mod runner;
pub mod types;
