//! Execution dispatch
//!
//! [`Dispatcher::execute`] is the error boundary of the crate: it picks the
//! backend for a request, bounds the backend call in time, records one metric
//! sample and always hands back an [`ExecutionResult`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use crate::runner::context::{ContextError, ExecutionContext, WORKSPACE_PREFIX};
pub use crate::runner::normalize::{normalize, rejected};

mod context;
mod normalize;

use crate::config::{BackendKind, Config, ConfigError, RuntimeProfile};
use crate::engine::{ContainerEngine, EngineError, EngineOutput, EphemeralRun};
use crate::metrics::MetricsRecorder;
use crate::pool::{PoolError, WarmPool};
use crate::registry::FunctionLookup;
use crate::types::{
    ExecutionRequest, ExecutionResult, FailureKind, RuntimeMode, UNKNOWN_FUNCTION,
};

/// Everything that can keep a request from producing a program exit code
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("language '{0}' is not supported in the requested mode")]
    UnsupportedLanguage(String),

    #[error("warm container unavailable: {0}")]
    PoolStartFailed(#[source] PoolError),

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("container engine failed: {0}")]
    EngineFailed(#[source] EngineError),

    #[error("workspace error: {0}")]
    Workspace(#[source] std::io::Error),
}

impl ExecutionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutionError::InvalidRequest(_) => FailureKind::InvalidRequest,
            ExecutionError::UnsupportedLanguage(_) => FailureKind::UnsupportedLanguage,
            ExecutionError::PoolStartFailed(_) => FailureKind::PoolStartFailed,
            ExecutionError::Timeout(_) => FailureKind::Timeout,
            ExecutionError::EngineUnavailable(_) => FailureKind::EngineUnavailable,
            ExecutionError::EngineFailed(_) => FailureKind::EngineFailed,
            ExecutionError::Workspace(_) => FailureKind::Workspace,
        }
    }
}

impl From<EngineError> for ExecutionError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Timeout(bound) => ExecutionError::Timeout(bound),
            EngineError::Unavailable(reason) => ExecutionError::EngineUnavailable(reason),
            other => ExecutionError::EngineFailed(other),
        }
    }
}

impl From<PoolError> for ExecutionError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Unavailable(inner) => inner.into(),
            start @ PoolError::StartFailed { .. } => ExecutionError::PoolStartFailed(start),
        }
    }
}

impl From<ContextError> for ExecutionError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::UnsupportedLanguage(id) => ExecutionError::UnsupportedLanguage(id),
            ContextError::Io(e) => ExecutionError::Workspace(e),
        }
    }
}

impl From<ConfigError> for ExecutionError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::LanguageNotFound(id) | ConfigError::NoWarmContainer(id) => {
                ExecutionError::UnsupportedLanguage(id)
            }
            other => ExecutionError::InvalidRequest(other.to_string()),
        }
    }
}

/// Top-level entry point for running submitted code
#[derive(Debug)]
pub struct Dispatcher {
    config: Arc<Config>,
    engine: Arc<dyn ContainerEngine>,
    pool: WarmPool,
    recorder: MetricsRecorder,
    registry: Option<Arc<dyn FunctionLookup>>,

    /// Runtimes the engine has confirmed; misses are asked again
    runtimes_seen: Mutex<HashSet<String>>,
}

impl Dispatcher {
    /// Create a dispatcher recording metrics in memory
    pub fn new(config: impl Into<Arc<Config>>, engine: Arc<dyn ContainerEngine>) -> Self {
        let config = config.into();
        let pool = WarmPool::new(&config, Arc::clone(&engine));
        Self {
            config,
            engine,
            pool,
            recorder: MetricsRecorder::in_memory(),
            registry: None,
            runtimes_seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_recorder(mut self, recorder: MetricsRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Resolve function names for metric attribution through `registry`
    pub fn with_registry(mut self, registry: Arc<dyn FunctionLookup>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    pub fn pool(&self) -> &WarmPool {
        &self.pool
    }

    pub fn recorder(&self) -> &MetricsRecorder {
        &self.recorder
    }

    /// Run a request; never fails
    #[instrument(skip(self, request), fields(language = %request.language, mode = %request.runtime_mode))]
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let result = self.dispatch(request).await;
        self.finish(request.function.as_deref(), result).await
    }

    /// Run a request whose mode is still a string
    ///
    /// An unknown mode is an invalid request.
    pub async fn execute_raw(
        &self,
        code: &str,
        language: &str,
        mode: &str,
        function: Option<&str>,
    ) -> ExecutionResult {
        match mode.parse::<RuntimeMode>() {
            Ok(mode) => {
                let mut request = ExecutionRequest::new(code, language, mode);
                request.function = function.map(str::to_owned);
                self.execute(&request).await
            }
            Err(e) => {
                let result = rejected(ExecutionError::InvalidRequest(e.to_string()));
                self.finish(function, result).await
            }
        }
    }

    /// Record the metric sample for a finished request
    async fn finish(&self, function: Option<&str>, result: ExecutionResult) -> ExecutionResult {
        let name = self.function_name(function);
        self.recorder.record(&name, &result.metrics).await;

        debug!(
            function = %name,
            exit_code = result.exit_code,
            failure = ?result.failure,
            duration = result.metrics.duration,
            "request complete"
        );
        result
    }

    /// Registered name for attribution, or [`UNKNOWN_FUNCTION`]
    fn function_name(&self, function: Option<&str>) -> String {
        function
            .zip(self.registry.as_ref())
            .and_then(|(name, registry)| registry.get(name))
            .map(|metadata| metadata.name)
            .unwrap_or_else(|| UNKNOWN_FUNCTION.to_owned())
    }

    async fn dispatch(&self, request: &ExecutionRequest) -> ExecutionResult {
        if request.code.trim().is_empty() {
            return rejected(ExecutionError::InvalidRequest("code is empty".to_owned()));
        }

        let profile = match self.config.profile(request.runtime_mode, &request.language) {
            Ok(profile) => profile,
            Err(e) => return rejected(e.into()),
        };

        match profile.backend {
            BackendKind::ExecIntoRunning => self.run_warm(request, &profile).await,
            BackendKind::EphemeralRun => self.run_cold(request, &profile).await,
        }
    }

    async fn run_warm(&self, request: &ExecutionRequest, profile: &RuntimeProfile) -> ExecutionResult {
        let container = match self.pool.ensure_running(&request.language).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                return rejected(ExecutionError::UnsupportedLanguage(request.language.clone()));
            }
            Err(e) => return rejected(e.into()),
        };
        let command = match self.config.get_language(&request.language) {
            Ok(language) => language.inline_command(&request.code),
            Err(e) => return rejected(e.into()),
        };

        let call = self.engine.exec_in(&container, &command, profile.timeout);
        let (outcome, usage) = MetricsRecorder::measure(self.bounded(profile.timeout, call)).await;

        if let Err(EngineError::NotRunning(_)) = outcome {
            self.pool.mark_dead(&request.language).await;
        }

        normalize(outcome.map_err(ExecutionError::from), usage, None)
    }

    async fn run_cold(&self, request: &ExecutionRequest, profile: &RuntimeProfile) -> ExecutionResult {
        let runtime = match self.resolve_runtime(profile).await {
            Ok(runtime) => runtime,
            Err(e) => return rejected(e),
        };
        let limits = match self.config.get_language(&request.language) {
            Ok(language) => self.config.effective_limits(language),
            Err(e) => return rejected(e.into()),
        };
        let ctx = match ExecutionContext::build(&self.config, &request.language, &request.code).await
        {
            Ok(ctx) => ctx,
            Err(e) => return rejected(e.into()),
        };

        let workdir = self.config.container_workdir.clone();
        let run = EphemeralRun {
            name: ctx.instance_name().to_owned(),
            image: profile.image.clone(),
            runtime: Some(runtime.clone()),
            mount: ctx.mount(&workdir),
            workdir,
            limits,
            command: ctx.command().to_vec(),
        };

        let call = self.engine.run_ephemeral(&run, profile.timeout);
        let (outcome, usage) = MetricsRecorder::measure(self.bounded(profile.timeout, call)).await;
        ctx.close();

        normalize(outcome.map_err(ExecutionError::from), usage, Some(runtime))
    }

    /// Bound a backend call by `bound` plus the configured grace
    ///
    /// The engine is expected to report its own timeout first; the grace only
    /// covers an engine that stops responding.
    async fn bounded<F>(&self, bound: Duration, call: F) -> Result<EngineOutput, EngineError>
    where
        F: Future<Output = Result<EngineOutput, EngineError>>,
    {
        let limit = bound.saturating_add(self.config.timeouts.grace());
        match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(?bound, "engine did not return within grace period");
                Err(EngineError::Timeout(bound))
            }
        }
    }

    /// OCI runtime a cold profile actually runs under
    async fn resolve_runtime(&self, profile: &RuntimeProfile) -> Result<String, ExecutionError> {
        let runtimes = &self.config.runtimes;
        let runtime = profile
            .isolation
            .clone()
            .unwrap_or_else(|| runtimes.standard.clone());

        if profile.mode != RuntimeMode::ColdSandboxed || self.runtime_available(&runtime).await? {
            return Ok(runtime);
        }

        if runtimes.sandbox_fallback {
            warn!(
                sandboxed = %runtime,
                standard = %runtimes.standard,
                "sandboxed runtime missing, running with the standard runtime"
            );
            return Ok(runtimes.standard.clone());
        }

        Err(ExecutionError::EngineUnavailable(format!(
            "sandboxed runtime '{runtime}' is not installed"
        )))
    }

    async fn runtime_available(&self, runtime: &str) -> Result<bool, ExecutionError> {
        if let Ok(seen) = self.runtimes_seen.lock()
            && seen.contains(runtime)
        {
            return Ok(true);
        }

        let available = self.engine.runtime_available(runtime).await?;
        info!(runtime, available, "checked runtime support");
        if available && let Ok(mut seen) = self.runtimes_seen.lock() {
            seen.insert(runtime.to_owned());
        }
        Ok(available)
    }
}
