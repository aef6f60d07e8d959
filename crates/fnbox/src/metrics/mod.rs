//! Invocation metrics
//!
//! [`MetricsRecorder`] measures a backend call with a [`ResourceProbe`] and
//! hands one [`MetricSample`] per invocation to a [`MetricsStore`].

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

pub use crate::metrics::probe::{ResourceProbe, ResourceUsage};
pub use crate::metrics::sqlite::SqliteMetricsStore;
pub use crate::metrics::store::{Aggregate, MemoryMetricsStore, MetricsStore};
use crate::types::{ExecutionMetrics, MetricSample};

mod probe;
mod sqlite;
mod store;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("metrics task failed: {0}")]
    Task(String),

    #[error("metrics store lock poisoned")]
    Poisoned,
}

/// Measures invocations and forwards samples to a store
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    store: Arc<dyn MetricsStore>,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Recorder backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryMetricsStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn MetricsStore> {
        &self.store
    }

    /// Await `fut` and measure it
    pub async fn measure<F, T>(fut: F) -> (T, ResourceUsage)
    where
        F: Future<Output = T>,
    {
        let probe = ResourceProbe::start();
        let output = fut.await;
        (output, probe.finish())
    }

    /// Persist one sample for `function_name`
    ///
    /// Insert failures are logged; the sample is returned either way.
    pub async fn record(&self, function_name: &str, metrics: &ExecutionMetrics) -> MetricSample {
        let sample = MetricSample::from_metrics(function_name, metrics);
        match self.store.insert(&sample).await {
            Ok(()) => debug!(
                function = function_name,
                duration = sample.duration,
                "recorded metric sample"
            ),
            Err(e) => warn!(function = function_name, error = %e, "failed to record metric sample"),
        }
        sample
    }

    pub async fn aggregate(&self, function_name: &str) -> Result<Aggregate, MetricsError> {
        self.store.aggregate(function_name).await
    }
}
