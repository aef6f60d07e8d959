use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use crate::metrics::MetricsError;
use crate::types::MetricSample;

/// Summary of all samples recorded for a function
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Aggregate {
    /// Mean duration in seconds, `None` without samples
    pub avg_duration: Option<f64>,
    pub count: u64,
}

/// Append-only persistence for metric samples
///
/// Implementations must accept concurrent inserts.
#[async_trait]
pub trait MetricsStore: Send + Sync + std::fmt::Debug {
    async fn insert(&self, sample: &MetricSample) -> Result<(), MetricsError>;

    /// Summarize samples for `function_name`; unknown names are not an error
    async fn aggregate(&self, function_name: &str) -> Result<Aggregate, MetricsError>;
}

/// Store that keeps samples in memory
#[derive(Debug, Default)]
pub struct MemoryMetricsStore {
    samples: Mutex<Vec<MetricSample>>,
}

impl MemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every sample in insertion order
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn insert(&self, sample: &MetricSample) -> Result<(), MetricsError> {
        self.samples
            .lock()
            .map_err(|_| MetricsError::Poisoned)?
            .push(sample.clone());
        Ok(())
    }

    async fn aggregate(&self, function_name: &str) -> Result<Aggregate, MetricsError> {
        let samples = self.samples.lock().map_err(|_| MetricsError::Poisoned)?;
        let (sum, count) = samples
            .iter()
            .filter(|s| s.function_name == function_name)
            .fold((0.0, 0u64), |(sum, count), s| (sum + s.duration, count + 1));

        Ok(Aggregate {
            avg_duration: (count > 0).then(|| sum / count as f64),
            count,
        })
    }
}
