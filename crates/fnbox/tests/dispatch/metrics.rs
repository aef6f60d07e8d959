use std::sync::Arc;

use fnbox::metrics::{MetricsRecorder, MetricsStore, SqliteMetricsStore};
use fnbox::types::{ExecutionRequest, RuntimeMode};
use fnbox::{Dispatcher, InMemoryRegistry};

use super::{Harness, test_config};
use crate::stub::{Behavior, StubEngine};

#[tokio::test]
async fn aggregate_for_function_without_samples() {
    let harness = Harness::interpreting();
    let aggregate = harness.dispatcher.recorder().aggregate("never-ran").await.unwrap();
    assert_eq!(aggregate.avg_duration, None);
    assert_eq!(aggregate.count, 0);
}

#[tokio::test]
async fn one_sample_per_invocation() {
    let harness = Harness::interpreting();

    let requests = [
        ExecutionRequest::new("print('a')", "python", RuntimeMode::Warm),
        ExecutionRequest::new("print('b')", "python", RuntimeMode::ColdStandard),
        ExecutionRequest::new("raise Exception", "python", RuntimeMode::ColdSandboxed),
        ExecutionRequest::new("", "python", RuntimeMode::Warm),
    ];
    for request in &requests {
        harness.dispatcher.execute(request).await;
    }

    let samples = harness.store.samples();
    assert_eq!(samples.len(), requests.len());
    assert_eq!(samples[0].error, None);
    assert_eq!(samples[1].error, None);
    assert!(samples[2].error.is_some());
    assert!(samples[3].error.is_some());
    assert!(samples.iter().all(|s| s.duration >= 0.0 && s.memory_mb >= 0.0));
}

#[tokio::test]
async fn attribution_goes_through_the_registry() {
    let harness = Harness::interpreting();

    let named = ExecutionRequest::new("print('x')", "python", RuntimeMode::ColdStandard)
        .with_function("hello");
    let unregistered = ExecutionRequest::new("print('x')", "python", RuntimeMode::ColdStandard)
        .with_function("not-registered");
    let anonymous = ExecutionRequest::new("print('x')", "python", RuntimeMode::ColdStandard);

    for request in [&named, &unregistered, &anonymous] {
        harness.dispatcher.execute(request).await;
    }

    let names: Vec<_> = harness
        .store
        .samples()
        .into_iter()
        .map(|s| s.function_name)
        .collect();
    assert_eq!(names, vec!["hello", "unknown", "unknown"]);

    let aggregate = harness.dispatcher.recorder().aggregate("hello").await.unwrap();
    assert_eq!(aggregate.count, 1);
    assert!(aggregate.avg_duration.is_some());
}

#[tokio::test]
async fn samples_reach_sqlite() {
    let workspaces = tempfile::tempdir().unwrap();
    let config = test_config(workspaces.path());
    let db = workspaces.path().join("metrics.db");

    let store = Arc::new(SqliteMetricsStore::open(&db).unwrap());
    let registry = Arc::new(InMemoryRegistry::from_config(&config));
    let dispatcher = Dispatcher::new(config, Arc::new(StubEngine::new(Behavior::Interpret)))
        .with_recorder(MetricsRecorder::new(store.clone()))
        .with_registry(registry);

    let request = ExecutionRequest::new(
        "print('Lambda Execution Works!')",
        "python",
        RuntimeMode::ColdStandard,
    )
    .with_function("hello");
    let result = dispatcher.execute(&request).await;
    assert_eq!(result.stdout, "Lambda Execution Works!");

    let aggregate = store.aggregate("hello").await.unwrap();
    assert_eq!(aggregate.count, 1);
    assert_eq!(aggregate.avg_duration, Some(result.metrics.duration));
}
