use std::sync::Arc;

use fnbox::pool::{ContainerState, WarmPool};
use fnbox::types::{ExecutionRequest, FailureKind, RuntimeMode};

use super::{Harness, test_config};
use crate::stub::{Behavior, StubEngine};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_ensure_running_starts_once() {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(StubEngine::new(Behavior::Interpret));
    let pool = Arc::new(WarmPool::new(&test_config(root.path()), engine.clone()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.ensure_running("python").await })
        })
        .collect();

    for handle in handles {
        let name = handle.await.unwrap().unwrap();
        assert_eq!(name.as_deref(), Some("warm-python-fn"));
    }

    assert_eq!(engine.starts(), 1);
    assert_eq!(pool.snapshot().await[0].state, ContainerState::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_warm_requests_share_one_container() {
    let harness = Arc::new(Harness::interpreting());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move {
                let request = ExecutionRequest::new(
                    format!("print('call {i}')"),
                    "python",
                    RuntimeMode::Warm,
                );
                harness.dispatcher.execute(&request).await
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.stdout, format!("call {i}"));
    }

    assert_eq!(harness.engine.starts(), 1);
    assert_eq!(harness.engine.execs(), 8);
}

#[tokio::test]
async fn warm_request_for_unconfigured_language_makes_no_engine_call() {
    let harness = Harness::interpreting();

    let request = ExecutionRequest::new("puts 'hi'", "ruby", RuntimeMode::Warm);
    let result = harness.dispatcher.execute(&request).await;

    assert_eq!(result.failure, Some(FailureKind::UnsupportedLanguage));
    assert_eq!(result.exit_code, -1);
    assert!(result.metrics.error.unwrap().contains("ruby"));
    assert_eq!(harness.engine.calls(), 0);
}

#[tokio::test]
async fn warm_request_for_cold_only_language_does_not_fall_back() {
    let harness = Harness::interpreting();

    let request = ExecutionRequest::new("console.log(1)", "javascript", RuntimeMode::Warm);
    let result = harness.dispatcher.execute(&request).await;

    assert_eq!(result.failure, Some(FailureKind::UnsupportedLanguage));
    assert_eq!(harness.engine.calls(), 0);
    assert!(harness.engine.runs().is_empty());
}

#[tokio::test]
async fn dead_container_is_marked_and_restarted() {
    let harness = Harness::interpreting();
    let request = ExecutionRequest::new("print('ok')", "python", RuntimeMode::Warm);

    assert!(harness.dispatcher.execute(&request).await.is_success());

    // Dies while idle
    harness.engine.kill("warm-python-fn");
    let again = harness.dispatcher.execute(&request).await;
    assert!(again.is_success(), "{again:?}");
    assert_eq!(harness.engine.starts(), 2);

    let snapshot = harness.dispatcher.pool().snapshot().await;
    assert_eq!(snapshot[0].state, ContainerState::Running);
}

#[tokio::test]
async fn exec_into_missing_container_marks_entry_dead() {
    let harness = Harness::interpreting();
    let pool = harness.dispatcher.pool();
    pool.ensure_running("python").await.unwrap();

    harness.engine.vanish_on_next_exec();
    let request = ExecutionRequest::new("print('lost')", "python", RuntimeMode::Warm);
    let result = harness.dispatcher.execute(&request).await;

    assert_eq!(result.exit_code, -1, "{result:?}");
    assert!(result.metrics.error.is_some());
    assert_eq!(pool.snapshot().await[0].state, ContainerState::Dead);

    let request = ExecutionRequest::new("print('back')", "python", RuntimeMode::Warm);
    let result = harness.dispatcher.execute(&request).await;
    assert_eq!(result.stdout, "back");
    assert_eq!(pool.snapshot().await[0].state, ContainerState::Running);
    assert_eq!(harness.engine.starts(), 2);
}

#[tokio::test]
async fn start_failure_is_a_result_and_retried() {
    let harness = Harness::new(StubEngine::new(Behavior::Interpret).failing_start());
    let request = ExecutionRequest::new("print('x')", "python", RuntimeMode::Warm);

    let result = harness.dispatcher.execute(&request).await;
    assert_eq!(result.failure, Some(FailureKind::PoolStartFailed));
    assert_eq!(result.exit_code, -1);
    assert!(result.metrics.error.is_some());

    harness.dispatcher.execute(&request).await;
    assert_eq!(harness.engine.starts(), 2);
    assert_eq!(harness.engine.execs(), 0);
}

#[tokio::test]
async fn unavailable_engine_is_a_result() {
    let harness = Harness::new(StubEngine::new(Behavior::Unavailable));

    for mode in [RuntimeMode::Warm, RuntimeMode::ColdStandard] {
        let request = ExecutionRequest::new("print('x')", "python", mode);
        let result = harness.dispatcher.execute(&request).await;
        assert_eq!(result.failure, Some(FailureKind::EngineUnavailable), "{mode}");
        assert!(
            result
                .metrics
                .error
                .as_deref()
                .unwrap()
                .contains("Cannot connect")
        );
    }
}

#[tokio::test]
async fn ensure_all_starts_every_warm_language() {
    let harness = Harness::interpreting();
    let running = harness.dispatcher.pool().ensure_all().await;
    assert_eq!(running, vec!["python".to_owned()]);
    assert_eq!(harness.engine.starts(), 1);
}
