//! Worker pool dispatch: concurrency bound, deadlines and failure isolation.

use std::sync::Arc;
use std::time::Duration;

use cogforge_core::{
    CognitiveStage, Eligibility, FailureKind, PoolConfig, PoolError, Specialization, StageContext,
    Worker, WorkerPool,
};
use cogforge_core::metrics::METRICS;
use cogforge_model::fakes::{ScriptedGenerator, ScriptedReply};
use cogforge_model::GatewayError;

const STAGE: CognitiveStage = CognitiveStage::CoreImplementation;

fn pool(config: PoolConfig, generator: &Arc<ScriptedGenerator>, ids: &[&str]) -> WorkerPool {
    let mut pool = WorkerPool::new(config);
    for id in ids {
        pool.add_worker(Worker::new(*id, Specialization::General, generator.clone()))
            .unwrap();
    }
    pool
}

fn ctx() -> StageContext {
    StageContext::new("implement an LRU cache")
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_calls_never_exceed_max_concurrent() {
    let generator = Arc::new(ScriptedGenerator::with_default(ScriptedReply::delayed(
        Duration::from_millis(10),
        ScriptedReply::Echo,
    )));
    let config = PoolConfig {
        max_concurrent: 3,
        ..Default::default()
    };
    let pool = pool(config, &generator, &["a", "b", "c", "d", "e", "f", "g"]);

    let dispatch = pool
        .dispatch(STAGE, &ctx(), Eligibility::Specialized)
        .await
        .unwrap();

    assert_eq!(dispatch.outputs.len(), 7);
    assert!(dispatch.failures.is_empty());
    assert_eq!(generator.max_in_flight(), 3);
    assert_eq!(generator.call_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_slow_worker_times_out_alone() {
    let generator = Arc::new(ScriptedGenerator::new().on_worker(
        "slow",
        ScriptedReply::delayed(Duration::from_secs(5), ScriptedReply::Echo),
    ));
    let config = PoolConfig {
        per_call_timeout_ms: 1_000,
        ..Default::default()
    };
    let pool = pool(config, &generator, &["fast", "slow"]);

    let dispatch = pool
        .dispatch(STAGE, &ctx(), Eligibility::Specialized)
        .await
        .unwrap();

    assert_eq!(dispatch.outputs.len(), 1);
    assert_eq!(dispatch.outputs[0].worker_id, "fast");
    assert_eq!(dispatch.failures.len(), 1);
    assert_eq!(dispatch.failures[0].worker_id, "slow");
    assert_eq!(dispatch.failures[0].kind, FailureKind::Timeout);

    let stats = pool.worker_stats();
    assert_eq!(stats["slow"].timeouts, 1);
}

#[tokio::test]
async fn test_gateway_timeout_counts_as_timeout() {
    let generator = Arc::new(ScriptedGenerator::new().on_worker(
        "gw",
        ScriptedReply::Fail(GatewayError::Timeout { after_ms: 1_500 }),
    ));
    let pool = pool(PoolConfig::default(), &generator, &["gw", "ok"]);
    let before = METRICS.snapshot().worker_timeouts;

    let dispatch = pool
        .dispatch(STAGE, &ctx(), Eligibility::Specialized)
        .await
        .unwrap();

    assert_eq!(dispatch.failures.len(), 1);
    assert_eq!(dispatch.failures[0].kind, FailureKind::Timeout);
    let stats = pool.worker_stats();
    assert_eq!(stats["gw"].timeouts, 1);
    assert!(METRICS.snapshot().worker_timeouts > before);
}

#[tokio::test(start_paused = true)]
async fn test_stage_deadline_is_shared_across_batches() {
    let generator = Arc::new(ScriptedGenerator::with_default(ScriptedReply::delayed(
        Duration::from_millis(40),
        ScriptedReply::Echo,
    )));
    let config = PoolConfig {
        max_concurrent: 1,
        per_call_timeout_ms: 1_000,
        stage_deadline_ms: 100,
    };
    let pool = pool(config, &generator, &["w1", "w2", "w3"]);

    let dispatch = pool
        .dispatch(STAGE, &ctx(), Eligibility::Specialized)
        .await
        .unwrap();

    let ids: Vec<&str> = dispatch.outputs.iter().map(|o| o.worker_id.as_str()).collect();
    assert_eq!(ids, vec!["w1", "w2"]);
    assert_eq!(dispatch.failures.len(), 1);
    assert_eq!(dispatch.failures[0].worker_id, "w3");
    assert_eq!(dispatch.failures[0].kind, FailureKind::Abandoned);
}

#[tokio::test]
async fn test_all_failures_reported_together() {
    let generator = Arc::new(ScriptedGenerator::with_default(ScriptedReply::fail(
        "quota exceeded",
    )));
    let pool = pool(PoolConfig::default(), &generator, &["a", "b"]);

    let err = pool
        .dispatch(STAGE, &ctx(), Eligibility::Specialized)
        .await
        .unwrap_err();

    match &err {
        PoolError::AllWorkersFailed { stage, failures } => {
            assert_eq!(*stage, STAGE);
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|f| f.kind == FailureKind::Error));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.failures().len(), 2);
}

#[tokio::test]
async fn test_escalation_widens_eligibility() {
    let generator = Arc::new(ScriptedGenerator::new());
    let mut pool = WorkerPool::new(PoolConfig::default());
    pool.add_worker(Worker::new("sec", Specialization::Security, generator.clone()))
        .unwrap();

    let specialized = pool
        .dispatch(
            CognitiveStage::TestingStrategy,
            &ctx(),
            Eligibility::Specialized,
        )
        .await;
    assert!(matches!(specialized, Err(PoolError::NoEligibleWorkers { .. })));

    let escalated = pool
        .dispatch(CognitiveStage::TestingStrategy, &ctx(), Eligibility::Escalated)
        .await
        .unwrap();
    assert_eq!(escalated.outputs.len(), 1);
    assert_eq!(escalated.outputs[0].specialization, Specialization::Security);
}

#[tokio::test]
async fn test_outputs_carry_assessed_metrics_and_digest() {
    let generator = Arc::new(ScriptedGenerator::new());
    let pool = pool(PoolConfig::default(), &generator, &["a"]);

    let dispatch = pool
        .dispatch(STAGE, &ctx(), Eligibility::Specialized)
        .await
        .unwrap();

    let output = &dispatch.outputs[0];
    assert_eq!(output.content, "[a] core_implementation: implement an LRU cache");
    assert!((0.0..=1.0).contains(&output.confidence));
    assert_eq!(
        output.digest,
        cogforge_core::ContentDigest::of_text(&output.content)
    );
}

#[tokio::test]
async fn test_stats_accumulate_and_reset() {
    let generator = Arc::new(ScriptedGenerator::new().on_worker("b", ScriptedReply::fail("nope")));
    let pool = pool(PoolConfig::default(), &generator, &["a", "b"]);

    for _ in 0..2 {
        pool.dispatch(STAGE, &ctx(), Eligibility::Specialized)
            .await
            .unwrap();
    }
    let stats = pool.worker_stats();
    assert_eq!(stats["a"].successes, 2);
    assert_eq!(stats["b"].failures, 2);
    assert_eq!(stats["b"].success_rate(), 0.0);

    pool.reset_stats();
    assert!(pool.worker_stats().is_empty());
}
