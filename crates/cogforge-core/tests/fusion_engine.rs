//! Master fusion behaviour across strategies.

use std::sync::Arc;

use async_trait::async_trait;
use cogforge_core::fusion::FusionOutcome;
use cogforge_core::{
    CognitiveStage, ContentMerger, FusionConfig, FusionEngine, FusionError, FusionStrategy,
    MergeInput, QualityDimension, QualityMetrics, StageContext, StageOutput,
};

const STAGE: CognitiveStage = CognitiveStage::CoreImplementation;

fn out(id: &str, content: &str, score: f64, confidence: f64) -> StageOutput {
    StageOutput::new(id, STAGE, content, QualityMetrics::uniform(score), confidence)
}

fn ctx() -> StageContext {
    StageContext::new("implement a bounded queue")
}

struct BrokenMerger;

#[async_trait]
impl ContentMerger for BrokenMerger {
    async fn merge(&self, stage: CognitiveStage, _inputs: &[MergeInput]) -> FusionOutcome<String> {
        Err(FusionError::MergeFailed {
            stage,
            reason: "merge backend unavailable".to_string(),
        })
    }
}

#[tokio::test]
async fn test_best_single_is_independent_of_input_order() {
    let engine = FusionEngine::default();
    let a = out("a", "ring buffer with head and tail", 0.9, 0.8);
    let b = out("b", "linked list guarded by mutex", 0.85, 0.9);
    let c = out("c", "vector that grows forever", 0.4, 0.6);

    let forward = engine
        .fuse_with(
            FusionStrategy::BestSingle,
            STAGE,
            &[a.clone(), b.clone(), c.clone()],
            &ctx(),
        )
        .await
        .unwrap();
    let reversed = engine
        .fuse_with(FusionStrategy::BestSingle, STAGE, &[c, b, a], &ctx())
        .await
        .unwrap();

    assert_eq!(forward.content, "ring buffer with head and tail");
    assert_eq!(forward.contributor_ids(), vec!["a"]);
    assert_eq!(forward.confidence, 0.8);
    assert_eq!(forward, reversed);
}

#[tokio::test]
async fn test_consensus_picks_best_member_of_majority_cluster() {
    let engine = FusionEngine::default();
    let agreed = "fixed capacity ring buffer using atomic head tail indices";
    let outputs = vec![
        out("w1", agreed, 0.6, 0.7),
        out("w2", agreed, 0.8, 0.75),
        out("w3", agreed, 0.7, 0.9),
        out("w4", "unbounded channel backed by linked blocks", 0.95, 0.9),
        out("w5", "spin lock around a plain vector buffer", 0.5, 0.5),
    ];

    let result = engine.fuse(STAGE, &outputs, &ctx()).await.unwrap();

    assert_eq!(result.strategy, FusionStrategy::ConsensusVoting);
    assert_eq!(result.content, agreed);
    assert_eq!(result.confidence, 0.75);
    assert_eq!(result.contributor_ids(), vec!["w1", "w2", "w3"]);
    assert!(!result.fallback);
    assert!(result.rationale.contains("3 of 5"));
}

#[tokio::test]
async fn test_chained_similarity_does_not_form_a_majority() {
    let engine = FusionEngine::default();
    // a~b and b~c clear the threshold, a~c does not.
    let outputs = vec![
        out("a", "alpha beta gamma delta epsilon zeta eta theta", 0.7, 0.7),
        out("b", "alpha beta gamma delta epsilon zeta eta theta iota", 0.8, 0.7),
        out("c", "beta gamma delta epsilon zeta eta theta iota", 0.6, 0.7),
        out("d", "unbounded channel backed by linked blocks", 0.5, 0.7),
        out("e", "spin lock around a plain vector buffer", 0.4, 0.7),
    ];

    let result = engine.fuse(STAGE, &outputs, &ctx()).await.unwrap();
    assert_ne!(result.strategy, FusionStrategy::ConsensusVoting);

    let voted = engine
        .fuse_with(FusionStrategy::ConsensusVoting, STAGE, &outputs, &ctx())
        .await
        .unwrap();
    assert_eq!(voted.strategy, FusionStrategy::BestSingle);
    assert_eq!(voted.contributor_ids(), vec!["b"]);
    assert!(voted.rationale.contains("no cluster reached quorum 3 of 5"));
}

#[tokio::test]
async fn test_consensus_without_quorum_degrades_to_best_single() {
    let engine = FusionEngine::default();
    let outputs = vec![
        out("a", "ring buffer with head and tail", 0.7, 0.7),
        out("b", "linked list guarded by mutex", 0.9, 0.6),
        out("c", "vector that grows forever", 0.4, 0.6),
    ];

    let result = engine
        .fuse_with(FusionStrategy::ConsensusVoting, STAGE, &outputs, &ctx())
        .await
        .unwrap();

    assert_eq!(result.strategy, FusionStrategy::BestSingle);
    assert_eq!(result.contributor_ids(), vec!["b"]);
    assert!(result.rationale.contains("no cluster reached quorum"));
}

#[tokio::test]
async fn test_fusion_is_idempotent() {
    let engine = FusionEngine::default();
    let outputs = vec![
        out("a", "ring buffer with head and tail", 0.7, 0.7),
        out("b", "linked list guarded by mutex", 0.6, 0.6),
    ];
    let first = engine.fuse(STAGE, &outputs, &ctx()).await.unwrap();
    let second = engine.fuse(STAGE, &outputs, &ctx()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.digest(), second.digest());
}

#[tokio::test]
async fn test_merger_failure_falls_back_without_error() {
    let engine = FusionEngine::default().with_merger(Arc::new(BrokenMerger));
    let outputs = vec![
        out("a", "ring buffer with head and tail", 0.7, 0.7),
        out("b", "linked list guarded by mutex", 0.6, 0.6),
    ];

    let result = engine
        .fuse_with(FusionStrategy::WeightedMerge, STAGE, &outputs, &ctx())
        .await
        .unwrap();

    assert!(result.fallback);
    assert_eq!(result.strategy, FusionStrategy::BestSingle);
    assert_eq!(result.contributor_ids(), vec!["a"]);
    assert!(result.rationale.contains("merge backend unavailable"));
}

#[tokio::test]
async fn test_complementary_candidates_combine_leaders() {
    let engine = FusionEngine::default();
    let a = StageOutput::new(
        "a",
        STAGE,
        "careful bounds checks on every push and pop",
        QualityMetrics::from_fn(|d| match d {
            QualityDimension::Correctness => 0.95,
            QualityDimension::Performance => 0.3,
            _ => 0.6,
        }),
        0.8,
    );
    let b = StageOutput::new(
        "b",
        STAGE,
        "lock free slots with cache line padding",
        QualityMetrics::from_fn(|d| match d {
            QualityDimension::Correctness => 0.5,
            QualityDimension::Performance => 0.95,
            _ => 0.6,
        }),
        0.6,
    );

    let result = engine.fuse(STAGE, &[a, b], &ctx()).await.unwrap();

    assert_eq!(result.strategy, FusionStrategy::FeatureCombination);
    assert_eq!(result.contributor_ids(), vec!["a", "b"]);
    assert_eq!(result.metrics.get(QualityDimension::Correctness), 0.95);
    assert_eq!(result.metrics.get(QualityDimension::Performance), 0.95);
    assert!((result.confidence - 0.7).abs() < 1e-9);
    assert!(result.content.contains("careful bounds checks"));
    assert!(result.content.contains("lock free slots"));
}

#[tokio::test]
async fn test_structure_sensitive_stage_uses_hierarchical_fusion() {
    let engine = FusionEngine::default();
    let stage = CognitiveStage::ArchitectureDesign;
    let outputs = vec![
        StageOutput::new("a", stage, "Queue owns Storage", QualityMetrics::uniform(0.7), 0.7),
        StageOutput::new("b", stage, "Queue wraps Channel", QualityMetrics::uniform(0.6), 0.6),
    ];

    let result = engine.fuse(stage, &outputs, &ctx()).await.unwrap();

    assert_eq!(result.strategy, FusionStrategy::HierarchicalFusion);
    assert!(result.rationale.contains("no upstream anchors"));
    assert_eq!(result.contributors.len(), 2);
}

#[tokio::test]
async fn test_structure_sensitivity_is_configurable() {
    let engine = FusionEngine::new(FusionConfig {
        structure_sensitive_stages: Vec::new(),
        ..Default::default()
    });
    let stage = CognitiveStage::ArchitectureDesign;
    let outputs = vec![
        StageOutput::new("a", stage, "Queue owns Storage", QualityMetrics::uniform(0.7), 0.7),
        StageOutput::new("b", stage, "Queue wraps Channel", QualityMetrics::uniform(0.6), 0.6),
    ];

    let result = engine.fuse(stage, &outputs, &ctx()).await.unwrap();
    assert_ne!(result.strategy, FusionStrategy::HierarchicalFusion);
}

#[tokio::test]
async fn test_no_candidates_is_an_error() {
    let engine = FusionEngine::default();
    let err = engine.fuse(STAGE, &[], &ctx()).await.unwrap_err();
    assert!(matches!(err, FusionError::NoCandidates { stage } if stage == STAGE));
}
