//! Master fusion: reconciling several worker candidates into one stage result.
//!
//! - `decision`: pure strategy selection ([`decide`], [`plan`])
//! - `engine`: carries a decision out and falls back to best-single on error
//! - `similarity`: token metrics, clustering and upstream anchor terms
//! - `merger`: the pluggable content-merge judgment

pub mod decision;
pub mod engine;
pub mod error;
pub mod merger;
pub mod similarity;

use cogforge_model::{CognitiveStage, ContentDigest};
use serde::{Deserialize, Serialize};

use crate::quality::{QualityMetrics, QualityWeights};

pub use decision::{decide, plan, FusionConfig, FusionDecision};
pub use engine::FusionEngine;
pub use error::{FusionError, FusionOutcome};
pub use merger::{ContentMerger, MergeInput, SectionMerger};
pub use similarity::SimilarityMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    BestSingle,
    WeightedMerge,
    FeatureCombination,
    HierarchicalFusion,
    ConsensusVoting,
}

impl FusionStrategy {
    pub const ALL: [FusionStrategy; 5] = [
        FusionStrategy::BestSingle,
        FusionStrategy::WeightedMerge,
        FusionStrategy::FeatureCombination,
        FusionStrategy::HierarchicalFusion,
        FusionStrategy::ConsensusVoting,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FusionStrategy::BestSingle => "best_single",
            FusionStrategy::WeightedMerge => "weighted_merge",
            FusionStrategy::FeatureCombination => "feature_combination",
            FusionStrategy::HierarchicalFusion => "hierarchical_fusion",
            FusionStrategy::ConsensusVoting => "consensus_voting",
        }
    }
}

impl std::fmt::Display for FusionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A worker's share in a fusion result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub worker_id: String,
    pub weight: f64,
}

/// The one artifact a completed stage exposes downstream.
///
/// Holds no wall-clock fields: fusing the same candidates twice yields equal
/// results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub stage: CognitiveStage,
    pub strategy: FusionStrategy,
    pub content: String,
    pub rationale: String,
    pub confidence: f64,
    pub metrics: QualityMetrics,
    pub contributors: Vec<Contribution>,
    /// The decided strategy failed and best-single was used instead.
    #[serde(default)]
    pub fallback: bool,
}

impl FusionResult {
    pub fn score(&self, weights: &QualityWeights) -> f64 {
        self.metrics.aggregate(weights)
    }

    pub fn contributor_ids(&self) -> Vec<&str> {
        self.contributors
            .iter()
            .map(|c| c.worker_id.as_str())
            .collect()
    }

    pub fn digest(&self) -> ContentDigest {
        ContentDigest::of_text(&self.content)
    }
}
