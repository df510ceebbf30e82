//! Accumulated run context and the per-stage slice handed to workers.

use std::collections::BTreeMap;

use cogforge_model::{CognitiveStage, UpstreamArtifact};
use serde::{Deserialize, Serialize};

use crate::fusion::FusionResult;

/// Everything a run has produced so far, plus the caller's input.
///
/// Fusion results are kept in completion order; they are the only artifacts
/// downstream stages may read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub requirement: String,
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
    results: Vec<FusionResult>,
}

impl RunContext {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            ..Default::default()
        }
    }

    pub fn with_hints(mut self, hints: BTreeMap<String, String>) -> Self {
        self.hints = hints;
        self
    }

    /// Record a stage's result. A second result for the same stage replaces
    /// the first.
    pub fn record(&mut self, result: FusionResult) {
        self.results.retain(|r| r.stage != result.stage);
        self.results.push(result);
    }

    pub fn result_for(&self, stage: CognitiveStage) -> Option<&FusionResult> {
        self.results.iter().find(|r| r.stage == stage)
    }

    pub fn results(&self) -> &[FusionResult] {
        &self.results
    }

    /// Slice of the context for a stage with the given direct dependencies.
    /// Dependencies without a recorded result are skipped.
    pub fn stage_context(&self, dependencies: &[CognitiveStage]) -> StageContext {
        StageContext {
            requirement: self.requirement.clone(),
            hints: self.hints.clone(),
            upstream: dependencies
                .iter()
                .filter_map(|d| self.result_for(*d))
                .map(|r| UpstreamArtifact {
                    stage: r.stage,
                    content: r.content.clone(),
                    confidence: r.confidence,
                })
                .collect(),
        }
    }
}

/// What one stage gets to see: the requirement, hints and the fused outputs
/// of its direct dependencies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageContext {
    pub requirement: String,
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
    #[serde(default)]
    pub upstream: Vec<UpstreamArtifact>,
}

impl StageContext {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            ..Default::default()
        }
    }

    pub fn with_upstream(mut self, stage: CognitiveStage, content: impl Into<String>) -> Self {
        self.upstream.push(UpstreamArtifact {
            stage,
            content: content.into(),
            confidence: 1.0,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::{Contribution, FusionStrategy};
    use crate::quality::QualityMetrics;

    fn result(stage: CognitiveStage, content: &str) -> FusionResult {
        FusionResult {
            stage,
            strategy: FusionStrategy::BestSingle,
            content: content.to_string(),
            rationale: String::new(),
            confidence: 0.7,
            metrics: QualityMetrics::uniform(0.7),
            contributors: vec![Contribution {
                worker_id: "w1".to_string(),
                weight: 1.0,
            }],
            fallback: false,
        }
    }

    #[test]
    fn test_stage_context_only_carries_direct_dependencies() {
        let mut ctx = RunContext::new("parse csv");
        ctx.record(result(CognitiveStage::RequirementAnalysis, "reqs"));
        ctx.record(result(CognitiveStage::AlgorithmSelection, "algo"));

        let slice = ctx.stage_context(&[CognitiveStage::AlgorithmSelection]);
        assert_eq!(slice.requirement, "parse csv");
        assert_eq!(slice.upstream.len(), 1);
        assert_eq!(slice.upstream[0].content, "algo");
    }

    #[test]
    fn test_record_replaces_same_stage() {
        let mut ctx = RunContext::new("r");
        ctx.record(result(CognitiveStage::Integration, "first"));
        ctx.record(result(CognitiveStage::Integration, "second"));
        assert_eq!(ctx.results().len(), 1);
        assert_eq!(
            ctx.result_for(CognitiveStage::Integration).map(|r| r.content.as_str()),
            Some("second")
        );
    }
}
