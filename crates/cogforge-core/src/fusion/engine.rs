//! Carrying out fusion decisions.
//!
//! Every strategy works on candidates sorted by worker id. Any strategy error
//! (in practice a failing [`ContentMerger`]) is absorbed here: the engine logs
//! it and falls back to best-single, which is pure arithmetic and cannot fail.

use std::collections::BTreeMap;
use std::sync::Arc;

use cogforge_model::CognitiveStage;
use tracing::{debug, instrument, warn};

use crate::context::StageContext;
use crate::fusion::decision::{best_single, decide, plan, sort_candidates, FusionConfig, FusionDecision};
use crate::fusion::error::{FusionError, FusionOutcome};
use crate::fusion::merger::{ContentMerger, MergeInput, SectionMerger};
use crate::fusion::similarity::{anchor_coverage, anchor_terms};
use crate::fusion::{Contribution, FusionResult, FusionStrategy};
use crate::metrics::METRICS;
use crate::obs;
use crate::quality::{QualityDimension, QualityMetrics, QualityWeights};
use crate::worker::StageOutput;

pub struct FusionEngine {
    config: FusionConfig,
    weights: QualityWeights,
    merger: Arc<dyn ContentMerger>,
}

impl std::fmt::Debug for FusionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionEngine")
            .field("config", &self.config)
            .field("weights", &self.weights)
            .finish_non_exhaustive()
    }
}

impl Default for FusionEngine {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            weights: QualityWeights::default(),
            merger: Arc::new(SectionMerger),
        }
    }

    pub fn with_weights(mut self, weights: QualityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_merger(mut self, merger: Arc<dyn ContentMerger>) -> Self {
        self.merger = merger;
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    /// Fuse with an automatically selected strategy.
    ///
    /// Fails only on an empty candidate set.
    #[instrument(skip(self, outputs, context), fields(stage = %stage, candidates = outputs.len()))]
    pub async fn fuse(
        &self,
        stage: CognitiveStage,
        outputs: &[StageOutput],
        context: &StageContext,
    ) -> FusionOutcome<FusionResult> {
        let decision = decide(stage, outputs, &self.config, &self.weights)?;
        debug!(strategy = %decision.strategy(), rationale = %decision.rationale(), "fusion decided");
        Ok(self.execute(stage, outputs, context, decision).await)
    }

    /// Fuse with a fixed strategy.
    #[instrument(skip(self, outputs, context), fields(stage = %stage, strategy = %strategy))]
    pub async fn fuse_with(
        &self,
        strategy: FusionStrategy,
        stage: CognitiveStage,
        outputs: &[StageOutput],
        context: &StageContext,
    ) -> FusionOutcome<FusionResult> {
        let decision = plan(strategy, stage, outputs, &self.config, &self.weights)?;
        Ok(self.execute(stage, outputs, context, decision).await)
    }

    async fn execute(
        &self,
        stage: CognitiveStage,
        outputs: &[StageOutput],
        context: &StageContext,
        decision: FusionDecision,
    ) -> FusionResult {
        let sorted = sort_candidates(outputs);
        let attempted = decision.strategy();
        let result = match self.apply(stage, &sorted, context, decision).await {
            Ok(result) => result,
            Err(e) => {
                warn!(stage = %stage, strategy = %attempted, error = %e, "fusion strategy failed; using best single");
                METRICS.inc_fusion_fallbacks();
                obs::emit_fusion_fallback(stage, attempted.name(), &e);
                self.fallback(stage, &sorted, attempted, &e)
            }
        };
        METRICS.inc_fusions();
        obs::emit_stage_fused(stage, result.strategy.name(), result.confidence, sorted.len());
        result
    }

    async fn apply(
        &self,
        stage: CognitiveStage,
        sorted: &[&StageOutput],
        context: &StageContext,
        decision: FusionDecision,
    ) -> FusionOutcome<FusionResult> {
        match decision {
            FusionDecision::BestSingle {
                winner,
                pass_through,
                rationale,
            } => {
                let w = find(sorted, &winner, stage)?;
                let confidence = if pass_through {
                    w.score(&self.weights)
                } else {
                    w.confidence
                };
                Ok(self.single(stage, w, FusionStrategy::BestSingle, rationale, confidence, false))
            }
            FusionDecision::ConsensusVoting {
                members,
                representative,
                rationale,
            } => {
                let rep = find(sorted, &representative, stage)?;
                let share = 1.0 / members.len().max(1) as f64;
                let mut result = self.single(
                    stage,
                    rep,
                    FusionStrategy::ConsensusVoting,
                    rationale,
                    rep.confidence,
                    false,
                );
                result.contributors = members
                    .into_iter()
                    .map(|worker_id| Contribution {
                        worker_id,
                        weight: share,
                    })
                    .collect();
                Ok(result)
            }
            FusionDecision::WeightedMerge { rationale } => {
                self.weighted_merge(stage, sorted, FusionStrategy::WeightedMerge, rationale)
                    .await
            }
            FusionDecision::HierarchicalFusion { rationale } => {
                self.hierarchical(stage, sorted, context, rationale).await
            }
            FusionDecision::FeatureCombination { leaders, rationale } => {
                self.feature_combination(stage, sorted, &leaders, rationale)
                    .await
            }
        }
    }

    fn single(
        &self,
        stage: CognitiveStage,
        output: &StageOutput,
        strategy: FusionStrategy,
        rationale: String,
        confidence: f64,
        fallback: bool,
    ) -> FusionResult {
        FusionResult {
            stage,
            strategy,
            content: output.content.clone(),
            rationale,
            confidence,
            metrics: output.metrics,
            contributors: vec![Contribution {
                worker_id: output.worker_id.clone(),
                weight: 1.0,
            }],
            fallback,
        }
    }

    fn fallback(
        &self,
        stage: CognitiveStage,
        sorted: &[&StageOutput],
        attempted: FusionStrategy,
        error: &FusionError,
    ) -> FusionResult {
        match best_single(sorted, &self.weights) {
            Some(w) => {
                let rationale = format!(
                    "{attempted} failed ({error}); fell back to best single output from {}",
                    w.worker_id
                );
                self.single(stage, w, FusionStrategy::BestSingle, rationale, w.confidence, true)
            }
            None => FusionResult {
                stage,
                strategy: FusionStrategy::BestSingle,
                content: String::new(),
                rationale: format!("{attempted} failed ({error}); no candidates to fall back to"),
                confidence: 0.0,
                metrics: QualityMetrics::default(),
                contributors: Vec::new(),
                fallback: true,
            },
        }
    }

    /// Weight each candidate by its share of the total aggregate score.
    async fn weighted_merge(
        &self,
        stage: CognitiveStage,
        sorted: &[&StageOutput],
        strategy: FusionStrategy,
        rationale: String,
    ) -> FusionOutcome<FusionResult> {
        let scores: Vec<f64> = sorted.iter().map(|o| o.score(&self.weights)).collect();
        let total: f64 = scores.iter().sum();
        let n = sorted.len().max(1) as f64;
        let shares: Vec<f64> = scores
            .iter()
            .map(|s| if total > 0.0 { s / total } else { 1.0 / n })
            .collect();

        let mut inputs: Vec<MergeInput> = sorted
            .iter()
            .zip(&shares)
            .map(|(o, w)| MergeInput {
                worker_id: o.worker_id.clone(),
                content: o.content.clone(),
                weight: *w,
                focus: Vec::new(),
            })
            .collect();
        sort_inputs(&mut inputs);

        let content = self.merger.merge(stage, &inputs).await?;
        let metrics = QualityMetrics::weighted_average(
            &sorted
                .iter()
                .zip(&shares)
                .map(|(o, w)| (o.metrics, *w))
                .collect::<Vec<_>>(),
        );
        let confidence = sorted
            .iter()
            .zip(&shares)
            .map(|(o, w)| o.confidence * w)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        Ok(FusionResult {
            stage,
            strategy,
            content,
            rationale,
            confidence,
            metrics,
            contributors: inputs
                .into_iter()
                .map(|i| Contribution {
                    worker_id: i.worker_id,
                    weight: i.weight,
                })
                .collect(),
            fallback: false,
        })
    }

    /// Keep candidates that mention enough of the upstream anchor terms, then
    /// weighted-merge them.
    async fn hierarchical(
        &self,
        stage: CognitiveStage,
        sorted: &[&StageOutput],
        context: &StageContext,
        rationale: String,
    ) -> FusionOutcome<FusionResult> {
        let upstream: Vec<&str> = context.upstream.iter().map(|a| a.content.as_str()).collect();
        let anchors = anchor_terms(&upstream, self.config.max_anchor_terms);

        if anchors.is_empty() {
            let rationale = format!("{rationale}; no upstream anchors, all candidates kept");
            return self
                .weighted_merge(stage, sorted, FusionStrategy::HierarchicalFusion, rationale)
                .await;
        }

        let kept: Vec<&StageOutput> = sorted
            .iter()
            .copied()
            .filter(|o| anchor_coverage(&anchors, &o.content) >= self.config.min_anchor_coverage)
            .collect();

        if kept.is_empty() {
            let rationale = format!(
                "{rationale}; no candidate reached anchor coverage {:.2}, all {} kept",
                self.config.min_anchor_coverage,
                sorted.len()
            );
            return self
                .weighted_merge(stage, sorted, FusionStrategy::HierarchicalFusion, rationale)
                .await;
        }

        let dropped: Vec<&str> = sorted
            .iter()
            .filter(|o| !kept.iter().any(|k| k.worker_id == o.worker_id))
            .map(|o| o.worker_id.as_str())
            .collect();
        let rationale = if dropped.is_empty() {
            format!("{rationale}; all {} candidates consistent with upstream", kept.len())
        } else {
            format!(
                "{rationale}; {} of {} candidates consistent with upstream, dropped {}",
                kept.len(),
                sorted.len(),
                dropped.join(", ")
            )
        };
        self.weighted_merge(stage, &kept, FusionStrategy::HierarchicalFusion, rationale)
            .await
    }

    /// Take every dimension from its leader.
    async fn feature_combination(
        &self,
        stage: CognitiveStage,
        sorted: &[&StageOutput],
        leaders: &[(QualityDimension, String)],
        rationale: String,
    ) -> FusionOutcome<FusionResult> {
        let mut led: BTreeMap<&str, Vec<QualityDimension>> = BTreeMap::new();
        for (dimension, worker_id) in leaders {
            led.entry(worker_id.as_str()).or_default().push(*dimension);
        }

        let mut inputs = Vec::with_capacity(led.len());
        let mut confidence_sum = 0.0;
        for (worker_id, dimensions) in &led {
            let output = find(sorted, worker_id, stage)?;
            confidence_sum += output.confidence;
            inputs.push(MergeInput {
                worker_id: output.worker_id.clone(),
                content: output.content.clone(),
                weight: dimensions.len() as f64 / QualityDimension::ALL.len() as f64,
                focus: dimensions.clone(),
            });
        }
        sort_inputs(&mut inputs);

        let mut metrics = QualityMetrics::default();
        for (dimension, worker_id) in leaders {
            let output = find(sorted, worker_id, stage)?;
            metrics.set(*dimension, output.metrics.get(*dimension));
        }

        let content = self.merger.merge(stage, &inputs).await?;
        let confidence = if led.is_empty() {
            0.0
        } else {
            confidence_sum / led.len() as f64
        };

        Ok(FusionResult {
            stage,
            strategy: FusionStrategy::FeatureCombination,
            content,
            rationale,
            confidence,
            metrics,
            contributors: inputs
                .into_iter()
                .map(|i| Contribution {
                    worker_id: i.worker_id,
                    weight: i.weight,
                })
                .collect(),
            fallback: false,
        })
    }
}

fn find<'a>(
    sorted: &[&'a StageOutput],
    worker_id: &str,
    stage: CognitiveStage,
) -> FusionOutcome<&'a StageOutput> {
    sorted
        .iter()
        .copied()
        .find(|o| o.worker_id == worker_id)
        .ok_or_else(|| FusionError::MergeFailed {
            stage,
            reason: format!("decision names unknown candidate {worker_id}"),
        })
}

/// Heaviest first; ties by worker id.
fn sort_inputs(inputs: &mut [MergeInput]) {
    inputs.sort_by(|a, b| {
        b.weight
            .total_cmp(&a.weight)
            .then_with(|| a.worker_id.cmp(&b.worker_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct RefusingMerger;

    #[async_trait]
    impl ContentMerger for RefusingMerger {
        async fn merge(&self, stage: CognitiveStage, _inputs: &[MergeInput]) -> FusionOutcome<String> {
            Err(FusionError::MergeFailed {
                stage,
                reason: "refused".to_string(),
            })
        }
    }

    fn out(id: &str, content: &str, score: f64, confidence: f64) -> StageOutput {
        StageOutput::new(
            id,
            CognitiveStage::CoreImplementation,
            content,
            QualityMetrics::uniform(score),
            confidence,
        )
    }

    #[tokio::test]
    async fn test_pass_through_confidence_is_aggregate_score() {
        let engine = FusionEngine::default();
        let result = engine
            .fuse(
                CognitiveStage::CoreImplementation,
                &[out("only", "fn f() {}", 0.42, 0.9)],
                &StageContext::new("r"),
            )
            .await
            .unwrap();
        assert_eq!(result.strategy, FusionStrategy::BestSingle);
        assert!((result.confidence - 0.42).abs() < 1e-9);
        assert_eq!(result.contributor_ids(), vec!["only"]);
    }

    #[tokio::test]
    async fn test_weighted_merge_weights_by_score() {
        let engine = FusionEngine::default();
        let result = engine
            .fuse_with(
                FusionStrategy::WeightedMerge,
                CognitiveStage::CoreImplementation,
                &[out("a", "alpha", 0.75, 0.8), out("b", "beta", 0.25, 0.4)],
                &StageContext::new("r"),
            )
            .await
            .unwrap();
        assert_eq!(result.contributors[0].worker_id, "a");
        assert!((result.contributors[0].weight - 0.75).abs() < 1e-9);
        assert!((result.confidence - (0.8 * 0.75 + 0.4 * 0.25)).abs() < 1e-9);
        assert!(result.content.starts_with("alpha"));
        assert!(!result.fallback);
    }

    #[tokio::test]
    async fn test_merger_failure_falls_back_to_best_single() {
        let engine = FusionEngine::default().with_merger(Arc::new(RefusingMerger));
        let result = engine
            .fuse_with(
                FusionStrategy::WeightedMerge,
                CognitiveStage::CoreImplementation,
                &[out("a", "alpha", 0.5, 0.6), out("b", "beta", 0.7, 0.65)],
                &StageContext::new("r"),
            )
            .await
            .unwrap();
        assert_eq!(result.strategy, FusionStrategy::BestSingle);
        assert!(result.fallback);
        assert_eq!(result.content, "beta");
        assert!(result.rationale.contains("refused"));
    }

    #[tokio::test]
    async fn test_hierarchical_drops_off_design_candidates() {
        let engine = FusionEngine::default();
        let context = StageContext::new("r").with_upstream(
            CognitiveStage::ArchitectureDesign,
            "TokenStream feeds Parser; Parser builds SyntaxTree",
        );
        let result = engine
            .fuse_with(
                FusionStrategy::HierarchicalFusion,
                CognitiveStage::InterfaceDesign,
                &[
                    out("a", "pub fn parse(stream: TokenStream) -> SyntaxTree", 0.6, 0.7),
                    out("b", "a spreadsheet macro", 0.9, 0.9),
                ],
                &context,
            )
            .await
            .unwrap();
        assert_eq!(result.strategy, FusionStrategy::HierarchicalFusion);
        assert_eq!(result.contributor_ids(), vec!["a"]);
        assert!(result.rationale.contains("dropped b"));
    }
}
