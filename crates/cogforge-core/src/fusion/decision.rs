//! Strategy selection.
//!
//! [`decide`] is a pure function from a candidate set to a [`FusionDecision`].
//! It never touches content merging, so the choice can be tested and logged
//! independently of the strategy that carries it out.

use cogforge_model::CognitiveStage;
use serde::{Deserialize, Serialize};

use crate::fusion::error::{FusionError, FusionOutcome};
use crate::fusion::similarity::{cluster, SimilarityMetric};
use crate::fusion::FusionStrategy;
use crate::quality::{QualityDimension, QualityWeights};
use crate::worker::StageOutput;

/// Thresholds for strategy selection and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Minimum spread (max - min) for a dimension to count as divergent.
    pub variance_threshold: f64,
    /// Divergent dimensions needed before candidates count as complementary.
    pub min_divergent_dimensions: usize,
    pub similarity_metric: SimilarityMetric,
    /// Pairwise similarity at which two candidates share a cluster.
    pub similarity_threshold: f64,
    /// Share of upstream anchor terms a candidate must mention to stay in a
    /// hierarchical fusion.
    pub min_anchor_coverage: f64,
    pub max_anchor_terms: usize,
    /// Stages whose results must stay consistent with upstream design.
    pub structure_sensitive_stages: Vec<CognitiveStage>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            variance_threshold: 0.15,
            min_divergent_dimensions: 2,
            similarity_metric: SimilarityMetric::TokenJaccard,
            similarity_threshold: 0.8,
            min_anchor_coverage: 0.2,
            max_anchor_terms: 32,
            structure_sensitive_stages: vec![
                CognitiveStage::ArchitectureDesign,
                CognitiveStage::InterfaceDesign,
                CognitiveStage::Integration,
            ],
        }
    }
}

impl FusionConfig {
    pub fn is_structure_sensitive(&self, stage: CognitiveStage) -> bool {
        self.structure_sensitive_stages.contains(&stage)
    }
}

/// The chosen strategy plus everything needed to carry it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FusionDecision {
    BestSingle {
        winner: String,
        /// Only one candidate existed; nothing was compared.
        pass_through: bool,
        rationale: String,
    },
    ConsensusVoting {
        members: Vec<String>,
        representative: String,
        rationale: String,
    },
    FeatureCombination {
        leaders: Vec<(QualityDimension, String)>,
        rationale: String,
    },
    HierarchicalFusion {
        rationale: String,
    },
    WeightedMerge {
        rationale: String,
    },
}

impl FusionDecision {
    pub fn strategy(&self) -> FusionStrategy {
        match self {
            FusionDecision::BestSingle { .. } => FusionStrategy::BestSingle,
            FusionDecision::ConsensusVoting { .. } => FusionStrategy::ConsensusVoting,
            FusionDecision::FeatureCombination { .. } => FusionStrategy::FeatureCombination,
            FusionDecision::HierarchicalFusion { .. } => FusionStrategy::HierarchicalFusion,
            FusionDecision::WeightedMerge { .. } => FusionStrategy::WeightedMerge,
        }
    }

    pub fn rationale(&self) -> &str {
        match self {
            FusionDecision::BestSingle { rationale, .. }
            | FusionDecision::ConsensusVoting { rationale, .. }
            | FusionDecision::FeatureCombination { rationale, .. }
            | FusionDecision::HierarchicalFusion { rationale }
            | FusionDecision::WeightedMerge { rationale } => rationale,
        }
    }
}

/// Candidates ordered by worker id. Every strategy works on this order so
/// the input order never affects the result.
pub fn sort_candidates(outputs: &[StageOutput]) -> Vec<&StageOutput> {
    let mut sorted: Vec<&StageOutput> = outputs.iter().collect();
    sorted.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
    sorted
}

/// Highest aggregate score; ties go to the lowest worker id.
pub fn best_single<'a>(sorted: &[&'a StageOutput], weights: &QualityWeights) -> Option<&'a StageOutput> {
    let mut best: Option<(&'a StageOutput, f64)> = None;
    for output in sorted.iter().copied() {
        let score = output.score(weights);
        match best {
            Some((_, s)) if score <= s => {}
            _ => best = Some((output, score)),
        }
    }
    best.map(|(o, _)| o)
}

/// Smallest cluster size that wins a vote among `n` candidates: `ceil(n / 2)`,
/// and never fewer than two.
pub fn quorum(n: usize) -> usize {
    n.div_ceil(2).max(2)
}

/// The winning cluster, as indices into `sorted`, if any reaches quorum.
///
/// Several qualifying clusters are ranked by size, then by their best member's
/// score, then by lowest worker id.
pub fn quorum_cluster(
    sorted: &[&StageOutput],
    config: &FusionConfig,
    weights: &QualityWeights,
) -> Option<Vec<usize>> {
    let needed = quorum(sorted.len());
    let best_score = |members: &[usize]| {
        members
            .iter()
            .map(|i| sorted[*i].score(weights))
            .fold(0.0, f64::max)
    };

    let mut winner: Option<Vec<usize>> = None;
    for members in cluster(sorted, config.similarity_metric, config.similarity_threshold) {
        if members.len() < needed {
            continue;
        }
        let better = match &winner {
            None => true,
            Some(current) => {
                members.len() > current.len()
                    || (members.len() == current.len() && best_score(&members) > best_score(current))
            }
        };
        if better {
            winner = Some(members);
        }
    }
    winner
}

/// Leader (index into `sorted`) of every dimension; ties go to the lowest id.
pub fn dimension_leaders(sorted: &[&StageOutput]) -> Vec<(QualityDimension, usize)> {
    QualityDimension::ALL
        .into_iter()
        .map(|d| {
            let mut lead = 0;
            for (i, output) in sorted.iter().enumerate().skip(1) {
                if output.metrics.get(d) > sorted[lead].metrics.get(d) {
                    lead = i;
                }
            }
            (d, lead)
        })
        .collect()
}

/// Dimensions whose spread across candidates reaches the variance threshold.
pub fn divergent_dimensions(sorted: &[&StageOutput], config: &FusionConfig) -> Vec<QualityDimension> {
    QualityDimension::ALL
        .into_iter()
        .filter(|d| {
            let values = sorted.iter().map(|o| o.metrics.get(*d));
            let max = values.clone().fold(f64::MIN, f64::max);
            let min = values.fold(f64::MAX, f64::min);
            max - min >= config.variance_threshold
        })
        .collect()
}

/// No candidate dominates the rest, and every candidate that beats the
/// top-scoring one on some dimension beats it there by at least
/// `variance_threshold`. Enough dimensions must also diverge overall.
pub fn is_complementary(sorted: &[&StageOutput], config: &FusionConfig, weights: &QualityWeights) -> bool {
    if sorted.len() < 2 {
        return false;
    }
    let Some(primary) = best_single(sorted, weights) else {
        return false;
    };
    let others: Vec<&StageOutput> = sorted
        .iter()
        .copied()
        .filter(|o| o.worker_id != primary.worker_id)
        .collect();
    if others.iter().all(|o| primary.metrics.dominates(&o.metrics)) {
        return false;
    }

    let mut excels_somewhere = false;
    for d in QualityDimension::ALL {
        let base = primary.metrics.get(d);
        let margin = others
            .iter()
            .map(|o| o.metrics.get(d) - base)
            .fold(f64::MIN, f64::max);
        if margin <= 0.0 {
            continue;
        }
        if margin < config.variance_threshold {
            return false;
        }
        excels_somewhere = true;
    }
    excels_somewhere && divergent_dimensions(sorted, config).len() >= config.min_divergent_dimensions
}

fn leaders_by_id(sorted: &[&StageOutput]) -> Vec<(QualityDimension, String)> {
    dimension_leaders(sorted)
        .into_iter()
        .map(|(d, i)| (d, sorted[i].worker_id.clone()))
        .collect()
}

fn describe_leaders(leaders: &[(QualityDimension, String)]) -> String {
    leaders
        .iter()
        .map(|(d, w)| format!("{d}={w}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn best_single_decision(
    sorted: &[&StageOutput],
    weights: &QualityWeights,
    stage: CognitiveStage,
    prefix: &str,
) -> FusionOutcome<FusionDecision> {
    let winner = best_single(sorted, weights).ok_or(FusionError::NoCandidates { stage })?;
    Ok(FusionDecision::BestSingle {
        winner: winner.worker_id.clone(),
        pass_through: sorted.len() == 1,
        rationale: format!(
            "{prefix}selected {} with the highest aggregate score {:.3} of {} candidates",
            winner.worker_id,
            winner.score(weights),
            sorted.len()
        ),
    })
}

fn consensus_decision(
    sorted: &[&StageOutput],
    members: &[usize],
    config: &FusionConfig,
    weights: &QualityWeights,
) -> FusionDecision {
    let group: Vec<&StageOutput> = members.iter().map(|i| sorted[*i]).collect();
    // Members are in id order, so best_single keeps the lowest id on ties.
    let representative = best_single(&group, weights)
        .map(|o| o.worker_id.clone())
        .unwrap_or_default();
    FusionDecision::ConsensusVoting {
        members: group.iter().map(|o| o.worker_id.clone()).collect(),
        rationale: format!(
            "{} of {} candidates agree ({:?} >= {:.2}); selected {} as the cluster's best",
            group.len(),
            sorted.len(),
            config.similarity_metric,
            config.similarity_threshold,
            representative
        ),
        representative,
    }
}

/// Pick a strategy for `outputs`.
///
/// In priority order: a single candidate passes through; structure-sensitive
/// stages use hierarchical fusion; a quorum cluster wins by consensus;
/// complementary candidates are combined per dimension; anything else is a
/// weighted merge.
pub fn decide(
    stage: CognitiveStage,
    outputs: &[StageOutput],
    config: &FusionConfig,
    weights: &QualityWeights,
) -> FusionOutcome<FusionDecision> {
    let sorted = sort_candidates(outputs);
    match sorted.len() {
        0 => return Err(FusionError::NoCandidates { stage }),
        1 => return best_single_decision(&sorted, weights, stage, "single candidate; "),
        _ => {}
    }

    if config.is_structure_sensitive(stage) {
        return Ok(FusionDecision::HierarchicalFusion {
            rationale: format!(
                "{stage} is structure-sensitive; merging the {} candidates consistent with upstream results",
                sorted.len()
            ),
        });
    }

    if let Some(members) = quorum_cluster(&sorted, config, weights) {
        return Ok(consensus_decision(&sorted, &members, config, weights));
    }

    if is_complementary(&sorted, config, weights) {
        let leaders = leaders_by_id(&sorted);
        return Ok(FusionDecision::FeatureCombination {
            rationale: format!(
                "candidates complement each other on {} dimensions; combining per-dimension leaders: {}",
                divergent_dimensions(&sorted, config).len(),
                describe_leaders(&leaders)
            ),
            leaders,
        });
    }

    Ok(FusionDecision::WeightedMerge {
        rationale: format!(
            "no quorum and no complementarity among {} candidates; weighted merge by aggregate score",
            sorted.len()
        ),
    })
}

/// Decision for a fixed strategy.
///
/// Consensus voting without a quorum degrades to best single.
pub fn plan(
    strategy: FusionStrategy,
    stage: CognitiveStage,
    outputs: &[StageOutput],
    config: &FusionConfig,
    weights: &QualityWeights,
) -> FusionOutcome<FusionDecision> {
    let sorted = sort_candidates(outputs);
    if sorted.is_empty() {
        return Err(FusionError::NoCandidates { stage });
    }
    match strategy {
        FusionStrategy::BestSingle => best_single_decision(&sorted, weights, stage, ""),
        FusionStrategy::ConsensusVoting => match quorum_cluster(&sorted, config, weights) {
            Some(members) => Ok(consensus_decision(&sorted, &members, config, weights)),
            None => best_single_decision(
                &sorted,
                weights,
                stage,
                &format!(
                    "no cluster reached quorum {} of {}; ",
                    quorum(sorted.len()),
                    sorted.len()
                ),
            ),
        },
        FusionStrategy::FeatureCombination => {
            let leaders = leaders_by_id(&sorted);
            Ok(FusionDecision::FeatureCombination {
                rationale: format!("combining per-dimension leaders: {}", describe_leaders(&leaders)),
                leaders,
            })
        }
        FusionStrategy::HierarchicalFusion => Ok(FusionDecision::HierarchicalFusion {
            rationale: format!(
                "merging the {} candidates consistent with upstream results",
                sorted.len()
            ),
        }),
        FusionStrategy::WeightedMerge => Ok(FusionDecision::WeightedMerge {
            rationale: format!("weighted merge of {} candidates by aggregate score", sorted.len()),
        }),
    }
}
