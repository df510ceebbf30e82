//! Content merging: how several weighted candidates become one artifact.

use std::collections::BTreeSet;

use async_trait::async_trait;
use cogforge_model::CognitiveStage;
use serde::{Deserialize, Serialize};

use crate::fusion::error::FusionOutcome;
use crate::quality::QualityDimension;

/// One candidate handed to a merger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeInput {
    pub worker_id: String,
    pub content: String,
    /// Share of the merged result in `[0, 1]`.
    pub weight: f64,
    /// Dimensions this candidate was picked for (feature combination only).
    #[serde(default)]
    pub focus: Vec<QualityDimension>,
}

/// Merge judgment. A model-backed implementation can be plugged in; any
/// error it returns makes the fusion engine fall back to the best single
/// candidate.
///
/// Inputs arrive ordered by weight (descending), ties by worker id.
#[async_trait]
pub trait ContentMerger: Send + Sync {
    async fn merge(&self, stage: CognitiveStage, inputs: &[MergeInput]) -> FusionOutcome<String>;
}

/// Deterministic line-level merger.
///
/// The heaviest input is the base. Every other input with non-zero weight
/// contributes the lines the merged text does not already contain, under a
/// comment header naming its worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionMerger;

#[async_trait]
impl ContentMerger for SectionMerger {
    async fn merge(&self, _stage: CognitiveStage, inputs: &[MergeInput]) -> FusionOutcome<String> {
        let Some((base, rest)) = inputs.split_first() else {
            return Ok(String::new());
        };

        let mut merged = base.content.trim_end().to_string();
        let mut seen: BTreeSet<String> = merged
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        for input in rest.iter().filter(|i| i.weight > 0.0) {
            let fresh: Vec<&str> = input
                .content
                .lines()
                .filter(|l| {
                    let t = l.trim();
                    !t.is_empty() && seen.insert(t.to_string())
                })
                .collect();
            if fresh.is_empty() {
                continue;
            }

            merged.push_str("\n\n");
            if input.focus.is_empty() {
                merged.push_str(&format!(
                    "// from {} (weight {:.2})\n",
                    input.worker_id, input.weight
                ));
            } else {
                let focus: Vec<&str> = input.focus.iter().map(|d| d.name()).collect();
                merged.push_str(&format!(
                    "// from {} ({})\n",
                    input.worker_id,
                    focus.join(", ")
                ));
            }
            merged.push_str(&fresh.join("\n"));
        }

        Ok(merged)
    }
}
