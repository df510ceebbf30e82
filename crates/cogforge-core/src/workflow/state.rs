//! Per-run stage status tracking.

use std::collections::BTreeMap;

use cogforge_model::CognitiveStage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Done => "done",
            StageStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Status of every stage in one run. Owned and mutated by the orchestrator
/// only; the workflow reads it to answer scheduling queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    statuses: BTreeMap<CognitiveStage, StageStatus>,
}

impl RunState {
    /// Every given stage starts `Pending`.
    pub fn new(stages: impl IntoIterator<Item = CognitiveStage>) -> Self {
        Self {
            statuses: stages
                .into_iter()
                .map(|s| (s, StageStatus::Pending))
                .collect(),
        }
    }

    /// Status of `stage`; stages the run does not know about read as pending.
    pub fn status(&self, stage: CognitiveStage) -> StageStatus {
        self.statuses
            .get(&stage)
            .copied()
            .unwrap_or(StageStatus::Pending)
    }

    pub fn set(&mut self, stage: CognitiveStage, status: StageStatus) {
        self.statuses.insert(stage, status);
    }

    pub fn mark_running(&mut self, stage: CognitiveStage) {
        self.set(stage, StageStatus::Running);
    }

    pub fn mark_done(&mut self, stage: CognitiveStage) {
        self.set(stage, StageStatus::Done);
    }

    pub fn mark_failed(&mut self, stage: CognitiveStage) {
        self.set(stage, StageStatus::Failed);
    }

    pub fn is_done(&self, stage: CognitiveStage) -> bool {
        self.status(stage) == StageStatus::Done
    }

    pub fn count(&self, status: StageStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    pub fn any_failed(&self) -> bool {
        self.count(StageStatus::Failed) > 0
    }

    /// Stages currently in `status`, in stage order.
    pub fn stages_with(&self, status: StageStatus) -> Vec<CognitiveStage> {
        self.statuses
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(stage, _)| *stage)
            .collect()
    }

    pub fn statuses(&self) -> &BTreeMap<CognitiveStage, StageStatus> {
        &self.statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_all_pending() {
        let state = RunState::new([
            CognitiveStage::RequirementAnalysis,
            CognitiveStage::CoreImplementation,
        ]);
        assert_eq!(state.count(StageStatus::Pending), 2);
        assert!(!state.any_failed());
    }

    #[test]
    fn test_transitions_are_recorded() {
        let mut state = RunState::new([CognitiveStage::RequirementAnalysis]);
        state.mark_running(CognitiveStage::RequirementAnalysis);
        assert_eq!(
            state.status(CognitiveStage::RequirementAnalysis),
            StageStatus::Running
        );
        state.mark_failed(CognitiveStage::RequirementAnalysis);
        assert!(state.any_failed());
        assert_eq!(
            state.stages_with(StageStatus::Failed),
            vec![CognitiveStage::RequirementAnalysis]
        );
    }
}
