//! Error types for workflow construction.

use cogforge_model::CognitiveStage;
use thiserror::Error;

/// Configuration errors raised while building or validating a workflow.
/// All of them are fatal for the run that would have used the workflow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Adding the requested edges would close a dependency cycle.
    #[error("dependency cycle detected involving stages: {stages:?}")]
    Cycle { stages: Vec<CognitiveStage> },

    /// A dependency (or queried stage) is not registered.
    #[error("stage not registered in workflow: {stage}")]
    UnknownStage { stage: CognitiveStage },

    /// The designated final stage is not part of the workflow.
    #[error("final stage {stage} is not registered in workflow")]
    FinalStageMissing { stage: CognitiveStage },

    #[error("workflow has no stages")]
    Empty,
}

/// Convenience result alias.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_displays_stage_names() {
        let err = WorkflowError::Cycle {
            stages: vec![
                CognitiveStage::ArchitectureDesign,
                CognitiveStage::InterfaceDesign,
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("ArchitectureDesign"));
        assert!(msg.contains("InterfaceDesign"));
    }

    #[test]
    fn test_unknown_stage_uses_snake_case_name() {
        let err = WorkflowError::UnknownStage {
            stage: CognitiveStage::ErrorHandling,
        };
        assert_eq!(err.to_string(), "stage not registered in workflow: error_handling");
    }
}
