//! Top-level engine error.

use cogforge_model::{CognitiveStage, GatewayError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::fusion::FusionError;
use crate::worker::PoolError;
use crate::workflow::WorkflowError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("fusion error: {0}")]
    Fusion(#[from] FusionError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("model gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// No stage is ready, none is running, and the run is not finished.
    #[error("scheduler deadlock: no stage ready, pending stages: {pending:?}")]
    Deadlock { pending: Vec<CognitiveStage> },

    /// A stage failed and escalation did not rescue it.
    #[error("stage {stage} failed: {reason}")]
    StageFailed {
        stage: CognitiveStage,
        reason: String,
    },

    #[error("collaboration is disabled and no linear pipeline is configured")]
    NoLinearPipeline,
}

impl EngineError {
    /// Configuration problems are fatal and must not be retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Workflow(_) | EngineError::Config(_))
    }
}

/// Convenience result alias.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_errors_are_configuration() {
        let err: EngineError = WorkflowError::Empty.into();
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "workflow error: workflow has no stages");
    }

    #[test]
    fn test_stage_failure_names_stage() {
        let err = EngineError::StageFailed {
            stage: CognitiveStage::ErrorHandling,
            reason: "all workers failed".to_string(),
        };
        assert!(err.to_string().contains("error_handling"));
        assert!(!err.is_configuration());
    }
}
