//! Error types for the worker pool.

use cogforge_model::CognitiveStage;
use thiserror::Error;

use crate::worker::output::WorkerFailure;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolError {
    /// Nobody on the roster may work on the stage.
    #[error("no eligible workers for stage {stage}")]
    NoEligibleWorkers { stage: CognitiveStage },

    /// Every eligible worker failed, timed out or was abandoned.
    #[error("all {} eligible workers failed for stage {stage}", failures.len())]
    AllWorkersFailed {
        stage: CognitiveStage,
        failures: Vec<WorkerFailure>,
    },

    #[error("worker already on the roster: {worker_id}")]
    DuplicateWorker { worker_id: String },

    #[error("worker not on the roster: {worker_id}")]
    UnknownWorker { worker_id: String },
}

impl PoolError {
    /// Per-worker failures carried by the error, if any.
    pub fn failures(&self) -> &[WorkerFailure] {
        match self {
            PoolError::AllWorkersFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Convenience result alias.
pub type PoolResult<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::output::FailureKind;

    #[test]
    fn test_all_failed_counts_failures() {
        let err = PoolError::AllWorkersFailed {
            stage: CognitiveStage::Integration,
            failures: vec![
                WorkerFailure::new("a", CognitiveStage::Integration, FailureKind::Error, "x"),
                WorkerFailure::new("b", CognitiveStage::Integration, FailureKind::Timeout, "y"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "all 2 eligible workers failed for stage integration"
        );
        assert_eq!(err.failures().len(), 2);
    }
}
