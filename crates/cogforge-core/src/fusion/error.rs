//! Error types for fusion.

use cogforge_model::CognitiveStage;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FusionError {
    /// Fusion was asked to reconcile an empty candidate set.
    #[error("no candidates to fuse for stage {stage}")]
    NoCandidates { stage: CognitiveStage },

    /// The content merger could not produce a merged artifact.
    #[error("content merge failed for stage {stage}: {reason}")]
    MergeFailed {
        stage: CognitiveStage,
        reason: String,
    },
}

/// Convenience result alias.
pub type FusionOutcome<T> = std::result::Result<T, FusionError>;
