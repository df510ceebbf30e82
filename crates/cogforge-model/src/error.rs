//! Error types for model invocation.

use thiserror::Error;

/// Errors a model backend or fallback pipeline may report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The backend did not answer in time.
    #[error("model call timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Network, auth or protocol failure talking to the backend.
    #[error("model transport failed: {0}")]
    Transport(String),

    /// The backend answered with something that could not be used.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// `true` for failures caused by a deadline rather than the backend.
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }
}

/// A string that is not a 64-char SHA-256 hex digest.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid content digest: {digest}")]
pub struct InvalidDigest {
    pub digest: String,
}
