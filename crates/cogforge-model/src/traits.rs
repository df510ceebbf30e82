//! Model-invocation contracts.
//!
//! - `StageGenerator`: one worker's call into a model for one stage
//! - `LinearPipeline`: a single-shot generator used as the non-collaborative path
//!
//! Both traits are async and backend-agnostic. Scripted fakes live in the
//! `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{GatewayError, InvalidDigest};
use crate::stage::{CognitiveStage, Specialization};

/// Result type for model invocations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always lowercase hex produced
/// by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Digest of a UTF-8 text artifact.
    pub fn of_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = InvalidDigest;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StageGenerator
// ---------------------------------------------------------------------------

/// Fused output of a completed upstream stage, handed to downstream workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamArtifact {
    pub stage: CognitiveStage,
    pub content: String,
    pub confidence: f64,
}

/// Everything a worker sends to the model for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub stage: CognitiveStage,
    pub worker_id: String,
    pub specialization: Specialization,
    /// The original user requirement, unchanged across stages.
    pub requirement: String,
    /// Free-form key/value hints (language, style, constraints).
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
    /// Fused outputs of the stage's direct dependencies, in dependency order.
    #[serde(default)]
    pub upstream: Vec<UpstreamArtifact>,
}

impl GenerationRequest {
    /// Content of the upstream artifact for `stage`, if it was supplied.
    pub fn upstream_content(&self, stage: CognitiveStage) -> Option<&str> {
        self.upstream
            .iter()
            .find(|a| a.stage == stage)
            .map(|a| a.content.as_str())
    }
}

/// Raw model answer for one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    /// Optional free-text explanation of the approach taken.
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Short feature labels the model claims for its answer.
    #[serde(default)]
    pub key_features: Vec<String>,
}

impl Generation {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.key_features.push(feature.into());
        self
    }
}

/// Model backend invoked by workers.
///
/// Implementations must be safe to call concurrently; the worker pool fans
/// out several requests for the same stage at once. Deadlines are enforced
/// by the caller, so an implementation may simply await its transport.
#[async_trait]
pub trait StageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<Generation>;
}

/// Single-shot generator used when collaboration is disabled and as the
/// degraded-output fallback after an unrecoverable stage failure.
#[async_trait]
pub trait LinearPipeline: Send + Sync {
    async fn generate(&self, requirement: &str) -> GatewayResult<String>;
}
