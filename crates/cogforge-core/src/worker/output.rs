//! What workers hand back for one stage: candidates and failures.

use std::sync::Arc;

use cogforge_model::{
    CognitiveStage, ContentDigest, GenerationRequest, Specialization, StageGenerator,
};
use serde::{Deserialize, Serialize};

use crate::context::StageContext;
use crate::quality::{QualityMetrics, QualityWeights};
use crate::worker::capability::{CapabilityTable, Eligibility};

/// Identity of a worker agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub id: String,
    pub specialization: Specialization,
    #[serde(default)]
    pub preferred_stages: Vec<CognitiveStage>,
}

/// A worker: identity plus the model backend it calls.
#[derive(Clone)]
pub struct Worker {
    pub profile: WorkerProfile,
    pub generator: Arc<dyn StageGenerator>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        specialization: Specialization,
        generator: Arc<dyn StageGenerator>,
    ) -> Self {
        Self {
            profile: WorkerProfile {
                id: id.into(),
                specialization,
                preferred_stages: Vec::new(),
            },
            generator,
        }
    }

    pub fn with_preferred_stages(mut self, stages: Vec<CognitiveStage>) -> Self {
        self.profile.preferred_stages = stages;
        self
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    pub fn specialization(&self) -> Specialization {
        self.profile.specialization
    }

    pub fn prefers(&self, stage: CognitiveStage) -> bool {
        self.profile.preferred_stages.contains(&stage)
    }

    /// Qualified by the table or by declaring the stage as preferred.
    pub fn is_specialist_for(&self, stage: CognitiveStage, table: &CapabilityTable) -> bool {
        table.qualifies(stage, self.specialization()) || self.prefers(stage)
    }

    pub fn is_eligible(
        &self,
        stage: CognitiveStage,
        table: &CapabilityTable,
        eligibility: Eligibility,
    ) -> bool {
        match eligibility {
            Eligibility::Escalated => true,
            Eligibility::Specialized => {
                self.specialization() == Specialization::General
                    || self.is_specialist_for(stage, table)
            }
        }
    }

    pub(crate) fn request_for(&self, stage: CognitiveStage, context: &StageContext) -> GenerationRequest {
        GenerationRequest {
            stage,
            worker_id: self.profile.id.clone(),
            specialization: self.profile.specialization,
            requirement: context.requirement.clone(),
            hints: context.hints.clone(),
            upstream: context.upstream.clone(),
        }
    }
}

/// One worker's candidate for one stage. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub worker_id: String,
    pub specialization: Specialization,
    pub stage: CognitiveStage,
    pub content: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub key_features: Vec<String>,
    pub metrics: QualityMetrics,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    pub latency_ms: u64,
    pub digest: ContentDigest,
}

impl StageOutput {
    /// Build an output directly, mostly for tests and custom pools.
    pub fn new(
        worker_id: impl Into<String>,
        stage: CognitiveStage,
        content: impl Into<String>,
        metrics: QualityMetrics,
        confidence: f64,
    ) -> Self {
        let content = content.into();
        Self {
            worker_id: worker_id.into(),
            specialization: Specialization::General,
            stage,
            digest: ContentDigest::of_text(&content),
            content,
            reasoning: None,
            key_features: Vec::new(),
            metrics,
            confidence: crate::quality::clamp_unit(confidence),
            latency_ms: 0,
        }
    }

    pub fn with_specialization(mut self, specialization: Specialization) -> Self {
        self.specialization = specialization;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_key_features(mut self, features: Vec<String>) -> Self {
        self.key_features = features;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Aggregate quality under `weights`.
    pub fn score(&self, weights: &QualityWeights) -> f64 {
        self.metrics.aggregate(weights)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The backend returned an error.
    Error,
    /// The per-call deadline elapsed.
    Timeout,
    /// The stage deadline elapsed before the call finished or started.
    Abandoned,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::Error => "error",
            FailureKind::Timeout => "timeout",
            FailureKind::Abandoned => "abandoned",
        };
        write!(f, "{s}")
    }
}

/// A worker that produced nothing for a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub worker_id: String,
    pub stage: CognitiveStage,
    pub kind: FailureKind,
    pub message: String,
}

impl WorkerFailure {
    pub fn new(
        worker_id: impl Into<String>,
        stage: CognitiveStage,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            stage,
            kind,
            message: message.into(),
        }
    }
}
