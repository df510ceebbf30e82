//! cogforge-core: collaborative multi-agent code generation
//!
//! A run walks a DAG of cognitive stages. Each ready stage is handed to the
//! workers qualified for it, their candidates are fused into one result, and
//! that result becomes upstream context for the stages that depend on it.
//!
//! ## Key Components
//!
//! - `workflow`: stage graph, presets and per-run status
//! - `worker`: roster, capability table and bounded concurrent dispatch
//! - `fusion`: strategy selection and the Master fusion engine
//! - `orchestrator`: session driver, escalation and run reports
//! - `provenance`: per-stage decision trail

pub mod config;
pub mod context;
pub mod error;
pub mod fusion;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod provenance;
pub mod quality;
pub mod telemetry;
pub mod worker;
pub mod workflow;

pub use config::{ConfigError, ConfigResult, EngineConfig, OrchestratorConfig, PoolConfig};
pub use context::{RunContext, StageContext};
pub use error::{EngineError, EngineResult};
pub use fusion::{
    Contribution, ContentMerger, FusionConfig, FusionDecision, FusionEngine, FusionError,
    FusionResult, FusionStrategy, MergeInput, SectionMerger, SimilarityMetric,
};
pub use orchestrator::{
    Orchestrator, RunInput, RunMode, RunReport, RunSummary, SessionState,
};
pub use provenance::{write_provenance_json, ProvenanceRecord, StageProvenance};
pub use quality::{QualityDimension, QualityMetrics, QualityWeights};
pub use worker::{
    CapabilityTable, Eligibility, FailureKind, HeuristicAssessor, OutputAssessor, PoolError,
    StageDispatch, StageOutput, Worker, WorkerFailure, WorkerPool, WorkerStats,
};
pub use workflow::{DagWorkflow, RunState, StageStatus, WorkflowError};

pub use cogforge_model::{
    CognitiveStage, ContentDigest, Generation, GenerationRequest, LinearPipeline, Specialization,
    StageGenerator,
};
