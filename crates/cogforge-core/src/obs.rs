//! Structured observability hooks for run lifecycle events.
//!
//! - `run_span` / `RunSpan`: run-scoped tracing spans
//! - `emit_*`: one `info!` (or `warn!`) event per lifecycle transition
//!
//! Every event carries an `event` field with a dotted name so log pipelines
//! can filter on it.

use cogforge_model::CognitiveStage;
use tracing::{info, warn};

/// Span tagged with the run id. Attach it to the run future with
/// `tracing::Instrument` so it survives across await points.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("cogforge.run", run_id = %run_id)
}

/// RAII guard that enters a run-scoped span for synchronous sections.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

pub fn emit_run_started(run_id: &str, stages: usize, workers: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        stages = stages,
        workers = workers,
    );
}

pub fn emit_stage_dispatched(stage: CognitiveStage, eligible: usize, escalated: bool) {
    info!(
        event = "stage.dispatched",
        stage = %stage,
        eligible = eligible,
        escalated = escalated,
    );
}

/// Emit event: a stage produced its fusion result.
pub fn emit_stage_fused(stage: CognitiveStage, strategy: &str, confidence: f64, candidates: usize) {
    info!(
        event = "stage.fused",
        stage = %stage,
        strategy = %strategy,
        confidence = confidence,
        candidates = candidates,
    );
}

pub fn emit_stage_escalated(stage: CognitiveStage, error: &dyn std::fmt::Display) {
    warn!(event = "stage.escalated", stage = %stage, error = %error);
}

pub fn emit_stage_failed(stage: CognitiveStage, error: &dyn std::fmt::Display) {
    warn!(event = "stage.failed", stage = %stage, error = %error);
}

/// Emit event: a fusion strategy failed and best-single was used instead.
pub fn emit_fusion_fallback(stage: CognitiveStage, strategy: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "fusion.fallback",
        stage = %stage,
        strategy = %strategy,
        error = %error,
    );
}

/// Emit event: run finished with duration, completed stage count and outcome.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, stages_completed: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        stages_completed = stages_completed,
        success = success,
    );
}
