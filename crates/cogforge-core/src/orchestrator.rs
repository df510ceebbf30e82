//! Session driver: walks the stage DAG, dispatches workers, fuses their
//! candidates and decides how the run ends.
//!
//! Stages are sequenced by one task. A stage never dispatches before every
//! dependency has a recorded fusion result. A failed stage is retried once
//! with the whole roster; if that also fails the run fails at once, naming the
//! stage and keeping the provenance gathered so far.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use cogforge_model::{CognitiveStage, ContentDigest, LinearPipeline};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, instrument, warn, Instrument};

use crate::config::{EngineConfig, OrchestratorConfig};
use crate::context::{RunContext, StageContext};
use crate::error::{EngineError, EngineResult};
use crate::fusion::FusionEngine;
use crate::metrics::METRICS;
use crate::obs;
use crate::provenance::{ProvenanceRecord, StageProvenance};
use crate::quality::QualityWeights;
use crate::worker::{Eligibility, PoolError, StageDispatch, Worker, WorkerPool, WorkerStats};
use crate::workflow::{DagWorkflow, RunState, StageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initialized,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Initialized => "initialized",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Collaborative,
    Linear,
}

/// What the caller asks for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    pub requirement: String,
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
}

impl RunInput {
    pub fn new(requirement: impl Into<String>) -> Self {
        Self {
            requirement: requirement.into(),
            hints: BTreeMap::new(),
        }
    }

    pub fn with_hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints.insert(key.into(), value.into());
        self
    }
}

/// Aggregate figures over the completed stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stages_completed: usize,
    pub stages_total: usize,
    pub progress: f64,
    pub mean_quality: f64,
    pub min_quality: f64,
    pub max_quality: f64,
    pub mean_confidence: f64,
}

impl RunSummary {
    fn from_provenance(
        provenance: &ProvenanceRecord,
        stages_total: usize,
        weights: &QualityWeights,
    ) -> Self {
        let results: Vec<_> = provenance
            .completed()
            .filter_map(|sp| sp.result.as_ref())
            .collect();
        let n = results.len();
        if n == 0 {
            return Self {
                stages_total,
                ..Default::default()
            };
        }
        let scores: Vec<f64> = results.iter().map(|r| r.score(weights)).collect();
        Self {
            stages_completed: n,
            stages_total,
            progress: if stages_total == 0 {
                0.0
            } else {
                n as f64 / stages_total as f64
            },
            mean_quality: scores.iter().sum::<f64>() / n as f64,
            min_quality: scores.iter().copied().fold(f64::MAX, f64::min),
            max_quality: scores.iter().copied().fold(f64::MIN, f64::max),
            mean_confidence: results.iter().map(|r| r.confidence).sum::<f64>() / n as f64,
        }
    }
}

/// Outcome of one run. Always produced, whether the run succeeded or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub state: SessionState,
    pub mode: RunMode,
    /// Fused result of the final stage, or the linear pipeline's output in
    /// linear mode. Present only on success.
    pub final_artifact: Option<String>,
    /// Linear-pipeline output produced after a collaborative failure. Never
    /// counts as success.
    pub degraded_artifact: Option<String>,
    /// The stage the run could not get past.
    pub stalled_stage: Option<CognitiveStage>,
    pub error: Option<String>,
    pub stage_statuses: BTreeMap<CognitiveStage, StageStatus>,
    pub provenance: ProvenanceRecord,
    pub summary: RunSummary,
    pub worker_stats: BTreeMap<String, WorkerStats>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Completed && self.final_artifact.is_some()
    }

    /// SHA-256 over the decision trail.
    pub fn provenance_digest(&self) -> anyhow::Result<ContentDigest> {
        self.provenance.digest()
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Run {}\n\n", self.run_id));
        out.push_str(&format!(
            "- state: {}\n- mode: {:?}\n- stages: {}/{}\n- mean quality: {:.2} (min {:.2}, max {:.2})\n- mean confidence: {:.2}\n- duration: {} ms\n",
            self.state,
            self.mode,
            self.summary.stages_completed,
            self.summary.stages_total,
            self.summary.mean_quality,
            self.summary.min_quality,
            self.summary.max_quality,
            self.summary.mean_confidence,
            self.duration_ms
        ));
        if let Some(stage) = self.stalled_stage {
            out.push_str(&format!("- stalled at: {stage}\n"));
        }
        if let Some(err) = &self.error {
            out.push_str(&format!("- error: {err}\n"));
        }
        if let Ok(digest) = self.provenance_digest() {
            out.push_str(&format!("- provenance: `{}`\n", digest.short()));
        }
        out.push('\n');

        if !self.worker_stats.is_empty() {
            out.push_str("## Workers\n\n");
            out.push_str("| worker | calls | failures | mean quality | mean confidence |\n");
            out.push_str("|---|---|---|---|---|\n");
            for (id, s) in &self.worker_stats {
                out.push_str(&format!(
                    "| {id} | {} | {} | {:.2} | {:.2} |\n",
                    s.calls, s.failures, s.mean_quality, s.mean_confidence
                ));
            }
            out.push('\n');
        }

        out.push_str(&self.provenance.render_markdown());

        if let Some(artifact) = &self.final_artifact {
            out.push_str("## Final Artifact\n\n```\n");
            out.push_str(artifact);
            out.push_str("\n```\n");
        } else if let Some(artifact) = &self.degraded_artifact {
            out.push_str("## Degraded Artifact (linear fallback)\n\n```\n");
            out.push_str(artifact);
            out.push_str("\n```\n");
        }
        out
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self).context("serialize run report")?;
        std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
        Ok(())
    }
}

/// How a collaborative pass ended before the report is assembled.
enum Halt {
    Finished,
    Stalled {
        stage: Option<CognitiveStage>,
        error: EngineError,
    },
}

pub struct Orchestrator {
    workflow: DagWorkflow,
    pool: WorkerPool,
    fusion: FusionEngine,
    config: OrchestratorConfig,
    linear: Option<Arc<dyn LinearPipeline>>,
    state: SessionState,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workflow", &self.workflow)
            .field("pool", &self.pool)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Fails if the workflow cannot drive a run.
    pub fn new(workflow: DagWorkflow, pool: WorkerPool, fusion: FusionEngine) -> EngineResult<Self> {
        workflow.validate()?;
        Ok(Self {
            workflow,
            pool,
            fusion,
            config: OrchestratorConfig::default(),
            linear: None,
            state: SessionState::Initialized,
        })
    }

    /// Build pool and fusion engine from one validated config.
    pub fn from_config(
        config: &EngineConfig,
        workflow: DagWorkflow,
        workers: Vec<Worker>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let mut pool = WorkerPool::new(config.pool.clone()).with_weights(config.quality);
        for worker in workers {
            pool.add_worker(worker)?;
        }
        let fusion = FusionEngine::new(config.fusion.clone()).with_weights(config.quality);
        Ok(Self::new(workflow, pool, fusion)?.with_config(config.orchestrator.clone()))
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_linear_pipeline(mut self, pipeline: Arc<dyn LinearPipeline>) -> Self {
        self.linear = Some(pipeline);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn workflow(&self) -> &DagWorkflow {
        &self.workflow
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Roster changes between runs.
    pub fn pool_mut(&mut self) -> &mut WorkerPool {
        &mut self.pool
    }

    /// Run one session to completion. Never panics on stage or fusion
    /// failures; the outcome is in the report.
    pub async fn run(&mut self, input: RunInput) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.run_session(run_id, input).instrument(span).await
    }

    async fn run_session(&mut self, run_id: String, input: RunInput) -> RunReport {
        let started = Instant::now();
        self.state = SessionState::Running;
        self.pool.reset_stats();
        obs::emit_run_started(&run_id, self.workflow.len(), self.pool.len());

        let mut report = if self.config.collaborative_enabled {
            self.run_collaborative(&run_id, &input).await
        } else {
            self.run_linear(&run_id, &input).await
        };

        report.duration_ms = started.elapsed().as_millis() as u64;
        report.worker_stats = self.pool.worker_stats();
        self.state = report.state;

        let success = report.is_success();
        if success {
            METRICS.inc_runs_completed();
        } else {
            METRICS.inc_runs_failed();
        }
        obs::emit_run_finished(
            &run_id,
            report.duration_ms,
            report.summary.stages_completed,
            success,
        );
        METRICS.flush();
        report
    }

    fn empty_report(&self, run_id: &str, input: &RunInput, mode: RunMode) -> RunReport {
        RunReport {
            run_id: run_id.to_string(),
            state: SessionState::Running,
            mode,
            final_artifact: None,
            degraded_artifact: None,
            stalled_stage: None,
            error: None,
            stage_statuses: BTreeMap::new(),
            provenance: ProvenanceRecord::new(run_id, &input.requirement),
            summary: RunSummary::default(),
            worker_stats: BTreeMap::new(),
            duration_ms: 0,
        }
    }

    async fn run_linear(&self, run_id: &str, input: &RunInput) -> RunReport {
        let mut report = self.empty_report(run_id, input, RunMode::Linear);
        let outcome = match &self.linear {
            Some(pipeline) => pipeline
                .generate(&input.requirement)
                .await
                .map_err(EngineError::from),
            None => Err(EngineError::NoLinearPipeline),
        };
        match outcome {
            Ok(artifact) => {
                info!(run_id = %run_id, "linear pipeline produced the artifact");
                report.state = SessionState::Completed;
                report.final_artifact = Some(artifact);
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "linear pipeline failed");
                report.state = SessionState::Failed;
                report.error = Some(e.to_string());
            }
        }
        report
    }

    #[instrument(skip(self, input), fields(stages = self.workflow.len()))]
    async fn run_collaborative(&self, run_id: &str, input: &RunInput) -> RunReport {
        let mut report = self.empty_report(run_id, input, RunMode::Collaborative);
        let mut run_state = RunState::new(self.workflow.stages().iter().copied());
        let mut ctx = RunContext::new(&input.requirement).with_hints(input.hints.clone());

        let halt = self
            .drive(&mut run_state, &mut ctx, &mut report.provenance)
            .await;

        let final_stage = self.workflow.final_stage();
        match halt {
            Halt::Finished => {
                let artifact = final_stage
                    .and_then(|s| ctx.result_for(s))
                    .map(|r| r.content.clone());
                match artifact {
                    Some(artifact) => {
                        report.state = SessionState::Completed;
                        report.final_artifact = Some(artifact);
                    }
                    None => {
                        report.state = SessionState::Failed;
                        report.stalled_stage = run_state.stages_with(StageStatus::Failed).first().copied();
                        report.error = Some("run ended without a final stage result".to_string());
                    }
                }
            }
            Halt::Stalled { stage, error } => {
                report.state = SessionState::Failed;
                report.stalled_stage = stage;
                report.error = Some(error.to_string());
            }
        }

        if report.state == SessionState::Failed {
            report.degraded_artifact = self.degraded_artifact(&input.requirement).await;
        }

        report.stage_statuses = run_state.statuses().clone();
        report.summary = RunSummary::from_provenance(
            &report.provenance,
            self.workflow.len(),
            self.fusion.weights(),
        );
        report
    }

    async fn drive(
        &self,
        run_state: &mut RunState,
        ctx: &mut RunContext,
        provenance: &mut ProvenanceRecord,
    ) -> Halt {
        loop {
            if self.workflow.is_terminal(run_state) {
                return Halt::Finished;
            }
            let ready = self.workflow.ready_stages(run_state);
            if ready.is_empty() {
                let pending = run_state.stages_with(StageStatus::Pending);
                warn!(pending = ?pending, "no stage ready; scheduler deadlock");
                return Halt::Stalled {
                    stage: pending.first().copied(),
                    error: EngineError::Deadlock { pending },
                };
            }
            for stage in ready {
                if let Err(error) = self.execute_stage(stage, run_state, ctx, provenance).await {
                    return Halt::Stalled {
                        stage: Some(stage),
                        error,
                    };
                }
            }
        }
    }

    /// Dispatch, escalate once if needed, fuse, record.
    async fn execute_stage(
        &self,
        stage: CognitiveStage,
        run_state: &mut RunState,
        ctx: &mut RunContext,
        provenance: &mut ProvenanceRecord,
    ) -> EngineResult<()> {
        let stage_ctx = ctx.stage_context(self.workflow.dependencies_of(stage)?);
        run_state.mark_running(stage);
        let mut sp = StageProvenance::started(stage);

        let outcome = self
            .dispatch_with_escalation(stage, &stage_ctx, &mut sp)
            .await;
        let dispatch = match outcome {
            Ok(dispatch) => dispatch,
            Err(e) => {
                obs::emit_stage_failed(stage, &e);
                run_state.mark_failed(stage);
                sp.error = Some(e.to_string());
                sp.finish(StageStatus::Failed);
                provenance.stages.push(sp);
                return Err(e);
            }
        };

        let fused = self.fusion.fuse(stage, &dispatch.outputs, &stage_ctx).await;
        sp.candidates = dispatch.outputs;
        sp.failures.extend(dispatch.failures);

        let result = match fused {
            Ok(result) => result,
            Err(e) => {
                let e = EngineError::from(e);
                obs::emit_stage_failed(stage, &e);
                run_state.mark_failed(stage);
                sp.error = Some(e.to_string());
                sp.finish(StageStatus::Failed);
                provenance.stages.push(sp);
                return Err(e);
            }
        };

        sp.result = Some(result.clone());
        sp.finish(StageStatus::Done);
        provenance.stages.push(sp);
        ctx.record(result);
        run_state.mark_done(stage);
        Ok(())
    }

    async fn dispatch_with_escalation(
        &self,
        stage: CognitiveStage,
        stage_ctx: &StageContext,
        sp: &mut StageProvenance,
    ) -> EngineResult<StageDispatch> {
        sp.attempts = 1;
        let first = match self
            .pool
            .dispatch(stage, stage_ctx, Eligibility::Specialized)
            .await
        {
            Ok(dispatch) => return Ok(dispatch),
            Err(e) => e,
        };
        sp.failures.extend(first.failures().iter().cloned());

        if !self.config.escalation_enabled {
            return Err(first.into());
        }

        obs::emit_stage_escalated(stage, &first);
        METRICS.inc_escalations();
        sp.attempts = 2;
        sp.escalated = true;

        match self
            .pool
            .dispatch(stage, stage_ctx, Eligibility::Escalated)
            .await
        {
            Ok(dispatch) => Ok(dispatch),
            Err(second) => {
                sp.failures.extend(second.failures().iter().cloned());
                Err(escalation_failed(stage, &first, second))
            }
        }
    }

    async fn degraded_artifact(&self, requirement: &str) -> Option<String> {
        if !self.config.use_fallback_pipeline {
            return None;
        }
        let pipeline = self.linear.as_ref()?;
        match pipeline.generate(requirement).await {
            Ok(artifact) => {
                info!("linear fallback produced a degraded artifact");
                Some(artifact)
            }
            Err(e) => {
                warn!(error = %e, "linear fallback failed");
                None
            }
        }
    }
}

fn escalation_failed(stage: CognitiveStage, first: &PoolError, second: PoolError) -> EngineError {
    EngineError::StageFailed {
        stage,
        reason: format!("{first}; escalation: {second}"),
    }
}

#[cfg(test)]
mod tests {
    use cogforge_model::fakes::{
        FailingLinearPipeline, ScriptedGenerator, ScriptedReply, StaticLinearPipeline,
    };
    use cogforge_model::{CognitiveStage::*, Specialization};

    use super::*;
    use crate::config::PoolConfig;

    fn orchestrator(generator: Arc<ScriptedGenerator>) -> Orchestrator {
        let pool = WorkerPool::new(PoolConfig::default())
            .with_worker(Worker::new("arch", Specialization::Architecture, generator.clone()))
            .unwrap()
            .with_worker(Worker::new("algo", Specialization::Algorithm, generator.clone()))
            .unwrap()
            .with_worker(Worker::new("qa", Specialization::Testing, generator))
            .unwrap();
        Orchestrator::new(DagWorkflow::simple().unwrap(), pool, FusionEngine::default()).unwrap()
    }

    #[tokio::test]
    async fn test_simple_run_completes_with_final_artifact() {
        let generator = Arc::new(ScriptedGenerator::new());
        let mut orch = orchestrator(generator);
        assert_eq!(orch.state(), SessionState::Initialized);

        let report = orch.run(RunInput::new("reverse a string")).await;

        assert!(report.is_success(), "{:?}", report.error);
        assert_eq!(orch.state(), SessionState::Completed);
        assert_eq!(report.mode, RunMode::Collaborative);
        assert_eq!(report.summary.stages_completed, 4);
        assert_eq!(report.summary.stages_total, 4);
        assert!(report.final_artifact.unwrap().contains("testing_strategy"));
        assert!(report
            .stage_statuses
            .values()
            .all(|s| *s == StageStatus::Done));
    }

    #[tokio::test]
    async fn test_empty_workflow_is_rejected_at_construction() {
        let err = Orchestrator::new(
            DagWorkflow::new(),
            WorkerPool::new(PoolConfig::default()),
            FusionEngine::default(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_linear_mode_uses_pipeline() {
        let linear = Arc::new(StaticLinearPipeline::new("fn reverse() {}"));
        let generator = Arc::new(ScriptedGenerator::new());
        let mut orch = orchestrator(generator.clone())
            .with_config(OrchestratorConfig {
                collaborative_enabled: false,
                ..Default::default()
            })
            .with_linear_pipeline(linear.clone());

        let report = orch.run(RunInput::new("reverse")).await;

        assert!(report.is_success());
        assert_eq!(report.mode, RunMode::Linear);
        assert_eq!(report.final_artifact.as_deref(), Some("fn reverse() {}"));
        assert_eq!(linear.call_count(), 1);
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_linear_mode_without_pipeline_fails() {
        let mut orch = orchestrator(Arc::new(ScriptedGenerator::new())).with_config(
            OrchestratorConfig {
                collaborative_enabled: false,
                ..Default::default()
            },
        );
        let report = orch.run(RunInput::new("reverse")).await;
        assert_eq!(report.state, SessionState::Failed);
        assert!(report.error.unwrap().contains("no linear pipeline"));
    }

    #[tokio::test]
    async fn test_failure_without_escalation_stops_immediately() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .on("algo", AlgorithmSelection, ScriptedReply::fail("boom"))
                .on("arch", AlgorithmSelection, ScriptedReply::fail("boom")),
        );
        let mut orch = orchestrator(generator.clone()).with_config(OrchestratorConfig {
            escalation_enabled: false,
            ..Default::default()
        });

        let report = orch.run(RunInput::new("sort numbers")).await;

        assert_eq!(report.state, SessionState::Failed);
        assert_eq!(report.stalled_stage, Some(AlgorithmSelection));
        assert!(generator.calls_for(CoreImplementation).is_empty());
        let sp = report.provenance.stage(AlgorithmSelection).unwrap();
        assert_eq!(sp.attempts, 1);
        assert!(!sp.escalated);
        assert!(report
            .provenance
            .stage(RequirementAnalysis)
            .and_then(|s| s.result.as_ref())
            .is_some());
    }

    #[tokio::test]
    async fn test_failed_linear_fallback_leaves_no_degraded_artifact() {
        let generator = Arc::new(ScriptedGenerator::with_default(ScriptedReply::fail("down")));
        let linear = Arc::new(FailingLinearPipeline::new());
        let mut orch = orchestrator(generator).with_linear_pipeline(linear.clone());

        let report = orch.run(RunInput::new("anything")).await;

        assert_eq!(report.state, SessionState::Failed);
        assert!(report.degraded_artifact.is_none());
        assert_eq!(linear.call_count(), 1);
    }

    #[tokio::test]
    async fn test_report_markdown_and_json() {
        let mut orch = orchestrator(Arc::new(ScriptedGenerator::new()));
        let report = orch.run(RunInput::new("reverse").with_hint("lang", "rust")).await;

        let md = report.render_markdown();
        assert!(md.contains("- state: completed"));
        assert!(md.contains("## Decision Trail"));
        assert!(md.contains("## Final Artifact"));
        assert!(md.contains("- provenance: `"));
        assert_eq!(
            report.provenance_digest().unwrap(),
            report.provenance.digest().unwrap()
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();
        let back: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.run_id, report.run_id);
        assert_eq!(back.state, SessionState::Completed);
    }
}
