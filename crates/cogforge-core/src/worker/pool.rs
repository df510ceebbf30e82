//! Concurrent per-stage dispatch across the worker roster.
//!
//! Every eligible worker gets one independent call. Calls run as tokio tasks
//! in batches of `max_concurrent`; all batches share one stage deadline. Each
//! call also has its own deadline. A failing or slow worker only loses its own
//! contribution; the stage fails only when nobody produced anything.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use cogforge_model::CognitiveStage;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::config::PoolConfig;
use crate::context::StageContext;
use crate::metrics::METRICS;
use crate::obs;
use crate::quality::QualityWeights;
use crate::worker::assess::{derive_confidence, HeuristicAssessor, OutputAssessor};
use crate::worker::capability::{CapabilityTable, Eligibility};
use crate::worker::error::{PoolError, PoolResult};
use crate::worker::output::{FailureKind, StageOutput, Worker, WorkerFailure};
use crate::worker::stats::WorkerStats;

/// Everything one dispatch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageDispatch {
    pub stage: CognitiveStage,
    /// Successful candidates, sorted by worker id.
    pub outputs: Vec<StageOutput>,
    /// Workers that produced nothing, sorted by worker id.
    pub failures: Vec<WorkerFailure>,
}

/// The roster of workers plus the policy for calling them.
pub struct WorkerPool {
    workers: Vec<Worker>,
    capabilities: CapabilityTable,
    config: PoolConfig,
    weights: QualityWeights,
    assessor: Arc<dyn OutputAssessor>,
    stats: std::sync::Mutex<BTreeMap<String, WorkerStats>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            workers: Vec::new(),
            capabilities: CapabilityTable::default(),
            config,
            weights: QualityWeights::default(),
            assessor: Arc::new(HeuristicAssessor),
            stats: std::sync::Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilityTable) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_weights(mut self, weights: QualityWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_assessor(mut self, assessor: Arc<dyn OutputAssessor>) -> Self {
        self.assessor = assessor;
        self
    }

    /// Builder form of [`WorkerPool::add_worker`].
    pub fn with_worker(mut self, worker: Worker) -> PoolResult<Self> {
        self.add_worker(worker)?;
        Ok(self)
    }

    pub fn add_worker(&mut self, worker: Worker) -> PoolResult<()> {
        if self.workers.iter().any(|w| w.id() == worker.id()) {
            return Err(PoolError::DuplicateWorker {
                worker_id: worker.id().to_string(),
            });
        }
        debug!(worker = %worker.id(), specialization = %worker.specialization(), "worker added");
        self.workers.push(worker);
        Ok(())
    }

    pub fn remove_worker(&mut self, worker_id: &str) -> PoolResult<Worker> {
        let idx = self
            .workers
            .iter()
            .position(|w| w.id() == worker_id)
            .ok_or_else(|| PoolError::UnknownWorker {
                worker_id: worker_id.to_string(),
            })?;
        self.lock_stats().remove(worker_id);
        Ok(self.workers.remove(idx))
    }

    /// Workers in the order they were added.
    pub fn roster(&self) -> &[Worker] {
        &self.workers
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// Workers allowed on `stage`, sorted by id.
    pub fn eligible_workers(&self, stage: CognitiveStage, eligibility: Eligibility) -> Vec<Worker> {
        let mut eligible: Vec<Worker> = self
            .workers
            .iter()
            .filter(|w| w.is_eligible(stage, &self.capabilities, eligibility))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.id().cmp(b.id()));
        eligible
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, WorkerStats>> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of per-worker statistics since the last reset.
    pub fn worker_stats(&self) -> BTreeMap<String, WorkerStats> {
        self.lock_stats().clone()
    }

    pub fn reset_stats(&self) {
        self.lock_stats().clear();
    }

    /// Run one call per eligible worker and collect what comes back.
    ///
    /// Returns [`PoolError::NoEligibleWorkers`] when the roster has nobody for
    /// the stage and [`PoolError::AllWorkersFailed`] when nobody produced an
    /// output before their deadlines.
    #[instrument(skip(self, context), fields(stage = %stage, eligibility = ?eligibility))]
    pub async fn dispatch(
        &self,
        stage: CognitiveStage,
        context: &StageContext,
        eligibility: Eligibility,
    ) -> PoolResult<StageDispatch> {
        let eligible = self.eligible_workers(stage, eligibility);
        if eligible.is_empty() {
            return Err(PoolError::NoEligibleWorkers { stage });
        }
        obs::emit_stage_dispatched(stage, eligible.len(), eligibility == Eligibility::Escalated);

        let per_call = Duration::from_millis(self.config.per_call_timeout_ms);
        let deadline = Instant::now() + Duration::from_millis(self.config.stage_deadline_ms);
        let buffer: Arc<Mutex<Vec<StageOutput>>> = Arc::new(Mutex::new(Vec::new()));
        let mut failures: Vec<WorkerFailure> = Vec::new();

        for batch in eligible.chunks(self.config.max_concurrent.max(1)) {
            if Instant::now() >= deadline {
                for worker in batch {
                    failures.push(WorkerFailure::new(
                        worker.id(),
                        stage,
                        FailureKind::Abandoned,
                        "stage deadline elapsed before dispatch",
                    ));
                }
                continue;
            }

            let mut pending: BTreeSet<String> = BTreeSet::new();
            let mut set = JoinSet::new();
            for worker in batch {
                pending.insert(worker.id().to_string());
                let request = worker.request_for(stage, context);
                let specialist = worker.is_specialist_for(stage, &self.capabilities);
                let worker = worker.clone();
                let buffer = Arc::clone(&buffer);
                let assessor = Arc::clone(&self.assessor);
                let weights = self.weights;

                set.spawn(async move {
                    METRICS.inc_worker_calls();
                    let started = Instant::now();
                    let outcome = tokio::time::timeout(per_call, worker.generator.generate(&request)).await;
                    let latency_ms = started.elapsed().as_millis() as u64;

                    match outcome {
                        Ok(Ok(generation)) => {
                            let metrics =
                                assessor.assess(stage, worker.specialization(), &generation);
                            let confidence =
                                derive_confidence(metrics.aggregate(&weights), &generation, specialist);
                            let output = StageOutput::new(
                                worker.id(),
                                stage,
                                generation.content,
                                metrics,
                                confidence,
                            )
                            .with_specialization(worker.specialization())
                            .with_key_features(generation.key_features)
                            .with_latency_ms(latency_ms);
                            let output = match generation.reasoning {
                                Some(r) => output.with_reasoning(r),
                                None => output,
                            };
                            buffer.lock().await.push(output);
                            Ok(worker.id().to_string())
                        }
                        Ok(Err(e)) => {
                            warn!(worker = %worker.id(), stage = %stage, error = %e, "worker call failed");
                            let kind = if e.is_timeout() {
                                METRICS.inc_worker_timeouts();
                                FailureKind::Timeout
                            } else {
                                METRICS.inc_worker_failures();
                                FailureKind::Error
                            };
                            Err(WorkerFailure::new(worker.id(), stage, kind, e.to_string()))
                        }
                        Err(_) => {
                            warn!(worker = %worker.id(), stage = %stage, timeout_ms = per_call.as_millis() as u64, "worker call timed out");
                            METRICS.inc_worker_timeouts();
                            Err(WorkerFailure::new(
                                worker.id(),
                                stage,
                                FailureKind::Timeout,
                                format!("no answer within {} ms", per_call.as_millis()),
                            ))
                        }
                    }
                });
            }

            let mut deadline_hit = false;
            loop {
                match tokio::time::timeout_at(deadline, set.join_next()).await {
                    Ok(Some(Ok(Ok(worker_id)))) => {
                        pending.remove(&worker_id);
                    }
                    Ok(Some(Ok(Err(failure)))) => {
                        pending.remove(&failure.worker_id);
                        failures.push(failure);
                    }
                    Ok(Some(Err(join_err))) => {
                        warn!(stage = %stage, error = %join_err, "worker task did not complete");
                    }
                    Ok(None) => break,
                    Err(_) => {
                        deadline_hit = true;
                        break;
                    }
                }
            }
            set.shutdown().await;

            // Outputs pushed before the abort still count.
            {
                let done = buffer.lock().await;
                for output in done.iter() {
                    pending.remove(&output.worker_id);
                }
            }
            for worker_id in pending {
                let (kind, message) = if deadline_hit {
                    warn!(worker = %worker_id, stage = %stage, "worker abandoned at stage deadline");
                    (FailureKind::Abandoned, "stage deadline elapsed".to_string())
                } else {
                    METRICS.inc_worker_failures();
                    (FailureKind::Error, "worker task panicked".to_string())
                };
                failures.push(WorkerFailure::new(worker_id, stage, kind, message));
            }
        }

        let mut outputs = std::mem::take(&mut *buffer.lock().await);
        outputs.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        failures.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        self.record_stats(&outputs, &failures);

        debug!(
            stage = %stage,
            outputs = outputs.len(),
            failures = failures.len(),
            "dispatch finished"
        );

        if outputs.is_empty() {
            return Err(PoolError::AllWorkersFailed { stage, failures });
        }
        Ok(StageDispatch {
            stage,
            outputs,
            failures,
        })
    }

    fn record_stats(&self, outputs: &[StageOutput], failures: &[WorkerFailure]) {
        let mut stats = self.lock_stats();
        for output in outputs {
            stats.entry(output.worker_id.clone()).or_default().record_success(
                output.score(&self.weights),
                output.confidence,
                output.latency_ms,
            );
        }
        for failure in failures {
            stats
                .entry(failure.worker_id.clone())
                .or_default()
                .record_failure(failure.kind == FailureKind::Timeout);
        }
    }
}
