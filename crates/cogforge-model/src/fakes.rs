//! Scripted fakes for the model-invocation traits (testing only)
//!
//! Provides `ScriptedGenerator`, `StaticLinearPipeline` and
//! `FailingLinearPipeline` that satisfy the trait contracts without any
//! model backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::GatewayError;
use crate::stage::CognitiveStage;
use crate::traits::*;

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// What a scripted worker answers with.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this generation verbatim.
    Ok(Generation),
    /// Return `"[<worker>] <stage>: <requirement>"`.
    Echo,
    /// Fail with this error.
    Fail(GatewayError),
    /// Sleep on the tokio clock, then answer with the inner reply.
    Delayed {
        delay: Duration,
        reply: Box<ScriptedReply>,
    },
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        ScriptedReply::Ok(Generation::new(content))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedReply::Fail(GatewayError::Transport(message.into()))
    }

    pub fn delayed(delay: Duration, reply: ScriptedReply) -> Self {
        ScriptedReply::Delayed {
            delay,
            reply: Box::new(reply),
        }
    }
}

/// Generator whose answers are fixed per worker and per (worker, stage).
///
/// Lookup order: (worker, stage) entry, then worker entry, then the default
/// reply. Every call is logged before any scripted delay so tests can inspect
/// dispatch order even for calls that were later cancelled.
#[derive(Debug)]
pub struct ScriptedGenerator {
    default_reply: ScriptedReply,
    by_worker: HashMap<String, ScriptedReply>,
    by_worker_stage: HashMap<(String, CognitiveStage), ScriptedReply>,
    calls: Mutex<Vec<(String, CognitiveStage)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::with_default(ScriptedReply::Echo)
    }

    pub fn with_default(default_reply: ScriptedReply) -> Self {
        Self {
            default_reply,
            by_worker: HashMap::new(),
            by_worker_stage: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Script every stage answered by `worker_id`.
    pub fn on_worker(mut self, worker_id: impl Into<String>, reply: ScriptedReply) -> Self {
        self.by_worker.insert(worker_id.into(), reply);
        self
    }

    /// Script one stage answered by `worker_id`.
    pub fn on(
        mut self,
        worker_id: impl Into<String>,
        stage: CognitiveStage,
        reply: ScriptedReply,
    ) -> Self {
        self.by_worker_stage.insert((worker_id.into(), stage), reply);
        self
    }

    /// Calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<(String, CognitiveStage)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Calls received for one stage.
    pub fn calls_for(&self, stage: CognitiveStage) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, s)| *s == stage)
            .map(|(w, _)| w)
            .collect()
    }

    /// Highest number of calls that were running at the same moment.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, request: &GenerationRequest) -> &ScriptedReply {
        self.by_worker_stage
            .get(&(request.worker_id.clone(), request.stage))
            .or_else(|| self.by_worker.get(&request.worker_id))
            .unwrap_or(&self.default_reply)
    }
}

/// Decrements the in-flight counter even when the call future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StageGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GatewayResult<Generation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.worker_id.clone(), request.stage));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let mut reply = self.reply_for(request);
        let mut delay = Duration::ZERO;
        while let ScriptedReply::Delayed { delay: d, reply: inner } = reply {
            delay += *d;
            reply = inner.as_ref();
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        debug!(
            worker = %request.worker_id,
            stage = %request.stage,
            "scripted generation"
        );

        match reply {
            ScriptedReply::Ok(generation) => Ok(generation.clone()),
            ScriptedReply::Echo => Ok(Generation::new(format!(
                "[{}] {}: {}",
                request.worker_id, request.stage, request.requirement
            ))),
            ScriptedReply::Fail(err) => Err(err.clone()),
            ScriptedReply::Delayed { .. } => Err(GatewayError::InvalidResponse(
                "unresolved scripted delay".to_string(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Linear pipelines
// ---------------------------------------------------------------------------

/// Linear pipeline that always answers with the same artifact.
#[derive(Debug, Default)]
pub struct StaticLinearPipeline {
    artifact: String,
    calls: AtomicUsize,
}

impl StaticLinearPipeline {
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinearPipeline for StaticLinearPipeline {
    async fn generate(&self, _requirement: &str) -> GatewayResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.artifact.clone())
    }
}

/// Linear pipeline that always fails.
#[derive(Debug, Default)]
pub struct FailingLinearPipeline {
    calls: AtomicUsize,
}

impl FailingLinearPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LinearPipeline for FailingLinearPipeline {
    async fn generate(&self, _requirement: &str) -> GatewayResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::Transport("linear pipeline unavailable".to_string()))
    }
}
