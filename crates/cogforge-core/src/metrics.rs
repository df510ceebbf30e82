//! Global atomic counters for engine observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event, typically at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, no allocations and no locking.
pub struct Metrics {
    worker_calls: AtomicU64,
    worker_failures: AtomicU64,
    worker_timeouts: AtomicU64,
    fusions: AtomicU64,
    fusion_fallbacks: AtomicU64,
    escalations: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub worker_calls: u64,
    pub worker_failures: u64,
    pub worker_timeouts: u64,
    pub fusions: u64,
    pub fusion_fallbacks: u64,
    pub escalations: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            worker_calls: AtomicU64::new(0),
            worker_failures: AtomicU64::new(0),
            worker_timeouts: AtomicU64::new(0),
            fusions: AtomicU64::new(0),
            fusion_fallbacks: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            runs_completed: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_worker_calls(&self) {
        self.worker_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "worker_calls", "counter incremented");
    }

    pub fn inc_worker_failures(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "worker_failures", "counter incremented");
    }

    pub fn inc_worker_timeouts(&self) {
        self.worker_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "worker_timeouts", "counter incremented");
    }

    pub fn inc_fusions(&self) {
        self.fusions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fusions", "counter incremented");
    }

    /// Increment when a fusion strategy failed and best-single was used instead.
    pub fn inc_fusion_fallbacks(&self) {
        self.fusion_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fusion_fallbacks", "counter incremented");
    }

    pub fn inc_escalations(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "escalations", "counter incremented");
    }

    pub fn inc_runs_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_completed", "counter incremented");
    }

    pub fn inc_runs_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_failed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            worker_calls = s.worker_calls,
            worker_failures = s.worker_failures,
            worker_timeouts = s.worker_timeouts,
            fusions = s.fusions,
            fusion_fallbacks = s.fusion_fallbacks,
            escalations = s.escalations,
            runs_completed = s.runs_completed,
            runs_failed = s.runs_failed,
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            worker_calls: self.worker_calls.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
            worker_timeouts: self.worker_timeouts.load(Ordering::Relaxed),
            fusions: self.fusions.load(Ordering::Relaxed),
            fusion_fallbacks: self.fusion_fallbacks.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.worker_calls,
            &self.worker_failures,
            &self.worker_timeouts,
            &self.fusions,
            &self.fusion_fallbacks,
            &self.escalations,
            &self.runs_completed,
            &self.runs_failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
