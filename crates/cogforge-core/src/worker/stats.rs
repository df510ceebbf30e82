//! Per-worker performance statistics, reporting only.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Calls dispatched to this worker.
    pub calls: u64,
    /// Calls that produced an output.
    pub successes: u64,
    /// Calls that failed for any reason, timeouts included.
    pub failures: u64,
    pub timeouts: u64,
    pub mean_quality: f64,
    pub mean_confidence: f64,
    pub mean_latency_ms: f64,
}

impl WorkerStats {
    pub fn record_success(&mut self, quality: f64, confidence: f64, latency_ms: u64) {
        self.calls += 1;
        self.successes += 1;
        let n = self.successes as f64;
        self.mean_quality += (quality - self.mean_quality) / n;
        self.mean_confidence += (confidence - self.mean_confidence) / n;
        self.mean_latency_ms += (latency_ms as f64 - self.mean_latency_ms) / n;
    }

    pub fn record_failure(&mut self, timed_out: bool) {
        self.calls += 1;
        self.failures += 1;
        if timed_out {
            self.timeouts += 1;
        }
    }

    /// Fraction of calls that produced an output.
    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            0.0
        } else {
            self.successes as f64 / self.calls as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_means() {
        let mut s = WorkerStats::default();
        s.record_success(0.8, 0.9, 100);
        s.record_success(0.4, 0.7, 300);
        s.record_failure(true);
        assert_eq!(s.calls, 3);
        assert_eq!(s.timeouts, 1);
        assert!((s.mean_quality - 0.6).abs() < 1e-9);
        assert!((s.mean_latency_ms - 200.0).abs() < 1e-9);
        assert!((s.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }
}
