//! Six-dimension quality model shared by workers and the fusion engine.
//!
//! All values live in `[0, 1]`. Construction clamps out-of-range input (NaN
//! becomes 0) so downstream arithmetic never has to re-check bounds. The
//! aggregate score is a weighted sum with weights normalized to 1.

use serde::{Deserialize, Serialize};

/// One axis of [`QualityMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Correctness,
    Clarity,
    Performance,
    Maintainability,
    Security,
    Testability,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 6] = [
        QualityDimension::Correctness,
        QualityDimension::Clarity,
        QualityDimension::Performance,
        QualityDimension::Maintainability,
        QualityDimension::Security,
        QualityDimension::Testability,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            QualityDimension::Correctness => "correctness",
            QualityDimension::Clarity => "clarity",
            QualityDimension::Performance => "performance",
            QualityDimension::Maintainability => "maintainability",
            QualityDimension::Security => "security",
            QualityDimension::Testability => "testability",
        }
    }
}

impl std::fmt::Display for QualityDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Per-dimension quality scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawMetrics")]
pub struct QualityMetrics {
    correctness: f64,
    clarity: f64,
    performance: f64,
    maintainability: f64,
    security: f64,
    testability: f64,
}

#[derive(Deserialize)]
struct RawMetrics {
    #[serde(default)]
    correctness: f64,
    #[serde(default)]
    clarity: f64,
    #[serde(default)]
    performance: f64,
    #[serde(default)]
    maintainability: f64,
    #[serde(default)]
    security: f64,
    #[serde(default)]
    testability: f64,
}

impl From<RawMetrics> for QualityMetrics {
    fn from(raw: RawMetrics) -> Self {
        QualityMetrics::new(
            raw.correctness,
            raw.clarity,
            raw.performance,
            raw.maintainability,
            raw.security,
            raw.testability,
        )
    }
}

impl QualityMetrics {
    pub fn new(
        correctness: f64,
        clarity: f64,
        performance: f64,
        maintainability: f64,
        security: f64,
        testability: f64,
    ) -> Self {
        Self {
            correctness: clamp_unit(correctness),
            clarity: clamp_unit(clarity),
            performance: clamp_unit(performance),
            maintainability: clamp_unit(maintainability),
            security: clamp_unit(security),
            testability: clamp_unit(testability),
        }
    }

    /// Same value on every dimension.
    pub fn uniform(value: f64) -> Self {
        Self::from_fn(|_| value)
    }

    /// Build from a per-dimension function.
    pub fn from_fn(mut f: impl FnMut(QualityDimension) -> f64) -> Self {
        Self::new(
            f(QualityDimension::Correctness),
            f(QualityDimension::Clarity),
            f(QualityDimension::Performance),
            f(QualityDimension::Maintainability),
            f(QualityDimension::Security),
            f(QualityDimension::Testability),
        )
    }

    pub fn get(&self, dimension: QualityDimension) -> f64 {
        match dimension {
            QualityDimension::Correctness => self.correctness,
            QualityDimension::Clarity => self.clarity,
            QualityDimension::Performance => self.performance,
            QualityDimension::Maintainability => self.maintainability,
            QualityDimension::Security => self.security,
            QualityDimension::Testability => self.testability,
        }
    }

    pub fn set(&mut self, dimension: QualityDimension, value: f64) {
        let value = clamp_unit(value);
        match dimension {
            QualityDimension::Correctness => self.correctness = value,
            QualityDimension::Clarity => self.clarity = value,
            QualityDimension::Performance => self.performance = value,
            QualityDimension::Maintainability => self.maintainability = value,
            QualityDimension::Security => self.security = value,
            QualityDimension::Testability => self.testability = value,
        }
    }

    /// Weighted aggregate in `[0, 1]`.
    pub fn aggregate(&self, weights: &QualityWeights) -> f64 {
        let w = weights.normalized();
        let sum: f64 = QualityDimension::ALL
            .iter()
            .zip(w.iter())
            .map(|(d, w)| self.get(*d) * w)
            .sum();
        clamp_unit(sum)
    }

    /// Aggregate with equal weights.
    pub fn score(&self) -> f64 {
        self.aggregate(&QualityWeights::default())
    }

    /// At least as good on every dimension and strictly better on one.
    pub fn dominates(&self, other: &QualityMetrics) -> bool {
        let mut strictly_better = false;
        for d in QualityDimension::ALL {
            let (a, b) = (self.get(d), other.get(d));
            if a < b {
                return false;
            }
            if a > b {
                strictly_better = true;
            }
        }
        strictly_better
    }

    /// Per-dimension weighted mean. Weights are normalized; when they sum to
    /// zero every entry counts equally. An empty slice yields all zeros.
    pub fn weighted_average(entries: &[(QualityMetrics, f64)]) -> QualityMetrics {
        if entries.is_empty() {
            return QualityMetrics::default();
        }
        let total: f64 = entries.iter().map(|(_, w)| w.max(0.0)).sum();
        let n = entries.len() as f64;
        QualityMetrics::from_fn(|d| {
            entries
                .iter()
                .map(|(m, w)| {
                    let share = if total > 0.0 { w.max(0.0) / total } else { 1.0 / n };
                    m.get(d) * share
                })
                .sum()
        })
    }
}

/// Relative importance of each quality dimension.
///
/// Any non-negative values are accepted; they are normalized before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub correctness: f64,
    pub clarity: f64,
    pub performance: f64,
    pub maintainability: f64,
    pub security: f64,
    pub testability: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            correctness: 1.0,
            clarity: 1.0,
            performance: 1.0,
            maintainability: 1.0,
            security: 1.0,
            testability: 1.0,
        }
    }
}

impl QualityWeights {
    fn raw(&self) -> [f64; 6] {
        [
            self.correctness,
            self.clarity,
            self.performance,
            self.maintainability,
            self.security,
            self.testability,
        ]
    }

    /// Weights in [`QualityDimension::ALL`] order, summing to 1.
    ///
    /// Negative or non-finite entries count as zero; if nothing is left the
    /// weights fall back to equal.
    pub fn normalized(&self) -> [f64; 6] {
        let raw = self
            .raw()
            .map(|w| if w.is_finite() && w > 0.0 { w } else { 0.0 });
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return [1.0 / 6.0; 6];
        }
        raw.map(|w| w / total)
    }

    /// Name of the first invalid weight, if any.
    pub fn invalid_dimension(&self) -> Option<QualityDimension> {
        QualityDimension::ALL
            .into_iter()
            .zip(self.raw())
            .find(|(_, w)| !w.is_finite() || *w < 0.0)
            .map(|(d, _)| d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_clamps_and_zeroes_nan() {
        let m = QualityMetrics::new(1.5, -0.2, f64::NAN, 0.5, 0.5, 0.5);
        assert_eq!(m.get(QualityDimension::Correctness), 1.0);
        assert_eq!(m.get(QualityDimension::Clarity), 0.0);
        assert_eq!(m.get(QualityDimension::Performance), 0.0);
    }

    #[test]
    fn test_default_weights_average_all_dimensions() {
        let m = QualityMetrics::new(0.6, 0.6, 0.6, 0.0, 0.0, 0.0);
        assert!((m.score() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_custom_weights_are_normalized() {
        let weights = QualityWeights {
            correctness: 3.0,
            clarity: 1.0,
            performance: 0.0,
            maintainability: 0.0,
            security: 0.0,
            testability: 0.0,
        };
        let m = QualityMetrics::new(1.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert!((m.aggregate(&weights) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_equal() {
        let weights = QualityWeights {
            correctness: 0.0,
            clarity: 0.0,
            performance: 0.0,
            maintainability: 0.0,
            security: 0.0,
            testability: 0.0,
        };
        assert_eq!(weights.normalized(), [1.0 / 6.0; 6]);
    }

    #[test]
    fn test_dominates_requires_strict_improvement() {
        let a = QualityMetrics::uniform(0.7);
        let mut b = a;
        assert!(!a.dominates(&b));
        b.set(QualityDimension::Security, 0.9);
        assert!(b.dominates(&a));
        assert!(!a.dominates(&b));
    }

    #[test]
    fn test_weighted_average_respects_weights() {
        let hi = QualityMetrics::uniform(1.0);
        let lo = QualityMetrics::uniform(0.0);
        let avg = QualityMetrics::weighted_average(&[(hi, 3.0), (lo, 1.0)]);
        assert!((avg.get(QualityDimension::Testability) - 0.75).abs() < 1e-9);

        let even = QualityMetrics::weighted_average(&[(hi, 0.0), (lo, 0.0)]);
        assert!((even.get(QualityDimension::Clarity) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_deserialize_clamps_out_of_range() {
        let m: QualityMetrics = serde_json::from_str(r#"{"correctness": 2.0}"#).unwrap();
        assert_eq!(m.get(QualityDimension::Correctness), 1.0);
        assert_eq!(m.get(QualityDimension::Security), 0.0);
    }

    #[test]
    fn test_invalid_dimension_reports_negative_weight() {
        let weights = QualityWeights {
            security: -1.0,
            ..QualityWeights::default()
        };
        assert_eq!(
            weights.invalid_dimension(),
            Some(QualityDimension::Security)
        );
        assert_eq!(QualityWeights::default().invalid_dimension(), None);
    }
}
