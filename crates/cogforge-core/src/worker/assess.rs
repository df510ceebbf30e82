//! Self-assessment of worker outputs.
//!
//! The default [`HeuristicAssessor`] is a deterministic keyword and length
//! scorer. It makes no claim to judge code; it only has to rank candidates
//! consistently so fusion has something to work with.

use cogforge_model::{CognitiveStage, Generation, Specialization};

use crate::quality::QualityMetrics;

/// Scores a raw generation on the six quality dimensions.
pub trait OutputAssessor: Send + Sync {
    fn assess(
        &self,
        stage: CognitiveStage,
        specialization: Specialization,
        generation: &Generation,
    ) -> QualityMetrics;
}

const EFFICIENCY_TERMS: &[&str] = &[
    "complexity",
    "o(",
    "time",
    "space",
    "performance",
    "efficient",
    "optimize",
    "cache",
];
const MAINTAINABILITY_TERMS: &[&str] = &[
    "modular",
    "clean",
    "readable",
    "documentation",
    "comment",
    "maintainable",
];
const SECURITY_TERMS: &[&str] = &[
    "validation",
    "validate",
    "sanitize",
    "secure",
    "encryption",
    "authentication",
    "authorization",
];
const RISKY_MARKERS: &[&str] = &["eval(", "exec(", "unsafe ", "system(", "shell", "sql"];
const TEST_TERMS: &[&str] = &["test", "assert", "mock", "fixture", "coverage", "edge case"];

fn specialization_terms(specialization: Specialization) -> &'static [&'static str] {
    match specialization {
        Specialization::Algorithm => &["algorithm", "complexity"],
        Specialization::Architecture => &["architecture", "component", "module"],
        Specialization::Performance => &["performance", "optimization"],
        Specialization::Security => &["security", "vulnerability"],
        Specialization::Testing => &["test", "testing"],
        Specialization::General => &[],
    }
}

fn count_terms(haystack: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|t| haystack.contains(*t)).count()
}

/// Keyword and length heuristics, all values in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicAssessor;

impl HeuristicAssessor {
    fn correctness(&self, generation: &Generation) -> f64 {
        let mut score = 0.6;
        let reasoning_len = generation.reasoning.as_deref().map_or(0, str::len);
        if reasoning_len > 100 {
            score += 0.15;
        } else if reasoning_len > 50 {
            score += 0.1;
        }

        let content = &generation.content;
        let mut structure: f64 = 0.0;
        if content.lines().any(|l| {
            let l = l.trim_start();
            (l.starts_with("fn ") || l.starts_with("pub fn ") || l.starts_with("def "))
                && l.contains('(')
                && l.contains(')')
        }) {
            structure += 0.1;
        }
        if content.contains("if ") {
            structure += 0.05;
        }
        if content.contains("for ") || content.contains("while ") {
            structure += 0.05;
        }
        if content.contains("return") || content.contains("Ok(") {
            structure += 0.05;
        }
        score + structure.min(0.2)
    }

    fn clarity(&self, specialization: Specialization, generation: &Generation) -> f64 {
        let len = generation.content.len();
        let mut score = 0.3;
        if len > 1000 {
            score += 0.3;
        } else if len > 500 {
            score += 0.2;
        } else if len > 200 {
            score += 0.1;
        }
        if generation.key_features.len() > 2 {
            score += 0.15;
        }
        let lower = generation.content.to_lowercase();
        if count_terms(&lower, specialization_terms(specialization)) > 0 {
            score += 0.15;
        }
        score
    }

    fn performance(
        &self,
        stage: CognitiveStage,
        specialization: Specialization,
        lower: &str,
    ) -> f64 {
        let mut score = 0.5 + (count_terms(lower, EFFICIENCY_TERMS) as f64 * 0.05).min(0.3);
        if matches!(
            specialization,
            Specialization::Performance | Specialization::Algorithm
        ) {
            score += 0.1;
        }
        if stage == CognitiveStage::AlgorithmSelection
            && ["o(n)", "o(log n)", "o(1)", "o(n log n)"]
                .iter()
                .any(|t| lower.contains(t))
        {
            score += 0.1;
        }
        score
    }

    fn maintainability(
        &self,
        stage: CognitiveStage,
        specialization: Specialization,
        generation: &Generation,
        lower: &str,
    ) -> f64 {
        let mut score =
            0.4 + (count_terms(lower, MAINTAINABILITY_TERMS) as f64 * 0.05).min(0.25);
        if stage == CognitiveStage::CoreImplementation {
            let content = &generation.content;
            if content.contains("///") || content.contains("//!") || content.contains("\"\"\"") {
                score += 0.15;
            }
            if content.contains("//") || content.contains('#') {
                score += 0.1;
            }
        }
        if specialization == Specialization::Architecture {
            score += 0.1;
        }
        score
    }

    fn security(&self, specialization: Specialization, lower: &str) -> f64 {
        let mut score = 0.7 + (count_terms(lower, SECURITY_TERMS) as f64 * 0.03).min(0.2);
        score -= count_terms(lower, RISKY_MARKERS) as f64 * 0.1;
        if specialization == Specialization::Security {
            score += 0.1;
        }
        score
    }

    fn testability(&self, specialization: Specialization, lower: &str) -> f64 {
        let mut score = 0.4 + (count_terms(lower, TEST_TERMS) as f64 * 0.1).min(0.4);
        if specialization == Specialization::Testing {
            score += 0.1;
        }
        score
    }
}

impl OutputAssessor for HeuristicAssessor {
    fn assess(
        &self,
        stage: CognitiveStage,
        specialization: Specialization,
        generation: &Generation,
    ) -> QualityMetrics {
        let lower = generation.content.to_lowercase();
        QualityMetrics::new(
            self.correctness(generation),
            self.clarity(specialization, generation),
            self.performance(stage, specialization, &lower),
            self.maintainability(stage, specialization, generation, &lower),
            self.security(specialization, &lower),
            self.testability(specialization, &lower),
        )
    }
}

/// Confidence in `[0.1, 0.95]` from the aggregate score, content length,
/// reasoning length and whether the worker is a specialist for the stage.
pub fn derive_confidence(aggregate: f64, generation: &Generation, specialist: bool) -> f64 {
    let mut confidence = 0.6 + aggregate * 0.3;
    let len = generation.content.len();
    if len > 500 {
        confidence += 0.1;
    } else if len < 100 {
        confidence -= 0.1;
    }
    if specialist {
        confidence += 0.1;
    }
    if generation.reasoning.as_deref().map_or(0, str::len) > 100 {
        confidence += 0.05;
    }
    confidence.clamp(0.1, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityDimension;

    #[test]
    fn test_assessment_is_deterministic() {
        let g = Generation::new("fn sum(xs: &[i32]) -> i32 {\n    xs.iter().sum()\n}");
        let a = HeuristicAssessor.assess(
            CognitiveStage::CoreImplementation,
            Specialization::Algorithm,
            &g,
        );
        let b = HeuristicAssessor.assess(
            CognitiveStage::CoreImplementation,
            Specialization::Algorithm,
            &g,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_risky_markers_lower_security() {
        let safe = Generation::new("validate input before use");
        let risky = Generation::new("build the sql string and pass it to the shell");
        let s = HeuristicAssessor.assess(CognitiveStage::ErrorHandling, Specialization::General, &safe);
        let r = HeuristicAssessor.assess(CognitiveStage::ErrorHandling, Specialization::General, &risky);
        assert!(r.get(QualityDimension::Security) < s.get(QualityDimension::Security));
    }

    #[test]
    fn test_testing_specialist_scores_testability() {
        let g = Generation::new("unit test every edge case, assert on output");
        let tester = HeuristicAssessor.assess(CognitiveStage::TestingStrategy, Specialization::Testing, &g);
        let plain = HeuristicAssessor.assess(CognitiveStage::TestingStrategy, Specialization::General, &g);
        assert!(tester.get(QualityDimension::Testability) > plain.get(QualityDimension::Testability));
    }

    #[test]
    fn test_confidence_is_bounded() {
        let long = Generation::new("x".repeat(2000)).with_reasoning("r".repeat(200));
        assert_eq!(derive_confidence(1.0, &long, true), 0.95);

        let short = Generation::new("x");
        let c = derive_confidence(0.0, &short, false);
        assert!((c - 0.5).abs() < 1e-9);
    }
}
