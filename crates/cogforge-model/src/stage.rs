//! Shared vocabulary: cognitive stages and worker specializations.

use serde::{Deserialize, Serialize};

/// The nine cognitive stages of a collaborative generation run.
///
/// Enumeration order carries no scheduling meaning; the order in which stages
/// run comes from the dependencies declared in a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveStage {
    RequirementAnalysis,
    ArchitectureDesign,
    AlgorithmSelection,
    InterfaceDesign,
    CoreImplementation,
    ErrorHandling,
    PerformanceOptimization,
    TestingStrategy,
    Integration,
}

impl CognitiveStage {
    /// All stages, in declaration order.
    pub const ALL: [CognitiveStage; 9] = [
        CognitiveStage::RequirementAnalysis,
        CognitiveStage::ArchitectureDesign,
        CognitiveStage::AlgorithmSelection,
        CognitiveStage::InterfaceDesign,
        CognitiveStage::CoreImplementation,
        CognitiveStage::ErrorHandling,
        CognitiveStage::PerformanceOptimization,
        CognitiveStage::TestingStrategy,
        CognitiveStage::Integration,
    ];

    /// Stable snake_case name, identical to the serde representation.
    pub fn name(&self) -> &'static str {
        match self {
            CognitiveStage::RequirementAnalysis => "requirement_analysis",
            CognitiveStage::ArchitectureDesign => "architecture_design",
            CognitiveStage::AlgorithmSelection => "algorithm_selection",
            CognitiveStage::InterfaceDesign => "interface_design",
            CognitiveStage::CoreImplementation => "core_implementation",
            CognitiveStage::ErrorHandling => "error_handling",
            CognitiveStage::PerformanceOptimization => "performance_optimization",
            CognitiveStage::TestingStrategy => "testing_strategy",
            CognitiveStage::Integration => "integration",
        }
    }

    /// One-line description of what the stage produces.
    pub fn description(&self) -> &'static str {
        match self {
            CognitiveStage::RequirementAnalysis => {
                "Clarify functional requirements, constraints and success criteria"
            }
            CognitiveStage::ArchitectureDesign => "Define components, boundaries and data flow",
            CognitiveStage::AlgorithmSelection => "Choose algorithms and data structures",
            CognitiveStage::InterfaceDesign => "Specify function signatures and public APIs",
            CognitiveStage::CoreImplementation => "Implement the core functional logic",
            CognitiveStage::ErrorHandling => "Design error handling and failure reporting",
            CognitiveStage::PerformanceOptimization => "Optimize time and resource usage",
            CognitiveStage::TestingStrategy => "Design test cases and verification strategy",
            CognitiveStage::Integration => "Assemble the parts into one complete solution",
        }
    }

    /// Parse a snake_case stage name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl std::fmt::Display for CognitiveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Expertise area of a worker agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialization {
    Algorithm,
    Architecture,
    Performance,
    Security,
    Testing,
    General,
}

impl Specialization {
    pub const ALL: [Specialization; 6] = [
        Specialization::Algorithm,
        Specialization::Architecture,
        Specialization::Performance,
        Specialization::Security,
        Specialization::Testing,
        Specialization::General,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Specialization::Algorithm => "algorithm",
            Specialization::Architecture => "architecture",
            Specialization::Performance => "performance",
            Specialization::Security => "security",
            Specialization::Testing => "testing",
            Specialization::General => "general",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl std::fmt::Display for Specialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
