//! Ready-made workflows.

use cogforge_model::CognitiveStage::*;

use crate::workflow::error::WorkflowResult;
use crate::workflow::graph::DagWorkflow;

impl DagWorkflow {
    /// All nine stages; the run ends with `integration`.
    pub fn standard() -> WorkflowResult<Self> {
        let mut wf = DagWorkflow::new();
        wf.add_stage(RequirementAnalysis, &[])?;
        wf.add_stage(ArchitectureDesign, &[RequirementAnalysis])?;
        wf.add_stage(AlgorithmSelection, &[RequirementAnalysis])?;
        wf.add_stage(InterfaceDesign, &[ArchitectureDesign])?;
        wf.add_stage(
            CoreImplementation,
            &[ArchitectureDesign, AlgorithmSelection, InterfaceDesign],
        )?;
        wf.add_stage(ErrorHandling, &[CoreImplementation])?;
        wf.add_stage(PerformanceOptimization, &[CoreImplementation])?;
        wf.add_stage(TestingStrategy, &[CoreImplementation])?;
        wf.add_stage(
            Integration,
            &[ErrorHandling, PerformanceOptimization, TestingStrategy],
        )?;
        wf.with_final_stage(Integration)
    }

    /// Straight line: analysis, algorithm, implementation, tests.
    pub fn simple() -> WorkflowResult<Self> {
        let mut wf = DagWorkflow::new();
        wf.add_stage(RequirementAnalysis, &[])?;
        wf.add_stage(AlgorithmSelection, &[RequirementAnalysis])?;
        wf.add_stage(CoreImplementation, &[AlgorithmSelection])?;
        wf.add_stage(TestingStrategy, &[CoreImplementation])?;
        wf.with_final_stage(TestingStrategy)
    }

    /// Design-heavy variant without error handling or integration.
    /// Performance optimization runs alongside the testing strategy.
    pub fn research() -> WorkflowResult<Self> {
        let mut wf = DagWorkflow::new();
        wf.add_stage(RequirementAnalysis, &[])?;
        wf.add_stage(ArchitectureDesign, &[RequirementAnalysis])?;
        wf.add_stage(AlgorithmSelection, &[RequirementAnalysis])?;
        wf.add_stage(InterfaceDesign, &[ArchitectureDesign])?;
        wf.add_stage(
            CoreImplementation,
            &[ArchitectureDesign, AlgorithmSelection, InterfaceDesign],
        )?;
        wf.add_stage(PerformanceOptimization, &[CoreImplementation])?;
        wf.add_stage(TestingStrategy, &[CoreImplementation])?;
        wf.with_final_stage(TestingStrategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_build_and_validate() {
        for wf in [
            DagWorkflow::standard().unwrap(),
            DagWorkflow::simple().unwrap(),
            DagWorkflow::research().unwrap(),
        ] {
            assert!(wf.validate().is_ok());
            assert_eq!(wf.execution_order().len(), wf.len());
        }
    }

    #[test]
    fn test_standard_covers_every_stage() {
        let wf = DagWorkflow::standard().unwrap();
        assert_eq!(wf.len(), 9);
        assert_eq!(wf.final_stage(), Some(Integration));
        assert_eq!(
            wf.dependencies_of(Integration).unwrap(),
            &[ErrorHandling, PerformanceOptimization, TestingStrategy]
        );
    }

    #[test]
    fn test_simple_is_a_chain() {
        let wf = DagWorkflow::simple().unwrap();
        assert_eq!(
            wf.execution_order(),
            vec![
                RequirementAnalysis,
                AlgorithmSelection,
                CoreImplementation,
                TestingStrategy
            ]
        );
        assert_eq!(wf.final_stage(), Some(TestingStrategy));
    }
}
