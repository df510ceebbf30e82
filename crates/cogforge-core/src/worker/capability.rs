//! Which specializations are qualified for which stage.

use std::collections::BTreeMap;

use cogforge_model::{CognitiveStage, Specialization};
use serde::{Deserialize, Serialize};

/// How wide the net is cast when picking workers for a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Workers qualified by the capability table, generalists, and workers
    /// that declared the stage as preferred.
    Specialized,
    /// The whole roster. Used for the single retry of a failed stage.
    Escalated,
}

/// Stage to qualifying specializations.
///
/// `general` never needs an entry: generalists are eligible everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityTable {
    entries: BTreeMap<CognitiveStage, Vec<Specialization>>,
}

impl Default for CapabilityTable {
    fn default() -> Self {
        use CognitiveStage::*;
        use Specialization::*;

        let entries = [
            (RequirementAnalysis, vec![Architecture, Security]),
            (ArchitectureDesign, vec![Architecture]),
            (AlgorithmSelection, vec![Algorithm, Performance]),
            (InterfaceDesign, vec![Architecture, Testing]),
            (CoreImplementation, vec![Algorithm, Performance, Security]),
            (ErrorHandling, vec![Security]),
            (PerformanceOptimization, vec![Algorithm, Performance]),
            (TestingStrategy, vec![Testing]),
            (Integration, vec![Testing]),
        ]
        .into_iter()
        .collect();

        Self { entries }
    }
}

impl CapabilityTable {
    /// Table with no entries: only generalists and preferred-stage matches
    /// qualify.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Replace the qualifying specializations for `stage`.
    pub fn with_entry(mut self, stage: CognitiveStage, specializations: Vec<Specialization>) -> Self {
        self.entries.insert(stage, specializations);
        self
    }

    pub fn qualifying(&self, stage: CognitiveStage) -> &[Specialization] {
        self.entries
            .get(&stage)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn qualifies(&self, stage: CognitiveStage, specialization: Specialization) -> bool {
        self.qualifying(stage).contains(&specialization)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_covers_all_stages() {
        let table = CapabilityTable::default();
        for stage in CognitiveStage::ALL {
            assert!(!table.qualifying(stage).is_empty(), "{stage} has no entry");
        }
    }

    #[test]
    fn test_core_implementation_qualifiers() {
        let table = CapabilityTable::default();
        let stage = CognitiveStage::CoreImplementation;
        assert!(table.qualifies(stage, Specialization::Algorithm));
        assert!(table.qualifies(stage, Specialization::Security));
        assert!(!table.qualifies(stage, Specialization::Testing));
        assert!(!table.qualifies(stage, Specialization::General));
    }

    #[test]
    fn test_with_entry_overrides() {
        let table = CapabilityTable::empty()
            .with_entry(CognitiveStage::Integration, vec![Specialization::Architecture]);
        assert!(table.qualifies(CognitiveStage::Integration, Specialization::Architecture));
        assert!(!table.qualifies(CognitiveStage::Integration, Specialization::Testing));
    }
}
