//! Decision trail of a run: every candidate, failure and fusion choice per
//! stage, in the order stages were attempted.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cogforge_model::{CognitiveStage, ContentDigest};
use serde::{Deserialize, Serialize};

use crate::fusion::FusionResult;
use crate::worker::{StageOutput, WorkerFailure};
use crate::workflow::StageStatus;

/// Everything that happened to one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProvenance {
    pub stage: CognitiveStage,
    pub status: StageStatus,
    /// Dispatch attempts: 1, or 2 when the stage was escalated.
    pub attempts: u32,
    pub escalated: bool,
    pub candidates: Vec<StageOutput>,
    pub failures: Vec<WorkerFailure>,
    pub result: Option<FusionResult>,
    /// Why the stage failed, when it did.
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageProvenance {
    pub fn started(stage: CognitiveStage) -> Self {
        Self {
            stage,
            status: StageStatus::Running,
            attempts: 0,
            escalated: false,
            candidates: Vec::new(),
            failures: Vec::new(),
            result: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self, status: StageStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub run_id: String,
    pub requirement: String,
    pub stages: Vec<StageProvenance>,
}

impl ProvenanceRecord {
    pub fn new(run_id: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            requirement: requirement.into(),
            stages: Vec::new(),
        }
    }

    pub fn stage(&self, stage: CognitiveStage) -> Option<&StageProvenance> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    /// Stages that produced a fusion result, in completion order.
    pub fn completed(&self) -> impl Iterator<Item = &StageProvenance> {
        self.stages.iter().filter(|s| s.status == StageStatus::Done)
    }

    /// SHA-256 over the JSON form of the trail.
    pub fn digest(&self) -> Result<ContentDigest> {
        let bytes = serde_json::to_vec(self).context("serialize provenance")?;
        Ok(ContentDigest::from_bytes(&bytes))
    }

    pub fn render_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## Decision Trail\n\n");
        for sp in &self.stages {
            out.push_str(&format!("### {} ({})\n", sp.stage, sp.status));
            out.push_str(&format!(
                "- candidates: {}\n- failures: {}\n- attempts: {}{}\n",
                sp.candidates.len(),
                sp.failures.len(),
                sp.attempts,
                if sp.escalated { " (escalated)" } else { "" }
            ));
            if let Some(result) = &sp.result {
                out.push_str(&format!(
                    "- strategy: `{}`{}\n- confidence: {:.2}\n- contributors: {}\n- rationale: {}\n",
                    result.strategy,
                    if result.fallback { " (fallback)" } else { "" },
                    result.confidence,
                    result.contributor_ids().join(", "),
                    result.rationale
                ));
            }
            for f in &sp.failures {
                out.push_str(&format!("- `{}` {}: {}\n", f.worker_id, f.kind, f.message));
            }
            if let Some(err) = &sp.error {
                out.push_str(&format!("- error: {err}\n"));
            }
            out.push('\n');
        }
        out
    }
}

/// Write the provenance record as pretty JSON.
pub fn write_provenance_json(path: &Path, record: &ProvenanceRecord) -> Result<()> {
    let content = serde_json::to_string_pretty(record).context("serialize provenance")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
