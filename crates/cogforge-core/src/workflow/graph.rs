//! Stage dependency graph.
//!
//! A stage may run once every stage it depends on is `Done`. Stages are kept
//! in registration order, which is also the tie-break for every ordering
//! query. Cycles are rejected at insertion time via DFS; a rejected insertion
//! leaves the graph exactly as it was.

use std::collections::{HashMap, HashSet};

use cogforge_model::CognitiveStage;

use crate::workflow::error::{WorkflowError, WorkflowResult};
use crate::workflow::state::{RunState, StageStatus};

/// Directed acyclic graph over [`CognitiveStage`]s with one final stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DagWorkflow {
    order: Vec<CognitiveStage>,
    /// `stage -> [dependency, ...]` (upstream adjacency)
    upstream: HashMap<CognitiveStage, Vec<CognitiveStage>>,
    final_stage: Option<CognitiveStage>,
}

impl DagWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `stage` with the given prerequisites.
    ///
    /// Every dependency must already be registered. Re-registering a stage
    /// replaces its dependency set. Returns [`WorkflowError::Cycle`] if the
    /// new edges would close a cycle (a self-dependency included).
    pub fn add_stage(
        &mut self,
        stage: CognitiveStage,
        dependencies: &[CognitiveStage],
    ) -> WorkflowResult<()> {
        if dependencies.contains(&stage) {
            return Err(WorkflowError::Cycle {
                stages: vec![stage],
            });
        }
        if let Some(missing) = dependencies
            .iter()
            .find(|d| !self.upstream.contains_key(*d))
        {
            return Err(WorkflowError::UnknownStage { stage: *missing });
        }

        let mut deps: Vec<CognitiveStage> = Vec::with_capacity(dependencies.len());
        for d in dependencies {
            if !deps.contains(d) {
                deps.push(*d);
            }
        }

        // Tentatively commit the edges.
        let previous = self.upstream.insert(stage, deps);
        if previous.is_none() {
            self.order.push(stage);
        }

        if let Some(cycle) = self.find_cycle_through(stage) {
            // Roll back.
            match previous {
                Some(old) => {
                    self.upstream.insert(stage, old);
                }
                None => {
                    self.upstream.remove(&stage);
                    self.order.pop();
                }
            }
            return Err(WorkflowError::Cycle { stages: cycle });
        }

        Ok(())
    }

    /// Designate the stage whose completion ends a successful run.
    pub fn with_final_stage(mut self, stage: CognitiveStage) -> WorkflowResult<Self> {
        if !self.contains(stage) {
            return Err(WorkflowError::FinalStageMissing { stage });
        }
        self.final_stage = Some(stage);
        Ok(self)
    }

    /// The final stage: the designated one, else `integration` when
    /// registered, else the last registered stage.
    pub fn final_stage(&self) -> Option<CognitiveStage> {
        self.final_stage.or_else(|| {
            if self.contains(CognitiveStage::Integration) {
                Some(CognitiveStage::Integration)
            } else {
                self.order.last().copied()
            }
        })
    }

    /// Check that the workflow can drive a run.
    pub fn validate(&self) -> WorkflowResult<()> {
        if self.order.is_empty() {
            return Err(WorkflowError::Empty);
        }
        if let Some(stage) = self.final_stage {
            if !self.contains(stage) {
                return Err(WorkflowError::FinalStageMissing { stage });
            }
        }
        Ok(())
    }

    pub fn contains(&self, stage: CognitiveStage) -> bool {
        self.upstream.contains_key(&stage)
    }

    /// Registered stages, in registration order.
    pub fn stages(&self) -> &[CognitiveStage] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Direct prerequisites of `stage`, in declaration order.
    pub fn dependencies_of(&self, stage: CognitiveStage) -> WorkflowResult<&[CognitiveStage]> {
        self.upstream
            .get(&stage)
            .map(Vec::as_slice)
            .ok_or(WorkflowError::UnknownStage { stage })
    }

    /// Stages that list `stage` as a direct prerequisite, in registration order.
    pub fn dependents_of(&self, stage: CognitiveStage) -> Vec<CognitiveStage> {
        self.order
            .iter()
            .filter(|s| {
                self.upstream
                    .get(*s)
                    .is_some_and(|deps| deps.contains(&stage))
            })
            .copied()
            .collect()
    }

    /// Pending stages whose dependencies are all done, in registration order.
    pub fn ready_stages(&self, state: &RunState) -> Vec<CognitiveStage> {
        self.order
            .iter()
            .filter(|stage| state.status(**stage) == StageStatus::Pending)
            .filter(|stage| {
                self.upstream
                    .get(*stage)
                    .map(|deps| deps.iter().all(|d| state.is_done(*d)))
                    .unwrap_or(false)
            })
            .copied()
            .collect()
    }

    /// `true` once the final stage is done, or once nothing is pending or
    /// running and at least one stage has failed.
    pub fn is_terminal(&self, state: &RunState) -> bool {
        if let Some(final_stage) = self.final_stage() {
            if state.is_done(final_stage) {
                return true;
            }
        }
        let active = self.order.iter().any(|s| {
            matches!(
                state.status(*s),
                StageStatus::Pending | StageStatus::Running
            )
        });
        let failed = self
            .order
            .iter()
            .any(|s| state.status(*s) == StageStatus::Failed);
        !active && failed
    }

    /// Fraction of registered stages that are done.
    pub fn progress(&self, state: &RunState) -> f64 {
        if self.order.is_empty() {
            return 0.0;
        }
        let done = self.order.iter().filter(|s| state.is_done(**s)).count();
        done as f64 / self.order.len() as f64
    }

    /// Topological order (dependencies first) using Kahn's algorithm with
    /// registration order as the tie-break.
    pub fn execution_order(&self) -> Vec<CognitiveStage> {
        let mut emitted: HashSet<CognitiveStage> = HashSet::new();
        let mut sorted = Vec::with_capacity(self.order.len());

        while sorted.len() < self.order.len() {
            let next = self.order.iter().find(|s| {
                !emitted.contains(*s)
                    && self
                        .upstream
                        .get(*s)
                        .is_some_and(|deps| deps.iter().all(|d| emitted.contains(d)))
            });
            match next {
                Some(stage) => {
                    emitted.insert(*stage);
                    sorted.push(*stage);
                }
                // Unreachable while add_stage rejects cycles.
                None => break,
            }
        }
        sorted
    }

    /// DFS over upstream edges looking for a path back to `start`.
    fn find_cycle_through(&self, start: CognitiveStage) -> Option<Vec<CognitiveStage>> {
        let mut visited = HashSet::new();
        let mut path = vec![start];
        if self.dfs_back_to(start, start, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn dfs_back_to(
        &self,
        node: CognitiveStage,
        target: CognitiveStage,
        visited: &mut HashSet<CognitiveStage>,
        path: &mut Vec<CognitiveStage>,
    ) -> bool {
        let Some(deps) = self.upstream.get(&node) else {
            return false;
        };
        for dep in deps {
            if *dep == target {
                return true;
            }
            if visited.insert(*dep) {
                path.push(*dep);
                if self.dfs_back_to(*dep, target, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }
}
