//! Stage workflow: the dependency graph, presets and per-run stage status.

pub mod error;
pub mod graph;
mod presets;
pub mod state;

pub use error::{WorkflowError, WorkflowResult};
pub use graph::DagWorkflow;
pub use state::{RunState, StageStatus};
