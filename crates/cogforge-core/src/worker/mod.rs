//! Worker agents and the pool that dispatches them.
//!
//! - `capability`: stage to qualifying specialization table
//! - `output`: worker identity, candidates and failures
//! - `assess`: self-assessment of raw generations
//! - `pool`: concurrent dispatch with per-call and per-stage deadlines

pub mod assess;
pub mod capability;
pub mod error;
pub mod output;
pub mod pool;
pub mod stats;

pub use assess::{derive_confidence, HeuristicAssessor, OutputAssessor};
pub use capability::{CapabilityTable, Eligibility};
pub use error::{PoolError, PoolResult};
pub use output::{FailureKind, StageOutput, Worker, WorkerFailure, WorkerProfile};
pub use pool::{StageDispatch, WorkerPool};
pub use stats::WorkerStats;
