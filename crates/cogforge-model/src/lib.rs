//! cogforge-model: model-invocation contracts for cogforge
//!
//! ## Layer 0 - Vocabulary and Backends
//!
//! Everything the collaborative engine needs to talk about a model without
//! knowing which model it is.
//!
//! ## Key Components
//!
//! - `CognitiveStage` / `Specialization`: shared stage and expertise vocabulary
//! - `StageGenerator`: one worker's model call for one stage
//! - `LinearPipeline`: single-shot generator for the non-collaborative path
//! - `fakes`: scripted in-memory implementations for tests

mod error;
pub mod fakes;
pub mod stage;
pub mod traits;

pub use error::{GatewayError, InvalidDigest};
pub use stage::{CognitiveStage, Specialization};
pub use traits::{
    ContentDigest, Generation, GenerationRequest, GatewayResult, LinearPipeline, StageGenerator,
    UpstreamArtifact,
};
