//! Retrieval-augmented generation pipeline.

mod orchestrator;
mod types;

pub use orchestrator::RagPipeline;
pub use types::{PipelineState, RagOutcome, SourceRef};
