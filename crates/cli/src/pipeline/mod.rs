//! Pipeline orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{output_path, Pipeline, PipelineConfig};
pub use stats::PipelineStats;
