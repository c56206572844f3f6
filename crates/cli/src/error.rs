//! Error types for CLI operations.

use std::path::PathBuf;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Input run file not found
    #[error("Input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// Input path has no file name to reuse for the output
    #[error("Input path has no file name: {}", path.display())]
    NoFileName { path: PathBuf },

    /// Output would overwrite the input
    #[error("Output {} would overwrite the input", path.display())]
    OutputIsInput { path: PathBuf },

    /// Some sink writes failed, the output is incomplete
    #[error("{failures} sink writes failed, output is incomplete")]
    SinkFailures { failures: u64 },

    /// Synchronizer stopped feeding the dispatcher
    #[error("Pipeline execution failed: {message}")]
    PipelineExecution { message: String },
}

impl CliError {
    pub fn pipeline_execution(message: impl Into<String>) -> Self {
        Self::PipelineExecution {
            message: message.into(),
        }
    }
}
