//! DataSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for Sinks and their configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::{CompositeRecord, ContractError, EventSkeleton};

/// Data output trait
///
/// A sink receives the run-begin record verbatim, then every merged event in
/// emission order.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Final output location, if the sink writes to disk
    fn location(&self) -> Option<&Path>;

    /// Write the run-begin record
    async fn begin_run(&mut self, run_begin: &CompositeRecord) -> Result<(), ContractError>;

    /// Write one merged event
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, event: &EventSkeleton) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    256
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Summary log lines
    Log,
    /// Native run file
    RunFile,
    /// One JSON record per line
    JsonLines,
}
