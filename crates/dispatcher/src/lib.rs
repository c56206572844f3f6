//! # Dispatcher
//!
//! Output fan-out.
//!
//! Responsibilities:
//! - Consume the run-begin record and merged events
//! - Fan-out to multiple sinks, each behind its own queue and worker task
//! - Apply backpressure instead of dropping: every sink sees every item

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod item;
pub mod metrics;
pub mod sinks;

pub use contracts::DataSink;
pub use dispatcher::{
    create_dispatcher, DispatchSummary, Dispatcher, DispatcherBuilder, DispatcherConfig,
};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use item::DispatchItem;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
