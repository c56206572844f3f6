//! # Ingestion
//!
//! Record sources for the synchronizer.
//!
//! Responsibilities:
//! - Decode native run files (`.trun`) and JSON-lines files (`.jsonl`)
//! - Encode records and merged events in the same formats
//! - Generate synthetic runs with injected counter faults
//!
//! ## Usage Example
//!
//! ```no_run
//! use contracts::RecordSource;
//! use std::path::Path;
//!
//! let mut source = ingestion::open_source(Path::new("run000123.trun")).unwrap();
//! while let Some(record) = source.next_record().unwrap() {
//!     println!("event {}", record.event_number);
//! }
//! ```

mod error;
mod format;
mod jsonl;
mod stats;
mod run_file;
mod synthetic;

// Re-exports
pub use error::{IngestionError, Result};
pub use format::{create_writer, open_source, RecordWriter, RunFormat};
pub use jsonl::{JsonLinesReader, JsonLinesWriter};
pub use stats::{IngestionMetrics, MetricsSnapshot};
pub use run_file::{RunFileReader, RunFileWriter, MAGIC, MAX_FRAME_LEN, VERSION};
pub use synthetic::{ChannelSpec, Fault, SyntheticRun};
