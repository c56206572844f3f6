//! # Sync Engine
//!
//! Trigger-number stream synchronizer.
//!
//! Every composite record carries one sub-record per detector channel, but
//! channels drop or duplicate triggers independently. The engine queues
//! each channel separately, reconstructs every channel's logical trigger
//! number from its wrapping hardware counter, and only merges sub-records
//! whose trigger numbers agree.
//!
//! Responsibilities:
//! - counter wraparound tracking and per-family quirk correction
//! - merge/discard cycles around a monotone target trigger value
//! - end-of-input drain and residual reporting
//! - a first-mismatch diagnostic scan
//!
//! ## Usage
//!
//! ```ignore
//! use sync_engine::{begin_run, SyncEngineConfig};
//!
//! let (run_begin, mut sync) = begin_run(&mut source, SyncEngineConfig::default())?;
//! while let Some(record) = source.next_record()? {
//!     if let Some(event) = sync.ingest(record)? {
//!         // hand off to sinks
//!     }
//! }
//! for event in sync.drain() {
//!     // flushed events
//! }
//! println!("{}", sync.residual());
//! ```

mod channel;
mod counter;
mod drain;
mod engine;
mod error;
mod run;
pub mod scan;
mod setup;

pub use channel::{ChannelDescriptor, ChannelQueue};
pub use counter::{apply_quirk, CounterModel, CounterUpdate, FamilyQuirk, QuirkRegistry};
pub use drain::Drain;
pub use engine::{CycleOutcome, StreamSynchronizer};
pub use error::{Result, SyncError};
pub use run::{begin_run, synchronize, synchronize_with, SyncReport};
pub use scan::{scan_first_mismatches, MismatchReport};
pub use setup::SyncSetup;

// Re-export contracts types
pub use contracts::{
    AnomalyKind, ChannelStats, QuirkConfig, QuirkPolicy, ResidualReport, SyncEngineConfig,
    SyncStats,
};
