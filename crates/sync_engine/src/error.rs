//! Sync engine error types

use contracts::{ChannelType, ContractError, RecordKind};
use thiserror::Error;

/// Fatal synchronizer error
///
/// Per-channel counter faults are never errors; they are absorbed by the
/// discard protocol. These variants abort the run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// First record of the run is not a run-begin record
    #[error("expected a run-begin record, found {kind:?} record {event_number}")]
    NotRunBegin {
        kind: RecordKind,
        event_number: u32,
    },

    /// Run-begin record has no sub-record of the reference type
    #[error("run-begin record has no reference channel of type '{reference}'")]
    MissingReferenceChannel { reference: ChannelType },

    /// Record does not carry one sub-record per channel
    #[error("record {event_number} has {actual} sub-records, expected {expected}")]
    ChannelCountMismatch {
        expected: usize,
        actual: usize,
        event_number: u32,
    },

    /// Sub-records out of channel order
    #[error("record {event_number}: sub-record {index} is '{actual}', expected '{expected}'")]
    ChannelOrderMismatch {
        index: usize,
        expected: ChannelType,
        actual: ChannelType,
        event_number: u32,
    },

    /// A second run-begin record inside the run
    #[error("unexpected run-begin record (run {run_number}) inside a run")]
    UnexpectedRunBegin { run_number: u32 },

    /// Source yielded no records at all
    #[error("source '{source_name}' contains no records")]
    EmptyInput { source_name: String },

    /// Engine configuration rejected at setup
    #[error("invalid configuration: {0}")]
    Config(#[source] ContractError),

    /// Record source failure
    #[error(transparent)]
    Source(#[from] ContractError),
}

/// Sync engine Result type alias
pub type Result<T> = std::result::Result<T, SyncError>;
