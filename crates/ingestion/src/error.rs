//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

/// Ingestion error
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying file could not be read or written
    #[error("io error on '{source_name}': {error}")]
    Io {
        /// Source or sink name
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    /// Header does not carry the run-file magic
    #[error("'{source_name}' is not a run file (bad magic)")]
    BadMagic {
        /// Source name
        source_name: String,
    },

    /// Run-file version this reader does not understand
    #[error("'{source_name}' has unsupported run-file version {version}")]
    UnsupportedVersion {
        /// Source name
        source_name: String,
        /// Version found in the header
        version: u32,
    },

    /// Input ended in the middle of a frame
    #[error("'{source_name}' is truncated at record {record_index}")]
    Truncated {
        /// Source name
        source_name: String,
        /// Index of the incomplete record
        record_index: u64,
    },

    /// Record frame could not be decoded
    #[error("failed to decode record {record_index} in '{source_name}': {message}")]
    Decode {
        /// Source name
        source_name: String,
        /// Index of the offending record (line number for JSON-lines)
        record_index: u64,
        /// Error message
        message: String,
    },

    /// Record could not be encoded
    #[error("failed to encode record for '{sink_name}': {message}")]
    Encode {
        /// Sink name
        sink_name: String,
        /// Error message
        message: String,
    },

    /// File extension does not name a known format
    #[error("unsupported run-file format for '{path}'")]
    UnsupportedFormat {
        /// Offending path
        path: String,
    },

    /// File contains no records
    #[error("'{source_name}' is empty")]
    Empty {
        /// Source name
        source_name: String,
    },
}

impl IngestionError {
    pub(crate) fn io(source_name: impl Into<String>, error: std::io::Error) -> Self {
        Self::Io {
            source_name: source_name.into(),
            error,
        }
    }
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        let message = err.to_string();
        match err {
            IngestionError::Io { error, .. } => ContractError::Io(error),
            IngestionError::Empty { source_name } => ContractError::EmptySource { source_name },
            IngestionError::Encode { sink_name, message } => {
                ContractError::sink_write(sink_name, message)
            }
            IngestionError::BadMagic { source_name }
            | IngestionError::UnsupportedVersion { source_name, .. }
            | IngestionError::Truncated { source_name, .. }
            | IngestionError::Decode { source_name, .. } => {
                ContractError::record_decode(source_name, message)
            }
            IngestionError::UnsupportedFormat { .. } => ContractError::Other(message),
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, IngestionError>;
