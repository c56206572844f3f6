//! RecordSource trait - event source abstraction
//!
//! Decouples the synchronizer from the run-file format. A source yields a
//! lazy, finite, non-restartable sequence of composite records.

use crate::{CompositeRecord, ContractError};

/// Event source trait
///
/// # Example
///
/// ```ignore
/// let mut source = ingestion::open_source(path)?;
/// while let Some(record) = source.next_record()? {
///     // feed the synchronizer
/// }
/// ```
pub trait RecordSource {
    /// Source name (file path or generator name) for logging
    fn name(&self) -> &str;

    /// Next record, `None` at end of input
    fn next_record(&mut self) -> Result<Option<CompositeRecord>, ContractError>;
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn next_record(&mut self) -> Result<Option<CompositeRecord>, ContractError> {
        (**self).next_record()
    }
}

/// In-memory source over a vector of records
#[derive(Debug, Clone)]
pub struct VecSource {
    name: String,
    records: std::vec::IntoIter<CompositeRecord>,
}

impl VecSource {
    pub fn new(name: impl Into<String>, records: Vec<CompositeRecord>) -> Self {
        Self {
            name: name.into(),
            records: records.into_iter(),
        }
    }
}

impl RecordSource for VecSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_record(&mut self) -> Result<Option<CompositeRecord>, ContractError> {
        Ok(self.records.next())
    }
}
