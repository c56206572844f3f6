//! Items flowing from the synchronizer to the sinks

use std::sync::Arc;

use contracts::{CompositeRecord, EventSkeleton};

/// One unit of sink input
///
/// Shared by `Arc` so fan-out to several sinks does not copy payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchItem {
    /// The run-begin record, passed through verbatim
    RunBegin(Arc<CompositeRecord>),
    /// A merged event
    Event(Arc<EventSkeleton>),
}

impl DispatchItem {
    pub fn run_begin(record: CompositeRecord) -> Self {
        Self::RunBegin(Arc::new(record))
    }

    pub fn event(event: EventSkeleton) -> Self {
        Self::Event(Arc::new(event))
    }

    pub fn event_number(&self) -> u32 {
        match self {
            Self::RunBegin(record) => record.event_number,
            Self::Event(event) => event.event_number,
        }
    }
}
