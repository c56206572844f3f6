//! End-of-input flush

use tracing::{info, warn};

use crate::engine::{CycleOutcome, StreamSynchronizer};

/// Iterator over the events still mergeable once input is exhausted
///
/// Runs cycles until some queue is empty. Discard cycles are absorbed;
/// only merged events are yielded. The residual is logged once when the
/// iterator finishes.
pub struct Drain<'a> {
    sync: &'a mut StreamSynchronizer,
    finished: bool,
}

impl<'a> Drain<'a> {
    pub(crate) fn new(sync: &'a mut StreamSynchronizer) -> Self {
        Self {
            sync,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        let residual = self.sync.residual();
        let stats = self.sync.stats();
        if residual.is_empty() {
            info!(
                events_drained = stats.events_drained,
                "drain complete, all queues empty"
            );
        } else {
            warn!(
                events_drained = stats.events_drained,
                global_events = residual.global_events,
                sub_records = residual.total_sub_records(),
                "drain complete with unmatched records"
            );
        }
    }
}

impl Iterator for Drain<'_> {
    type Item = contracts::EventSkeleton;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            match self.sync.sync_cycle() {
                CycleOutcome::Merged(event) => return Some(event),
                CycleOutcome::Discarded => continue,
                CycleOutcome::Pending => {
                    self.finish();
                    return None;
                }
            }
        }
    }
}
