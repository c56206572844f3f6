//! Stream synchronizer.
//!
//! Owns the global event queue and one [`ChannelQueue`] per channel. Every
//! ingested record runs exactly one cycle; a cycle either merges the
//! queue fronts into one event or discards the fronts that disagree with
//! the target trigger value.

use std::collections::VecDeque;

use contracts::{
    ChannelResidual, CompositeRecord, EventSkeleton, RecordKind, ResidualReport,
    SyncEngineConfig, SyncStats,
};
use tracing::{debug, instrument, trace};

use crate::channel::ChannelQueue;
use crate::drain::Drain;
use crate::error::{Result, SyncError};
use crate::setup::SyncSetup;

/// Result of one synchronization cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Some queue is empty, nothing to decide
    Pending,
    /// Mismatch resolved by dropping fronts
    Discarded,
    /// All fronts agreed and were merged
    Merged(EventSkeleton),
}

/// Trigger-number stream synchronizer for one run
#[derive(Debug)]
pub struct StreamSynchronizer {
    setup: SyncSetup,
    global: VecDeque<EventSkeleton>,
    channels: Vec<ChannelQueue>,
    /// Highest trusted logical trigger number
    target: Option<u64>,
    stats: SyncStats,
    draining: bool,
}

impl StreamSynchronizer {
    /// Create a synchronizer from a completed setup
    pub fn new(setup: SyncSetup) -> Self {
        let model = setup.model();
        let channels = setup
            .channels()
            .iter()
            .cloned()
            .map(|desc| ChannelQueue::new(desc, model))
            .collect();

        Self {
            setup,
            global: VecDeque::new(),
            channels,
            target: None,
            stats: SyncStats::default(),
            draining: false,
        }
    }

    /// Set up from the run-begin record
    pub fn from_run_begin(run_begin: &CompositeRecord, config: SyncEngineConfig) -> Result<Self> {
        Ok(Self::new(SyncSetup::new(run_begin, config)?))
    }

    /// Ingest one composite record and run one cycle
    ///
    /// Returns the merged event if the cycle produced one.
    ///
    /// # Errors
    /// - a second run-begin record
    /// - wrong number of sub-records or wrong channel order
    #[instrument(
        level = "trace",
        name = "sync_ingest",
        skip(self, record),
        fields(event_number = record.event_number)
    )]
    pub fn ingest(&mut self, record: CompositeRecord) -> Result<Option<EventSkeleton>> {
        if record.is_run_begin() {
            return Err(SyncError::UnexpectedRunBegin {
                run_number: record.run_number,
            });
        }
        self.check_layout(&record)?;

        let (skeleton, sub_records) = EventSkeleton::split(record);
        self.global.push_back(skeleton);
        for (channel, sub_record) in self.channels.iter_mut().zip(sub_records) {
            channel.push(sub_record);
        }
        self.stats.records_ingested += 1;

        Ok(match self.sync_cycle() {
            CycleOutcome::Merged(event) => Some(event),
            CycleOutcome::Pending | CycleOutcome::Discarded => None,
        })
    }

    /// Decide merge or discard from the current queue fronts
    #[instrument(level = "trace", name = "sync_cycle", skip(self), fields(target = ?self.target))]
    pub fn sync_cycle(&mut self) -> CycleOutcome {
        if !self.is_ready() {
            return CycleOutcome::Pending;
        }
        let Some(expected) = self.global.front().map(|e| self.expected_trigger(e.event_number))
        else {
            return CycleOutcome::Pending;
        };

        let end_of_run = self.at_run_end();
        let mismatch = self.classify(expected, end_of_run);
        let target = self.advance_target(expected);

        let outcome = if mismatch {
            self.discard(expected, target, end_of_run);
            CycleOutcome::Discarded
        } else {
            match self.merge() {
                Some(event) => CycleOutcome::Merged(event),
                None => CycleOutcome::Pending,
            }
        };

        self.record_depths();
        outcome
    }

    /// Flush buffered events after the input is exhausted
    pub fn drain(&mut self) -> Drain<'_> {
        self.draining = true;
        Drain::new(self)
    }

    /// Global queue and every channel queue hold at least one record
    pub fn is_ready(&self) -> bool {
        !self.global.is_empty() && self.channels.iter().all(|c| !c.is_empty())
    }

    pub fn setup(&self) -> &SyncSetup {
        &self.setup
    }

    /// Current target trigger value, `None` before the first cycle
    pub fn target(&self) -> Option<u64> {
        self.target
    }

    pub fn channels(&self) -> &[ChannelQueue] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&ChannelQueue> {
        self.channels.get(index)
    }

    pub fn global_depth(&self) -> usize {
        self.global.len()
    }

    /// `(label, depth)` for every channel queue
    pub fn channel_depths(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.channels.iter().map(|c| (c.label(), c.len()))
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Counters so far, per-channel stats included
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            channels: self.channels.iter().map(|c| c.stats().clone()).collect(),
            ..self.stats.clone()
        }
    }

    /// Records still buffered
    pub fn residual(&self) -> ResidualReport {
        ResidualReport {
            global_events: self.global.len(),
            channels: self
                .channels
                .iter()
                .map(|c| {
                    let desc = c.descriptor();
                    ChannelResidual {
                        label: desc.label.clone(),
                        type_id: desc.type_id.clone(),
                        family: desc.family.clone(),
                        remaining: c.len(),
                    }
                })
                .collect(),
        }
    }
}

impl StreamSynchronizer {
    #[inline]
    fn expected_trigger(&self, event_number: u32) -> u64 {
        u64::from(event_number) + self.setup.event_offset()
    }

    fn check_layout(&self, record: &CompositeRecord) -> Result<()> {
        if record.sub_records.len() != self.channels.len() {
            return Err(SyncError::ChannelCountMismatch {
                expected: self.channels.len(),
                actual: record.sub_records.len(),
                event_number: record.event_number,
            });
        }
        for (index, (channel, sub)) in self.channels.iter().zip(&record.sub_records).enumerate() {
            let expected = &channel.descriptor().type_id;
            if &sub.type_id != expected {
                return Err(SyncError::ChannelOrderMismatch {
                    index,
                    expected: expected.clone(),
                    actual: sub.type_id.clone(),
                    event_number: record.event_number,
                });
            }
        }
        Ok(())
    }

    /// The global front is the run-end record
    fn at_run_end(&self) -> bool {
        self.global
            .front()
            .is_some_and(|e| e.kind == RecordKind::RunEnd)
            || self
                .channels
                .iter()
                .any(|c| c.is_reference() && c.front_is_end_marker())
    }

    /// Any non-reference channel disagreeing with the global front
    ///
    /// End-of-run markers only agree with the run-end record.
    fn classify(&self, expected: u64, end_of_run: bool) -> bool {
        let mut mismatch = false;
        for channel in &self.channels {
            if channel.is_reference() {
                continue;
            }
            if channel.front_is_end_marker() {
                if !end_of_run {
                    trace!(
                        channel = %channel.label(),
                        expected,
                        "end-of-run marker ahead of a data event"
                    );
                    mismatch = true;
                }
                continue;
            }
            let estimate = channel.front_trigger_estimate();
            if channel.is_desynchronized() || estimate != Some(expected) {
                trace!(
                    channel = %channel.label(),
                    estimate = ?estimate,
                    expected,
                    desynchronized = channel.is_desynchronized(),
                    "channel mismatch"
                );
                mismatch = true;
            }
        }
        mismatch
    }

    /// Raise the target to trusted estimates within the forward window
    fn advance_target(&mut self, expected: u64) -> u64 {
        let window = self.setup.config().target_window;
        let mut target = *self.target.get_or_insert(expected);

        for channel in &self.channels {
            if channel.is_reference()
                || channel.is_desynchronized()
                || channel.front_is_end_marker()
            {
                continue;
            }
            if let Some(estimate) = channel.front_trigger_estimate() {
                if estimate > target && estimate - target < window {
                    target = estimate;
                }
            }
        }

        self.target = Some(target);
        observability::record_target_trigger(target);
        target
    }

    /// Drop every front that does not match the target
    ///
    /// Once some channel has reached its end-of-run marker the data event
    /// at the global front can never be completed, so it goes together
    /// with every front that is not an end marker. At the run-end record
    /// itself only the leftover data fronts go.
    fn discard(&mut self, expected: u64, target: u64, end_of_run: bool) {
        self.stats.mismatch_cycles += 1;
        observability::record_mismatch_cycle();
        debug!(expected, target, end_of_run, "trigger mismatch, resynchronizing");

        let stranded = !end_of_run
            && self
                .channels
                .iter()
                .any(|c| !c.is_reference() && c.front_is_end_marker());

        if stranded || (!end_of_run && expected != target) {
            if let Some(event) = self.global.pop_front() {
                self.stats.events_discarded += 1;
                observability::record_event_discarded();
                debug!(event_number = event.event_number, "global event discarded");
            }
        }

        let offset = self.setup.event_offset();
        for channel in &mut self.channels {
            let drop_front = if end_of_run || stranded {
                !channel.front_is_end_marker()
            } else if channel.is_reference() {
                channel
                    .front()
                    .is_some_and(|s| u64::from(s.event_number) + offset != target)
            } else {
                channel.is_desynchronized() || channel.front_trigger_estimate() != Some(target)
            };
            if !drop_front {
                continue;
            }

            let estimate = channel.front_trigger_estimate();
            if let Some(sub) = channel.discard() {
                channel.stats_mut().discarded += 1;
                observability::record_subrecord_discarded(channel.label());
                debug!(
                    channel = %channel.label(),
                    event_number = sub.event_number,
                    estimate = ?estimate,
                    target,
                    "sub-record discarded"
                );
            }
        }
    }

    /// Attach every channel's front to the global front, in channel order
    fn merge(&mut self) -> Option<EventSkeleton> {
        let mut event = self.global.pop_front()?;
        for channel in &mut self.channels {
            if let Some(sub) = channel.pop() {
                channel.stats_mut().merged += 1;
                event.attach(sub);
            }
        }

        self.stats.events_merged += 1;
        if self.draining {
            self.stats.events_drained += 1;
        }
        observability::record_event_merged(self.draining);
        trace!(event_number = event.event_number, "event merged");
        Some(event)
    }

    fn record_depths(&self) {
        observability::record_global_queue_depth(self.global.len());
        for channel in &self.channels {
            observability::record_queue_depth(channel.label(), channel.len());
        }
    }
}
