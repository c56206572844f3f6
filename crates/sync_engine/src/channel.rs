//! Per-channel FIFO with trigger tracking.
//!
//! The logical trigger estimate always describes the current front. It is
//! computed once per front: when the queue goes from empty to non-empty
//! and when a pop exposes a new front. End-of-run fronts carry no counter
//! and keep the previous estimate.
//!
//! Until a channel has contributed to a merged event its estimates are
//! unconfirmed, so a discarded front is not used as the baseline for the
//! next one.

use std::collections::VecDeque;
use std::fmt;

use contracts::{channel_label, AnomalyKind, ChannelStats, ChannelType, SubRecord};
use tracing::debug;

use crate::counter::{apply_quirk, CounterModel, FamilyQuirk};

/// Static description of one channel, fixed at setup
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    pub index: usize,
    pub type_id: ChannelType,
    pub family: String,
    pub label: String,
    pub is_reference: bool,
    pub quirk: FamilyQuirk,
}

impl ChannelDescriptor {
    pub fn new(
        index: usize,
        type_id: ChannelType,
        family: impl Into<String>,
        is_reference: bool,
        quirk: FamilyQuirk,
    ) -> Self {
        let family = family.into();
        Self {
            label: channel_label(index, &type_id, &family),
            index,
            type_id,
            family,
            is_reference,
            quirk,
        }
    }
}

/// One channel's pending sub-records and trigger state
pub struct ChannelQueue {
    desc: ChannelDescriptor,
    model: CounterModel,
    queue: VecDeque<SubRecord>,
    /// Logical trigger number of the front (or of the last front seen)
    estimate: Option<u64>,
    /// Accumulated wraparound offset, a multiple of the modulus
    offset: u64,
    desynchronized: bool,
    /// Current front already went through estimation
    front_estimated: bool,
    /// A front of this channel has been merged
    anchored: bool,
    stats: ChannelStats,
}

impl fmt::Debug for ChannelQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelQueue")
            .field("label", &self.desc.label)
            .field("len", &self.queue.len())
            .field("estimate", &self.estimate)
            .field("offset", &self.offset)
            .field("desynchronized", &self.desynchronized)
            .finish()
    }
}

impl ChannelQueue {
    pub fn new(desc: ChannelDescriptor, model: CounterModel) -> Self {
        let stats = ChannelStats::new(desc.label.clone());
        Self {
            desc,
            model,
            queue: VecDeque::new(),
            estimate: None,
            offset: 0,
            desynchronized: false,
            front_estimated: false,
            anchored: false,
            stats,
        }
    }

    /// Append a sub-record; the first record of an empty queue is estimated
    pub fn push(&mut self, sub_record: SubRecord) {
        self.queue.push_back(sub_record);
        self.stats.max_queue_depth = self.stats.max_queue_depth.max(self.queue.len());
        if self.queue.len() == 1 {
            self.front_estimated = false;
            self.refresh();
        }
    }

    /// Remove the front for a merged event and estimate the one behind it
    ///
    /// Returns `None` only when called on an empty queue, which callers
    /// must not do.
    pub fn pop(&mut self) -> Option<SubRecord> {
        let front = self.advance()?;
        self.anchored = true;
        Some(front)
    }

    /// Drop the front after a mismatch and estimate the one behind it
    ///
    /// Before the channel's first merge the dropped estimate is forgotten,
    /// so a garbage first counter cannot fake a wraparound on the next one.
    pub fn discard(&mut self) -> Option<SubRecord> {
        if !self.anchored && !self.desc.is_reference && !self.queue.is_empty() {
            self.estimate = None;
        }
        self.advance()
    }

    fn advance(&mut self) -> Option<SubRecord> {
        let front = self.queue.pop_front()?;
        self.front_estimated = false;
        self.refresh();
        Some(front)
    }

    /// Estimate the current front if it has not been estimated yet
    ///
    /// Calling this again on the same front does nothing.
    pub fn refresh(&mut self) {
        if self.front_estimated {
            return;
        }
        let Some(front) = self.queue.front() else {
            return;
        };
        self.front_estimated = true;
        if front.is_end_marker() {
            self.desynchronized = false;
            return;
        }

        let raw = self.desc.quirk.raw_trigger(front.trigger_id);
        let previous = self.estimate;
        let update = apply_quirk(
            &self.model,
            self.desc.quirk.policy,
            raw,
            previous,
            self.offset,
            self.desc.is_reference,
        );

        if update.wrapped {
            self.stats.record_anomaly(AnomalyKind::Wraparound);
            observability::record_wraparound(&self.desc.label);
            debug!(
                channel = %self.desc.label,
                raw,
                previous = ?previous,
                estimate = ?update.estimate,
                offset = update.offset,
                "trigger counter wraparound"
            );
        }
        if let Some(kind) = update.anomaly {
            self.stats.record_anomaly(kind);
            observability::record_channel_anomaly(&self.desc.label, kind);
            debug!(
                channel = %self.desc.label,
                family = %self.desc.family,
                kind = %kind,
                raw,
                previous = ?previous,
                estimate = ?update.estimate,
                "trigger counter anomaly"
            );
        }

        self.estimate = update.estimate;
        self.offset = update.offset;
        self.desynchronized = update.desynchronized;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn front(&self) -> Option<&SubRecord> {
        self.queue.front()
    }

    /// Logical trigger number of the front, `None` when nothing was estimated yet
    #[inline]
    pub fn front_trigger_estimate(&self) -> Option<u64> {
        self.estimate
    }

    pub fn front_is_end_marker(&self) -> bool {
        self.queue.front().is_some_and(SubRecord::is_end_marker)
    }

    #[inline]
    pub fn is_desynchronized(&self) -> bool {
        self.desynchronized
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub fn is_reference(&self) -> bool {
        self.desc.is_reference
    }

    pub fn descriptor(&self) -> &ChannelDescriptor {
        &self.desc
    }

    pub fn label(&self) -> &str {
        &self.desc.label
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ChannelStats {
        &mut self.stats
    }
}
