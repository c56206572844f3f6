//! Synchronizer statistics and end-of-run residual report.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ChannelType;

/// Per-channel trigger anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Raw counter above the modulus
    HighCounter,
    /// Stale counter from a family known to skip one trigger
    SingleSkip,
    /// Spurious counter jump from a family known to glitch
    ZeroGlitch,
    /// Counter wrapped around the modulus
    Wraparound,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighCounter => "high_counter",
            Self::SingleSkip => "single_skip",
            Self::ZeroGlitch => "zero_glitch",
            Self::Wraparound => "wraparound",
        }
    }

    /// Wraparound is bookkeeping, not a fault
    pub fn desynchronizes(&self) -> bool {
        !matches!(self, Self::Wraparound)
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub label: String,
    /// Sub-records attached to merged events
    pub merged: u64,
    /// Sub-records dropped by the discard protocol
    pub discarded: u64,
    pub high_counter: u64,
    pub single_skip: u64,
    pub zero_glitch: u64,
    pub wraparounds: u64,
    /// Deepest queue observed
    pub max_queue_depth: usize,
}

impl ChannelStats {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn record_anomaly(&mut self, kind: AnomalyKind) {
        match kind {
            AnomalyKind::HighCounter => self.high_counter += 1,
            AnomalyKind::SingleSkip => self.single_skip += 1,
            AnomalyKind::ZeroGlitch => self.zero_glitch += 1,
            AnomalyKind::Wraparound => self.wraparounds += 1,
        }
    }

    pub fn anomalies(&self) -> u64 {
        self.high_counter + self.single_skip + self.zero_glitch
    }
}

/// Synchronizer counters for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Composite records ingested (run-begin excluded)
    pub records_ingested: u64,
    /// Events emitted
    pub events_merged: u64,
    /// Of which emitted during the drain phase
    pub events_drained: u64,
    /// Global queue positions dropped
    pub events_discarded: u64,
    /// Cycles that resolved by discarding
    pub mismatch_cycles: u64,
    pub channels: Vec<ChannelStats>,
}

/// Records left unmerged in one channel after the drain phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResidual {
    pub label: String,
    pub type_id: ChannelType,
    pub family: String,
    pub remaining: usize,
}

/// Unmerged state at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidualReport {
    /// Event skeletons still waiting in the global queue
    pub global_events: usize,
    pub channels: Vec<ChannelResidual>,
}

impl ResidualReport {
    /// No record was left behind
    pub fn is_empty(&self) -> bool {
        self.global_events == 0 && self.channels.iter().all(|c| c.remaining == 0)
    }

    /// Sub-records left across all channels
    pub fn total_sub_records(&self) -> usize {
        self.channels.iter().map(|c| c.remaining).sum()
    }
}

impl fmt::Display for ResidualReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Remaining global events: {}", self.global_events)?;
        for channel in &self.channels {
            writeln!(
                f,
                "Remaining sub-records {}: {}",
                channel.label, channel.remaining
            )?;
        }
        Ok(())
    }
}
