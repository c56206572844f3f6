//! Synchronizer metric recorders and run summary aggregation
//!
//! All metric names used by the workspace live here.

use std::collections::BTreeMap;

use contracts::{AnomalyKind, ResidualReport, SyncStats};
use metrics::{counter, gauge, histogram};

/// Record a per-channel counter anomaly
pub fn record_channel_anomaly(channel: &str, kind: AnomalyKind) {
    counter!(
        "trigsync_channel_anomalies_total",
        "channel" => channel.to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a counter wraparound
pub fn record_wraparound(channel: &str) {
    counter!("trigsync_wraparounds_total", "channel" => channel.to_string()).increment(1);
}

/// Record a sub-record dropped during resynchronization
pub fn record_subrecord_discarded(channel: &str) {
    counter!(
        "trigsync_subrecords_discarded_total",
        "channel" => channel.to_string()
    )
    .increment(1);
}

/// Record a merged event
pub fn record_event_merged(drained: bool) {
    let phase = if drained { "drain" } else { "stream" };
    counter!("trigsync_events_merged_total", "phase" => phase).increment(1);
}

/// Record a discarded global event
pub fn record_event_discarded() {
    counter!("trigsync_events_discarded_total").increment(1);
}

/// Record a cycle that ran the discard protocol
pub fn record_mismatch_cycle() {
    counter!("trigsync_mismatch_cycles_total").increment(1);
}

/// Record a channel queue depth
pub fn record_queue_depth(channel: &str, depth: usize) {
    gauge!(
        "trigsync_channel_queue_depth",
        "channel" => channel.to_string()
    )
    .set(depth as f64);
}

/// Record the global event queue depth
pub fn record_global_queue_depth(depth: usize) {
    gauge!("trigsync_global_queue_depth").set(depth as f64);
    histogram!("trigsync_global_queue_depth_hist").record(depth as f64);
}

/// Record the current target trigger value
pub fn record_target_trigger(target: u64) {
    gauge!("trigsync_target_trigger").set(target as f64);
}

/// Record a sink delivery
pub fn record_event_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "trigsync_events_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Queue depth aggregator
///
/// Sampled once per ingested record; combined with the engine's
/// [`SyncStats`] into a [`RunSummary`].
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsAggregator {
    /// Samples taken
    pub samples: u64,

    /// Global queue depth statistics
    pub global_depth: RunningStats,

    /// Per-channel queue depth statistics
    pub channel_depth: BTreeMap<String, RunningStats>,
}

impl SyncMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one depth sample
    pub fn update<'a>(
        &mut self,
        global_depth: usize,
        channel_depths: impl IntoIterator<Item = (&'a str, usize)>,
    ) {
        self.samples += 1;
        self.global_depth.push(global_depth as f64);
        for (label, depth) in channel_depths {
            self.channel_depth
                .entry(label.to_string())
                .or_default()
                .push(depth as f64);
        }
    }

    /// Build the end-of-run summary
    pub fn summary(&self, stats: &SyncStats, residual: &ResidualReport) -> RunSummary {
        let positions = stats.events_merged + stats.events_discarded;
        RunSummary {
            stats: stats.clone(),
            discard_rate: if positions > 0 {
                stats.events_discarded as f64 / positions as f64 * 100.0
            } else {
                0.0
            },
            global_depth: StatsSummary::from(&self.global_depth),
            channel_depth: self
                .channel_depth
                .iter()
                .map(|(label, s)| (label.clone(), StatsSummary::from(s)))
                .collect(),
            residual: residual.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// End-of-run summary
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stats: SyncStats,
    /// Discarded positions as a percentage of all resolved positions
    pub discard_rate: f64,
    pub global_depth: StatsSummary,
    pub channel_depth: BTreeMap<String, StatsSummary>,
    pub residual: ResidualReport,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = &self.stats;
        writeln!(f, "=== Synchronization Summary ===")?;
        writeln!(f, "Records ingested: {}", s.records_ingested)?;
        writeln!(
            f,
            "Events merged: {} ({} while draining)",
            s.events_merged, s.events_drained
        )?;
        writeln!(
            f,
            "Events discarded: {} ({:.2}%)",
            s.events_discarded, self.discard_rate
        )?;
        writeln!(f, "Mismatch cycles: {}", s.mismatch_cycles)?;
        writeln!(f, "Global queue depth: {}", self.global_depth)?;

        if !s.channels.is_empty() {
            writeln!(f, "Channels:")?;
            for ch in &s.channels {
                writeln!(
                    f,
                    "  {}: merged={} discarded={} anomalies={} wraparounds={} max_depth={}",
                    ch.label,
                    ch.merged,
                    ch.discarded,
                    ch.anomalies(),
                    ch.wraparounds,
                    ch.max_queue_depth
                )?;
            }
        }

        write!(f, "{}", self.residual)
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.0}, max={:.0}, mean={:.2}, std={:.2} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
