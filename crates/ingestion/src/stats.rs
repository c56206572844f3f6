//! Reader statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics
///
/// Shared between a reader and whoever reports on it.
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total records decoded
    pub records_read: AtomicU64,

    /// Total frame bytes consumed
    pub bytes_read: AtomicU64,

    /// Decode error count
    pub decode_errors: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a decoded record
    pub fn record_read(&self, source: &str, bytes: usize) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
        metrics::counter!("trigsync_records_read_total", "source" => source.to_string())
            .increment(1);
    }

    /// Record a decode error
    pub fn record_decode_error(&self, source: &str) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("trigsync_decode_errors_total", "source" => source.to_string())
            .increment(1);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total records decoded
    pub records_read: u64,

    /// Total frame bytes consumed
    pub bytes_read: u64,

    /// Decode error count
    pub decode_errors: u64,
}
