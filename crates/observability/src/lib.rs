//! # Observability
//!
//! Logging and Prometheus metrics for `trigsync`.
//!
//! The binary installs one subscriber at startup. Engine, ingestion and
//! dispatcher code only emit `tracing` events and call the recorders in
//! [`metrics`]; they never touch the subscriber.
//!
//! ```ignore
//! let config = ObservabilityConfig::with_verbosity(LogFormat::Compact, 1, false);
//! observability::init_with_config(config)?;
//!
//! let mut aggregator = observability::SyncMetricsAggregator::new();
//! // sample queue depths after every ingested record ...
//! println!("{}", aggregator.summary(&stats, &residual));
//! ```

pub mod metrics;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::metrics::{
    record_channel_anomaly, record_event_discarded, record_event_dispatched,
    record_event_merged, record_global_queue_depth, record_mismatch_cycle, record_queue_depth,
    record_subrecord_discarded, record_target_trigger, record_wraparound, RunSummary,
    RunningStats, StatsSummary, SyncMetricsAggregator,
};

type BoxedFmtLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with source location
    #[default]
    Json,
    Pretty,
    Compact,
}

/// Logging and metrics settings for one process
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus scrape port, `None` leaves the exporter off
    pub metrics_port: Option<u16>,
    /// Filter directive used when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

impl ObservabilityConfig {
    /// Settings for the `-v`/`-q` command-line flags
    ///
    /// `quiet` wins over any verbosity count.
    pub fn with_verbosity(log_format: LogFormat, verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            (false, _) => "trace",
        };
        Self {
            log_format,
            metrics_port: None,
            default_log_level: level.to_string(),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_log_level))
    }
}

fn fmt_layer(format: LogFormat) -> BoxedFmtLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    }
}

/// Install the tracing subscriber and, if a port is set, the exporter
///
/// Fails when a global subscriber or recorder is already installed.
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt_layer(config.log_format))
        .with(config.env_filter())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        level = %config.default_log_level,
        "logging initialized"
    );
    Ok(())
}

/// Install only the Prometheus exporter, listening on all interfaces
pub fn init_metrics_only(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on {addr}"))?;

    tracing::info!(%addr, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_log_level, "info");
    }

    #[test]
    fn test_verbosity_levels() {
        let level = |verbose, quiet| {
            ObservabilityConfig::with_verbosity(LogFormat::Compact, verbose, quiet).default_log_level
        };
        assert_eq!(level(0, false), "info");
        assert_eq!(level(1, false), "debug");
        assert_eq!(level(3, false), "trace");
        assert_eq!(level(2, true), "warn");
    }
}
