//! Dispatcher - main loop for fan-out to sinks

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use contracts::{SinkConfig, SinkType};
use ingestion::RunFormat;

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::item::DispatchItem;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sink configurations
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<DispatchItem>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<DispatchItem>) -> Self {
        Self { config, input_rx }
    }

    /// Build and start the dispatcher
    #[instrument(name = "dispatcher_builder_build", skip(self))]
    pub async fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = Self::initialize_handles(&self.config)?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }

    #[instrument(
        name = "dispatcher_initialize_handles",
        skip(config),
        fields(sink_count = config.sinks.len())
    )]
    fn initialize_handles(config: &DispatcherConfig) -> Result<Vec<SinkHandle>, DispatcherError> {
        let mut handles = Vec::with_capacity(config.sinks.len());
        for sink_config in &config.sinks {
            handles.push(create_sink_handle(sink_config)?);
        }
        Ok(handles)
    }
}

/// Create a SinkHandle from configuration
#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::from_params(&config.name, &config.params);
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
        SinkType::RunFile | SinkType::JsonLines => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            let expected = match config.sink_type {
                SinkType::JsonLines => RunFormat::JsonLines,
                _ => RunFormat::RunFile,
            };
            if sink.format() != expected {
                return Err(DispatcherError::sink_creation(
                    &config.name,
                    format!("output extension does not match sink type {:?}", config.sink_type),
                ));
            }
            Ok(SinkHandle::spawn(sink, config.queue_capacity))
        }
    }
}

/// Final per-sink results of a dispatcher run
#[derive(Debug, Clone, Default)]
pub struct DispatchSummary {
    /// Items received from the synchronizer
    pub items: u64,
    /// `(sink name, final metrics)` in configuration order
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

impl DispatchSummary {
    pub fn total_failures(&self) -> u64 {
        self.sinks.iter().map(|(_, m)| m.failure_count).sum()
    }
}

/// The main Dispatcher that fans out run items to sinks
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<DispatchItem>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(handles: Vec<SinkHandle>, input_rx: mpsc::Receiver<DispatchItem>) -> Self {
        Self { handles, input_rx }
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run the dispatcher main loop
    ///
    /// Consumes items from input and hands each one to every sink in
    /// order, waiting on slow sinks. Returns when the input channel is
    /// closed and every sink has been flushed and closed.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchSummary {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut item_count: u64 = 0;

        while let Some(item) = self.input_rx.recv().await {
            item_count += 1;
            self.dispatch_item(item).await;

            if item_count.is_multiple_of(10_000) {
                debug!(items = item_count, "Dispatcher progress");
            }
        }

        info!(items = item_count, "Dispatcher input closed, shutting down");

        let sinks = Self::shutdown_handles(self.handles).await;

        info!("Dispatcher shutdown complete");
        DispatchSummary {
            items: item_count,
            sinks,
        }
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(self) -> JoinHandle<DispatchSummary> {
        tokio::spawn(self.run())
    }

    async fn dispatch_item(&self, item: DispatchItem) {
        for handle in &self.handles {
            if let Err(e) = handle.send(item.clone()).await {
                error!(sink = %handle.name(), error = %e, "Dispatch failed");
            }
        }
    }

    async fn shutdown_handles(handles: Vec<SinkHandle>) -> Vec<(String, MetricsSnapshot)> {
        let mut sinks = Vec::with_capacity(handles.len());
        for handle in handles {
            let name = handle.name().to_string();
            sinks.push((name, handle.shutdown().await));
        }
        sinks
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs, input_rx))]
pub async fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<DispatchItem>,
) -> Result<Dispatcher, DispatcherError> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build().await
}
