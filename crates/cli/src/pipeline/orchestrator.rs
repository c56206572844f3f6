//! Pipeline orchestrator - coordinates all components.
//!
//! The synchronizer is synchronous and file-bound, so it runs on a
//! blocking thread and feeds the async dispatcher through a bounded
//! channel. A full channel blocks the synchronizer; nothing is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{
    CompositeRecord, RecordSource, ResidualReport, SinkConfig, SinkType, SyncEngineConfig,
    SyncStats,
};
use dispatcher::DispatchItem;
use observability::SyncMetricsAggregator;
use sync_engine::StreamSynchronizer;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Input run file
    pub input: PathBuf,

    /// Synchronized output file
    pub output: PathBuf,

    /// Engine configuration
    pub engine: SyncEngineConfig,

    /// Sinks in addition to the output file
    pub extra_sinks: Vec<SinkConfig>,

    /// Channel buffer size
    pub buffer_size: usize,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

/// An input whose run-begin record has been accepted
struct OpenRun {
    source: Box<dyn RecordSource + Send>,
    run_begin: CompositeRecord,
    sync: StreamSynchronizer,
}

/// What the blocking synchronizer task hands back
struct SyncOutcome {
    stats: SyncStats,
    residual: ResidualReport,
    depths: SyncMetricsAggregator,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Sink configuration of the primary output file
    fn output_sink(&self) -> SinkConfig {
        let sink_type = match ingestion::RunFormat::from_path(&self.config.output) {
            Some(ingestion::RunFormat::JsonLines) => SinkType::JsonLines,
            _ => SinkType::RunFile,
        };
        let mut params = HashMap::new();
        params.insert(
            "path".to_string(),
            self.config.output.display().to_string(),
        );
        SinkConfig {
            name: "output".to_string(),
            sink_type,
            queue_capacity: self.config.buffer_size,
            params,
        }
    }

    /// Run the pipeline to completion
    ///
    /// The input is opened and its run-begin record checked before any
    /// sink exists, so a setup failure leaves no output file behind.
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();

        let input = self.config.input.clone();
        let engine = self.config.engine.clone();
        let run = tokio::task::spawn_blocking(move || open_run(&input, engine))
            .await
            .context("Run setup task panicked")??;

        // Setup Dispatcher
        let mut sinks = vec![self.output_sink()];
        sinks.extend(self.config.extra_sinks.iter().cloned());
        let active_sinks = sinks.len();

        let (sync_tx, sync_rx) = mpsc::channel::<DispatchItem>(self.config.buffer_size.max(1));
        let dispatcher = dispatcher::create_dispatcher(sinks, sync_rx)
            .await
            .context("Failed to create dispatcher")?;
        let dispatcher_handle = dispatcher.spawn();
        info!(active_sinks, "Dispatcher started");

        // Run the synchronizer off the async runtime
        let input = self.config.input.clone();
        let sync_task =
            tokio::task::spawn_blocking(move || synchronize_file(run, &input, sync_tx));

        let sync_result = sync_task.await.context("Synchronizer task panicked")?;

        // The sender is dropped either way, so the dispatcher drains and stops
        let dispatch = dispatcher_handle
            .await
            .context("Dispatcher task panicked")?;
        let outcome = sync_result?;

        let summary = outcome.depths.summary(&outcome.stats, &outcome.residual);
        let stats = PipelineStats {
            input: self.config.input.clone(),
            output: self.config.output.clone(),
            duration: start_time.elapsed(),
            summary,
            dispatch,
        };

        info!(
            records = stats.summary.stats.records_ingested,
            events = stats.summary.stats.events_merged,
            duration_secs = stats.duration.as_secs_f64(),
            rate = format!("{:.0}", stats.records_per_sec()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Open the input and set up the synchronizer from its run-begin record
fn open_run(input: &Path, engine: SyncEngineConfig) -> Result<OpenRun> {
    let mut source = ingestion::open_source(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let (run_begin, sync) = sync_engine::begin_run(&mut source, engine)
        .with_context(|| format!("Failed to set up run from {}", input.display()))?;
    Ok(OpenRun {
        source,
        run_begin,
        sync,
    })
}

/// Synchronize the rest of the input and hand every item to the dispatcher
fn synchronize_file(
    run: OpenRun,
    input: &Path,
    tx: mpsc::Sender<DispatchItem>,
) -> Result<SyncOutcome> {
    let OpenRun {
        mut source,
        run_begin,
        mut sync,
    } = run;

    let send = |item: DispatchItem| {
        tx.blocking_send(item)
            .map_err(|_| CliError::pipeline_execution("dispatcher stopped accepting events"))
    };

    send(DispatchItem::run_begin(run_begin))?;

    let mut depths = SyncMetricsAggregator::new();
    while let Some(record) = source
        .next_record()
        .with_context(|| format!("Failed to read {}", input.display()))?
    {
        let merged = sync.ingest(record).context("Synchronization aborted")?;
        depths.update(sync.global_depth(), sync.channel_depths());
        if let Some(event) = merged {
            send(DispatchItem::event(event))?;
        }
    }

    for event in sync.drain() {
        send(DispatchItem::event(event))?;
    }

    let residual = sync.residual();
    if residual.is_empty() {
        info!("All queues empty after drain");
    } else {
        warn!(
            global_events = residual.global_events,
            sub_records = residual.total_sub_records(),
            "Unmatched records left after drain"
        );
    }

    Ok(SyncOutcome {
        stats: sync.stats(),
        residual,
        depths,
    })
}

/// Output path: the input's file name inside `output_dir`
///
/// Trailing separators on either path are ignored.
pub fn output_path(input: &Path, output_dir: &Path) -> Result<PathBuf, CliError> {
    let file_name = input.file_name().ok_or_else(|| CliError::NoFileName {
        path: input.to_path_buf(),
    })?;
    let output = output_dir.join(file_name);

    let same = match (input.canonicalize(), output.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => input == output,
    };
    if same {
        return Err(CliError::OutputIsInput { path: output });
    }
    Ok(output)
}
