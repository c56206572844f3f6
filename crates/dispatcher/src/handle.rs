//! SinkHandle - manages a sink with isolated queue and worker task

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::DataSink;

use crate::error::DispatcherError;
use crate::item::DispatchItem;
use crate::metrics::{MetricsSnapshot, SinkMetrics};

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Where the sink writes, if anywhere
    location: Option<PathBuf>,
    /// Channel to send items to worker
    tx: mpsc::Sender<DispatchItem>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: DataSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let location = sink.location().map(PathBuf::from);
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            location,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Option<&PathBuf> {
        self.location.as_ref()
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Send an item, waiting for queue capacity
    ///
    /// Nothing is ever dropped: a slow sink slows the sender down instead.
    ///
    /// # Errors
    /// `SinkClosed` when the worker task is gone
    pub async fn send(&self, item: DispatchItem) -> Result<(), DispatcherError> {
        if self.tx.capacity() == 0 {
            self.metrics.inc_blocked_sends();
        }
        let event_number = item.event_number();
        self.tx
            .send(item)
            .await
            .map_err(|_| DispatcherError::SinkClosed {
                sink_name: self.name.clone(),
                event_number,
            })?;
        self.metrics
            .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
        Ok(())
    }

    /// Shutdown the sink worker gracefully, returning its final metrics
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) -> MetricsSnapshot {
        // Drop sender to signal worker to stop
        drop(self.tx);
        // Wait for worker to finish
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
        self.metrics.snapshot()
    }
}

/// Worker task that consumes items and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: DataSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<DispatchItem>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(item) = rx.recv().await {
        // Update queue length
        metrics.set_queue_len(rx.len());

        let result = match &item {
            DispatchItem::RunBegin(record) => sink.begin_run(record).await,
            DispatchItem::Event(event) => sink.write(event).await,
        };
        match result {
            Ok(()) => {
                metrics.inc_write_count();
                observability::record_event_dispatched(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::record_event_dispatched(&name, false);
                error!(
                    sink = %name,
                    event_number = item.event_number(),
                    error = %e,
                    "Write failed"
                );
                // Continue processing - don't crash on single failure
            }
        }
    }

    // Cleanup
    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
