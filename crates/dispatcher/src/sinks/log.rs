//! LogSink - logs event summaries via tracing

use contracts::{CompositeRecord, ContractError, DataSink, EventSkeleton};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, instrument};

const DEFAULT_EVERY: u64 = 1000;

/// Sink that logs event summaries for debugging
pub struct LogSink {
    name: String,
    /// Log one event out of `every` at info level, the rest at debug
    every: u64,
    events: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            every: DEFAULT_EVERY,
            events: 0,
        }
    }

    /// Create from params map; `every` sets the info-level sampling
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        let every = params
            .get("every")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_EVERY);
        Self {
            every,
            ..Self::new(name)
        }
    }

    pub fn events_seen(&self) -> u64 {
        self.events
    }

    fn log_event_summary(&self, event: &EventSkeleton) {
        let end_markers = event
            .sub_records
            .iter()
            .filter(|s| s.is_end_marker())
            .count();

        if self.events % self.every == 0 {
            info!(
                sink = %self.name,
                event_number = event.event_number,
                kind = ?event.kind,
                sub_records = event.sub_records.len(),
                end_markers,
                "Event received"
            );
        } else {
            debug!(
                sink = %self.name,
                event_number = event.event_number,
                sub_records = event.sub_records.len(),
                "Event received"
            );
        }
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> Option<&Path> {
        None
    }

    #[instrument(name = "log_sink_begin_run", skip(self, run_begin), fields(sink = %self.name))]
    async fn begin_run(&mut self, run_begin: &CompositeRecord) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            run_number = run_begin.run_number,
            channels = run_begin.sub_records.len(),
            tags = run_begin.tags.len(),
            "Run begin"
        );
        Ok(())
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, event_number = event.event_number)
    )]
    async fn write(&mut self, event: &EventSkeleton) -> Result<(), ContractError> {
        self.log_event_summary(event);
        self.events += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, events = self.events, "LogSink closed");
        Ok(())
    }
}
