//! Pipeline statistics and metrics.

use std::path::PathBuf;
use std::time::Duration;

use dispatcher::DispatchSummary;
use observability::RunSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Input run file
    pub input: PathBuf,

    /// Synchronized output file
    pub output: PathBuf,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Synchronizer counters, queue depths and residual
    pub summary: RunSummary,

    /// Per-sink delivery results
    pub dispatch: DispatchSummary,
}

impl PipelineStats {
    /// Records ingested per second
    pub fn records_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.summary.stats.records_ingested as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        println!("Input:  {}", self.input.display());
        println!("Output: {}", self.output.display());
        println!(
            "Duration: {:.2}s ({:.0} records/s)",
            self.duration.as_secs_f64(),
            self.records_per_sec()
        );
        println!();
        println!("{}", self.summary);

        if !self.dispatch.sinks.is_empty() {
            println!();
            println!("Sinks:");
            for (name, metrics) in &self.dispatch.sinks {
                println!(
                    "  {}: written={} failed={} blocked_sends={}",
                    name, metrics.write_count, metrics.failure_count, metrics.blocked_sends
                );
            }
        }
        println!();
    }
}
