//! `sync` command implementation.

use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::info;

use contracts::{SinkConfig, SinkType};

use crate::cli::SyncArgs;
use crate::error::CliError;
use crate::pipeline::{output_path, Pipeline, PipelineConfig};

/// Execute the `sync` command
pub async fn run_sync(args: &SyncArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(CliError::InputNotFound {
            path: args.input.clone(),
        }
        .into());
    }

    let engine = config_loader::ConfigLoader::load_or_default(args.config.as_deref())
        .context("Failed to load engine configuration")?;
    let output = output_path(&args.input, &args.output_dir)?;

    info!(
        input = %args.input.display(),
        output = %output.display(),
        reference = %engine.reference_type,
        counter_bits = engine.counter_bits,
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let pipeline = Pipeline::new(PipelineConfig {
        input: args.input.clone(),
        extra_sinks: extra_sinks(args, &output),
        output,
        engine,
        buffer_size: args.buffer_size,
    });

    let stats = pipeline.run().await.context("Pipeline execution failed")?;
    stats.print_summary();

    let failures = stats.dispatch.total_failures();
    if failures > 0 {
        return Err(CliError::SinkFailures { failures }.into());
    }

    info!("trigsync finished");
    Ok(())
}

/// Optional JSON-lines copy and event log
fn extra_sinks(args: &SyncArgs, output: &std::path::Path) -> Vec<SinkConfig> {
    let mut sinks = Vec::new();

    if args.jsonl {
        let mut params = HashMap::new();
        params.insert(
            "path".to_string(),
            output.with_extension("jsonl").display().to_string(),
        );
        sinks.push(SinkConfig {
            name: "jsonl".to_string(),
            sink_type: SinkType::JsonLines,
            queue_capacity: args.buffer_size,
            params,
        });
    }

    if args.log_every > 0 {
        let mut params = HashMap::new();
        params.insert("every".to_string(), args.log_every.to_string());
        sinks.push(SinkConfig {
            name: "log".to_string(),
            sink_type: SinkType::Log,
            queue_capacity: args.buffer_size,
            params,
        });
    }

    sinks
}
