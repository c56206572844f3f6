//! # trigsync CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - run synchronization into an output directory
//! - first-mismatch scanning with a CSV report
//! - synthetic run generation for testing
//! - engine configuration validation

mod cli;
mod commands;
mod error;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_generate, run_scan, run_sync, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "trigsync starting");

    // Execute command
    let result = match &cli.command {
        Commands::Sync(args) => run_sync(args).await,
        Commands::Scan(args) => run_scan(args),
        Commands::Generate(args) => run_generate(args),
        Commands::Validate(args) => run_validate(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// `RUST_LOG` overrides the level picked by `-v`/`-q`.
fn init_logging(cli: &Cli) -> Result<()> {
    observability::init_with_config(ObservabilityConfig::with_verbosity(
        cli.log_format.into(),
        cli.verbose,
        cli.quiet,
    ))
}
