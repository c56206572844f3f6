//! `scan` command implementation.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use tracing::{info, warn};

use sync_engine::scan::{run_number_from_file_name, scan_first_mismatches};

use crate::cli::ScanArgs;
use crate::error::CliError;

/// Execute the `scan` command
pub fn run_scan(args: &ScanArgs) -> Result<()> {
    if !args.input.exists() {
        return Err(CliError::InputNotFound {
            path: args.input.clone(),
        }
        .into());
    }

    let config = config_loader::ConfigLoader::load_or_default(args.config.as_deref())
        .context("Failed to load engine configuration")?;

    let expected_run = args.run.or_else(|| run_number_from_file_name(&args.input));
    if expected_run.is_none() {
        warn!(
            input = %args.input.display(),
            "No run number in file name, run number check disabled"
        );
    }

    let mut source = ingestion::open_source(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    let report = scan_first_mismatches(&mut source, &config, expected_run)
        .with_context(|| format!("Failed to scan {}", args.input.display()))?;

    println!("{report}");

    if args.no_csv {
        return Ok(());
    }

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory {}", args.output_dir.display())
    })?;
    let csv_path = args.output_dir.join(report.csv_file_name());
    let file = File::create(&csv_path)
        .with_context(|| format!("Failed to create {}", csv_path.display()))?;
    report
        .write_csv(BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    info!(path = %csv_path.display(), "Mismatch report written");
    Ok(())
}
