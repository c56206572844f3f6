//! `generate` command implementation.

use anyhow::{Context, Result};
use std::fs;
use tracing::info;

use ingestion::{create_writer, SyntheticRun};

use crate::cli::GenerateArgs;

/// Build the synthetic run described by the arguments
fn build_run(args: &GenerateArgs) -> SyntheticRun {
    let mut run = SyntheticRun::new(args.run)
        .events(args.events)
        .first_event(args.first_event)
        .counter_bits(args.counter_bits)
        .faults(args.faults.iter().copied())
        .run_end(!args.no_run_end);
    if !args.channels.is_empty() {
        run = run.channels(args.channels.clone());
    }
    if let Some(id) = &args.firmware_id {
        run = run.firmware_id(id.clone());
    }
    run
}

/// Execute the `generate` command
pub fn run_generate(args: &GenerateArgs) -> Result<()> {
    let run = build_run(args);

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut writer = create_writer(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    for record in run.records() {
        writer
            .write_record(&record)
            .with_context(|| format!("Failed to write {}", args.output.display()))?;
    }
    writer.flush()?;

    info!(
        output = %args.output.display(),
        run_number = args.run,
        channels = run.num_channels(),
        records = writer.records_written(),
        faults = args.faults.len(),
        "Synthetic run written"
    );
    println!(
        "Wrote {} records to {}",
        writer.records_written(),
        args.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::{open_source, Fault};
    use tempfile::tempdir;

    #[test]
    fn test_generate_writes_run() {
        let dir = tempdir().unwrap();
        let args = GenerateArgs {
            output: dir.path().join("gen").join("run000003.trun"),
            run: 3,
            events: 10,
            first_event: 0,
            counter_bits: 15,
            firmware_id: None,
            channels: Vec::new(),
            faults: vec![Fault::StaleCounter { channel: 1, event: 4 }],
            no_run_end: true,
        };
        run_generate(&args).unwrap();

        let mut source = open_source(&args.output).unwrap();
        let mut count = 0;
        while let Some(record) = source.next_record().unwrap() {
            assert_eq!(record.run_number, 3);
            count += 1;
        }
        assert_eq!(count, 11);
    }
}
