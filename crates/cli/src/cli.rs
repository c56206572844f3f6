//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use ingestion::{ChannelSpec, Fault};
use std::path::PathBuf;

/// trigsync - trigger-number synchronizer for multi-detector run files
#[derive(Parser, Debug)]
#[command(
    name = "trigsync",
    author,
    version,
    about = "Trigger-number synchronizer for multi-detector run files",
    long_about = "Re-aligns the per-detector sub-records of a recorded run by their hardware \n\
                  trigger counters, discarding positions where detectors disagree, and \n\
                  writes a synchronized copy of the run."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TRIGSYNC_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TRIGSYNC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronize a run file into an output directory
    Sync(SyncArgs),

    /// Report the first trigger mismatch of every channel
    Scan(ScanArgs),

    /// Write a synthetic run, optionally with injected counter faults
    Generate(GenerateArgs),

    /// Validate an engine configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `sync` command
#[derive(Parser, Debug, Clone)]
pub struct SyncArgs {
    /// Input run file (.trun or .jsonl)
    #[arg(short, long, env = "TRIGSYNC_INPUT")]
    pub input: PathBuf,

    /// Output directory; the output keeps the input's file name
    #[arg(short, long, env = "TRIGSYNC_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Engine configuration file (TOML or JSON); built-in defaults otherwise
    #[arg(short, long, env = "TRIGSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write the synchronized run as JSON lines next to the output
    #[arg(long)]
    pub jsonl: bool,

    /// Log every Nth merged event at info level (0 = no event log)
    #[arg(long, default_value = "0", env = "TRIGSYNC_LOG_EVERY")]
    pub log_every: u64,

    /// Queue capacity between the synchronizer and each sink
    #[arg(long, default_value = "256", env = "TRIGSYNC_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TRIGSYNC_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `scan` command
#[derive(Parser, Debug, Clone)]
pub struct ScanArgs {
    /// Input run file (.trun or .jsonl)
    #[arg(short, long, env = "TRIGSYNC_INPUT")]
    pub input: PathBuf,

    /// Directory for the mismatch CSV
    #[arg(short, long, default_value = ".", env = "TRIGSYNC_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Engine configuration file (TOML or JSON)
    #[arg(short, long, env = "TRIGSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Expected run number; taken from the file name (`run` + 6 digits) if omitted
    #[arg(long)]
    pub run: Option<u32>,

    /// Print the report without writing the CSV
    #[arg(long)]
    pub no_csv: bool,
}

/// Arguments for the `generate` command
#[derive(Parser, Debug, Clone)]
pub struct GenerateArgs {
    /// Output file; the extension picks the format
    #[arg(short, long)]
    pub output: PathBuf,

    /// Run number
    #[arg(long, default_value = "1")]
    pub run: u32,

    /// Number of data events
    #[arg(long, default_value = "1000")]
    pub events: u32,

    /// Event number of the first data event
    #[arg(long, default_value = "0")]
    pub first_event: u32,

    /// Trigger counter width in bits
    #[arg(long, default_value = "15")]
    pub counter_bits: u32,

    /// Firmware id tag written into the run-begin record
    #[arg(long)]
    pub firmware_id: Option<String>,

    /// Channel as TYPE or TYPE:FAMILY; repeat in order, the first is the reference
    #[arg(long = "channel", value_parser = parse_channel)]
    pub channels: Vec<ChannelSpec>,

    /// Injected fault: stale:CH:EV, high:CH:EV, zero:CH:EV, replace:CH:EV:ID or wrap:EV:JUMP
    #[arg(long = "fault", value_parser = parse_fault)]
    pub faults: Vec<Fault>,

    /// Omit the run-end record
    #[arg(long)]
    pub no_run_end: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "trigsync.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

fn parse_channel(s: &str) -> Result<ChannelSpec, String> {
    let (type_id, family) = s.split_once(':').unwrap_or((s, ""));
    if type_id.is_empty() {
        return Err(format!("empty channel type in '{s}'"));
    }
    Ok(ChannelSpec::new(type_id, family))
}

fn parse_fault(s: &str) -> Result<Fault, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let num = |i: usize| -> Result<u32, String> {
        parts
            .get(i)
            .ok_or_else(|| format!("missing field {i} in fault '{s}'"))?
            .parse::<u32>()
            .map_err(|e| format!("invalid number in fault '{s}': {e}"))
    };

    let expected_len = match parts[0] {
        "replace" => 4,
        _ => 3,
    };
    if parts.len() != expected_len {
        return Err(format!("fault '{s}' needs {expected_len} fields"));
    }

    match parts[0] {
        "stale" => Ok(Fault::StaleCounter {
            channel: num(1)? as usize,
            event: num(2)?,
        }),
        "high" => Ok(Fault::HighCounter {
            channel: num(1)? as usize,
            event: num(2)?,
        }),
        "zero" => Ok(Fault::ZeroGlitch {
            channel: num(1)? as usize,
            event: num(2)?,
        }),
        "replace" => Ok(Fault::ReplacedCounter {
            channel: num(1)? as usize,
            event: num(2)?,
            trigger_id: num(3)?,
        }),
        "wrap" => Ok(Fault::ReferenceWrap {
            event: num(1)?,
            jump: num(2)?,
        }),
        other => Err(format!("unknown fault kind '{other}'")),
    }
}
