//! First-mismatch scanner
//!
//! A diagnostic pass over a raw run that does not synchronize anything: it
//! compares every non-reference raw counter against the counter expected
//! from the record's event number and remembers, per channel, the first
//! event where they disagree.

use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use contracts::{RecordSource, SyncEngineConfig};
use tracing::{debug, info, instrument};

use crate::error::{Result, SyncError};
use crate::setup::SyncSetup;

/// First disagreement seen on one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMismatch {
    pub index: usize,
    pub label: String,
    pub family: String,
    pub first_event: u32,
    /// Raw counter found at `first_event`
    pub raw_trigger: u64,
}

/// Where the run number first differed from the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunNumberMismatch {
    AtRunBegin,
    AtEvent(u32),
}

impl RunNumberMismatch {
    /// CSV value: `-1` for the run-begin record
    pub fn csv_value(&self) -> i64 {
        match self {
            RunNumberMismatch::AtRunBegin => -1,
            RunNumberMismatch::AtEvent(event) => i64::from(*event),
        }
    }
}

/// Scanner output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MismatchReport {
    /// Run number of the run-begin record
    pub run_number: u32,
    /// Run number the records were checked against
    pub expected_run: Option<u32>,
    /// Data records seen, run-end excluded
    pub events: u64,
    pub channels: Vec<ChannelMismatch>,
    pub run_number_mismatch: Option<RunNumberMismatch>,
}

impl MismatchReport {
    pub fn has_mismatch(&self) -> bool {
        !self.channels.is_empty() || self.run_number_mismatch.is_some()
    }

    /// `mismatch_<run>.csv`, zero padded to six digits
    pub fn csv_file_name(&self) -> String {
        format!(
            "mismatch_{:06}.csv",
            self.expected_run.unwrap_or(self.run_number)
        )
    }

    /// Two rows: labels of mismatching channels then first event numbers,
    /// each followed by the event count column
    pub fn write_csv<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut header: Vec<String> = self.channels.iter().map(|c| c.label.clone()).collect();
        let mut values: Vec<String> = self
            .channels
            .iter()
            .map(|c| c.first_event.to_string())
            .collect();
        if let Some(mismatch) = self.run_number_mismatch {
            header.push("runnumber".to_string());
            values.push(mismatch.csv_value().to_string());
        }
        header.push("number of events".to_string());
        values.push(self.events.to_string());

        writeln!(writer, "{}", header.join(","))?;
        writeln!(writer, "{}", values.join(","))?;
        writer.flush()
    }
}

impl fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}: {} events", self.run_number, self.events)?;
        if !self.has_mismatch() {
            return write!(f, "No trigger mismatch found");
        }
        for channel in &self.channels {
            writeln!(
                f,
                "  {}: first mismatch at event {} (raw {})",
                channel.label, channel.first_event, channel.raw_trigger
            )?;
        }
        match self.run_number_mismatch {
            Some(RunNumberMismatch::AtRunBegin) => {
                write!(f, "  run number differs from file name at run begin")
            }
            Some(RunNumberMismatch::AtEvent(event)) => {
                write!(f, "  run number differs from file name at event {event}")
            }
            None => Ok(()),
        }
    }
}

/// Run number embedded in a file name: the six digits after the last `run`
/// of the file stem
///
/// ```
/// use std::path::Path;
/// use sync_engine::scan::run_number_from_file_name;
///
/// assert_eq!(run_number_from_file_name(Path::new("/data/run000123.trun")), Some(123));
/// assert_eq!(run_number_from_file_name(Path::new("/data/output.trun")), None);
/// ```
pub fn run_number_from_file_name(path: &Path) -> Option<u32> {
    let name = path.file_stem()?.to_str()?;
    let start = name.rfind("run")? + 3;
    let digits = name.get(start..start + 6)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Scan a run for the first trigger mismatch of every channel
///
/// # Errors
/// - the source is empty or fails
/// - the first record is not a usable run-begin record
#[instrument(level = "debug", name = "scan_first_mismatches", skip(source, config), fields(source = source.name()))]
pub fn scan_first_mismatches<S>(
    source: &mut S,
    config: &SyncEngineConfig,
    expected_run: Option<u32>,
) -> Result<MismatchReport>
where
    S: RecordSource + ?Sized,
{
    let run_begin = source
        .next_record()?
        .ok_or_else(|| SyncError::EmptyInput {
            source_name: source.name().to_string(),
        })?;
    let setup = SyncSetup::new(&run_begin, config.clone())?;
    let modulus = config.modulus();
    let offset = setup.event_offset();

    let mut report = MismatchReport {
        run_number: setup.run_number(),
        expected_run,
        events: 0,
        channels: Vec::new(),
        run_number_mismatch: None,
    };
    if expected_run.is_some_and(|run| run != run_begin.run_number) {
        report.run_number_mismatch = Some(RunNumberMismatch::AtRunBegin);
    }

    let mut seen = vec![false; setup.num_channels()];
    while let Some(record) = source.next_record()? {
        if record.is_run_end() {
            continue;
        }
        report.events += 1;

        let expected = (u64::from(record.event_number) + offset) % modulus;
        for (desc, sub) in setup.channels().iter().zip(&record.sub_records) {
            if desc.is_reference || seen[desc.index] {
                continue;
            }
            let raw = desc.quirk.raw_trigger(sub.trigger_id);
            if raw != expected {
                seen[desc.index] = true;
                debug!(
                    channel = %desc.label,
                    event_number = record.event_number,
                    raw,
                    expected,
                    "first trigger mismatch"
                );
                report.channels.push(ChannelMismatch {
                    index: desc.index,
                    label: desc.label.clone(),
                    family: desc.family.clone(),
                    first_event: record.event_number,
                    raw_trigger: raw,
                });
            }
        }

        if report.run_number_mismatch.is_none()
            && expected_run.is_some_and(|run| run != record.run_number)
        {
            report.run_number_mismatch = Some(RunNumberMismatch::AtEvent(record.event_number));
        }
    }

    report.channels.sort_by_key(|c| c.index);
    info!(
        run_number = report.run_number,
        events = report.events,
        mismatching_channels = report.channels.len(),
        "scan complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::VecSource;
    use ingestion::{Fault, SyntheticRun};
    use std::path::PathBuf;

    #[test]
    fn test_clean_run_has_no_mismatch() {
        let mut source = SyntheticRun::new(7).events(50).source();
        let report =
            scan_first_mismatches(&mut source, &SyncEngineConfig::default(), Some(7)).unwrap();
        assert_eq!(report.events, 50);
        assert!(!report.has_mismatch());
    }

    #[test]
    fn test_first_mismatch_per_channel() {
        let mut source = SyntheticRun::new(7)
            .events(100)
            .faults([
                Fault::StaleCounter { channel: 1, event: 30 },
                Fault::StaleCounter { channel: 1, event: 60 },
                Fault::ReplacedCounter {
                    channel: 2,
                    event: 12,
                    trigger_id: 999,
                },
            ])
            .source();
        let report =
            scan_first_mismatches(&mut source, &SyncEngineConfig::default(), None).unwrap();

        assert_eq!(report.channels.len(), 2);
        assert_eq!(report.channels[0].index, 1);
        assert_eq!(report.channels[0].first_event, 30);
        assert_eq!(report.channels[0].family, "NI");
        assert_eq!(report.channels[1].first_event, 12);
        assert_eq!(report.channels[1].raw_trigger, 999);
    }

    #[test]
    fn test_run_number_mismatch_at_begin() {
        let mut source = SyntheticRun::new(7).events(5).source();
        let report =
            scan_first_mismatches(&mut source, &SyncEngineConfig::default(), Some(8)).unwrap();
        assert_eq!(report.run_number_mismatch, Some(RunNumberMismatch::AtRunBegin));
        assert_eq!(report.csv_file_name(), "mismatch_000008.csv");
    }

    #[test]
    fn test_csv_layout() {
        let mut source = SyntheticRun::new(7)
            .events(40)
            .fault(Fault::StaleCounter { channel: 1, event: 30 })
            .source();
        let report =
            scan_first_mismatches(&mut source, &SyncEngineConfig::default(), Some(7)).unwrap();

        let mut out = Vec::new();
        report.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "1:NI:NI,number of events\n30,40\n");
    }

    #[test]
    fn test_empty_source() {
        let mut source = VecSource::new("empty", Vec::new());
        let err =
            scan_first_mismatches(&mut source, &SyncEngineConfig::default(), None).unwrap_err();
        assert!(matches!(err, SyncError::EmptyInput { .. }));
    }

    #[test]
    fn test_run_number_from_file_name() {
        let path = PathBuf::from("/data/run_tb/run000042_output.trun");
        assert_eq!(run_number_from_file_name(&path), Some(42));
        assert_eq!(run_number_from_file_name(Path::new("run12.trun")), None);
    }
}
