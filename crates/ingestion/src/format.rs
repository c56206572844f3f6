//! Format selection by file extension

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use contracts::{CompositeRecord, EventSkeleton, RecordSource};
use tracing::info;

use crate::error::{IngestionError, Result};
use crate::jsonl::{JsonLinesReader, JsonLinesWriter};
use crate::run_file::{RunFileReader, RunFileWriter};

/// Supported record file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFormat {
    /// Native framed run file (`.trun`)
    RunFile,
    /// One JSON record per line (`.jsonl`)
    JsonLines,
}

impl RunFormat {
    /// Infer the format from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "trun" => Some(Self::RunFile),
            "jsonl" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Open a record source, picking the reader by extension
///
/// # Errors
/// - Unknown extension
/// - Unreadable or zero-length file
/// - Bad run-file header
pub fn open_source(path: &Path) -> Result<Box<dyn RecordSource + Send>> {
    let format = RunFormat::from_path(path).ok_or_else(|| IngestionError::UnsupportedFormat {
        path: path.display().to_string(),
    })?;

    let name = path.display().to_string();
    let len = std::fs::metadata(path)
        .map_err(|e| IngestionError::io(&name, e))?
        .len();
    if len == 0 {
        return Err(IngestionError::Empty { source_name: name });
    }

    info!(source = %name, ?format, bytes = len, "opening record source");
    Ok(match format {
        RunFormat::RunFile => Box::new(RunFileReader::open(path)?),
        RunFormat::JsonLines => Box::new(JsonLinesReader::open(path)?),
    })
}

/// Record writer abstraction over the supported formats
pub trait RecordWriter: Send {
    fn write_record(&mut self, record: &CompositeRecord) -> Result<()>;

    fn write_event(&mut self, event: &EventSkeleton) -> Result<()>;

    fn records_written(&self) -> u64;

    fn flush(&mut self) -> Result<()>;
}

impl<W: Write + Send> RecordWriter for RunFileWriter<W> {
    fn write_record(&mut self, record: &CompositeRecord) -> Result<()> {
        RunFileWriter::write_record(self, record)
    }

    fn write_event(&mut self, event: &EventSkeleton) -> Result<()> {
        RunFileWriter::write_event(self, event)
    }

    fn records_written(&self) -> u64 {
        RunFileWriter::records_written(self)
    }

    fn flush(&mut self) -> Result<()> {
        RunFileWriter::flush(self)
    }
}

impl<W: Write + Send> RecordWriter for JsonLinesWriter<W> {
    fn write_record(&mut self, record: &CompositeRecord) -> Result<()> {
        JsonLinesWriter::write_record(self, record)
    }

    fn write_event(&mut self, event: &EventSkeleton) -> Result<()> {
        JsonLinesWriter::write_event(self, event)
    }

    fn records_written(&self) -> u64 {
        JsonLinesWriter::records_written(self)
    }

    fn flush(&mut self) -> Result<()> {
        JsonLinesWriter::flush(self)
    }
}

/// Create a writer, picking the format by extension
pub fn create_writer(path: &Path) -> Result<Box<dyn RecordWriter>> {
    let format = RunFormat::from_path(path).ok_or_else(|| IngestionError::UnsupportedFormat {
        path: path.display().to_string(),
    })?;
    Ok(match format {
        RunFormat::RunFile => Box::new(RunFileWriter::<BufWriter<File>>::create(path)?),
        RunFormat::JsonLines => Box::new(JsonLinesWriter::<BufWriter<File>>::create(path)?),
    })
}
