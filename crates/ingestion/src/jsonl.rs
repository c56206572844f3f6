//! JSON-lines records: one `CompositeRecord` per line

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use contracts::{CompositeRecord, ContractError, EventSkeleton, RecordSource};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{IngestionError, Result};
use crate::stats::IngestionMetrics;

/// Line-oriented JSON record reader
///
/// Blank lines are skipped; decode errors name the 1-based line number.
pub struct JsonLinesReader<R: BufRead> {
    name: String,
    inner: R,
    line: u64,
    buf: String,
    metrics: Arc<IngestionMetrics>,
}

impl JsonLinesReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| IngestionError::io(&name, e))?;
        debug!(source = %name, "opened JSON-lines file");
        Ok(Self::new(name, BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesReader<R> {
    pub fn new(name: impl Into<String>, inner: R) -> Self {
        Self {
            name: name.into(),
            inner,
            line: 0,
            buf: String::new(),
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// Shared reader metrics
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Decode the next non-blank line
    pub fn read_record(&mut self) -> Result<Option<CompositeRecord>> {
        loop {
            self.buf.clear();
            let n = self
                .inner
                .read_line(&mut self.buf)
                .map_err(|e| IngestionError::io(&self.name, e))?;
            if n == 0 {
                return Ok(None);
            }
            self.line += 1;

            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }

            let record: CompositeRecord = serde_json::from_str(text).map_err(|e| {
                self.metrics.record_decode_error(&self.name);
                IngestionError::Decode {
                    source_name: self.name.clone(),
                    record_index: self.line,
                    message: e.to_string(),
                }
            })?;
            trace!(source = %self.name, line = self.line, "decoded record");
            self.metrics.record_read(&self.name, n);
            return Ok(Some(record));
        }
    }
}

impl<R: BufRead> RecordSource for JsonLinesReader<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_record(&mut self) -> std::result::Result<Option<CompositeRecord>, ContractError> {
        Ok(self.read_record()?)
    }
}

/// JSON-lines writer
pub struct JsonLinesWriter<W: Write> {
    name: String,
    inner: W,
    records: u64,
}

impl JsonLinesWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let file = File::create(path).map_err(|e| IngestionError::io(&name, e))?;
        Ok(Self::new(name, BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(name: impl Into<String>, inner: W) -> Self {
        Self {
            name: name.into(),
            inner,
            records: 0,
        }
    }

    pub fn write_record(&mut self, record: &CompositeRecord) -> Result<()> {
        self.write_line(record)
    }

    pub fn write_event(&mut self, event: &EventSkeleton) -> Result<()> {
        self.write_line(event)
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| IngestionError::io(&self.name, e))
    }

    /// Flush and return the underlying writer
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn write_line<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer(&mut self.inner, value).map_err(|e| IngestionError::Encode {
            sink_name: self.name.clone(),
            message: e.to_string(),
        })?;
        self.inner
            .write_all(b"\n")
            .map_err(|e| IngestionError::io(&self.name, e))?;
        self.records += 1;
        Ok(())
    }
}
