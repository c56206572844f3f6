//! Native run-file codec
//!
//! Layout: 8-byte magic, `u32` little-endian version, then one frame per
//! record. A frame is a `u32` little-endian length followed by the
//! `bincode` encoding of a [`CompositeRecord`].
//!
//! [`EventSkeleton`] has the same field layout as [`CompositeRecord`], so
//! merged events are written directly and read back as composite records.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;

use contracts::{CompositeRecord, ContractError, EventSkeleton, RecordSource};
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::error::{IngestionError, Result};
use crate::stats::IngestionMetrics;

/// Run-file magic
pub const MAGIC: [u8; 8] = *b"TRGSYNC\0";

/// Current run-file version
pub const VERSION: u32 = 1;

/// Upper bound on a single frame, guards against reading garbage lengths
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Streaming run-file reader
pub struct RunFileReader<R: Read> {
    name: String,
    inner: R,
    records: u64,
    metrics: Arc<IngestionMetrics>,
}

impl RunFileReader<BufReader<File>> {
    /// Open a run file and validate its header
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|e| IngestionError::io(&name, e))?;
        Self::new(name, BufReader::new(file))
    }
}

impl<R: Read> RunFileReader<R> {
    /// Wrap a reader and validate the header
    pub fn new(name: impl Into<String>, mut inner: R) -> Result<Self> {
        let name = name.into();
        let mut header = [0u8; 12];
        let filled = read_full(&mut inner, &mut header).map_err(|e| IngestionError::io(&name, e))?;

        if filled == 0 {
            return Err(IngestionError::Empty { source_name: name });
        }
        if filled < header.len() || header[..8] != MAGIC {
            return Err(IngestionError::BadMagic { source_name: name });
        }

        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != VERSION {
            return Err(IngestionError::UnsupportedVersion {
                source_name: name,
                version,
            });
        }

        debug!(source = %name, version, "opened run file");
        Ok(Self {
            name,
            inner,
            records: 0,
            metrics: Arc::new(IngestionMetrics::new()),
        })
    }

    /// Shared reader metrics
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Decode the next frame, `None` at a clean end of file
    pub fn read_record(&mut self) -> Result<Option<CompositeRecord>> {
        let mut len_buf = [0u8; 4];
        let filled =
            read_full(&mut self.inner, &mut len_buf).map_err(|e| IngestionError::io(&self.name, e))?;
        match filled {
            0 => return Ok(None),
            4 => {}
            _ => return Err(self.truncated()),
        }

        let len = u32::from_le_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            self.metrics.record_decode_error(&self.name);
            return Err(IngestionError::Decode {
                source_name: self.name.clone(),
                record_index: self.records,
                message: format!("frame length {len} exceeds {MAX_FRAME_LEN}"),
            });
        }

        let mut frame = vec![0u8; len as usize];
        let filled =
            read_full(&mut self.inner, &mut frame).map_err(|e| IngestionError::io(&self.name, e))?;
        if filled < frame.len() {
            return Err(self.truncated());
        }

        let record: CompositeRecord = bincode::deserialize(&frame).map_err(|e| {
            self.metrics.record_decode_error(&self.name);
            IngestionError::Decode {
                source_name: self.name.clone(),
                record_index: self.records,
                message: e.to_string(),
            }
        })?;

        trace!(
            source = %self.name,
            index = self.records,
            event_number = record.event_number,
            "decoded record"
        );
        self.records += 1;
        self.metrics.record_read(&self.name, frame.len() + 4);
        Ok(Some(record))
    }

    fn truncated(&self) -> IngestionError {
        warn!(source = %self.name, index = self.records, "truncated frame");
        self.metrics.record_decode_error(&self.name);
        IngestionError::Truncated {
            source_name: self.name.clone(),
            record_index: self.records,
        }
    }
}

impl<R: Read> RecordSource for RunFileReader<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_record(&mut self) -> std::result::Result<Option<CompositeRecord>, ContractError> {
        Ok(self.read_record()?)
    }
}

/// Run-file writer
pub struct RunFileWriter<W: Write> {
    name: String,
    inner: W,
    records: u64,
}

impl RunFileWriter<BufWriter<File>> {
    /// Create (truncate) a run file and write its header
    pub fn create(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let file = File::create(path).map_err(|e| IngestionError::io(&name, e))?;
        Self::new(name, BufWriter::new(file))
    }
}

impl<W: Write> RunFileWriter<W> {
    /// Wrap a writer and emit the header
    pub fn new(name: impl Into<String>, mut inner: W) -> Result<Self> {
        let name = name.into();
        inner
            .write_all(&MAGIC)
            .and_then(|_| inner.write_all(&VERSION.to_le_bytes()))
            .map_err(|e| IngestionError::io(&name, e))?;
        Ok(Self {
            name,
            inner,
            records: 0,
        })
    }

    /// Append one composite record
    pub fn write_record(&mut self, record: &CompositeRecord) -> Result<()> {
        self.write_frame(record)
    }

    /// Append one merged event
    pub fn write_event(&mut self, event: &EventSkeleton) -> Result<()> {
        self.write_frame(event)
    }

    /// Number of frames written so far
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

    fn write_frame<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let frame = bincode::serialize(value).map_err(|e| IngestionError::Encode {
            sink_name: self.name.clone(),
            message: e.to_string(),
        })?;
        let len = u32::try_from(frame.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or_else(|| IngestionError::Encode {
                sink_name: self.name.clone(),
                message: format!("frame of {} bytes is too large", frame.len()),
            })?;

        self.inner
            .write_all(&len.to_le_bytes())
            .and_then(|_| self.inner.write_all(&frame))
            .map_err(|e| IngestionError::io(&self.name, e))?;
        self.records += 1;
        Ok(())
    }
}

/// Fill `buf` as far as the reader allows, returning the bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
