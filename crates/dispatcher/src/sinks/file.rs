//! FileSink - writes the synchronized run to a record file

use contracts::{CompositeRecord, ContractError, DataSink, EventSkeleton};
use ingestion::{create_writer, RecordWriter, RunFormat};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file; the extension picks the format
    pub path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    ///
    /// `path` wins; otherwise `output_dir` joined with `file_name`.
    pub fn from_params(params: &HashMap<String, String>) -> Option<Self> {
        if let Some(path) = params.get("path") {
            return Some(Self {
                path: PathBuf::from(path),
            });
        }
        let dir = params.get("output_dir")?;
        let file_name = params.get("file_name")?;
        Some(Self {
            path: Path::new(dir).join(file_name),
        })
    }
}

/// Sink that writes the run-begin record and every merged event to one
/// file, native run file or JSON lines depending on the extension
pub struct FileSink {
    name: String,
    path: PathBuf,
    format: RunFormat,
    writer: Box<dyn RecordWriter>,
}

impl FileSink {
    /// Create the output file, and its directory if missing
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> Result<Self, ContractError> {
        let name = name.into();
        let path = config.path;
        let format = RunFormat::from_path(&path).ok_or_else(|| {
            ContractError::sink_write(
                &name,
                format!("unsupported output extension: {}", path.display()),
            )
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let writer = create_writer(&path).map_err(ContractError::from)?;

        Ok(Self {
            name,
            path,
            format,
            writer,
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileSinkConfig::from_params(params).ok_or_else(|| {
            ContractError::config_validation(
                format!("sinks.{name}.params"),
                "file sink needs 'path' or 'output_dir' + 'file_name'",
            )
        })?;
        Self::new(name, config)
    }

    pub fn format(&self) -> RunFormat {
        self.format
    }

    pub fn records_written(&self) -> u64 {
        self.writer.records_written()
    }

    fn write_failed(&self, event_number: u32, err: ingestion::IngestionError) -> ContractError {
        error!(sink = %self.name, event_number, error = %err, "Write failed");
        ContractError::sink_write(&self.name, err.to_string())
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    #[instrument(
        name = "file_sink_begin_run",
        skip(self, run_begin),
        fields(sink = %self.name, run_number = run_begin.run_number)
    )]
    async fn begin_run(&mut self, run_begin: &CompositeRecord) -> Result<(), ContractError> {
        self.writer
            .write_record(run_begin)
            .map_err(|e| self.write_failed(run_begin.event_number, e))
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, event),
        fields(sink = %self.name, event_number = event.event_number)
    )]
    async fn write(&mut self, event: &EventSkeleton) -> Result<(), ContractError> {
        self.writer
            .write_event(event)
            .map_err(|e| self.write_failed(event.event_number, e))
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        self.writer
            .flush()
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        self.flush().await?;
        info!(
            sink = %self.name,
            path = %self.path.display(),
            records = self.writer.records_written(),
            "FileSink closed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::{open_source, SyntheticRun};
    use tempfile::tempdir;

    async fn write_run(sink: &mut FileSink) {
        let mut records = SyntheticRun::new(9).events(3).records().into_iter();
        let begin = records.next().unwrap();
        sink.begin_run(&begin).await.unwrap();
        for record in records {
            let (mut event, subs) = EventSkeleton::split(record);
            for sub in subs {
                event.attach(sub);
            }
            sink.write(&event).await.unwrap();
        }
        sink.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_file_sink_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("run000009.trun");
        let mut sink = FileSink::new("run_file", FileSinkConfig { path: path.clone() }).unwrap();
        assert_eq!(sink.format(), RunFormat::RunFile);

        write_run(&mut sink).await;
        assert_eq!(sink.records_written(), 5);

        let mut source = open_source(&path).unwrap();
        let first = source.next_record().unwrap().unwrap();
        assert!(first.is_run_begin());
        let mut count = 1;
        while source.next_record().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[tokio::test]
    async fn test_json_lines_sink() {
        let dir = tempdir().unwrap();
        let mut params = HashMap::new();
        params.insert("output_dir".to_string(), dir.path().display().to_string());
        params.insert("file_name".to_string(), "run.jsonl".to_string());

        let mut sink = FileSink::from_params("jsonl", &params).unwrap();
        assert_eq!(sink.format(), RunFormat::JsonLines);
        write_run(&mut sink).await;

        let text = fs::read_to_string(dir.path().join("run.jsonl")).unwrap();
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_missing_params() {
        assert!(FileSink::from_params("bad", &HashMap::new()).is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempdir().unwrap();
        let config = FileSinkConfig {
            path: dir.path().join("out.txt"),
        };
        assert!(FileSink::new("bad", config).is_err());
    }
}
