//! Whole-run driver over a [`RecordSource`]

use contracts::{
    CompositeRecord, EventSkeleton, RecordSource, ResidualReport, SyncEngineConfig, SyncStats,
};
use tracing::{info, instrument};

use crate::engine::StreamSynchronizer;
use crate::error::{Result, SyncError};

/// Final state of a synchronized run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub run_begin: CompositeRecord,
    pub stats: SyncStats,
    pub residual: ResidualReport,
}

/// Read the run-begin record and set up a synchronizer
///
/// # Errors
/// - `EmptyInput` when the source yields nothing
/// - setup errors for a malformed run-begin record
pub fn begin_run<S>(
    source: &mut S,
    config: SyncEngineConfig,
) -> Result<(CompositeRecord, StreamSynchronizer)>
where
    S: RecordSource + ?Sized,
{
    let run_begin = source
        .next_record()?
        .ok_or_else(|| SyncError::EmptyInput {
            source_name: source.name().to_string(),
        })?;
    let sync = StreamSynchronizer::from_run_begin(&run_begin, config)?;
    Ok((run_begin, sync))
}

/// Synchronize a whole source, handing every merged event to `emit`
///
/// Events are passed in emission order: streamed merges first, then the
/// ones flushed after the input ends.
#[instrument(level = "debug", name = "synchronize", skip_all, fields(source = source.name()))]
pub fn synchronize_with<S, F>(
    source: &mut S,
    config: SyncEngineConfig,
    mut emit: F,
) -> Result<SyncReport>
where
    S: RecordSource + ?Sized,
    F: FnMut(EventSkeleton),
{
    let (run_begin, mut sync) = begin_run(source, config)?;

    while let Some(record) = source.next_record()? {
        if let Some(event) = sync.ingest(record)? {
            emit(event);
        }
    }
    for event in sync.drain() {
        emit(event);
    }

    let stats = sync.stats();
    let residual = sync.residual();
    info!(
        run_number = run_begin.run_number,
        records = stats.records_ingested,
        merged = stats.events_merged,
        discarded = stats.events_discarded,
        "run synchronized"
    );

    Ok(SyncReport {
        run_begin,
        stats,
        residual,
    })
}

/// Synchronize a whole source and collect the merged events
pub fn synchronize<S>(
    source: &mut S,
    config: SyncEngineConfig,
) -> Result<(SyncReport, Vec<EventSkeleton>)>
where
    S: RecordSource + ?Sized,
{
    let mut events = Vec::new();
    let report = synchronize_with(source, config, |event| events.push(event))?;
    Ok((report, events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::VecSource;
    use ingestion::{Fault, SyntheticRun};

    #[test]
    fn test_synchronize_clean_run() {
        let mut source = SyntheticRun::new(3).events(40).source();
        let (report, events) = synchronize(&mut source, SyncEngineConfig::default()).unwrap();

        assert_eq!(report.run_begin.run_number, 3);
        assert_eq!(events.len(), 41);
        assert_eq!(report.stats.records_ingested, 41);
        assert!(report.residual.is_empty());
    }

    #[test]
    fn test_synchronize_with_fault() {
        let mut source = SyntheticRun::new(3)
            .events(40)
            .fault(Fault::StaleCounter { channel: 1, event: 10 })
            .source();
        let mut count = 0;
        let report = synchronize_with(&mut source, SyncEngineConfig::default(), |_| count += 1)
            .unwrap();
        assert_eq!(count, 40);
        assert_eq!(report.stats.events_discarded, 1);
    }

    #[test]
    fn test_empty_source() {
        let mut source = VecSource::new("nothing", Vec::new());
        let err = synchronize(&mut source, SyncEngineConfig::default()).unwrap_err();
        assert!(matches!(err, SyncError::EmptyInput { ref source_name } if source_name == "nothing"));
    }

    #[test]
    fn test_first_record_must_be_run_begin() {
        let records = SyntheticRun::new(3).events(2).records();
        let mut source = VecSource::new("headless", records[1..].to_vec());
        let err = synchronize(&mut source, SyncEngineConfig::default()).unwrap_err();
        assert!(matches!(err, SyncError::NotRunBegin { .. }));
    }
}
