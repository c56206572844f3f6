//! Run setup from the run-begin record

use contracts::{CompositeRecord, SyncEngineConfig};
use tracing::info;

use crate::channel::ChannelDescriptor;
use crate::counter::{CounterModel, QuirkRegistry};
use crate::error::{Result, SyncError};

/// Everything learned from the run-begin record
#[derive(Debug, Clone)]
pub struct SyncSetup {
    config: SyncEngineConfig,
    run_number: u32,
    event_offset: u64,
    reference_index: usize,
    channels: Vec<ChannelDescriptor>,
    model: CounterModel,
}

impl SyncSetup {
    /// Learn channel layout and event-numbering offset
    ///
    /// # Errors
    /// - `record` is not a run-begin record
    /// - no sub-record has the reference type id
    /// - `config` fails [`SyncEngineConfig::validate`]
    pub fn new(record: &CompositeRecord, config: SyncEngineConfig) -> Result<Self> {
        if !record.is_run_begin() {
            return Err(SyncError::NotRunBegin {
                kind: record.kind,
                event_number: record.event_number,
            });
        }
        config.validate().map_err(SyncError::Config)?;

        let reference_index = record
            .sub_records
            .iter()
            .position(|s| s.type_id == config.reference_type)
            .ok_or_else(|| SyncError::MissingReferenceChannel {
                reference: config.reference_type.clone(),
            })?;

        let registry = QuirkRegistry::from_config(&config.quirks);
        let channels = record
            .sub_records
            .iter()
            .enumerate()
            .map(|(index, sub)| {
                ChannelDescriptor::new(
                    index,
                    sub.type_id.clone(),
                    sub.family.clone(),
                    index == reference_index,
                    registry.lookup(&sub.family),
                )
            })
            .collect::<Vec<_>>();

        let firmware_id = record.tag(&config.firmware.tag);
        let event_offset = config.firmware.event_offset(firmware_id);

        info!(
            run_number = record.run_number,
            channels = channels.len(),
            reference = %channels[reference_index].label,
            firmware_id = ?firmware_id,
            event_offset,
            modulus = config.modulus(),
            "run setup complete"
        );

        Ok(Self {
            model: CounterModel::from_config(&config),
            config,
            run_number: record.run_number,
            event_offset,
            reference_index,
            channels,
        })
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    /// Offset between a reference event number and the channels' counters
    pub fn event_offset(&self) -> u64 {
        self.event_offset
    }

    pub fn reference_index(&self) -> usize {
        self.reference_index
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn model(&self) -> CounterModel {
        self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{QuirkPolicy, RecordKind, SubRecord};
    use std::collections::BTreeMap;

    fn run_begin(firmware: Option<&str>) -> CompositeRecord {
        let mut tags = BTreeMap::new();
        if let Some(id) = firmware {
            tags.insert("FirmwareID".to_string(), id.to_string());
        }
        CompositeRecord {
            kind: RecordKind::RunBegin,
            run_number: 123,
            tags,
            sub_records: vec![
                SubRecord::new("NI", "NI", 0, 0),
                SubRecord::new("_TLU", "", 0, 0),
                SubRecord::new("USBPIXI4", "PyBAR", 0, 0),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_setup_learns_channels() {
        let setup = SyncSetup::new(&run_begin(None), SyncEngineConfig::default()).unwrap();
        assert_eq!(setup.run_number(), 123);
        assert_eq!(setup.num_channels(), 3);
        assert_eq!(setup.reference_index(), 1);
        assert!(setup.channels()[1].is_reference);
        assert_eq!(setup.channels()[0].quirk.policy, QuirkPolicy::SingleSkip);
        assert_eq!(setup.channels()[2].quirk.mask, Some(0xFFFF));
        assert_eq!(setup.channels()[2].label, "2:USBPIXI4:PyBAR");
    }

    #[test]
    fn test_event_offset_from_firmware() {
        let config = SyncEngineConfig::default();
        let legacy = SyncSetup::new(&run_begin(Some("0x0E")), config.clone()).unwrap();
        assert_eq!(legacy.event_offset(), 0);

        let newer = SyncSetup::new(&run_begin(Some("0x1e000012")), config.clone()).unwrap();
        assert_eq!(newer.event_offset(), 1);

        let absent = SyncSetup::new(&run_begin(None), config).unwrap();
        assert_eq!(absent.event_offset(), 1);
    }

    #[test]
    fn test_not_run_begin() {
        let mut record = run_begin(None);
        record.kind = RecordKind::Data;
        let err = SyncSetup::new(&record, SyncEngineConfig::default()).unwrap_err();
        assert!(matches!(err, SyncError::NotRunBegin { .. }));
    }

    #[test]
    fn test_missing_reference() {
        let mut record = run_begin(None);
        record.sub_records.remove(1);
        let err = SyncSetup::new(&record, SyncEngineConfig::default()).unwrap_err();
        assert!(matches!(err, SyncError::MissingReferenceChannel { .. }));
    }

    #[test]
    fn test_invalid_counter_bits() {
        let config = SyncEngineConfig {
            counter_bits: 40,
            ..Default::default()
        };
        let err = SyncSetup::new(&run_begin(None), config).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_wrap_tolerance_must_fit_counter() {
        let config = SyncEngineConfig {
            counter_bits: 4,
            ..Default::default()
        };
        let err = SyncSetup::new(&run_begin(None), config).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
