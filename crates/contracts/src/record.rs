//! Composite records - event source output
//!
//! A composite record is one arrival of the data-acquisition system: a header
//! plus exactly one sub-record per detector channel.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ChannelType;

/// Position of a record within the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Beginning-of-run record carrying channel setup metadata
    RunBegin,
    /// Ordinary triggered event
    #[default]
    Data,
    /// End-of-run record
    RunEnd,
}

/// One channel's raw record for one arrival
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRecord {
    /// Channel type id (`_TLU` for the reference channel)
    pub type_id: ChannelType,

    /// Hardware family label, selects the quirk policy
    #[serde(default)]
    pub family: String,

    /// The channel's own event number
    pub event_number: u32,

    /// Trigger counter as decoded from the channel payload
    pub trigger_id: u32,

    /// End-of-run marker
    #[serde(default)]
    pub end_marker: bool,

    /// Opaque channel payload
    #[serde(default)]
    pub payload: Bytes,
}

impl SubRecord {
    /// Create a sub-record without payload
    pub fn new(
        type_id: impl Into<ChannelType>,
        family: impl Into<String>,
        event_number: u32,
        trigger_id: u32,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            family: family.into(),
            event_number,
            trigger_id,
            end_marker: false,
            payload: Bytes::new(),
        }
    }

    /// Whether this sub-record belongs to an end-of-run record
    #[inline]
    pub fn is_end_marker(&self) -> bool {
        self.end_marker
    }
}

/// One arrival: header plus one sub-record per channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeRecord {
    #[serde(default)]
    pub kind: RecordKind,
    pub run_number: u32,
    pub event_number: u32,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub sub_records: Vec<SubRecord>,
}

impl CompositeRecord {
    #[inline]
    pub fn is_run_begin(&self) -> bool {
        self.kind == RecordKind::RunBegin
    }

    #[inline]
    pub fn is_run_end(&self) -> bool {
        self.kind == RecordKind::RunEnd
    }

    /// Look up a tag value
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn sub_record(&self, index: usize) -> Option<&SubRecord> {
        self.sub_records.get(index)
    }

    pub fn num_sub_records(&self) -> usize {
        self.sub_records.len()
    }
}

/// A merged event in the making
///
/// Created from a composite record's header on ingestion; sub-records are
/// moved in one per channel when the position is merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSkeleton {
    pub kind: RecordKind,
    pub run_number: u32,
    pub event_number: u32,
    pub timestamp: u64,
    pub flags: u32,
    pub tags: BTreeMap<String, String>,
    pub sub_records: Vec<SubRecord>,
}

impl EventSkeleton {
    /// Split a composite record into its skeleton and its sub-records
    pub fn split(record: CompositeRecord) -> (Self, Vec<SubRecord>) {
        let CompositeRecord {
            kind,
            run_number,
            event_number,
            timestamp,
            flags,
            tags,
            sub_records,
        } = record;

        let skeleton = Self {
            kind,
            run_number,
            event_number,
            timestamp,
            flags,
            tags,
            sub_records: Vec::with_capacity(sub_records.len()),
        };
        (skeleton, sub_records)
    }

    /// Attach the next channel's sub-record
    #[inline]
    pub fn attach(&mut self, sub_record: SubRecord) {
        self.sub_records.push(sub_record);
    }

    /// Convert back into a composite record for serialization
    pub fn into_record(self) -> CompositeRecord {
        CompositeRecord {
            kind: self.kind,
            run_number: self.run_number,
            event_number: self.event_number,
            timestamp: self.timestamp,
            flags: self.flags,
            tags: self.tags,
            sub_records: self.sub_records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> CompositeRecord {
        CompositeRecord {
            kind: RecordKind::Data,
            run_number: 42,
            event_number: 7,
            timestamp: 1234,
            flags: 0x10,
            tags: BTreeMap::from([("Mode".to_string(), "beam".to_string())]),
            sub_records: vec![
                SubRecord::new("_TLU", "", 7, 7),
                SubRecord::new("NI", "NI", 7, 8),
            ],
        }
    }

    #[test]
    fn test_split_keeps_header() {
        let (skeleton, subs) = EventSkeleton::split(sample_record());
        assert_eq!(skeleton.run_number, 42);
        assert_eq!(skeleton.event_number, 7);
        assert_eq!(skeleton.flags, 0x10);
        assert_eq!(skeleton.tags.get("Mode").map(String::as_str), Some("beam"));
        assert!(skeleton.sub_records.is_empty());
        assert_eq!(subs.len(), 2);
    }

    #[test]
    fn test_attach_and_back() {
        let original = sample_record();
        let (mut skeleton, subs) = EventSkeleton::split(original.clone());
        for sub in subs {
            skeleton.attach(sub);
        }
        assert_eq!(skeleton.into_record(), original);
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{"run_number":1,"event_number":2,
            "sub_records":[{"type_id":"_TLU","event_number":2,"trigger_id":2}]}"#;
        let record: CompositeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, RecordKind::Data);
        assert!(!record.sub_records[0].is_end_marker());
        assert!(record.sub_records[0].payload.is_empty());
        assert_eq!(record.tag("FirmwareID"), None);
    }
}
