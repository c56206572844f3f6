//! Synthetic run generator
//!
//! Builds a run-begin record, `events` data records and an optional
//! run-end record. Every channel counts `(event_number + event_offset)`
//! modulo `2^counter_bits` unless a [`Fault`] says otherwise.
//!
//! ```
//! use ingestion::{Fault, SyntheticRun};
//!
//! let records = SyntheticRun::new(42)
//!     .events(100)
//!     .fault(Fault::StaleCounter { channel: 1, event: 30 })
//!     .records();
//! assert_eq!(records.len(), 102);
//! ```

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use contracts::{
    ChannelType, CompositeRecord, FirmwareConfig, RecordKind, SubRecord, VecSource,
};

/// One generated channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub type_id: ChannelType,
    pub family: String,
    /// Garbage placed above bit 16 of every raw counter
    pub high_word: u32,
}

impl ChannelSpec {
    pub fn new(type_id: impl Into<ChannelType>, family: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            family: family.into(),
            high_word: 0,
        }
    }

    /// Set the bits above the low 16 of every raw counter
    pub fn with_high_word(mut self, high_word: u32) -> Self {
        self.high_word = high_word;
        self
    }
}

/// Injected counter fault, keyed by channel index and event number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Channel repeats its previous raw counter
    StaleCounter { channel: usize, event: u32 },
    /// Channel reports an arbitrary counter value
    ReplacedCounter {
        channel: usize,
        event: u32,
        trigger_id: u32,
    },
    /// Channel reports a value above the modulus
    HighCounter { channel: usize, event: u32 },
    /// Channel reports zero
    ZeroGlitch { channel: usize, event: u32 },
    /// Reference counter jumps backward by `jump` counts
    ReferenceWrap { event: u32, jump: u32 },
}

impl Fault {
    fn key(&self) -> (usize, u32) {
        match *self {
            Fault::StaleCounter { channel, event }
            | Fault::ReplacedCounter { channel, event, .. }
            | Fault::HighCounter { channel, event }
            | Fault::ZeroGlitch { channel, event } => (channel, event),
            Fault::ReferenceWrap { event, .. } => (0, event),
        }
    }
}

/// Synthetic run builder
#[derive(Debug, Clone)]
pub struct SyntheticRun {
    run_number: u32,
    first_event: u32,
    events: u32,
    counter_bits: u32,
    firmware_tag: String,
    firmware_id: Option<String>,
    firmware: FirmwareConfig,
    channels: Vec<ChannelSpec>,
    faults: Vec<Fault>,
    run_end: bool,
}

impl SyntheticRun {
    /// Run with a reference channel plus `NI` and `PyBAR` channels
    pub fn new(run_number: u32) -> Self {
        Self {
            run_number,
            first_event: 0,
            events: 0,
            counter_bits: 15,
            firmware_tag: "FirmwareID".to_string(),
            firmware_id: None,
            firmware: FirmwareConfig::default(),
            channels: vec![
                ChannelSpec::new("_TLU", ""),
                ChannelSpec::new("NI", "NI"),
                ChannelSpec::new("USBPIXI4", "PyBAR"),
            ],
            faults: Vec::new(),
            run_end: true,
        }
    }

    /// Replace the channel list; the first channel is the reference
    pub fn channels(mut self, channels: Vec<ChannelSpec>) -> Self {
        self.channels = channels;
        self
    }

    pub fn events(mut self, events: u32) -> Self {
        self.events = events;
        self
    }

    pub fn first_event(mut self, first_event: u32) -> Self {
        self.first_event = first_event;
        self
    }

    pub fn counter_bits(mut self, bits: u32) -> Self {
        self.counter_bits = bits;
        self
    }

    /// Firmware id placed in the run-begin tags
    pub fn firmware_id(mut self, id: impl Into<String>) -> Self {
        self.firmware_id = Some(id.into());
        self
    }

    /// Offset table used to derive the counters from the firmware id
    pub fn firmware_config(mut self, firmware: FirmwareConfig) -> Self {
        self.firmware_tag = firmware.tag.clone();
        self.firmware = firmware;
        self
    }

    pub fn fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn faults(mut self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.faults.extend(faults);
        self
    }

    /// Whether to terminate the run with a run-end record
    pub fn run_end(mut self, run_end: bool) -> Self {
        self.run_end = run_end;
        self
    }

    /// Event-numbering offset the generated counters follow
    pub fn event_offset(&self) -> u64 {
        self.firmware.event_offset(self.firmware_id.as_deref())
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Generate all records
    pub fn records(&self) -> Vec<CompositeRecord> {
        let modulus = 1u64 << self.counter_bits;
        let offset = self.event_offset();
        let faults: HashMap<(usize, u32), Fault> =
            self.faults.iter().map(|f| (f.key(), *f)).collect();

        let mut records = Vec::with_capacity(self.events as usize + 2);
        records.push(self.run_begin());

        let mut last_raw: Vec<Option<u32>> = vec![None; self.channels.len()];
        for event in self.first_event..self.first_event.saturating_add(self.events) {
            let natural = ((u64::from(event) + offset) % modulus) as u32;
            let sub_records = self
                .channels
                .iter()
                .enumerate()
                .map(|(idx, spec)| {
                    let raw = match faults.get(&(idx, event)) {
                        Some(Fault::StaleCounter { .. }) => {
                            last_raw[idx].unwrap_or(natural)
                        }
                        Some(Fault::ReplacedCounter { trigger_id, .. }) => *trigger_id,
                        Some(Fault::HighCounter { .. }) => (modulus as u32) + 1 + natural,
                        Some(Fault::ZeroGlitch { .. }) => 0,
                        Some(Fault::ReferenceWrap { jump, .. }) => {
                            let previous = u64::from(last_raw[idx].unwrap_or(natural));
                            ((previous + modulus - u64::from(*jump) % modulus) % modulus) as u32
                        }
                        None => natural,
                    };
                    last_raw[idx] = Some(raw);

                    let trigger_id = raw | (spec.high_word << 16);
                    let mut sub = SubRecord::new(
                        spec.type_id.clone(),
                        spec.family.clone(),
                        event,
                        trigger_id,
                    );
                    sub.payload = Bytes::copy_from_slice(&trigger_id.to_le_bytes());
                    sub
                })
                .collect();

            records.push(CompositeRecord {
                kind: RecordKind::Data,
                run_number: self.run_number,
                event_number: event,
                timestamp: u64::from(event) * 1_000,
                flags: 0,
                tags: BTreeMap::new(),
                sub_records,
            });
        }

        if self.run_end {
            records.push(self.run_end_record());
        }
        records
    }

    /// Generate all records as an in-memory source
    pub fn source(&self) -> VecSource {
        VecSource::new(format!("synthetic-run{:06}", self.run_number), self.records())
    }

    fn run_begin(&self) -> CompositeRecord {
        let mut tags = BTreeMap::new();
        if let Some(id) = &self.firmware_id {
            tags.insert(self.firmware_tag.clone(), id.clone());
        }
        CompositeRecord {
            kind: RecordKind::RunBegin,
            run_number: self.run_number,
            event_number: 0,
            timestamp: 0,
            flags: 0,
            tags,
            sub_records: self
                .channels
                .iter()
                .map(|spec| SubRecord::new(spec.type_id.clone(), spec.family.clone(), 0, 0))
                .collect(),
        }
    }

    fn run_end_record(&self) -> CompositeRecord {
        let event = self.first_event.saturating_add(self.events);
        CompositeRecord {
            kind: RecordKind::RunEnd,
            run_number: self.run_number,
            event_number: event,
            timestamp: u64::from(event) * 1_000,
            flags: 0,
            tags: BTreeMap::new(),
            sub_records: self
                .channels
                .iter()
                .map(|spec| {
                    let mut sub =
                        SubRecord::new(spec.type_id.clone(), spec.family.clone(), event, 0);
                    sub.end_marker = true;
                    sub
                })
                .collect(),
        }
    }
}
