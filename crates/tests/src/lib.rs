//! # Integration Tests
//!
//! Cross-crate tests for the trigger-number synchronizer.
//!
//! Covers:
//! - configuration contracts shared by the loader and the engine
//! - whole-run synchronization of generated runs
//! - file-to-file runs through the dispatcher
//! - randomized fault injection

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{FirmwareConfig, QuirkConfig, QuirkPolicy, SyncEngineConfig};
    use ingestion::SyntheticRun;

    #[test]
    fn test_default_config_survives_toml() {
        let config = SyncEngineConfig::default();
        let toml = ConfigLoader::to_toml(&config).unwrap();
        let loaded = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_custom_config_survives_json() {
        let config = SyncEngineConfig {
            counter_bits: 16,
            quirks: vec![QuirkConfig::policy("NI", QuirkPolicy::SingleSkip)],
            ..Default::default()
        };
        let json = ConfigLoader::to_json(&config).unwrap();
        let loaded = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(loaded.modulus(), 65536);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_generator_follows_firmware_offset() {
        let firmware = FirmwareConfig::default();
        let legacy = SyntheticRun::new(1).firmware_id("0x0A");
        let current = SyntheticRun::new(1).firmware_id("0x10");

        assert_eq!(legacy.event_offset(), firmware.event_offset(Some("0x0A")));
        assert_eq!(current.event_offset(), firmware.event_offset(Some("0x10")));
        assert_ne!(legacy.event_offset(), current.event_offset());
    }

    #[test]
    fn test_loaded_config_drives_engine() {
        let toml = "counter_bits = 16\n";
        let config = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();

        let mut source = SyntheticRun::new(9)
            .counter_bits(16)
            .first_event(65_000)
            .events(1_000)
            .source();
        let (report, events) = sync_engine::synchronize(&mut source, config).unwrap();

        assert_eq!(report.stats.events_discarded, 0);
        assert_eq!(events.len(), 1_001);
        assert!(report.residual.is_empty());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::HashMap;

    use contracts::{
        ChannelType, EventSkeleton, RecordKind, SinkConfig, SinkType, SyncEngineConfig,
    };
    use dispatcher::{create_dispatcher, DispatchItem};
    use ingestion::{ChannelSpec, Fault, SyntheticRun};
    use sync_engine::{synchronize, StreamSynchronizer};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn data_events(events: &[EventSkeleton]) -> Vec<u32> {
        events
            .iter()
            .filter(|e| e.kind == RecordKind::Data)
            .map(|e| e.event_number)
            .collect()
    }

    #[test]
    fn test_clean_run_merges_everything() {
        let mut source = SyntheticRun::new(1).events(500).source();
        let (report, events) = synchronize(&mut source, SyncEngineConfig::default()).unwrap();

        assert_eq!(data_events(&events), (0..500).collect::<Vec<_>>());
        assert_eq!(report.stats.mismatch_cycles, 0);
        assert_eq!(report.stats.events_drained, 0);
        for event in &events {
            assert_eq!(event.sub_records.len(), 3);
        }
    }

    #[test]
    fn test_counter_wrap_is_transparent() {
        let mut source = SyntheticRun::new(2).first_event(32_700).events(200).source();
        let (report, events) = synchronize(&mut source, SyncEngineConfig::default()).unwrap();

        assert_eq!(data_events(&events).len(), 200);
        assert_eq!(report.stats.events_discarded, 0);
        // One wraparound on each counting channel
        assert!(report.stats.channels[1..].iter().all(|c| c.wraparounds == 1));
    }

    #[test]
    fn test_stale_counter_costs_one_event() {
        let mut source = SyntheticRun::new(3)
            .events(60)
            .fault(Fault::StaleCounter { channel: 1, event: 30 })
            .source();
        let (report, events) = synchronize(&mut source, SyncEngineConfig::default()).unwrap();

        let numbers = data_events(&events);
        assert_eq!(numbers.len(), 59);
        assert!(!numbers.contains(&30));
        assert_eq!(report.stats.events_discarded, 1);
        assert_eq!(report.stats.events_drained, 1);
        assert_eq!(report.stats.channels[1].single_skip, 1);
        assert!(report.residual.is_empty());
    }

    #[test]
    fn test_high_counter_on_masked_family() {
        let channels = vec![
            ChannelSpec::new("_TLU", ""),
            ChannelSpec::new("USBPIXI4", "PyBAR").with_high_word(0xABCD),
        ];
        let mut source = SyntheticRun::new(4)
            .channels(channels)
            .events(80)
            .fault(Fault::HighCounter { channel: 1, event: 50 })
            .source();
        let (report, events) = synchronize(&mut source, SyncEngineConfig::default()).unwrap();

        let numbers = data_events(&events);
        assert_eq!(numbers.len(), 79);
        assert!(!numbers.contains(&50));
        assert_eq!(report.stats.channels[1].high_counter, 1);
    }

    #[test]
    fn test_truncated_run_drains_buffer() {
        let mut source = SyntheticRun::new(5)
            .events(40)
            .fault(Fault::StaleCounter { channel: 2, event: 10 })
            .run_end(false)
            .source();
        let (report, events) = synchronize(&mut source, SyncEngineConfig::default()).unwrap();

        assert_eq!(data_events(&events).len(), 39);
        assert!(report.stats.events_drained >= 1);
        assert!(report.residual.is_empty());
    }

    #[test]
    fn test_merged_event_keeps_channel_order() {
        let mut sync = StreamSynchronizer::from_run_begin(
            &SyntheticRun::new(6).records()[0],
            SyncEngineConfig::default(),
        )
        .unwrap();
        let records = SyntheticRun::new(6).events(3).records();

        let event = sync.ingest(records[1].clone()).unwrap().unwrap();
        let types: Vec<&ChannelType> = event.sub_records.iter().map(|s| &s.type_id).collect();
        assert_eq!(
            types,
            vec![
                &ChannelType::new("_TLU"),
                &ChannelType::new("NI"),
                &ChannelType::new("USBPIXI4")
            ]
        );
    }

    #[tokio::test]
    async fn test_file_run_through_dispatcher() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("run000007.trun");
        let output = dir.path().join("out").join("run000007.trun");
        std::fs::create_dir_all(output.parent().unwrap()).unwrap();

        let generated = SyntheticRun::new(7)
            .events(120)
            .fault(Fault::StaleCounter { channel: 1, event: 60 })
            .records();
        {
            let mut writer = ingestion::create_writer(&input).unwrap();
            for record in &generated {
                writer.write_record(record).unwrap();
            }
            writer.flush().unwrap();
        }

        let mut params = HashMap::new();
        params.insert("path".to_string(), output.display().to_string());
        let sink = SinkConfig {
            name: "output".to_string(),
            sink_type: SinkType::RunFile,
            queue_capacity: 8,
            params,
        };
        let (tx, rx) = mpsc::channel(8);
        let dispatcher = create_dispatcher(vec![sink], rx).await.unwrap();
        let task = dispatcher.spawn();

        let mut source = ingestion::open_source(&input).unwrap();
        let (report, events) = synchronize(&mut source, SyncEngineConfig::default()).unwrap();
        tx.send(DispatchItem::run_begin(report.run_begin.clone()))
            .await
            .unwrap();
        for event in events.iter().cloned() {
            tx.send(DispatchItem::event(event)).await.unwrap();
        }
        drop(tx);

        let summary = task.await.unwrap();
        assert_eq!(summary.items, events.len() as u64 + 1);
        assert_eq!(summary.total_failures(), 0);

        let mut written = ingestion::open_source(&output).unwrap();
        let begin = written.next_record().unwrap().unwrap();
        assert!(begin.is_run_begin());
        assert_eq!(begin.run_number, 7);

        let mut read_back = Vec::new();
        while let Some(record) = written.next_record().unwrap() {
            read_back.push(record);
        }
        assert_eq!(read_back.len(), events.len());
        for (record, event) in read_back.iter().zip(&events) {
            assert_eq!(record.event_number, event.event_number);
            assert_eq!(record.sub_records, event.sub_records);
        }
        assert!(read_back.iter().all(|r| r.event_number != 60));
    }
}

#[cfg(test)]
mod fault_injection_tests {
    use std::collections::BTreeSet;

    use contracts::{RecordKind, SyncEngineConfig};
    use ingestion::{ChannelSpec, Fault, SyntheticRun};
    use observability::SyncMetricsAggregator;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use sync_engine::{scan_first_mismatches, StreamSynchronizer};

    const EVENTS: u32 = 3_000;
    const FIRST_EVENT: u32 = 31_000;
    const MIN_GAP: u32 = 6;

    fn channels() -> Vec<ChannelSpec> {
        vec![
            ChannelSpec::new("_TLU", ""),
            ChannelSpec::new("NI", "NI"),
            ChannelSpec::new("USBPIXI4", "PyBAR").with_high_word(0x1234),
            ChannelSpec::new("DEPFE5", "DEPFE5"),
            ChannelSpec::new("TEL", ""),
        ]
    }

    /// Faults the corrections are expected to absorb at a cost of one event each
    fn random_faults(rng: &mut StdRng, offset: u64, modulus: u64) -> Vec<Fault> {
        let mut faults = Vec::new();
        let mut event = FIRST_EVENT + 10;
        let last = FIRST_EVENT + EVENTS - 10;
        loop {
            event += rng.random_range(MIN_GAP..MIN_GAP + 120);
            if event >= last {
                break;
            }
            // Counter values next to the wrap look like wraparounds
            let natural = (u64::from(event) + offset) % modulus;
            if natural < 40 || natural > modulus - 40 {
                continue;
            }
            let channel = rng.random_range(1..5usize);
            let fault = match (channel, rng.random_bool(0.5)) {
                (1, _) => Fault::StaleCounter { channel, event },
                (3, true) => Fault::ZeroGlitch { channel, event },
                (_, true) => Fault::StaleCounter { channel, event },
                (_, false) => Fault::HighCounter { channel, event },
            };
            faults.push(fault);
        }
        faults
    }

    fn fault_event(fault: &Fault) -> (usize, u32) {
        match *fault {
            Fault::StaleCounter { channel, event }
            | Fault::HighCounter { channel, event }
            | Fault::ZeroGlitch { channel, event }
            | Fault::ReplacedCounter { channel, event, .. } => (channel, event),
            Fault::ReferenceWrap { event, .. } => (0, event),
        }
    }

    #[test]
    fn test_random_faults_keep_invariants() {
        let config = SyncEngineConfig::default();
        let modulus = config.modulus();

        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let run = SyntheticRun::new(100 + seed as u32)
                .channels(channels())
                .first_event(FIRST_EVENT)
                .events(EVENTS);
            let offset = run.event_offset();
            let faults = random_faults(&mut rng, offset, modulus);
            let faulty: BTreeSet<u32> = faults.iter().map(|f| fault_event(f).1).collect();
            let records = run.faults(faults.clone()).records();

            let mut sync =
                StreamSynchronizer::from_run_begin(&records[0], config.clone()).unwrap();
            let mut aggregator = SyncMetricsAggregator::new();
            let mut events = Vec::new();
            for record in records[1..].iter().cloned() {
                events.extend(sync.ingest(record).unwrap());
                aggregator.update(sync.global_depth(), sync.channel_depths());
            }
            events.extend(sync.drain());

            let stats = sync.stats();
            assert_eq!(stats.events_discarded, faults.len() as u64, "seed {seed}");
            assert_eq!(events.len() as u64, u64::from(EVENTS) - faults.len() as u64 + 1);
            assert!(sync.residual().is_empty(), "seed {seed}");

            // Strictly increasing event numbers: no duplicates, FIFO order
            assert!(events.windows(2).all(|w| w[0].event_number < w[1].event_number));

            for event in events.iter().filter(|e| e.kind == RecordKind::Data) {
                assert!(!faulty.contains(&event.event_number), "seed {seed}");
                let expected = (u64::from(event.event_number) + offset) % modulus;
                assert_eq!(event.sub_records[0].event_number, event.event_number);
                for sub in &event.sub_records[1..] {
                    assert_eq!(u64::from(sub.trigger_id & 0xFFFF), expected, "seed {seed}");
                    assert_eq!(sub.event_number, event.event_number, "seed {seed}");
                }
            }

            for channel in &stats.channels {
                assert_eq!(channel.merged + channel.discarded, stats.records_ingested);
            }

            let summary = aggregator.summary(&stats, &sync.residual());
            assert!(summary.global_depth.max <= faults.len() as f64 + 2.0);
        }
    }

    #[test]
    fn test_scan_finds_first_fault_per_channel() {
        let config = SyncEngineConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        let run = SyntheticRun::new(77)
            .channels(channels())
            .first_event(FIRST_EVENT)
            .events(EVENTS);
        let faults = random_faults(&mut rng, run.event_offset(), config.modulus());

        let mut first: Vec<Option<u32>> = vec![None; 5];
        for fault in &faults {
            let (channel, event) = fault_event(fault);
            first[channel] = Some(first[channel].map_or(event, |e| e.min(event)));
        }

        let mut source = run.faults(faults).source();
        let report = scan_first_mismatches(&mut source, &config, Some(77)).unwrap();

        assert!(report.run_number_mismatch.is_none());
        assert_eq!(report.events, u64::from(EVENTS));
        for (index, expected) in first.iter().enumerate().skip(1) {
            let found = report
                .channels
                .iter()
                .find(|c| c.index == index)
                .map(|c| c.first_event);
            assert_eq!(found, *expected, "channel {index}");
        }
    }
}
