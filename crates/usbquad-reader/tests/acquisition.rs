//! End-to-end tests of the acquisition loop against the simulated counter bank.
//!
//! All tests run on paused tokio time, so poll intervals elapse instantly
//! and deterministically.

use std::sync::Arc;
use std::time::Duration;

use tracing_test::traced_test;

use usbquad_core::{
    Axis, ChannelLayout, DeviceClock, ManualClock, PositionRecord, RawCount, ReaderConfig,
    ReaderError, ScanSnapshot, ScanStatus,
};
use usbquad_driver_mock::{CounterBankBuilder, FaultScenario, MotionProfile, SimulatedCounterBank};
use usbquad_reader::{
    demux, stop_channel, AcquisitionCounters, AcquisitionLoop, ChannelSink, ExitReason,
    MemorySink, ScanCursor, SinkMessage, SinkMode,
};

const CLOCK_START_US: i64 = 1_000_000;

fn clock() -> Arc<dyn DeviceClock> {
    Arc::new(ManualClock::new(CLOCK_START_US))
}

fn bank(config: &ReaderConfig) -> CounterBankBuilder {
    CounterBankBuilder::matching(config).scans_per_snapshot(1000)
}

fn build(
    config: ReaderConfig,
    bank: &Arc<SimulatedCounterBank>,
    sink: &MemorySink,
) -> AcquisitionLoop<SimulatedCounterBank, MemorySink> {
    AcquisitionLoop::builder(Arc::clone(bank), sink.clone())
        .config(config)
        .clock(clock())
        .build()
        .unwrap()
}

fn assert_contiguous_timestamps(records: &[PositionRecord], first: i64) {
    for (k, record) in records.iter().enumerate() {
        assert_eq!(record.timestamp, first + k as i64 * 1000, "record {}", k);
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconstructs_motion_until_scan_ends() {
    let config = ReaderConfig::default();
    let bank = Arc::new(
        bank(&config)
            .profile(Axis::X, MotionProfile::ramp(0.0, 10.0))
            .profile(Axis::Y, MotionProfile::ramp(0.0, 100.0))
            .profile(Axis::Z, MotionProfile::sine(4.0, 3.0, 1.0))
            .fault(FaultScenario::StopAfterScans { scans: 3000 })
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();

    let summary = build(config, &bank, &sink).run().await.unwrap();

    assert_eq!(summary.reason, ExitReason::ScanEnded);
    assert_eq!(summary.stats.windows, 3);
    assert_eq!(summary.stats.records, 3000);
    assert_eq!(summary.stats.alignment_errors, 0);
    assert_eq!(sink.batch_sizes(), vec![1000, 1000, 1000]);
    assert_eq!(sink.closed_intervals(), 1);
    assert_eq!(bank.stop_calls(), 1);

    let records = sink.records();
    assert_contiguous_timestamps(&records, CLOCK_START_US + 1);

    for (k, record) in records.iter().enumerate() {
        let scan = k as u64;
        assert!((record.x - bank.expected_position(Axis::X, scan)).abs() < 1e-6);
        assert!((record.z - bank.expected_position(Axis::Z, scan)).abs() < 1e-6);
        // Y crosses one counter wrap; the wrap threshold differs from the
        // counter span by less than a tenth of a millimetre.
        assert!((record.y - bank.expected_position(Axis::Y, scan)).abs() < 0.1);
    }
    assert!(records[2999].y > 299.0);
    assert_eq!(summary.stats.wraps_x, 0);
    assert_eq!(summary.stats.wraps_y, 1);
    assert_eq!(summary.stats.wraps_z, 0);
    assert_eq!(summary.positions.y, records[2999].y);
}

#[tokio::test(start_paused = true)]
async fn test_backward_motion_through_zero() {
    let config = ReaderConfig::default();
    let bank = Arc::new(
        bank(&config)
            .profile(Axis::X, MotionProfile::ramp(5.0, -20.0))
            .fault(FaultScenario::StopAfterScans { scans: 2000 })
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();

    let summary = build(config, &bank, &sink).run().await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2000);
    assert!((records[0].x - bank.expected_position(Axis::X, 0)).abs() < 1e-9);
    assert_eq!(summary.stats.wraps_x, 1);
    // 5 mm minus 20 mm/s for 2 s, off by at most one wrap-threshold error.
    assert!((records[1999].x - bank.expected_position(Axis::X, 1999)).abs() < 0.1);
    assert!(records[1999].x < -34.0);
}

#[tokio::test(start_paused = true)]
async fn test_initial_position_offsets_output() {
    let mut config = ReaderConfig::default();
    config.acquisition.initial_positions.x = 500.0;
    let bank = Arc::new(
        bank(&config)
            .profile(Axis::X, MotionProfile::ramp(0.0, 10.0))
            .fault(FaultScenario::StopAfterScans { scans: 2000 })
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();

    let summary = build(config, &bank, &sink).run().await.unwrap();

    assert_eq!(summary.stats.wraps_x, 0);
    for (k, record) in sink.records().iter().enumerate() {
        let scan = k as u64;
        assert!((record.x - (500.0 + bank.expected_position(Axis::X, scan))).abs() < 1e-6);
    }
}

#[tokio::test(start_paused = true)]
async fn test_not_started_scan_emits_zero_record() {
    let config = ReaderConfig::default();
    let bank = Arc::new(
        bank(&config)
            .profile(Axis::X, MotionProfile::ramp(0.0, 10.0))
            .start_delay_snapshots(1)
            .fault(FaultScenario::StopAfterScans { scans: 1000 })
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();

    let summary = build(config, &bank, &sink).run().await.unwrap();

    let records = sink.records();
    assert_eq!(sink.batch_sizes(), vec![1, 1000]);
    assert_eq!(
        records[0],
        PositionRecord {
            timestamp: CLOCK_START_US + 1,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    );
    assert_contiguous_timestamps(&records, CLOCK_START_US + 1);
    assert_eq!(summary.cursor, 5000);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_disagreeing_z_sample_is_zeroed() {
    let config = ReaderConfig::default();
    let z2 = config.layout.z2;
    let bank = Arc::new(
        bank(&config)
            .profile(Axis::Z, MotionProfile::stationary(1.0))
            .fault(FaultScenario::CorruptChannel {
                channel: z2,
                every_n_scans: 100,
                value: 65_000,
            })
            .fault(FaultScenario::StopAfterScans { scans: 2000 })
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();

    let summary = build(config, &bank, &sink).run().await.unwrap();

    // Scans 100, 200, ..., 1900.
    assert_eq!(summary.stats.disagreements, 19);
    assert!(logs_contain("Z channels disagree"));

    let records = sink.records();
    let true_z = bank.expected_position(Axis::Z, 0);
    for (k, record) in records.iter().enumerate() {
        if k > 0 && k % 100 == 0 {
            // The invalid marker is unwrapped like a real reading.
            assert!(record.z.abs() < 1e-9, "record {} z = {}", k, record.z);
        } else if k > 0 {
            assert!((record.z - true_z).abs() < 1e-9, "record {} z = {}", k, record.z);
        }
    }
    assert_eq!(summary.stats.wraps_z, 0);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_misaligned_window_is_retried() {
    let config = ReaderConfig::default();
    let bank = Arc::new(
        bank(&config)
            .profile(Axis::X, MotionProfile::ramp(0.0, 10.0))
            .fault(FaultScenario::MisalignCursor {
                snapshot: 2,
                offset: 2,
            })
            .fault(FaultScenario::StopAfterScans { scans: 3000 })
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();

    let summary = build(config, &bank, &sink).run().await.unwrap();

    assert_eq!(summary.stats.alignment_errors, 1);
    assert_eq!(summary.stats.polls, 3);
    assert!(logs_contain("Discarding misaligned window"));

    // The discarded window is recovered by the next poll: no gaps.
    assert_eq!(sink.batch_sizes(), vec![1000, 2000]);
    let records = sink.records();
    assert_contiguous_timestamps(&records, CLOCK_START_US + 1);
    for (k, record) in records.iter().enumerate() {
        assert!((record.x - bank.expected_position(Axis::X, k as u64)).abs() < 1e-6);
    }
}

#[tokio::test(start_paused = true)]
async fn test_overrun_is_counted() {
    let mut config = ReaderConfig::default();
    config.acquisition.samples_per_channel = 2000;
    let bank = Arc::new(
        bank(&config)
            .scans_per_snapshot(2500)
            .fault(FaultScenario::StopAfterScans { scans: 5000 })
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();

    let summary = build(config, &bank, &sink).run().await.unwrap();

    assert_eq!(summary.stats.overruns, 2);
    assert_eq!(summary.stats.samples_overwritten, 2 * 500 * 5);
}

#[tokio::test(start_paused = true)]
async fn test_zero_rebases_axis() {
    let config = ReaderConfig::default();
    let bank = Arc::new(
        bank(&config)
            .profile(Axis::X, MotionProfile::ramp(0.0, 10.0))
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();
    let (stop, signal) = stop_channel();
    let acquisition = AcquisitionLoop::builder(Arc::clone(&bank), sink.clone())
        .config(config)
        .clock(clock())
        .stop_signal(signal)
        .build()
        .unwrap();
    let zero = acquisition.zero_handle();
    let task = tokio::spawn(acquisition.run());

    // Two windows land at t = 0 s and t = 1 s.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let baseline = zero.zero(Axis::X).await.unwrap();
    stop.stop();

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.reason, ExitReason::Stopped);
    assert_eq!(summary.stats.zero_requests, 1);
    assert!((baseline - bank.expected_position(Axis::X, 1999)).abs() < 1e-6);
    assert_eq!(summary.baseline.x, baseline);
    assert_eq!(summary.baseline.y, 0.0);

    let records = sink.records();
    assert!(records.len() >= 3000);
    for (k, record) in records.iter().enumerate() {
        let accumulated = bank.expected_position(Axis::X, k as u64);
        let expected = if k < 2000 {
            accumulated
        } else {
            accumulated - baseline
        };
        assert!((record.x - expected).abs() < 1e-6, "record {}", k);
    }
    assert!(records[2000].x > 0.0 && records[2000].x < 0.1);
    assert_eq!(bank.stop_calls(), 1);

    // The loop is gone; further commands fail.
    assert!(matches!(
        zero.zero_all().await.unwrap_err(),
        ReaderError::NotRunning
    ));
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_poll() {
    let config = ReaderConfig::default();
    let bank = Arc::new(bank(&config).build().unwrap());
    let sink = MemorySink::new();
    let (stop, signal) = stop_channel();
    stop.stop();

    let summary = AcquisitionLoop::builder(Arc::clone(&bank), sink.clone())
        .config(config)
        .clock(clock())
        .stop_signal(signal)
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.reason, ExitReason::Stopped);
    assert_eq!(summary.stats.polls, 0);
    assert_eq!(bank.start_calls(), 1);
    assert_eq!(bank.stop_calls(), 1);
    assert_eq!(sink.closed_intervals(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_source_failure_releases_scan() {
    let config = ReaderConfig::default();
    let bank = Arc::new(
        bank(&config)
            .fault(FaultScenario::FailAfterSnapshots { count: 2 })
            .build()
            .unwrap(),
    );
    let sink = MemorySink::new();

    let err = build(config, &bank, &sink).run().await.unwrap_err();

    assert!(matches!(err, ReaderError::Source { .. }));
    assert_eq!(sink.records().len(), 2000);
    assert_eq!(sink.closed_intervals(), 1);
    assert_eq!(bank.stop_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_still_closes_interval() {
    let config = ReaderConfig::default();
    let bank = Arc::new(bank(&config).fault(FaultScenario::FailOnStart).build().unwrap());
    let sink = MemorySink::new();

    let err = build(config, &bank, &sink).run().await.unwrap_err();

    assert!(matches!(err, ReaderError::Source { .. }));
    assert_eq!(bank.stop_calls(), 0);
    assert_eq!(sink.closed_intervals(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_is_terminal() {
    let config = ReaderConfig::default();
    let bank = Arc::new(bank(&config).build().unwrap());
    let sink = MemorySink::failing_after(1);

    let err = build(config, &bank, &sink).run().await.unwrap_err();

    assert!(matches!(err, ReaderError::Sink { .. }));
    assert_eq!(sink.batch_count(), 1);
    assert_eq!(bank.stop_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_channel_sink_consumer() {
    let config = ReaderConfig::default();
    let bank = Arc::new(
        bank(&config)
            .fault(FaultScenario::StopAfterScans { scans: 4000 })
            .build()
            .unwrap(),
    );
    let counters = Arc::new(AcquisitionCounters::new());
    let (sink, mut rx) = ChannelSink::new("consumer", 1, SinkMode::Blocking);

    let consumer = tokio::spawn(async move {
        let mut sequences = Vec::new();
        let mut records = 0;
        while let Some(message) = rx.recv().await {
            match message {
                SinkMessage::Batch(batch) => {
                    sequences.push(batch.sequence);
                    records += batch.records.len();
                }
                SinkMessage::IntervalClosed => break,
            }
        }
        (sequences, records)
    });

    let summary = AcquisitionLoop::builder(Arc::clone(&bank), sink)
        .config(config)
        .clock(clock())
        .counters(Arc::clone(&counters))
        .build()
        .unwrap()
        .run()
        .await
        .unwrap();

    let (sequences, records) = consumer.await.unwrap();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
    assert_eq!(records, 4000);
    assert_eq!(summary.stats.records_dropped, 0);
    assert_eq!(counters.snapshot().windows, 4);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn test_lossy_sink_with_stalled_consumer() {
    let config = ReaderConfig::default();
    let bank = Arc::new(
        bank(&config)
            .fault(FaultScenario::StopAfterScans { scans: 4000 })
            .build()
            .unwrap(),
    );
    // Kept alive but never read until the loop is done.
    let (sink, mut rx) = ChannelSink::new("stalled", 1, SinkMode::Lossy);

    let acquisition = AcquisitionLoop::builder(Arc::clone(&bank), sink)
        .config(config)
        .clock(clock())
        .build()
        .unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(3600), acquisition.run())
        .await
        .expect("loop must exit with a full lossy sink")
        .unwrap();

    assert_eq!(summary.reason, ExitReason::ScanEnded);
    assert_eq!(summary.stats.records, 4000);
    assert_eq!(summary.stats.batches_dropped, 3);
    assert_eq!(summary.stats.records_dropped, 3000);
    assert_eq!(summary.stats.interval_closes_dropped, 1);
    assert!(logs_contain("Dropped batch (sink full)"));
    assert_eq!(bank.stop_calls(), 1);

    // Only the first batch got through; the end of the interval shows as
    // the channel closing.
    let mut delivered = 0;
    while let Some(message) = rx.recv().await {
        match message {
            SinkMessage::Batch(batch) => {
                assert_eq!(batch.sequence, 0);
                delivered += batch.records.len() as u64;
            }
            SinkMessage::IntervalClosed => panic!("close marker should have been dropped"),
        }
    }
    assert_eq!(delivered + summary.stats.records_dropped, summary.stats.records);
}

#[test]
fn test_wrapped_window_not_multiple_of_stride_is_rejected() {
    // 10-sample buffer read at 8, written up to 2: four samples, five channels.
    let snapshot = |index: i64| ScanSnapshot {
        status: ScanStatus::Running,
        current_index: index,
        total_count: None,
        buffer: Arc::from((0..10).collect::<Vec<RawCount>>()),
    };
    let layout = ChannelLayout::default();
    let mut cursor = ScanCursor::new();
    let first = cursor.pending(&snapshot(8), layout.stride);
    cursor.commit(&first);
    assert_eq!(cursor.prev_index(), 8);

    let pending = cursor.pending(&snapshot(2), layout.stride);
    assert_eq!(pending.samples, vec![8, 9, 0, 1]);

    let err = demux(&pending.samples, &layout).unwrap_err();
    assert!(matches!(
        err,
        ReaderError::MisalignedWindow { len: 4, stride: 5 }
    ));
    assert!(err.is_retryable());
    assert_eq!(cursor.prev_index(), 8);
}

#[test]
fn test_build_rejects_layout_mismatch() {
    let config = ReaderConfig::default();
    let four_channel = ChannelLayout {
        stride: 4,
        extruder: None,
        ..ChannelLayout::default()
    };
    let bank = Arc::new(
        CounterBankBuilder::matching(&config)
            .layout(four_channel)
            .build()
            .unwrap(),
    );
    let result = AcquisitionLoop::builder(bank, MemorySink::new())
        .config(config)
        .build();
    assert!(result.err().is_some_and(|e| e.is_configuration()));
}

#[test]
fn test_build_rejects_invalid_calibration() {
    let mut config = ReaderConfig::default();
    config.axes.z.wrap_guard = 20.0;
    let bank = Arc::new(CounterBankBuilder::matching(&config).build().unwrap());
    let result = AcquisitionLoop::builder(bank, MemorySink::new())
        .config(config)
        .build();
    assert!(result.err().is_some_and(|e| e.is_configuration()));
}
