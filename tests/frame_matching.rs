//! Frame timing and frame-to-telemetry matching tests.

use std::time::Duration;

use geoframes::{
    FrameMatcher, FrameRate, FrameSampling, FrameTiming, GeoFrameError, MatchStrategy,
    TelemetryRecord, TelemetryTrack,
};

fn record(index: u64, start_ms: u64, end_ms: u64, latitude: f64) -> TelemetryRecord {
    TelemetryRecord {
        sequence_index: index,
        start_time: Duration::from_millis(start_ms),
        end_time: Duration::from_millis(end_ms),
        latitude,
        longitude: -74.0,
        altitude: 50.0,
        focal_length: 24.0,
    }
}

/// Two adjacent half-second blocks.
fn two_blocks() -> TelemetryTrack {
    TelemetryTrack::new(vec![record(1, 0, 500, 40.0), record(2, 500, 1_000, 41.0)]).unwrap()
}

fn millis(values: &[u64]) -> FrameTiming {
    FrameTiming::from_timestamps(values.iter().map(|&ms| Duration::from_millis(ms)).collect())
}

#[test]
fn boundary_frame_belongs_to_the_block_that_starts_there() {
    let track = two_blocks();
    let timing = millis(&[0, 400, 500, 999, 1_000]);

    let mut matcher = FrameMatcher::new(&track, timing.frames());
    let matched: Vec<(u64, u64)> = matcher
        .by_ref()
        .map(|m| (m.frame_index, m.record.sequence_index))
        .collect();

    assert_eq!(matched, vec![(0, 1), (1, 1), (2, 2), (3, 2)]);
    assert_eq!(matcher.unmatched_count(), 1);
}

#[test]
fn frames_before_first_block_and_in_gaps_are_unmatched() {
    let track =
        TelemetryTrack::new(vec![record(1, 100, 200, 1.0), record(2, 300, 400, 2.0)]).unwrap();
    // from_timestamps shifts the earliest frame to zero, so include it.
    let timing = millis(&[0, 50, 150, 250, 350, 450]);

    let mut matcher = FrameMatcher::new(&track, timing.frames());
    let indices: Vec<u64> = matcher.by_ref().map(|m| m.frame_index).collect();

    assert_eq!(indices, vec![2, 4]);
    assert_eq!(matcher.unmatched_count(), 4);
}

#[test]
fn binary_and_linear_strategies_agree() {
    let records: Vec<TelemetryRecord> = (0..200)
        .map(|i| {
            // Every fifth block leaves a 7 ms gap after itself.
            let start = i * 40 + (i / 5) * 7;
            record(i + 1, start, start + 40, 1.0)
        })
        .collect();
    let track = TelemetryTrack::new(records).unwrap();

    for step in 0..10_000u64 {
        let timestamp = Duration::from_micros(step * 997);
        let binary = MatchStrategy::Binary.find(&track, timestamp);
        let linear = MatchStrategy::Linear.find(&track, timestamp);
        assert_eq!(
            binary.map(|r| r.sequence_index),
            linear.map(|r| r.sequence_index),
            "disagreement at {timestamp:?}"
        );
    }
}

#[test]
fn matcher_with_linear_strategy_matches_binary() {
    let track = two_blocks();
    let timing = FrameTiming::Constant {
        rate: FrameRate::from_integer(30).unwrap(),
        frame_count: 40,
    };

    let binary: Vec<u64> = FrameMatcher::new(&track, timing.frames())
        .map(|m| m.record.sequence_index)
        .collect();
    let linear: Vec<u64> =
        FrameMatcher::with_strategy(&track, timing.frames(), MatchStrategy::Linear)
            .map(|m| m.record.sequence_index)
            .collect();

    // 30 frames fall inside the one-second track.
    assert_eq!(binary.len(), 30);
    assert_eq!(binary, linear);
    assert_eq!(binary.iter().filter(|&&s| s == 1).count(), 15);
}

#[test]
fn ntsc_rate_timestamps_do_not_drift() {
    let rate = FrameRate::new(30_000, 1_001).unwrap();

    assert_eq!(rate.frame_timestamp(0), Duration::ZERO);
    assert_eq!(rate.frame_timestamp(30_000), Duration::from_secs(1_001));
    // One hour of footage lands on an exact nanosecond count.
    assert_eq!(
        rate.frame_timestamp(107_892),
        Duration::from_nanos(107_892 * 1_001 * 1_000_000_000 / 30_000)
    );
    assert_eq!(rate.frames_in(Duration::from_secs(1_001)), 30_000);
}

#[test]
fn frame_rate_rejects_zero_parts() {
    assert!(FrameRate::new(0, 1).is_none());
    assert!(FrameRate::new(30, 0).is_none());
    assert_eq!(FrameRate::from_integer(25).unwrap().as_f64(), 25.0);
}

#[test]
fn constant_timing_exposes_count_and_timestamps() {
    let timing = FrameTiming::Constant {
        rate: FrameRate::from_integer(25).unwrap(),
        frame_count: 3,
    };
    assert_eq!(timing.frame_count(), 3);
    assert_eq!(timing.timestamp(2), Some(Duration::from_millis(80)));
    assert_eq!(timing.timestamp(3), None);
    assert_eq!(timing.frames().count(), 3);
}

#[test]
fn native_timestamps_are_sorted_and_rebased() {
    let timing = millis(&[1_080, 1_000, 1_040]);
    let times: Vec<(u64, Duration)> = timing.frames().map(|f| (f.index, f.timestamp)).collect();
    assert_eq!(
        times,
        vec![
            (0, Duration::ZERO),
            (1, Duration::from_millis(40)),
            (2, Duration::from_millis(80)),
        ]
    );
    assert_eq!(timing.frame_rate(), None);
}

#[test]
fn every_nth_sampling_keeps_multiples() {
    let timing = FrameTiming::Constant {
        rate: FrameRate::from_integer(30).unwrap(),
        frame_count: 10,
    };
    let indices: Vec<u64> = timing
        .sampled(FrameSampling::EveryNth(4))
        .unwrap()
        .map(|f| f.index)
        .collect();
    assert_eq!(indices, vec![0, 4, 8]);
}

#[test]
fn interval_sampling_takes_first_frame_at_or_after_each_mark() {
    // Irregular spacing: marks at 0, 100, 200 and 300 ms.
    let timing = millis(&[0, 30, 90, 120, 150, 310, 320]);
    let indices: Vec<u64> = timing
        .sampled(FrameSampling::Interval(Duration::from_millis(100)))
        .unwrap()
        .map(|f| f.index)
        .collect();
    // 310 ms covers both the 200 and 300 ms marks.
    assert_eq!(indices, vec![0, 3, 5]);
}

#[test]
fn zero_sampling_steps_are_rejected() {
    let timing = millis(&[0, 10]);
    assert!(matches!(
        timing.sampled(FrameSampling::EveryNth(0)),
        Err(GeoFrameError::InvalidInterval)
    ));
    assert!(matches!(
        timing.sampled(FrameSampling::Interval(Duration::ZERO)),
        Err(GeoFrameError::InvalidInterval)
    ));
}

#[test]
fn record_lookup_on_track() {
    let track = two_blocks();
    assert_eq!(track.start_time(), Duration::ZERO);
    assert_eq!(track.end_time(), Duration::from_secs(1));
    assert_eq!(
        track
            .record_at(Duration::from_millis(500))
            .map(|r| r.sequence_index),
        Some(2)
    );
    assert!(track.record_at(Duration::from_secs(1)).is_none());
}
