//! Frame-to-telemetry matching.
//!
//! Every telemetry record covers a half-open interval `[start, end)` of video
//! time. A frame at time `t` belongs to the record with `start <= t < end`.
//! A frame landing exactly on a boundary belongs to the record that starts
//! there. Frames before the first record or at/after the last record's end
//! have no telemetry; they are skipped with a warning, which is normal at the
//! tail of a recording where the video outlives its subtitle track.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use geoframes::{FrameMatcher, FrameTiming, ParseOptions, parse_telemetry};
//!
//! let text = "1\n00:00:00,000 --> 00:00:00,500\n\
//!     [latitude: 1.0] [longitude: 2.0] [abs_alt: 3.0] [focal_len: 24.0]\n";
//! let track = parse_telemetry(text, &ParseOptions::default())?;
//! let timing = FrameTiming::from_timestamps(vec![
//!     Duration::ZERO,
//!     Duration::from_millis(400),
//!     Duration::from_millis(500),
//! ]);
//!
//! let mut matcher = FrameMatcher::new(&track, timing.frames());
//! let matched: Vec<u64> = matcher.by_ref().map(|m| m.frame_index).collect();
//! assert_eq!(matched, vec![0, 1]);
//! assert_eq!(matcher.unmatched_count(), 1);
//! # Ok::<(), geoframes::GeoFrameError>(())
//! ```

use std::time::Duration;

use crate::{
    telemetry::{TelemetryRecord, TelemetryTrack, format_timestamp},
    timing::FrameTime,
};

/// How a frame timestamp is looked up in a [`TelemetryTrack`].
///
/// Both strategies return identical results for every valid track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// Binary search over interval starts. `O(log n)` per frame.
    #[default]
    Binary,
    /// Front-to-back scan. `O(n)` per frame; kept as a reference.
    Linear,
}

impl MatchStrategy {
    /// The record whose interval contains `timestamp`, if any.
    pub fn find(self, track: &TelemetryTrack, timestamp: Duration) -> Option<&TelemetryRecord> {
        let records = track.records();
        match self {
            MatchStrategy::Binary => {
                // Number of records starting at or before `timestamp`.
                let candidates = records.partition_point(|r| r.start_time <= timestamp);
                let record = records.get(candidates.checked_sub(1)?)?;
                record.contains(timestamp).then_some(record)
            }
            MatchStrategy::Linear => records.iter().find(|r| r.contains(timestamp)),
        }
    }
}

/// A video frame paired with the telemetry record that covers it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedFrame<'t> {
    /// 0-based frame index.
    pub frame_index: u64,
    /// Presentation time of the frame.
    pub timestamp: Duration,
    /// The record whose interval contains `timestamp`.
    pub record: &'t TelemetryRecord,
}

/// Lazy, single-pass iterator of [`MatchedFrame`] values.
///
/// Frames without telemetry are logged, counted, and skipped.
pub struct FrameMatcher<'t, I> {
    track: &'t TelemetryTrack,
    frames: I,
    strategy: MatchStrategy,
    unmatched: u64,
}

impl<'t, I> FrameMatcher<'t, I>
where
    I: Iterator<Item = FrameTime>,
{
    /// Match `frames` against `track` using binary search.
    pub fn new(track: &'t TelemetryTrack, frames: I) -> Self {
        Self::with_strategy(track, frames, MatchStrategy::Binary)
    }

    /// Match `frames` against `track` with an explicit lookup strategy.
    pub fn with_strategy(track: &'t TelemetryTrack, frames: I, strategy: MatchStrategy) -> Self {
        Self {
            track,
            frames,
            strategy,
            unmatched: 0,
        }
    }

    /// Number of frames skipped so far because no record covered them.
    pub fn unmatched_count(&self) -> u64 {
        self.unmatched
    }
}

impl<'t, I> Iterator for FrameMatcher<'t, I>
where
    I: Iterator<Item = FrameTime>,
{
    type Item = MatchedFrame<'t>;

    fn next(&mut self) -> Option<MatchedFrame<'t>> {
        for frame in self.frames.by_ref() {
            match self.strategy.find(self.track, frame.timestamp) {
                Some(record) => {
                    return Some(MatchedFrame {
                        frame_index: frame.index,
                        timestamp: frame.timestamp,
                        record,
                    });
                }
                None => {
                    self.unmatched += 1;
                    log::warn!(
                        "Frame {} at {} has no telemetry (track covers {} to {}); skipping",
                        frame.index,
                        format_timestamp(frame.timestamp),
                        format_timestamp(self.track.start_time()),
                        format_timestamp(self.track.end_time()),
                    );
                }
            }
        }
        None
    }
}
