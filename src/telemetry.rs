//! Telemetry records and the immutable track that holds them.
//!
//! A [`TelemetryRecord`] is one subtitle block's worth of GPS and camera
//! data, valid for a half-open interval of video time. A [`TelemetryTrack`]
//! owns the ordered records for a whole run. It can only be built through a
//! validating constructor and exposes no way to mutate its records, so every
//! frame of a conversion reads the same data.

use std::{ops::Deref, time::Duration};

use crate::{error::GeoFrameError, matcher::MatchStrategy};

/// One telemetry sample covering `[start_time, end_time)` of the video.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Sequence index from the subtitle block header.
    pub sequence_index: u64,
    /// Start of the interval this record describes (inclusive).
    pub start_time: Duration,
    /// End of the interval this record describes (exclusive).
    pub end_time: Duration,
    /// Latitude in signed decimal degrees, south negative.
    pub latitude: f64,
    /// Longitude in signed decimal degrees, west negative.
    pub longitude: f64,
    /// Altitude in metres, exactly as reported by the drone.
    pub altitude: f64,
    /// Lens focal length in millimetres.
    pub focal_length: f64,
}

impl TelemetryRecord {
    /// Whether `timestamp` falls inside this record's closed-open interval.
    pub fn contains(&self, timestamp: Duration) -> bool {
        self.start_time <= timestamp && timestamp < self.end_time
    }

    /// The drone reports `0.0, 0.0` when it has no satellite fix.
    pub fn has_gps_fix(&self) -> bool {
        self.latitude != 0.0 || self.longitude != 0.0
    }

    /// Check the record's own invariants.
    ///
    /// Returns the offending field name and a description on failure.
    pub(crate) fn check(&self) -> Result<(), (&'static str, String)> {
        if self.start_time >= self.end_time {
            return Err((
                "time range",
                format!(
                    "start {} is not before end {}",
                    format_timestamp(self.start_time),
                    format_timestamp(self.end_time)
                ),
            ));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(("latitude", format!("{} is outside [-90, 90]", self.latitude)));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err((
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        if !self.altitude.is_finite() {
            return Err(("altitude", format!("{} is not a finite number", self.altitude)));
        }
        if !self.focal_length.is_finite() || self.focal_length <= 0.0 {
            return Err((
                "focal length",
                format!("{} must be a positive number", self.focal_length),
            ));
        }
        Ok(())
    }

    /// Check ordering against the record that precedes this one.
    pub(crate) fn check_follows(
        &self,
        previous: &TelemetryRecord,
    ) -> Result<(), (&'static str, String)> {
        if self.sequence_index <= previous.sequence_index {
            return Err((
                "sequence index",
                format!(
                    "{} does not increase on previous index {}",
                    self.sequence_index, previous.sequence_index
                ),
            ));
        }
        if self.start_time < previous.end_time {
            return Err((
                "time range",
                format!(
                    "start {} overlaps previous block ending at {}",
                    format_timestamp(self.start_time),
                    format_timestamp(previous.end_time)
                ),
            ));
        }
        Ok(())
    }
}

/// An immutable, validated, time-ordered sequence of telemetry records.
///
/// Invariants, checked on construction:
///
/// - at least one record;
/// - sequence indices strictly increase;
/// - every interval is non-empty (`start < end`);
/// - intervals never overlap and never go backwards in time.
///
/// The track dereferences to `&[TelemetryRecord]` for read-only access.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryTrack {
    records: Vec<TelemetryRecord>,
}

impl TelemetryTrack {
    /// Build a track from records, checking every invariant.
    ///
    /// # Errors
    ///
    /// - [`GeoFrameError::EmptyTelemetry`] if `records` is empty.
    /// - [`GeoFrameError::TelemetryParse`] naming the first record that
    ///   breaks an invariant.
    pub fn new(records: Vec<TelemetryRecord>) -> Result<Self, GeoFrameError> {
        if records.is_empty() {
            return Err(GeoFrameError::EmptyTelemetry);
        }

        let mut previous: Option<&TelemetryRecord> = None;
        for record in &records {
            let checked = record
                .check()
                .and_then(|()| previous.map_or(Ok(()), |prev| record.check_follows(prev)));
            if let Err((field, reason)) = checked {
                return Err(GeoFrameError::TelemetryParse {
                    block: record.sequence_index,
                    line: None,
                    field,
                    reason,
                });
            }
            previous = Some(record);
        }

        Ok(Self { records })
    }

    /// Wrap records the parser has already validated one by one.
    pub(crate) fn from_checked(records: Vec<TelemetryRecord>) -> Self {
        debug_assert!(!records.is_empty());
        Self { records }
    }

    /// All records, in time order.
    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    /// Start of the first record's interval.
    pub fn start_time(&self) -> Duration {
        self.records[0].start_time
    }

    /// End of the last record's interval.
    pub fn end_time(&self) -> Duration {
        self.records[self.records.len() - 1].end_time
    }

    /// The record whose interval contains `timestamp`, if any.
    ///
    /// Uses binary search over interval starts.
    pub fn record_at(&self, timestamp: Duration) -> Option<&TelemetryRecord> {
        MatchStrategy::Binary.find(self, timestamp)
    }
}

impl Deref for TelemetryTrack {
    type Target = [TelemetryRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl<'a> IntoIterator for &'a TelemetryTrack {
    type Item = &'a TelemetryRecord;
    type IntoIter = std::slice::Iter<'a, TelemetryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Format a duration as an SRT timestamp, `HH:MM:SS,mmm`.
pub fn format_timestamp(timestamp: Duration) -> String {
    let total_ms = timestamp.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1_000) % 60;
    let millis = total_ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}
