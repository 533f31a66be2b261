//! Per-frame video timing.
//!
//! A decoder reports timing either as a constant frame rate plus a frame
//! count, or as one presentation timestamp per frame. [`FrameTiming`] holds
//! either form and normalizes both to a sequence of [`FrameTime`] values,
//! one per frame index, with frame 0 at video time zero.
//!
//! Constant-rate timestamps are computed with integer arithmetic on the
//! rational frame rate so that `29.97` fps footage does not drift across
//! long recordings.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

use crate::error::GeoFrameError;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// A frame rate expressed as an exact ratio (e.g. `30000/1001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    numerator: u32,
    denominator: u32,
}

impl FrameRate {
    /// Create a frame rate of `numerator / denominator` frames per second.
    ///
    /// Returns `None` if either part is zero.
    pub fn new(numerator: u32, denominator: u32) -> Option<Self> {
        (numerator > 0 && denominator > 0).then_some(Self {
            numerator,
            denominator,
        })
    }

    /// Whole frames per second.
    pub fn from_integer(frames_per_second: u32) -> Option<Self> {
        Self::new(frames_per_second, 1)
    }

    /// Numerator of the ratio.
    pub fn numerator(self) -> u32 {
        self.numerator
    }

    /// Denominator of the ratio.
    pub fn denominator(self) -> u32 {
        self.denominator
    }

    /// Frames per second as a float, for display.
    pub fn as_f64(self) -> f64 {
        f64::from(self.numerator) / f64::from(self.denominator)
    }

    /// Presentation time of frame `index`.
    pub fn frame_timestamp(self, index: u64) -> Duration {
        let nanos = u128::from(index) * u128::from(self.denominator) * NANOS_PER_SECOND
            / u128::from(self.numerator);
        duration_from_nanos(nanos)
    }

    /// Number of whole frames in `interval`, rounded to nearest.
    pub fn frames_in(self, interval: Duration) -> u64 {
        let scaled = interval.as_nanos() * u128::from(self.numerator);
        let divisor = u128::from(self.denominator) * NANOS_PER_SECOND;
        ((scaled + divisor / 2) / divisor) as u64
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:.3} fps", self.as_f64())
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    let seconds = (nanos / NANOS_PER_SECOND) as u64;
    let remainder = (nanos % NANOS_PER_SECOND) as u32;
    Duration::new(seconds, remainder)
}

/// One frame's index and presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTime {
    /// 0-based frame index in presentation order.
    pub index: u64,
    /// Presentation time relative to the first frame.
    pub timestamp: Duration,
}

/// Timing information for every frame of a video.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameTiming {
    /// A fixed frame rate and a total frame count.
    Constant {
        /// The stream's frame rate.
        rate: FrameRate,
        /// Number of frames in the stream.
        frame_count: u64,
    },
    /// Native per-frame timestamps, in presentation order, first at zero.
    Timestamps(Vec<Duration>),
}

impl FrameTiming {
    /// Build native timing from presentation timestamps in any order.
    ///
    /// Timestamps are sorted and shifted so the earliest frame is at zero.
    pub fn from_timestamps(mut timestamps: Vec<Duration>) -> Self {
        timestamps.sort_unstable();
        if let Some(&first) = timestamps.first() {
            for timestamp in &mut timestamps {
                *timestamp -= first;
            }
        }
        FrameTiming::Timestamps(timestamps)
    }

    /// Total number of frames.
    pub fn frame_count(&self) -> u64 {
        match self {
            FrameTiming::Constant { frame_count, .. } => *frame_count,
            FrameTiming::Timestamps(timestamps) => timestamps.len() as u64,
        }
    }

    /// The constant frame rate, if the timing has one.
    pub fn frame_rate(&self) -> Option<FrameRate> {
        match self {
            FrameTiming::Constant { rate, .. } => Some(*rate),
            FrameTiming::Timestamps(_) => None,
        }
    }

    /// Presentation time of frame `index`, if it exists.
    pub fn timestamp(&self, index: u64) -> Option<Duration> {
        match self {
            FrameTiming::Constant { rate, frame_count } => {
                (index < *frame_count).then(|| rate.frame_timestamp(index))
            }
            FrameTiming::Timestamps(timestamps) => {
                usize::try_from(index).ok().and_then(|i| timestamps.get(i).copied())
            }
        }
    }

    /// Every frame, in order.
    pub fn frames(&self) -> FrameTimes<'_> {
        FrameTimes {
            timing: self,
            next_index: 0,
            sampling: FrameSampling::All,
            next_due: Duration::ZERO,
        }
    }

    /// The frames selected by `sampling`, in order.
    ///
    /// # Errors
    ///
    /// [`GeoFrameError::InvalidInterval`] if the sampling step is zero.
    pub fn sampled(&self, sampling: FrameSampling) -> Result<FrameTimes<'_>, GeoFrameError> {
        match sampling {
            FrameSampling::EveryNth(0) => return Err(GeoFrameError::InvalidInterval),
            FrameSampling::Interval(interval) if interval.is_zero() => {
                return Err(GeoFrameError::InvalidInterval);
            }
            _ => {}
        }
        Ok(FrameTimes {
            timing: self,
            next_index: 0,
            sampling,
            next_due: Duration::ZERO,
        })
    }
}

/// Which frames of a video to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameSampling {
    /// Every frame.
    #[default]
    All,
    /// Frames whose index is a multiple of N.
    EveryNth(u64),
    /// The first frame at or after each multiple of the interval.
    Interval(Duration),
}

/// Lazy iterator over [`FrameTime`] values. Created by
/// [`FrameTiming::frames`] and [`FrameTiming::sampled`].
#[derive(Debug, Clone)]
pub struct FrameTimes<'a> {
    timing: &'a FrameTiming,
    next_index: u64,
    sampling: FrameSampling,
    next_due: Duration,
}

impl Iterator for FrameTimes<'_> {
    type Item = FrameTime;

    fn next(&mut self) -> Option<FrameTime> {
        loop {
            let index = self.next_index;
            let timestamp = self.timing.timestamp(index)?;
            self.next_index += 1;

            let selected = match self.sampling {
                FrameSampling::All => true,
                FrameSampling::EveryNth(step) => index % step == 0,
                FrameSampling::Interval(interval) => {
                    if timestamp >= self.next_due {
                        while self.next_due <= timestamp {
                            self.next_due += interval;
                        }
                        true
                    } else {
                        false
                    }
                }
            };

            if selected {
                return Some(FrameTime { index, timestamp });
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.timing.frame_count().saturating_sub(self.next_index);
        (0, usize::try_from(remaining).ok())
    }
}
