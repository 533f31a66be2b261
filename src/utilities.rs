//! Internal utility functions.
//!
//! Helpers for pixel-data copying and timestamp conversion between FFmpeg
//! stream time bases and [`Duration`].

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

const MICROS_PER_SECOND: i128 = 1_000_000;
const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// FFmpeg's `AV_NOPTS_VALUE`.
const NO_PTS: i64 = i64::MIN;

/// Copy pixel data from an FFmpeg video frame into a tightly-packed RGB buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3).
/// This function strips that padding so the result can be passed directly to
/// [`image::RgbImage::from_raw`].
pub fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// Convert a PTS delta in `time_base` units to a [`Duration`].
///
/// Negative deltas clamp to zero.
pub fn pts_to_duration(pts: i64, time_base: Rational) -> Duration {
    let denominator = i128::from(time_base.denominator());
    if pts <= 0 || denominator == 0 {
        return Duration::ZERO;
    }
    let nanos = i128::from(pts) * i128::from(time_base.numerator()) * NANOS_PER_SECOND / denominator;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Rescale a PTS value to microseconds (FFmpeg's `AV_TIME_BASE`), the unit
/// [`ffmpeg_next::format::context::Input::seek`] expects.
pub fn pts_to_micros(pts: i64, time_base: Rational) -> i64 {
    let denominator = i128::from(time_base.denominator());
    if denominator == 0 {
        return 0;
    }
    let micros = i128::from(pts) * i128::from(time_base.numerator()) * MICROS_PER_SECOND / denominator;
    i64::try_from(micros).unwrap_or(if micros < 0 { i64::MIN } else { i64::MAX })
}

/// A [`Duration`] in whole microseconds, saturating at `i64::MAX`.
pub fn duration_to_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

/// The usable start PTS of a stream, treating FFmpeg's "no value" sentinel
/// as zero.
pub fn stream_origin(start_time: i64) -> i64 {
    if start_time == NO_PTS {
        0
    } else {
        start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_converts_through_time_base() {
        let time_base = Rational::new(1, 90_000);
        assert_eq!(pts_to_duration(45_000, time_base), Duration::from_millis(500));
        assert_eq!(pts_to_micros(45_000, time_base), 500_000);
    }

    #[test]
    fn negative_pts_clamps_to_zero() {
        assert_eq!(pts_to_duration(-3, Rational::new(1, 1000)), Duration::ZERO);
        assert_eq!(pts_to_micros(-3, Rational::new(1, 1000)), -3_000);
    }

    #[test]
    fn nopts_sentinel_is_zero_origin() {
        assert_eq!(stream_origin(NO_PTS), 0);
        assert_eq!(stream_origin(1_234), 1_234);
    }
}
