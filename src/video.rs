//! Video frame extraction.
//!
//! [`FrameSource`] is the seam between the pipeline and whatever produces
//! decoded frames. [`VideoFile`] implements it on top of FFmpeg: one decoder
//! is kept open for the whole run and requests for frames a short distance
//! ahead of the last decoded one are served by decoding forward, so a
//! front-to-back conversion never seeks. Backward or distant requests seek to
//! the nearest keyframe first.
//!
//! Frames are returned as [`DynamicImage`] in RGB8 format at the stream's
//! native resolution.

use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Rational,
    codec::{context::Context as CodecContext, decoder::Video as VideoDecoder},
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::{
    error::GeoFrameError,
    metadata::VideoMetadata,
    timing::{FrameRate, FrameTiming},
    utilities::{
        duration_to_micros, frame_to_rgb_buffer, pts_to_duration, pts_to_micros, stream_origin,
    },
};

/// Furthest ahead of the decoder position a request may be before a seek is
/// used instead of decoding forward.
const FORWARD_DECODE_WINDOW: u64 = 120;

/// Produces decoded frames by index.
///
/// Implemented by [`VideoFile`]; tests and alternative decoders can supply
/// their own.
pub trait FrameSource {
    /// Timing of every frame the source can produce.
    fn timing(&self) -> &FrameTiming;

    /// Decode frame `index`.
    ///
    /// # Errors
    ///
    /// [`GeoFrameError::FrameExtraction`] if the frame cannot be produced.
    /// The caller may continue with other frames.
    fn frame(&mut self, index: u64) -> Result<DynamicImage, GeoFrameError>;
}

/// An open video file backed by FFmpeg.
///
/// # Example
///
/// ```no_run
/// use geoframes::{FrameSource, VideoFile};
///
/// let mut video = VideoFile::open("DJI_0001.MP4")?;
/// println!("{}", video.metadata());
/// let first = video.frame(0)?;
/// first.save("first.png")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct VideoFile {
    path: PathBuf,
    input_context: Input,
    stream_index: usize,
    time_base: Rational,
    /// PTS that maps to video time zero.
    origin_pts: i64,
    metadata: VideoMetadata,
    timing: FrameTiming,
    decoder: VideoDecoder,
    scaler: Option<ScalingContext>,
    /// Index of the last frame received from the decoder.
    position: Option<u64>,
    last_request: Option<u64>,
    /// A decoded frame past the last requested index, kept for the next
    /// request.
    pending: Option<(u64, VideoFrame)>,
    end_of_stream: bool,
}

impl VideoFile {
    /// Open a video file, timing frames from its declared frame rate.
    ///
    /// Falls back to scanning packet timestamps when the stream declares no
    /// usable frame rate.
    ///
    /// # Errors
    ///
    /// [`GeoFrameError::FileOpen`] if the file cannot be opened or its
    /// decoder cannot be created, [`GeoFrameError::NoVideoStream`] if it has
    /// no video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeoFrameError> {
        Self::open_inner(path.as_ref(), false)
    }

    /// Open a video file, timing frames from their own presentation
    /// timestamps.
    ///
    /// Reads every packet once up front. Use for variable-frame-rate footage
    /// where `rate × index` drifts from the real frame times.
    ///
    /// # Errors
    ///
    /// As [`open`](VideoFile::open), plus [`GeoFrameError::FileOpen`] if the
    /// stream carries no timestamped packets.
    pub fn open_with_native_timestamps<P: AsRef<Path>>(path: P) -> Result<Self, GeoFrameError> {
        Self::open_inner(path.as_ref(), true)
    }

    fn open_inner(path: &Path, native_timestamps: bool) -> Result<Self, GeoFrameError> {
        let path = path.to_path_buf();
        log::debug!("Opening video file: {}", path.display());

        let open_error = |reason: String| GeoFrameError::FileOpen {
            path: path.clone(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let mut input_context =
            ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let container_duration = input_context.duration();

        let (stream_index, time_base, start_pts, frame_rate, stream_duration, declared_frames, decoder) = {
            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or(GeoFrameError::NoVideoStream)?;

            let decoder = CodecContext::from_parameters(stream.parameters())
                .and_then(|context| context.decoder().video())
                .map_err(|error| {
                    open_error(format!(
                        "Failed to create video decoder for stream {}: {error}",
                        stream.index()
                    ))
                })?;

            let frame_rate =
                to_frame_rate(stream.avg_frame_rate()).or_else(|| to_frame_rate(stream.rate()));

            (
                stream.index(),
                stream.time_base(),
                stream.start_time(),
                frame_rate,
                stream.duration(),
                u64::try_from(stream.frames()).unwrap_or(0),
                decoder,
            )
        };

        let duration = if stream_duration > 0 {
            pts_to_duration(stream_duration, time_base)
        } else if container_duration > 0 {
            Duration::from_micros(container_duration as u64)
        } else {
            Duration::ZERO
        };

        let (timing, origin_pts) = match frame_rate {
            Some(rate) if !native_timestamps => {
                let frame_count = if declared_frames > 0 {
                    declared_frames
                } else {
                    rate.frames_in(duration)
                };
                (
                    FrameTiming::Constant { rate, frame_count },
                    stream_origin(start_pts),
                )
            }
            _ => {
                if !native_timestamps {
                    log::warn!(
                        "{} declares no frame rate; timing frames from packet timestamps",
                        path.display()
                    );
                }
                scan_timestamps(&mut input_context, stream_index, time_base)
                    .map_err(open_error)?
            }
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            frame_rate,
            frame_count: timing.frame_count(),
            duration,
            codec,
        };
        log::debug!("Video stream {stream_index}: {metadata}");

        Ok(Self {
            path,
            input_context,
            stream_index,
            time_base,
            origin_pts,
            metadata,
            timing,
            decoder,
            scaler: None,
            position: None,
            last_request: None,
            pending: None,
            end_of_stream: false,
        })
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached stream metadata.
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn decode_frame(&mut self, index: u64, target: Duration) -> Result<DynamicImage, GeoFrameError> {
        let sequential = self.last_request.is_some_and(|last| index > last)
            && self
                .position
                .is_some_and(|position| index <= position.saturating_add(FORWARD_DECODE_WINDOW));
        if !sequential {
            self.seek_to(target)?;
        }
        self.last_request = Some(index);

        if let Some((pending_index, frame)) = self.pending.take() {
            match pending_index.cmp(&index) {
                Ordering::Equal => return self.to_image(&frame),
                Ordering::Greater => {
                    let image = self.to_image(&frame);
                    self.pending = Some((pending_index, frame));
                    return image;
                }
                Ordering::Less => {}
            }
        }

        while let Some(frame) = self.next_decoded_frame()? {
            let decoded_index = index_for_pts(
                &self.timing,
                frame_pts(&frame)
                    .unwrap_or(self.origin_pts)
                    .saturating_sub(self.origin_pts),
                self.time_base,
            );
            self.position = Some(decoded_index);

            match decoded_index.cmp(&index) {
                Ordering::Less => continue,
                Ordering::Equal => return self.to_image(&frame),
                Ordering::Greater => {
                    log::debug!(
                        "Frame {index} not present in the stream; using frame {decoded_index}"
                    );
                    let image = self.to_image(&frame);
                    self.pending = Some((decoded_index, frame));
                    return image;
                }
            }
        }

        Err(GeoFrameError::FrameExtraction {
            frame_index: index,
            reason: "end of stream reached before the frame was decoded".to_string(),
        })
    }

    fn seek_to(&mut self, target: Duration) -> Result<(), GeoFrameError> {
        let timestamp = pts_to_micros(self.origin_pts, self.time_base)
            .saturating_add(duration_to_micros(target));
        log::trace!("Seeking {} to {timestamp}us", self.path.display());

        self.input_context.seek(timestamp, ..timestamp)?;
        self.decoder.flush();
        self.position = None;
        self.pending = None;
        self.end_of_stream = false;
        Ok(())
    }

    /// Pull the next frame out of the decoder, feeding it packets as needed.
    fn next_decoded_frame(&mut self) -> Result<Option<VideoFrame>, GeoFrameError> {
        let mut decoded_frame = VideoFrame::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded_frame).is_ok() {
                return Ok(Some(decoded_frame));
            }
            if self.end_of_stream {
                return Ok(None);
            }
            match self.input_context.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                None => {
                    self.decoder.send_eof()?;
                    self.end_of_stream = true;
                }
            }
        }
    }

    fn to_image(&mut self, frame: &VideoFrame) -> Result<DynamicImage, GeoFrameError> {
        let width = self.metadata.width;
        let height = self.metadata.height;

        let mut scaler = match self.scaler.take() {
            Some(scaler) => scaler,
            None => ScalingContext::get(
                frame.format(),
                frame.width(),
                frame.height(),
                Pixel::RGB24,
                width,
                height,
                ScalingFlags::BILINEAR,
            )?,
        };
        let mut rgb_frame = VideoFrame::empty();
        scaler.run(frame, &mut rgb_frame)?;
        self.scaler = Some(scaler);

        let buffer = frame_to_rgb_buffer(&rgb_frame, width, height);
        let rgb_image = RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
            GeoFrameError::FfmpegError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })?;
        Ok(DynamicImage::ImageRgb8(rgb_image))
    }
}

impl FrameSource for VideoFile {
    fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    fn frame(&mut self, index: u64) -> Result<DynamicImage, GeoFrameError> {
        let target = self
            .timing
            .timestamp(index)
            .ok_or_else(|| GeoFrameError::FrameExtraction {
                frame_index: index,
                reason: format!(
                    "frame is past the end of the stream ({} frames)",
                    self.timing.frame_count()
                ),
            })?;

        self.decode_frame(index, target).map_err(|error| match error {
            GeoFrameError::FrameExtraction { .. } => error,
            other => GeoFrameError::FrameExtraction {
                frame_index: index,
                reason: other.to_string(),
            },
        })
    }
}

fn to_frame_rate(rate: Rational) -> Option<FrameRate> {
    let numerator = u32::try_from(rate.numerator()).ok()?;
    let denominator = u32::try_from(rate.denominator()).ok()?;
    FrameRate::new(numerator, denominator)
}

fn frame_pts(frame: &VideoFrame) -> Option<i64> {
    frame.timestamp().or_else(|| frame.pts())
}

/// Read every packet of the video stream and collect presentation times.
///
/// Returns the timing and the smallest PTS, which becomes video time zero.
fn scan_timestamps(
    input_context: &mut Input,
    stream_index: usize,
    time_base: Rational,
) -> Result<(FrameTiming, i64), String> {
    let mut pts_values: Vec<i64> = Vec::new();
    let mut missing = 0_u64;
    for (stream, packet) in input_context.packets() {
        if stream.index() != stream_index {
            continue;
        }
        match packet.pts() {
            Some(pts) => pts_values.push(pts),
            None => missing += 1,
        }
    }

    let origin = *pts_values
        .iter()
        .min()
        .ok_or_else(|| "video stream has no timestamped packets".to_string())?;
    if missing > 0 {
        log::warn!("{missing} video packets carry no timestamp and were not counted");
    }

    let timestamps = pts_values
        .into_iter()
        .map(|pts| pts_to_duration(pts.saturating_sub(origin), time_base))
        .collect();
    Ok((FrameTiming::from_timestamps(timestamps), origin))
}

/// Map a PTS offset from the stream origin to a frame index.
///
/// Constant-rate streams round to the nearest frame; timestamped streams pick
/// the frame whose timestamp is closest.
fn index_for_pts(timing: &FrameTiming, pts_offset: i64, time_base: Rational) -> u64 {
    match timing {
        FrameTiming::Constant { rate, .. } => {
            let denominator = i128::from(time_base.denominator()) * i128::from(rate.denominator());
            if pts_offset <= 0 || denominator <= 0 {
                return 0;
            }
            let numerator = i128::from(pts_offset)
                * i128::from(time_base.numerator())
                * i128::from(rate.numerator());
            u64::try_from((numerator + denominator / 2) / denominator).unwrap_or(u64::MAX)
        }
        FrameTiming::Timestamps(timestamps) => {
            let time = pts_to_duration(pts_offset, time_base);
            let after = timestamps.partition_point(|&t| t < time);
            let nearest = match (after.checked_sub(1), timestamps.get(after)) {
                (Some(before), Some(&next)) if time - timestamps[before] < next - time => before,
                (Some(before), None) => before,
                _ => after,
            };
            nearest as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_rate_pts_rounds_to_nearest_frame() {
        let timing = FrameTiming::Constant {
            rate: FrameRate::new(30_000, 1_001).unwrap(),
            frame_count: 1_000,
        };
        let time_base = Rational::new(1, 30_000);

        assert_eq!(index_for_pts(&timing, 0, time_base), 0);
        assert_eq!(index_for_pts(&timing, 1_001, time_base), 1);
        assert_eq!(index_for_pts(&timing, 1_001 * 500 - 3, time_base), 500);
        assert_eq!(index_for_pts(&timing, -40, time_base), 0);
    }

    #[test]
    fn timestamped_pts_picks_closest_frame() {
        let timing = FrameTiming::from_timestamps(vec![
            Duration::ZERO,
            Duration::from_millis(40),
            Duration::from_millis(100),
        ]);
        let time_base = Rational::new(1, 1_000);

        assert_eq!(index_for_pts(&timing, 0, time_base), 0);
        assert_eq!(index_for_pts(&timing, 39, time_base), 1);
        assert_eq!(index_for_pts(&timing, 60, time_base), 1);
        assert_eq!(index_for_pts(&timing, 90, time_base), 2);
        assert_eq!(index_for_pts(&timing, 5_000, time_base), 2);
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        assert_eq!(to_frame_rate(Rational::new(0, 1)), None);
        assert_eq!(to_frame_rate(Rational::new(30, 0)), None);
        assert_eq!(to_frame_rate(Rational::new(-1, 1)), None);
        assert_eq!(to_frame_rate(Rational::new(25, 1)), FrameRate::from_integer(25));
    }
}
