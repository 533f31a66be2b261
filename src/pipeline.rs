//! Conversion pipeline.
//!
//! [`Converter`] drives one conversion: frames selected by the configured
//! sampling are matched to telemetry records, and each matched frame is
//! decoded, encoded to an image, and tagged with its record's position,
//! altitude and focal length.
//!
//! Work is strictly sequential. A frame that cannot be decoded, encoded, or
//! tagged is logged, counted and skipped; any partially written image is
//! removed. Errors in the telemetry itself are fatal and surface before any
//! frame is touched.
//!
//! # Example
//!
//! ```no_run
//! use geoframes::ConversionOptions;
//!
//! let options = ConversionOptions::new().with_output_dir("frames");
//! let summary = geoframes::convert("DJI_0001.SRT", "DJI_0001.MP4", &options)?;
//! println!("{summary}");
//! summary.into_result()?;
//! # Ok::<(), geoframes::GeoFrameError>(())
//! ```

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    configuration::ConversionOptions,
    error::GeoFrameError,
    exif::{ExifJpegWriter, MetadataWriter},
    geodesy::encode_record,
    image_output::{FrameEncoder, JpegFrameEncoder},
    matcher::{FrameMatcher, MatchedFrame},
    progress::ProgressTracker,
    srt::read_telemetry_file,
    telemetry::{TelemetryTrack, format_timestamp},
    timing::FrameTiming,
    video::{FrameSource, VideoFile},
};

/// Why a frame did not produce an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    /// No telemetry record covers the frame's timestamp.
    NoTelemetry,
    /// The matching record reports latitude and longitude of zero.
    NoGpsFix,
    /// The decoder could not produce the frame.
    Extraction,
    /// The frame could not be written as an image.
    ImageEncode,
    /// The metadata could not be written into the image.
    MetadataWrite,
}

impl SkipReason {
    /// Every reason, in summary order.
    pub const ALL: [SkipReason; 5] = [
        SkipReason::NoTelemetry,
        SkipReason::NoGpsFix,
        SkipReason::Extraction,
        SkipReason::ImageEncode,
        SkipReason::MetadataWrite,
    ];

    /// Short machine-friendly name.
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::NoTelemetry => "no_telemetry",
            SkipReason::NoGpsFix => "no_gps_fix",
            SkipReason::Extraction => "extraction_failed",
            SkipReason::ImageEncode => "image_encode_failed",
            SkipReason::MetadataWrite => "metadata_write_failed",
        }
    }

    fn for_error(error: &GeoFrameError) -> Option<Self> {
        match error {
            GeoFrameError::FrameExtraction { .. } => Some(SkipReason::Extraction),
            GeoFrameError::ImageEncode { .. } => Some(SkipReason::ImageEncode),
            GeoFrameError::MetadataWrite { .. } => Some(SkipReason::MetadataWrite),
            _ => None,
        }
    }
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let text = match self {
            SkipReason::NoTelemetry => "no telemetry",
            SkipReason::NoGpsFix => "no GPS fix",
            SkipReason::Extraction => "extraction failed",
            SkipReason::ImageEncode => "image encoding failed",
            SkipReason::MetadataWrite => "metadata write failed",
        };
        f.write_str(text)
    }
}

/// Outcome of a conversion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct ConversionSummary {
    /// Images written, in frame order.
    pub written: Vec<PathBuf>,
    /// Frames skipped, by reason. Reasons with no skips are absent.
    pub skipped: BTreeMap<SkipReason, u64>,
}

impl ConversionSummary {
    /// Number of images written.
    pub fn written_count(&self) -> u64 {
        self.written.len() as u64
    }

    /// Total frames skipped for any reason.
    pub fn skipped_count(&self) -> u64 {
        self.skipped.values().sum()
    }

    /// Frames skipped for `reason`.
    pub fn skipped_for(&self, reason: SkipReason) -> u64 {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    /// Frames considered, written or skipped.
    pub fn frames_considered(&self) -> u64 {
        self.written_count() + self.skipped_count()
    }

    /// `true` if at least one image was written.
    pub fn is_success(&self) -> bool {
        !self.written.is_empty()
    }

    /// The summary, or [`GeoFrameError::NoFramesWritten`] if nothing was
    /// written.
    pub fn into_result(self) -> Result<Self, GeoFrameError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(GeoFrameError::NoFramesWritten {
                skipped: self.skipped_count(),
            })
        }
    }

    fn record_skip(&mut self, reason: SkipReason, count: u64) {
        if count > 0 {
            *self.skipped.entry(reason).or_insert(0) += count;
        }
    }
}

impl Display for ConversionSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} of {} frames written",
            self.written_count(),
            self.frames_considered()
        )?;
        if !self.skipped.is_empty() {
            let reasons: Vec<String> = self
                .skipped
                .iter()
                .map(|(reason, count)| format!("{count} {reason}"))
                .collect();
            write!(f, " ({} skipped: {})", self.skipped_count(), reasons.join(", "))?;
        }
        Ok(())
    }
}

/// One image a conversion would write.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedFrame {
    /// Frame index.
    pub frame_index: u64,
    /// Video time of the frame.
    pub timestamp: Duration,
    /// Sequence index of the telemetry record it is tagged with.
    pub sequence_index: u64,
    /// Latitude of that record.
    pub latitude: f64,
    /// Longitude of that record.
    pub longitude: f64,
    /// Output path.
    pub path: PathBuf,
}

/// Result of [`Converter::plan`]: what a run would write, without decoding
/// or writing anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionPlan {
    /// Frames that would be written, in order.
    pub frames: Vec<PlannedFrame>,
    /// Frames that would be skipped before decoding, by reason.
    pub skipped: BTreeMap<SkipReason, u64>,
}

/// Runs conversions with a fixed set of [`ConversionOptions`].
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConversionOptions,
}

impl Converter {
    /// Create a converter that runs with `options`.
    pub fn new(options: ConversionOptions) -> Self {
        Self { options }
    }

    /// The options every run uses.
    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// Match frames to telemetry and list the images a run would write.
    ///
    /// # Errors
    ///
    /// [`GeoFrameError::InvalidInterval`] for a zero sampling step.
    pub fn plan(
        &self,
        track: &TelemetryTrack,
        timing: &FrameTiming,
    ) -> Result<ConversionPlan, GeoFrameError> {
        let frames = timing.sampled(self.options.sampling)?;
        let mut matcher = FrameMatcher::with_strategy(track, frames, self.options.match_strategy);
        let mut plan = ConversionPlan::default();

        for matched in matcher.by_ref() {
            if self.lacks_fix(&matched) {
                *plan.skipped.entry(SkipReason::NoGpsFix).or_insert(0) += 1;
                continue;
            }
            plan.frames.push(PlannedFrame {
                frame_index: matched.frame_index,
                timestamp: matched.timestamp,
                sequence_index: matched.record.sequence_index,
                latitude: matched.record.latitude,
                longitude: matched.record.longitude,
                path: self.options.output_path(matched.frame_index),
            });
        }

        if matcher.unmatched_count() > 0 {
            plan.skipped.insert(SkipReason::NoTelemetry, matcher.unmatched_count());
        }
        Ok(plan)
    }

    /// Convert every selected frame of `source` that `track` covers.
    ///
    /// Per-frame failures are logged and counted in the returned summary.
    /// A summary with nothing written is still `Ok`; use
    /// [`ConversionSummary::into_result`] to treat it as a failure.
    ///
    /// # Errors
    ///
    /// [`GeoFrameError::InvalidInterval`] for a zero sampling step,
    /// [`GeoFrameError::IoError`] if the output directory cannot be created,
    /// and any error from a collaborator that is not a per-frame failure.
    pub fn run(
        &self,
        track: &TelemetryTrack,
        source: &mut dyn FrameSource,
        encoder: &dyn FrameEncoder,
        writer: &mut dyn MetadataWriter,
    ) -> Result<ConversionSummary, GeoFrameError> {
        // The source is borrowed mutably for decoding while frames are
        // iterated.
        let timing = source.timing().clone();
        let frames = timing.sampled(self.options.sampling)?;
        let total = frames.clone().count() as u64;

        fs::create_dir_all(&self.options.output_directory)?;
        log::info!(
            "Converting {total} frames against {} telemetry records into {}",
            track.len(),
            self.options.output_directory.display()
        );

        let mut tracker =
            ProgressTracker::new(self.options.progress.clone(), Some(total), self.options.batch_size);
        let mut matcher = FrameMatcher::with_strategy(track, frames, self.options.match_strategy);
        let mut summary = ConversionSummary::default();
        let mut unmatched_seen = 0;

        while let Some(matched) = matcher.next() {
            let unmatched = matcher.unmatched_count();
            tracker.skip(unmatched - unmatched_seen);
            unmatched_seen = unmatched;

            if self.lacks_fix(&matched) {
                log::debug!(
                    "Frame {} at {}: record {} has no GPS fix; skipping",
                    matched.frame_index,
                    format_timestamp(matched.timestamp),
                    matched.record.sequence_index
                );
                summary.record_skip(SkipReason::NoGpsFix, 1);
                tracker.advance(matched.frame_index, matched.timestamp, false);
                continue;
            }

            match self.convert_frame(&matched, source, encoder, writer) {
                Ok(path) => {
                    log::debug!(
                        "Frame {} at {} -> {} (record {})",
                        matched.frame_index,
                        format_timestamp(matched.timestamp),
                        path.display(),
                        matched.record.sequence_index
                    );
                    summary.written.push(path);
                    tracker.advance(matched.frame_index, matched.timestamp, true);
                }
                Err(error) => {
                    let Some(reason) = SkipReason::for_error(&error) else {
                        return Err(error);
                    };
                    log::warn!("Skipping frame {}: {error}", matched.frame_index);
                    summary.record_skip(reason, 1);
                    tracker.advance(matched.frame_index, matched.timestamp, false);
                }
            }
        }

        let trailing_unmatched = matcher.unmatched_count() - unmatched_seen;
        tracker.skip(trailing_unmatched);
        tracker.finish();
        summary.record_skip(SkipReason::NoTelemetry, matcher.unmatched_count());

        if summary.is_success() {
            log::info!("{summary}");
        } else {
            log::warn!("{summary}");
        }
        Ok(summary)
    }

    fn lacks_fix(&self, matched: &MatchedFrame<'_>) -> bool {
        !self.options.keep_zero_fix && !matched.record.has_gps_fix()
    }

    /// Decode, encode and tag one frame. Removes the image on failure.
    fn convert_frame(
        &self,
        matched: &MatchedFrame<'_>,
        source: &mut dyn FrameSource,
        encoder: &dyn FrameEncoder,
        writer: &mut dyn MetadataWriter,
    ) -> Result<PathBuf, GeoFrameError> {
        let image = source.frame(matched.frame_index)?;
        let metadata = encode_record(matched.record);
        let path = self.options.output_path(matched.frame_index);

        encoder
            .encode(&image, &path)
            .and_then(|()| writer.write_metadata(&path, &metadata))
            .inspect_err(|_| remove_partial(&path))?;
        Ok(path)
    }
}

fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed partial image {}", path.display()),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => log::warn!("Failed to remove partial image {}: {error}", path.display()),
    }
}

/// Convert a video and its telemetry subtitle file into geotagged JPEGs.
///
/// Parses the whole subtitle file first; any telemetry error aborts before
/// the video is opened.
///
/// # Errors
///
/// Telemetry errors, [`GeoFrameError::FileOpen`] or
/// [`GeoFrameError::NoVideoStream`] for the video, and anything
/// [`Converter::run`] returns.
pub fn convert<S: AsRef<Path>, V: AsRef<Path>>(
    subtitle_path: S,
    video_path: V,
    options: &ConversionOptions,
) -> Result<ConversionSummary, GeoFrameError> {
    let track = read_telemetry_file(subtitle_path, options.parse_options())?;

    let mut video = if options.native_timestamps() {
        VideoFile::open_with_native_timestamps(video_path)?
    } else {
        VideoFile::open(video_path)?
    };
    log::info!("{}: {}", video.path().display(), video.metadata());

    let encoder = JpegFrameEncoder::new(options.jpeg_quality());
    let mut writer = ExifJpegWriter::new();
    Converter::new(options.clone()).run(&track, &mut video, &encoder, &mut writer)
}
