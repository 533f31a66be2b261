//! Conversion configuration.
//!
//! [`ConversionOptions`] is a builder that carries output naming, frame
//! sampling, parsing and progress settings through a conversion without
//! widening every function signature.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use geoframes::{AltitudeSource, ConversionOptions, FrameSampling, ImageExtension};
//!
//! let options = ConversionOptions::new()
//!     .with_output_dir("frames")
//!     .with_prefix("flight_03")
//!     .with_extension(ImageExtension::Jpg)
//!     .with_sampling(FrameSampling::Interval(Duration::from_secs(1)))
//!     .with_altitude_source(AltitudeSource::Relative);
//!
//! assert_eq!(
//!     options.output_path(42),
//!     std::path::Path::new("frames/flight_03_000042.jpg"),
//! );
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    image_output::{DEFAULT_JPEG_QUALITY, ImageExtension},
    matcher::MatchStrategy,
    progress::{NoOpProgress, ProgressCallback},
    srt::{AltitudeSource, ParseOptions},
    timing::FrameSampling,
};

/// Default output directory.
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "out";

/// Default output file name prefix.
pub const DEFAULT_PREFIX: &str = "frame";

/// Settings for a video-to-geotagged-frames conversion.
///
/// All fields have defaults: every frame, written as
/// `out/frame_NNNNNN.jpeg` at quality 95, absolute altitude, records without
/// a GPS fix skipped.
#[derive(Clone)]
pub struct ConversionOptions {
    pub(crate) output_directory: PathBuf,
    pub(crate) prefix: String,
    pub(crate) extension: ImageExtension,
    pub(crate) jpeg_quality: u8,
    pub(crate) sampling: FrameSampling,
    pub(crate) keep_zero_fix: bool,
    pub(crate) parse: ParseOptions,
    pub(crate) match_strategy: MatchStrategy,
    pub(crate) native_timestamps: bool,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// How often to fire the progress callback (every N frames).
    pub(crate) batch_size: u64,
}

impl Debug for ConversionOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ConversionOptions")
            .field("output_directory", &self.output_directory)
            .field("prefix", &self.prefix)
            .field("extension", &self.extension)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("sampling", &self.sampling)
            .field("keep_zero_fix", &self.keep_zero_fix)
            .field("parse", &self.parse)
            .field("match_strategy", &self.match_strategy)
            .field("native_timestamps", &self.native_timestamps)
            .field("has_progress", &true)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            prefix: DEFAULT_PREFIX.to_string(),
            extension: ImageExtension::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            sampling: FrameSampling::All,
            keep_zero_fix: false,
            parse: ParseOptions::default(),
            match_strategy: MatchStrategy::default(),
            native_timestamps: false,
            progress: Arc::new(NoOpProgress),
            batch_size: 1,
        }
    }

    /// Directory images are written to. Created if missing.
    #[must_use]
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.output_directory = directory.into();
        self
    }

    /// File name prefix; images are named `{prefix}_{index:06}.{extension}`.
    #[must_use]
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Output file extension. Defaults to `jpeg`.
    #[must_use]
    pub fn with_extension(mut self, extension: ImageExtension) -> Self {
        self.extension = extension;
        self
    }

    /// JPEG quality, clamped to `1..=100`.
    #[must_use]
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Which frames to convert. Defaults to every frame.
    #[must_use]
    pub fn with_sampling(mut self, sampling: FrameSampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Also write frames whose record reports latitude and longitude of
    /// exactly zero, which drones emit before acquiring a fix.
    #[must_use]
    pub fn with_keep_zero_fix(mut self, keep: bool) -> Self {
        self.keep_zero_fix = keep;
        self
    }

    /// Replace all telemetry parser settings at once.
    #[must_use]
    pub fn with_parse_options(mut self, options: ParseOptions) -> Self {
        self.parse = options;
        self
    }

    /// Shorthand for setting [`ParseOptions::altitude_source`].
    #[must_use]
    pub fn with_altitude_source(mut self, source: AltitudeSource) -> Self {
        self.parse.altitude_source = source;
        self
    }

    /// How frames are looked up in the track. Defaults to binary search.
    #[must_use]
    pub fn with_match_strategy(mut self, strategy: MatchStrategy) -> Self {
        self.match_strategy = strategy;
        self
    }

    /// Time frames from their presentation timestamps instead of the
    /// declared frame rate. Only affects [`convert`](crate::convert).
    #[must_use]
    pub fn with_native_timestamps(mut self, native: bool) -> Self {
        self.native_timestamps = native;
        self
    }

    /// Attach a progress callback.
    ///
    /// The callback is invoked every
    /// [`batch_size`](ConversionOptions::with_batch_size) frames.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn extension(&self) -> ImageExtension {
        self.extension
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    pub fn sampling(&self) -> FrameSampling {
        self.sampling
    }

    pub fn keep_zero_fix(&self) -> bool {
        self.keep_zero_fix
    }

    pub fn parse_options(&self) -> &ParseOptions {
        &self.parse
    }

    pub fn native_timestamps(&self) -> bool {
        self.native_timestamps
    }

    /// Where the image for frame `index` is written.
    pub fn output_path(&self, index: u64) -> PathBuf {
        self.output_directory
            .join(format!("{}_{index:06}.{}", self.prefix, self.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_name_frames_in_out_directory() {
        let options = ConversionOptions::new();
        assert_eq!(options.output_path(123), Path::new("out/frame_000123.jpeg"));
        assert_eq!(options.jpeg_quality(), 95);
        assert_eq!(options.sampling(), FrameSampling::All);
        assert!(!options.keep_zero_fix());
    }

    #[test]
    fn indices_wider_than_six_digits_are_not_truncated() {
        let options = ConversionOptions::new().with_prefix("clip");
        assert_eq!(
            options.output_path(1_234_567),
            Path::new("out/clip_1234567.jpeg")
        );
    }

    #[test]
    fn builder_clamps_quality_and_batch_size() {
        let options = ConversionOptions::new()
            .with_jpeg_quality(0)
            .with_batch_size(0);
        assert_eq!(options.jpeg_quality(), 1);
        assert_eq!(options.batch_size, 1);
    }
}
