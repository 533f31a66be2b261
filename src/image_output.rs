//! Still-image encoding of extracted frames.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    str::FromStr,
};

use image::{DynamicImage, codecs::jpeg::JpegEncoder};

use crate::error::GeoFrameError;

/// Default JPEG quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// File extension used for output images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageExtension {
    /// `.jpeg`
    #[default]
    Jpeg,
    /// `.jpg`
    Jpg,
}

impl ImageExtension {
    /// The extension without a leading dot.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageExtension::Jpeg => "jpeg",
            ImageExtension::Jpg => "jpg",
        }
    }
}

impl Display for ImageExtension {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageExtension {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpeg" => Ok(ImageExtension::Jpeg),
            "jpg" => Ok(ImageExtension::Jpg),
            other => Err(format!("unsupported image extension: {other} (expected jpeg or jpg)")),
        }
    }
}

/// Writes a decoded frame to disk as a still image.
pub trait FrameEncoder {
    /// Encode `image` and write it to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// [`GeoFrameError::ImageEncode`] on any encoding or I/O failure. A
    /// partially written file may remain; the caller removes it.
    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<(), GeoFrameError>;
}

/// Baseline JPEG encoder from the `image` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    /// Create an encoder. `quality` is clamped to `1..=100`.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// The effective quality.
    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, image: &DynamicImage, path: &Path) -> Result<(), GeoFrameError> {
        let failure = |reason: String| GeoFrameError::ImageEncode {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::create(path).map_err(|e| failure(format!("Failed to create file: {e}")))?;
        let mut writer = BufWriter::new(file);

        // JPEG has no alpha channel.
        let rgb = image.to_rgb8();
        JpegEncoder::new_with_quality(&mut writer, self.quality)
            .encode_image(&rgb)
            .map_err(|e| failure(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| failure(format!("Failed to flush file: {e}")))?;

        log::trace!(
            "Encoded {}x{} JPEG (quality {}) to {}",
            rgb.width(),
            rgb.height(),
            self.quality,
            path.display()
        );
        Ok(())
    }
}
