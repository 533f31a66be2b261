//! Error types for the `geoframes` crate.
//!
//! This module defines [`GeoFrameError`], the unified error type returned by
//! all fallible operations in the crate. Errors carry enough context (file
//! paths, telemetry block indices, line numbers, frame indices) to locate the
//! offending input without extra logging at the call site.
//!
//! Errors fall into two groups. Telemetry errors
//! ([`TelemetryParse`](GeoFrameError::TelemetryParse),
//! [`EmptyTelemetry`](GeoFrameError::EmptyTelemetry)) are fatal and abort a
//! conversion before any frame is written. Per-frame errors
//! ([`FrameExtraction`](GeoFrameError::FrameExtraction),
//! [`ImageEncode`](GeoFrameError::ImageEncode),
//! [`MetadataWrite`](GeoFrameError::MetadataWrite)) are caught by the
//! [`Converter`](crate::Converter), logged, and counted as skipped frames.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// The unified error type for all `geoframes` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GeoFrameError {
    /// A telemetry subtitle block is malformed.
    #[error("Telemetry block {block}{}: invalid {field}: {reason}", line_suffix(.line))]
    TelemetryParse {
        /// Sequence index of the offending block, or its 1-based position
        /// in the file when the index line itself could not be read.
        block: u64,
        /// 1-based line number in the subtitle file, when parsed from text.
        line: Option<usize>,
        /// The field that was missing or invalid (e.g. `"latitude"`).
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The subtitle file contains no telemetry blocks at all.
    #[error("No telemetry blocks found in subtitle input")]
    EmptyTelemetry,

    /// An input file (video or telemetry subtitle) could not be opened.
    #[error("Failed to open input file at {path}: {reason}")]
    FileOpen {
        /// Path of the video or subtitle file.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The decoder could not produce the requested frame.
    #[error("Failed to extract frame {frame_index}: {reason}")]
    FrameExtraction {
        /// Index of the frame that was requested.
        frame_index: u64,
        /// Underlying decoder failure.
        reason: String,
    },

    /// A decoded frame could not be encoded to the output image format.
    #[error("Failed to encode image {path}: {reason}")]
    ImageEncode {
        /// Destination path of the image.
        path: PathBuf,
        /// Underlying encoder failure.
        reason: String,
    },

    /// The metadata writer rejected the encoded tags or the output file.
    #[error("Failed to write metadata to {path}: {reason}")]
    MetadataWrite {
        /// Image the metadata was being written into.
        path: PathBuf,
        /// Underlying writer failure.
        reason: String,
    },

    /// A sampling interval of zero was provided.
    #[error("Sampling interval must be greater than zero")]
    InvalidInterval,

    /// A conversion finished without writing a single image.
    #[error("No frames were written ({skipped} skipped)")]
    NoFramesWritten {
        /// Number of frames that were considered and skipped.
        skipped: u64,
    },

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),
}

impl From<FfmpegError> for GeoFrameError {
    fn from(error: FfmpegError) -> Self {
        GeoFrameError::FfmpegError(error.to_string())
    }
}

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|line| format!(" (line {line})")).unwrap_or_default()
}

impl GeoFrameError {
    /// Returns `true` for errors that invalidate the whole run rather than a
    /// single frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            GeoFrameError::FrameExtraction { .. }
                | GeoFrameError::ImageEncode { .. }
                | GeoFrameError::MetadataWrite { .. }
        )
    }
}
