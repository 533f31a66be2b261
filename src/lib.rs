//! # geoframes
//!
//! Turn drone video and its telemetry subtitle track into geotagged still
//! frames for photogrammetry.
//!
//! DJI-style drones record a companion `.SRT` file next to each clip: one
//! subtitle block per video interval, carrying GPS position, altitude and
//! camera settings as loosely formatted text. `geoframes` parses that track,
//! matches every video frame to the block whose interval contains it,
//! decodes the frame with FFmpeg via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next), and writes it as a
//! JPEG whose EXIF carries the latitude, longitude, altitude and focal
//! length that photogrammetry tools expect.
//!
//! ## Quick Start
//!
//! ### Convert a Clip
//!
//! ```no_run
//! use geoframes::ConversionOptions;
//!
//! let options = ConversionOptions::new().with_output_dir("frames");
//! let summary = geoframes::convert("DJI_0001.SRT", "DJI_0001.MP4", &options)?;
//! println!("{summary}");
//! # Ok::<(), geoframes::GeoFrameError>(())
//! ```
//!
//! ### Parse Telemetry
//!
//! ```
//! use std::time::Duration;
//!
//! use geoframes::{ParseOptions, parse_telemetry};
//!
//! let text = "1\n00:00:00,000 --> 00:00:00,033\n\
//!     <font size=\"28\">[iso: 100] [latitude: 40.123456] [longitude: -74.654321] \
//!     [rel_alt: 12.300 abs_alt: 50.200] [focal_len: 24.00]</font>\n";
//! let track = parse_telemetry(text, &ParseOptions::default())?;
//!
//! let record = track.record_at(Duration::from_millis(10)).unwrap();
//! assert_eq!(record.altitude, 50.2);
//! # Ok::<(), geoframes::GeoFrameError>(())
//! ```
//!
//! ### Encode a Record
//!
//! ```
//! use std::time::Duration;
//!
//! use geoframes::{Axis, TelemetryRecord, decode_coordinate, encode_record};
//!
//! let record = TelemetryRecord {
//!     sequence_index: 1,
//!     start_time: Duration::ZERO,
//!     end_time: Duration::from_millis(500),
//!     latitude: 40.123456,
//!     longitude: -74.654321,
//!     altitude: 50.2,
//!     focal_length: 24.0,
//! };
//! let metadata = encode_record(&record);
//! let longitude = decode_coordinate(&metadata, Axis::Longitude).unwrap();
//! assert!((longitude - record.longitude).abs() < 6e-7);
//! ```
//!
//! ## Features
//!
//! - **Tolerant telemetry parsing**: independent per-field extractors find
//!   `latitude`, `longitude`, altitude and `focal_len` wherever they sit in
//!   a block, across firmware layouts
//! - **Exact frame matching**: closed-open interval lookup by binary search,
//!   with integer frame-rate arithmetic or native per-frame timestamps
//! - **Bit-exact EXIF**: DMS rationals over 1,000,000, hemisphere refs,
//!   altitude with above/below reference, focal length; all rounded to
//!   nearest
//! - **Sequential forward decoding**: one decoder per run, seeking only for
//!   backward or distant frames
//! - **Frame sampling**: every Nth frame or one frame per time interval
//! - **Progress callbacks** for long clips
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod configuration;
pub mod error;
pub mod exif;
pub mod ffmpeg;
pub mod geodesy;
pub mod image_output;
pub mod matcher;
pub mod metadata;
pub mod pipeline;
pub mod progress;
pub mod rational;
pub mod srt;
pub mod telemetry;
pub mod timing;
mod utilities;
pub mod video;

pub use configuration::ConversionOptions;
pub use error::GeoFrameError;
pub use exif::{
    EncodedMetadata, ExifJpegWriter, ExifTag, ExifValue, MetadataWriter, read_metadata,
};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use geodesy::{
    AltitudeReference, Axis, Dms, Hemisphere, decode_altitude, decode_coordinate,
    decode_focal_length, encode_record,
};
pub use image_output::{FrameEncoder, ImageExtension, JpegFrameEncoder};
pub use matcher::{FrameMatcher, MatchStrategy, MatchedFrame};
pub use metadata::VideoMetadata;
pub use pipeline::{
    ConversionPlan, ConversionSummary, Converter, PlannedFrame, SkipReason, convert,
};
pub use progress::{ProgressCallback, ProgressInfo};
pub use rational::URational;
pub use srt::{AltitudeSource, ParseOptions, parse_telemetry, read_telemetry_file};
pub use telemetry::{TelemetryRecord, TelemetryTrack, format_timestamp};
pub use timing::{FrameRate, FrameSampling, FrameTime, FrameTiming};
pub use video::{FrameSource, VideoFile};
