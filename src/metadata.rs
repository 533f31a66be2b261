//! Video stream metadata.
//!
//! Read once when a [`VideoFile`](crate::VideoFile) is opened and cached for
//! its lifetime.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    time::Duration,
};

use crate::timing::FrameRate;

/// Metadata for the video stream frames are extracted from.
///
/// # Example
///
/// ```no_run
/// use geoframes::VideoFile;
///
/// let video = VideoFile::open("DJI_0001.MP4").unwrap();
/// let metadata = video.metadata();
/// println!("{}x{} {}", metadata.width, metadata.height, metadata.codec);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Nominal frame rate, if the container declares one.
    pub frame_rate: Option<FrameRate>,
    /// Number of frames, from the stream header, a packet scan, or
    /// duration × frame rate.
    pub frame_count: u64,
    /// Stream duration (container duration if the stream has none).
    pub duration: Duration,
    /// Codec name (e.g. `"h264"`, `"hevc"`).
    pub codec: String,
}

impl Display for VideoMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}x{} {}, {} frames over {:.3}s",
            self.width,
            self.height,
            self.codec,
            self.frame_count,
            self.duration.as_secs_f64()
        )?;
        if let Some(rate) = self.frame_rate {
            write!(f, " at {rate}")?;
        }
        Ok(())
    }
}
