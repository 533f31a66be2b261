//! Progress reporting.
//!
//! Attach a [`ProgressCallback`] to [`ConversionOptions`](crate::ConversionOptions)
//! to observe a conversion frame by frame.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use geoframes::{ConversionOptions, ProgressCallback, ProgressInfo};
//!
//! struct StderrProgress;
//!
//! impl ProgressCallback for StderrProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         match (info.current_frame, info.total) {
//!             (Some(frame), Some(total)) => {
//!                 eprintln!("frame {frame}: {}/{total}, {} tagged", info.current, info.written)
//!             }
//!             _ => eprintln!("done: {} tagged, {} skipped", info.written, info.skipped),
//!         }
//!     }
//! }
//!
//! let options = ConversionOptions::new()
//!     .with_progress(Arc::new(StderrProgress))
//!     .with_batch_size(30);
//! ```

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// A snapshot of conversion progress.
///
/// Delivered to [`ProgressCallback::on_progress`] at a cadence controlled by
/// [`ConversionOptions::with_batch_size`](crate::ConversionOptions::with_batch_size).
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames considered so far, written or skipped.
    pub current: u64,
    /// Frames selected for conversion, if known ahead of time.
    pub total: Option<u64>,
    /// `current` as a share of `total`, 0 to 100.
    pub percentage: Option<f32>,
    /// Images written so far.
    pub written: u64,
    /// Frames skipped so far, for any reason.
    pub skipped: u64,
    /// Wall-clock time elapsed since the conversion started.
    pub elapsed: Duration,
    /// Projected time to finish at the average rate so far.
    pub estimated_remaining: Option<Duration>,
    /// The frame index most recently processed.
    pub current_frame: Option<u64>,
    /// Video time of that frame.
    pub current_timestamp: Option<Duration>,
}

/// Receives progress updates during a conversion.
///
/// Callbacks observe but cannot halt the run.
pub trait ProgressCallback: Send + Sync {
    /// Called every batch of frames and once at the end.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Running totals for one conversion, reported in batches.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    written: u64,
    skipped: u64,
    batch_size: u64,
    unreported: u64,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: Option<u64>, batch_size: u64) -> Self {
        Self {
            callback,
            total,
            written: 0,
            skipped: 0,
            batch_size: batch_size.max(1),
            unreported: 0,
            started: Instant::now(),
        }
    }

    fn considered(&self) -> u64 {
        self.written + self.skipped
    }

    /// Count a frame that reached the decoder, reporting once a full batch
    /// has accumulated.
    pub(crate) fn advance(&mut self, frame_index: u64, timestamp: Duration, written: bool) {
        if written {
            self.written += 1;
        } else {
            self.skipped += 1;
        }
        self.unreported += 1;

        if self.unreported >= self.batch_size {
            self.unreported = 0;
            self.callback
                .on_progress(&self.snapshot(Some((frame_index, timestamp))));
        }
    }

    /// Count frames dropped before decoding. They show up in the next report.
    pub(crate) fn skip(&mut self, count: u64) {
        self.skipped += count;
        self.unreported += count;
    }

    /// Report the final totals, whatever the batch position.
    pub(crate) fn finish(&mut self) {
        self.unreported = 0;
        self.callback.on_progress(&self.snapshot(None));
    }

    fn snapshot(&self, frame: Option<(u64, Duration)>) -> ProgressInfo {
        let current = self.considered();
        let elapsed = self.started.elapsed();
        let total = self.total;

        ProgressInfo {
            current,
            total,
            percentage: total
                .filter(|&total| total > 0)
                .map(|total| current as f32 * 100.0 / total as f32),
            written: self.written,
            skipped: self.skipped,
            elapsed,
            // Assumes the remaining frames cost what the finished ones did.
            estimated_remaining: total.filter(|_| current > 0).map(|total| {
                elapsed.mul_f64(total.saturating_sub(current) as f64 / current as f64)
            }),
            current_frame: frame.map(|(index, _)| index),
            current_timestamp: frame.map(|(_, timestamp)| timestamp),
        }
    }
}
