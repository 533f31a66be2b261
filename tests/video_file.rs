//! Video decoding and end-to-end conversion against real media.
//!
//! Fixture-backed tests require files from `tests/fixtures/generate_fixtures.sh`
//! and return early when they are missing.

use std::path::Path;

use geoframes::{
    Axis, ConversionOptions, FrameSampling, FrameSource, FrameTiming, GeoFrameError, SkipReason,
    VideoFile, decode_coordinate, read_metadata,
};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const SAMPLE_VFR: &str = "tests/fixtures/sample_vfr.mp4";
const SAMPLE_AUDIO_ONLY: &str = "tests/fixtures/sample_audio_only.mp4";
const SAMPLE_TELEMETRY: &str = "tests/fixtures/sample_video.srt";

// ── Open errors ────────────────────────────────────────────────────

#[test]
fn open_nonexistent_file() {
    let result = VideoFile::open("this_file_does_not_exist.mp4");

    match result {
        Err(GeoFrameError::FileOpen { path, .. }) => {
            assert_eq!(path, Path::new("this_file_does_not_exist.mp4"));
        }
        Err(other) => panic!("expected FileOpen, got {other}"),
        Ok(_) => panic!("opening a missing file should fail"),
    }
}

#[test]
fn open_invalid_file() {
    let temporary_directory = tempfile::tempdir().expect("Failed to create temp dir");
    let invalid_file_path = temporary_directory.path().join("invalid.mp4");
    std::fs::write(&invalid_file_path, b"this is not a media file")
        .expect("Failed to write invalid file");

    let error = VideoFile::open(&invalid_file_path)
        .err()
        .expect("Expected error for invalid media file");
    assert!(
        error.to_string().contains("Failed to open input file"),
        "Error message should mention file open failure: {error}",
    );
}

#[test]
fn no_video_stream_error() {
    if !Path::new(SAMPLE_AUDIO_ONLY).exists() {
        return;
    }

    let result = VideoFile::open(SAMPLE_AUDIO_ONLY);
    assert!(matches!(result, Err(GeoFrameError::NoVideoStream)));
}

// ── Decoding ───────────────────────────────────────────────────────

#[test]
fn metadata_and_constant_timing() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let video = VideoFile::open(SAMPLE_VIDEO).expect("Failed to open test video");
    let metadata = video.metadata();
    assert_eq!((metadata.width, metadata.height), (640, 360));
    assert_eq!(metadata.frame_rate.map(|rate| rate.as_f64()), Some(30.0));
    assert_eq!(metadata.frame_count, 60);
    assert!(matches!(video.timing(), FrameTiming::Constant { .. }));
}

#[test]
fn frames_decode_at_stream_size() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut video = VideoFile::open(SAMPLE_VIDEO).expect("Failed to open test video");
    let first = video.frame(0).expect("Failed to decode first frame");
    let last = video.frame(59).expect("Failed to decode last frame");
    assert_eq!((first.width(), first.height()), (640, 360));
    assert_eq!((last.width(), last.height()), (640, 360));
}

#[test]
fn backward_requests_match_fresh_decodes() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut sequential = VideoFile::open(SAMPLE_VIDEO).expect("Failed to open test video");
    for index in 0..20 {
        sequential.frame(index).expect("Failed to decode frame");
    }
    // Seek back across a keyframe boundary.
    let revisited = sequential.frame(7).expect("Failed to decode frame 7");

    let mut fresh = VideoFile::open(SAMPLE_VIDEO).expect("Failed to open test video");
    let direct = fresh.frame(7).expect("Failed to decode frame 7");

    assert_eq!(revisited.to_rgb8(), direct.to_rgb8());
}

#[test]
fn frame_past_the_end_is_a_frame_error() {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut video = VideoFile::open(SAMPLE_VIDEO).expect("Failed to open test video");
    match video.frame(999_999) {
        Err(error @ GeoFrameError::FrameExtraction { .. }) => assert!(!error.is_fatal()),
        Err(other) => panic!("expected FrameExtraction, got {other}"),
        Ok(_) => panic!("frame 999999 should not exist"),
    }
}

#[test]
fn native_timestamps_follow_irregular_spacing() {
    if !Path::new(SAMPLE_VFR).exists() {
        return;
    }

    let video =
        VideoFile::open_with_native_timestamps(SAMPLE_VFR).expect("Failed to open VFR video");
    let FrameTiming::Timestamps(timestamps) = video.timing() else {
        panic!("expected native timestamps");
    };
    assert_eq!(timestamps.len(), 60);
    assert!(timestamps.windows(2).all(|pair| pair[0] < pair[1]));
    // The 200 ms jump after frame 29.
    let gap = timestamps[30] - timestamps[29];
    assert!(gap.as_millis() >= 200, "gap was {gap:?}");
}

// ── End to end ─────────────────────────────────────────────────────

#[test]
fn convert_sample_clip() {
    if !Path::new(SAMPLE_VIDEO).exists() || !Path::new(SAMPLE_TELEMETRY).exists() {
        return;
    }

    let output = tempfile::tempdir().expect("Failed to create temp dir");
    let options = ConversionOptions::new()
        .with_output_dir(output.path())
        .with_sampling(FrameSampling::EveryNth(3));

    let summary = geoframes::convert(SAMPLE_TELEMETRY, SAMPLE_VIDEO, &options)
        .expect("Conversion failed");

    // Telemetry covers 1.5 s of the 2 s clip: frames 0, 3, ..., 42 match.
    assert_eq!(summary.written_count(), 15);
    assert_eq!(summary.skipped_for(SkipReason::NoTelemetry), 5);

    let bytes = std::fs::read(&summary.written[0]).expect("Failed to read first image");
    let metadata = read_metadata(&bytes).expect("Failed to read EXIF");
    let latitude = decode_coordinate(&metadata, Axis::Latitude).unwrap();
    assert!((latitude - 40.123400).abs() < 6e-7);
}
