//! Benchmarks for telemetry parsing, frame matching and EXIF encoding.
//!
//! Run with: cargo bench
//!
//! Uses a synthetic one-hour track (30 fps, one block per frame), so no
//! fixture files are needed.

use std::{fmt::Write, hint::black_box, time::Duration};

use criterion::Criterion;
use geoframes::{
    FrameMatcher, FrameRate, FrameTiming, MatchStrategy, ParseOptions, encode_record,
    exif::serialize_tiff, parse_telemetry,
};

const BLOCKS: u64 = 108_000;

fn synthetic_track() -> String {
    let mut text = String::with_capacity(BLOCKS as usize * 260);
    for index in 0..BLOCKS {
        let start = index * 1_000 / 30;
        let end = (index + 1) * 1_000 / 30;
        let _ = write!(
            text,
            "{}\n{} --> {}\n<font size=\"28\">FrameCnt: {}, DiffTime: 33ms\n\
             [iso: 100] [shutter: 1/1000.0] [fnum: 2.8] [ev: 0] [focal_len: 24.00] \
             [latitude: {:.6}] [longitude: {:.6}] [rel_alt: 12.300 abs_alt: 152.417]</font>\n\n",
            index + 1,
            timecode(start),
            timecode(end),
            index + 1,
            40.0 + index as f64 * 1e-6,
            -74.0 - index as f64 * 1e-6,
        );
    }
    text
}

fn timecode(millis: u64) -> String {
    format!(
        "{:02}:{:02}:{:02},{:03}",
        millis / 3_600_000,
        millis / 60_000 % 60,
        millis / 1_000 % 60,
        millis % 1_000
    )
}

fn benchmark_parsing(criterion: &mut Criterion) {
    let text = synthetic_track();
    let options = ParseOptions::default();

    criterion.bench_function("parse one hour of telemetry", |bencher| {
        bencher.iter(|| parse_telemetry(black_box(&text), &options).unwrap());
    });
}

fn benchmark_matching(criterion: &mut Criterion) {
    let track = parse_telemetry(&synthetic_track(), &ParseOptions::default()).unwrap();
    let timing = FrameTiming::Constant {
        rate: FrameRate::new(30_000, 1_001).unwrap(),
        frame_count: BLOCKS,
    };

    criterion.bench_function("match one hour of frames (binary search)", |bencher| {
        bencher.iter(|| FrameMatcher::new(&track, timing.frames()).count());
    });

    // The linear scan is quadratic over the whole track; keep it to a prefix.
    let prefix = FrameTiming::Constant {
        rate: FrameRate::new(30_000, 1_001).unwrap(),
        frame_count: 2_000,
    };
    criterion.bench_function("match 2000 frames (linear scan)", |bencher| {
        bencher.iter(|| {
            FrameMatcher::with_strategy(&track, prefix.frames(), MatchStrategy::Linear).count()
        });
    });

    criterion.bench_function("record lookup at one timestamp", |bencher| {
        bencher.iter(|| track.record_at(black_box(Duration::from_secs(1_800))));
    });
}

fn benchmark_encoding(criterion: &mut Criterion) {
    let track = parse_telemetry(&synthetic_track(), &ParseOptions::default()).unwrap();
    let record = &track[track.len() / 2];

    criterion.bench_function("encode record and serialize EXIF", |bencher| {
        bencher.iter(|| serialize_tiff(&encode_record(black_box(record))));
    });
}

criterion::criterion_group!(
    benches,
    benchmark_parsing,
    benchmark_matching,
    benchmark_encoding
);
criterion::criterion_main!(benches);
