//! Telemetry subtitle parsing.
//!
//! Drone recorders write a SubRip (`.srt`) track alongside the video. Every
//! block carries a sequence index, a time range and a few lines of bracketed
//! `label: value` tokens:
//!
//! ```text
//! 1
//! 00:00:00,000 --> 00:00:00,033
//! <font size="28">FrameCnt: 1, DiffTime: 33ms
//! 2024-05-01 10:12:33.123
//! [iso: 100] [shutter: 1/1000.0] [fnum: 2.8] [ev: 0] [focal_len: 24.00]
//! [latitude: 40.123456] [longitude: -74.654321] [rel_alt: 1.200 abs_alt: 50.200]</font>
//! ```
//!
//! [`parse_telemetry`] turns that text into a validated [`TelemetryTrack`].
//! Each required value (latitude, longitude, altitude, focal length) has its
//! own [`FieldExtractor`] that finds its label anywhere in the block, so
//! the surrounding and ignored tokens never affect the four required ones.
//!
//! Parsing stops at the first malformed block: a silently dropped block
//! would leave frames matched to the wrong telemetry.
//!
//! # Example
//!
//! ```
//! use geoframes::{ParseOptions, parse_telemetry};
//!
//! let text = "1\n00:00:00,000 --> 00:00:00,500\n\
//!     [focal_len: 24.00] [latitude: 40.123456] [longitude: -74.654321] [abs_alt: 50.2]\n";
//! let track = parse_telemetry(text, &ParseOptions::default())?;
//! assert_eq!(track.len(), 1);
//! assert_eq!(track[0].longitude, -74.654321);
//! # Ok::<(), geoframes::GeoFrameError>(())
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::Path,
    sync::LazyLock,
    time::Duration,
};

use regex::Regex;

use crate::{
    error::GeoFrameError,
    telemetry::{TelemetryRecord, TelemetryTrack},
};

/// Which altitude token is read from each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AltitudeSource {
    /// `abs_alt` (barometric altitude above sea level), falling back to a
    /// plain `altitude` token on firmware that only writes one value.
    #[default]
    Absolute,
    /// `rel_alt` (height above the take-off point).
    Relative,
}

impl Display for AltitudeSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AltitudeSource::Absolute => write!(f, "absolute"),
            AltitudeSource::Relative => write!(f, "relative"),
        }
    }
}

/// Settings for [`parse_telemetry`].
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Altitude token to read. Defaults to [`AltitudeSource::Absolute`].
    pub altitude_source: AltitudeSource,
}

impl ParseOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose which altitude token to read.
    #[must_use]
    pub fn with_altitude_source(mut self, source: AltitudeSource) -> Self {
        self.altitude_source = source;
        self
    }
}

/// How an extracted token is turned into a number.
#[derive(Debug, Clone, Copy)]
enum ValueKind {
    /// Plain signed decimal.
    Number,
    /// Signed decimal degrees, optionally with a hemisphere letter.
    Coordinate { positive: char, negative: char },
}

/// Locates one labelled value anywhere in a block's telemetry lines.
#[derive(Debug)]
pub struct FieldExtractor {
    field: &'static str,
    pattern: Regex,
    kind: ValueKind,
}

/// A value found by a [`FieldExtractor`], with the line it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractedValue {
    /// The parsed value.
    pub value: f64,
    /// 1-based line number in the subtitle text.
    pub line: usize,
}

impl FieldExtractor {
    fn new(field: &'static str, labels: &[&str], kind: ValueKind) -> Self {
        let labels = labels.join("|");
        let pattern = Regex::new(&format!(
            r"\b(?i:{labels})\s*:\s*([^\s\[\]<>,]+)(?:\s+([NSEW])\b)?"
        ))
        .expect("field extractor pattern is valid");
        Self {
            field,
            pattern,
            kind,
        }
    }

    /// Name of the field this extractor reads.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Find and parse the field in `lines` (`(line number, text)` pairs).
    ///
    /// Returns `Ok(None)` when the label does not appear at all.
    pub fn extract(
        &self,
        lines: &[(usize, &str)],
    ) -> Result<Option<ExtractedValue>, (usize, String)> {
        for &(line, text) in lines {
            let Some(captures) = self.pattern.captures(text) else {
                continue;
            };
            let token = &captures[1];
            let hemisphere = captures.get(2).map(|m| m.as_str());
            let value = match self.kind {
                ValueKind::Number => parse_number(token),
                ValueKind::Coordinate { positive, negative } => {
                    parse_coordinate(token, hemisphere, positive, negative)
                }
            }
            .map_err(|reason| (line, reason))?;
            return Ok(Some(ExtractedValue { value, line }));
        }
        Ok(None)
    }
}

static LATITUDE: LazyLock<FieldExtractor> = LazyLock::new(|| {
    FieldExtractor::new(
        "latitude",
        &["latitude"],
        ValueKind::Coordinate {
            positive: 'N',
            negative: 'S',
        },
    )
});

static LONGITUDE: LazyLock<FieldExtractor> = LazyLock::new(|| {
    FieldExtractor::new(
        "longitude",
        &["longitude"],
        ValueKind::Coordinate {
            positive: 'E',
            negative: 'W',
        },
    )
});

static ABSOLUTE_ALTITUDE: LazyLock<FieldExtractor> =
    LazyLock::new(|| FieldExtractor::new("altitude", &["abs_alt"], ValueKind::Number));

static PLAIN_ALTITUDE: LazyLock<FieldExtractor> =
    LazyLock::new(|| FieldExtractor::new("altitude", &["altitude"], ValueKind::Number));

static RELATIVE_ALTITUDE: LazyLock<FieldExtractor> =
    LazyLock::new(|| FieldExtractor::new("altitude", &["rel_alt"], ValueKind::Number));

static FOCAL_LENGTH: LazyLock<FieldExtractor> =
    LazyLock::new(|| FieldExtractor::new("focal length", &["focal_len"], ValueKind::Number));

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\d+):(\d{2}):(\d{2})[,.](\d{3})\s*-->\s*(\d+):(\d{2}):(\d{2})[,.](\d{3})\s*$",
    )
    .expect("time range pattern is valid")
});

/// The extractors a block parser needs.
#[derive(Debug, Clone, Copy)]
pub struct RequiredFields {
    /// Latitude extractor.
    pub latitude: &'static FieldExtractor,
    /// Longitude extractor.
    pub longitude: &'static FieldExtractor,
    /// Altitude extractor, chosen by [`AltitudeSource`].
    pub altitude: &'static FieldExtractor,
    /// Tried only when [`altitude`](RequiredFields::altitude) finds no label.
    pub altitude_fallback: Option<&'static FieldExtractor>,
    /// Focal length extractor.
    pub focal_length: &'static FieldExtractor,
}

impl RequiredFields {
    /// The extractor set for the given options.
    pub fn for_options(options: &ParseOptions) -> Self {
        let (altitude, altitude_fallback): (&'static FieldExtractor, _) =
            match options.altitude_source {
                AltitudeSource::Absolute => (&*ABSOLUTE_ALTITUDE, Some(&*PLAIN_ALTITUDE)),
                AltitudeSource::Relative => (&*RELATIVE_ALTITUDE, None),
            };
        Self {
            latitude: &LATITUDE,
            longitude: &LONGITUDE,
            altitude,
            altitude_fallback,
            focal_length: &FOCAL_LENGTH,
        }
    }
}

/// One blank-line-delimited block, with original line numbers.
struct RawBlock<'t> {
    /// 1-based position of the block in the file.
    position: u64,
    lines: Vec<(usize, &'t str)>,
}

/// Split subtitle text into non-empty blocks.
fn split_blocks(text: &str) -> Vec<RawBlock<'_>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut blocks = Vec::new();
    let mut current: Vec<(usize, &str)> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(RawBlock {
                    position: blocks.len() as u64 + 1,
                    lines: std::mem::take(&mut current),
                });
            }
        } else {
            current.push((index + 1, line));
        }
    }
    if !current.is_empty() {
        blocks.push(RawBlock {
            position: blocks.len() as u64 + 1,
            lines: current,
        });
    }

    blocks
}

/// Parse the full text of a telemetry subtitle file.
///
/// # Errors
///
/// - [`GeoFrameError::EmptyTelemetry`] if the text has no blocks.
/// - [`GeoFrameError::TelemetryParse`] for the first block that is
///   malformed, lacks a required field, or breaks ordering.
pub fn parse_telemetry(text: &str, options: &ParseOptions) -> Result<TelemetryTrack, GeoFrameError> {
    let fields = RequiredFields::for_options(options);
    let blocks = split_blocks(text);
    if blocks.is_empty() {
        return Err(GeoFrameError::EmptyTelemetry);
    }

    let mut records: Vec<TelemetryRecord> = Vec::with_capacity(blocks.len());
    for block in &blocks {
        let parsed = parse_block(block, &fields)?;
        if let Some(previous) = records.last() {
            parsed
                .record
                .check_follows(previous)
                .map_err(|(field, reason)| GeoFrameError::TelemetryParse {
                    block: parsed.record.sequence_index,
                    line: Some(parsed.line_for(field)),
                    field,
                    reason,
                })?;
        }
        records.push(parsed.record);
    }

    log::debug!(
        "Parsed {} telemetry records ({} altitude)",
        records.len(),
        options.altitude_source
    );
    Ok(TelemetryTrack::from_checked(records))
}

/// Read and parse a telemetry subtitle file.
///
/// UTF-8 is tried first; anything else is read as Latin-1, which keeps
/// the ASCII telemetry tokens intact.
///
/// # Errors
///
/// [`GeoFrameError::FileOpen`] if the file cannot be read, plus everything
/// [`parse_telemetry`] returns.
pub fn read_telemetry_file<P: AsRef<Path>>(
    path: P,
    options: &ParseOptions,
) -> Result<TelemetryTrack, GeoFrameError> {
    let path = path.as_ref();
    log::debug!("Reading telemetry from {}", path.display());
    let bytes = fs::read(path).map_err(|error| GeoFrameError::FileOpen {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })?;
    let text = String::from_utf8(bytes)
        .unwrap_or_else(|error| error.into_bytes().iter().map(|&b| char::from(b)).collect());
    parse_telemetry(&text, options)
}

/// A parsed record plus the lines its values came from.
struct ParsedBlock {
    record: TelemetryRecord,
    index_line: usize,
    time_line: usize,
    latitude_line: usize,
    longitude_line: usize,
    altitude_line: usize,
    focal_length_line: usize,
}

impl ParsedBlock {
    fn line_for(&self, field: &str) -> usize {
        match field {
            "sequence index" => self.index_line,
            "latitude" => self.latitude_line,
            "longitude" => self.longitude_line,
            "altitude" => self.altitude_line,
            "focal length" => self.focal_length_line,
            _ => self.time_line,
        }
    }
}

fn parse_block(block: &RawBlock<'_>, fields: &RequiredFields) -> Result<ParsedBlock, GeoFrameError> {
    let (index_line, index_text) = block.lines[0];
    let sequence_index: u64 =
        index_text
            .trim()
            .parse()
            .map_err(|_| GeoFrameError::TelemetryParse {
                block: block.position,
                line: Some(index_line),
                field: "sequence index",
                reason: format!("expected an integer, found {:?}", index_text.trim()),
            })?;

    let error = |line: usize, field: &'static str, reason: String| GeoFrameError::TelemetryParse {
        block: sequence_index,
        line: Some(line),
        field,
        reason,
    };

    let (time_line, time_text) = block
        .lines
        .get(1)
        .copied()
        .ok_or_else(|| error(index_line, "time range", "missing time range line".to_string()))?;
    let (start_time, end_time) =
        parse_time_range(time_text).map_err(|reason| error(time_line, "time range", reason))?;

    let body = &block.lines[2.min(block.lines.len())..];
    let last_line = block.lines[block.lines.len() - 1].0;
    let required = |extractor: &FieldExtractor| -> Result<ExtractedValue, GeoFrameError> {
        match extractor.extract(body) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(error(
                last_line,
                extractor.field(),
                "not present in block".to_string(),
            )),
            Err((line, reason)) => Err(error(line, extractor.field(), reason)),
        }
    };

    let latitude = required(fields.latitude)?;
    let longitude = required(fields.longitude)?;
    let altitude = match (fields.altitude.extract(body), fields.altitude_fallback) {
        (Ok(None), Some(fallback)) => required(fallback)?,
        _ => required(fields.altitude)?,
    };
    let focal_length = required(fields.focal_length)?;

    let parsed = ParsedBlock {
        record: TelemetryRecord {
            sequence_index,
            start_time,
            end_time,
            latitude: latitude.value,
            longitude: longitude.value,
            altitude: altitude.value,
            focal_length: focal_length.value,
        },
        index_line,
        time_line,
        latitude_line: latitude.line,
        longitude_line: longitude.line,
        altitude_line: altitude.line,
        focal_length_line: focal_length.line,
    };

    parsed
        .record
        .check()
        .map_err(|(field, reason)| error(parsed.line_for(field), field, reason))?;

    Ok(parsed)
}

/// Parse `HH:MM:SS,mmm --> HH:MM:SS,mmm`.
pub fn parse_time_range(text: &str) -> Result<(Duration, Duration), String> {
    let captures = TIME_RANGE
        .captures(text)
        .ok_or_else(|| format!("expected `HH:MM:SS,mmm --> HH:MM:SS,mmm`, found {text:?}"))?;

    let component = |index: usize| -> Result<u64, String> {
        captures[index]
            .parse::<u64>()
            .map_err(|error| format!("{:?}: {error}", &captures[index]))
    };
    let timestamp = |offset: usize| -> Result<Duration, String> {
        let hours = component(offset)?;
        let minutes = component(offset + 1)?;
        let seconds = component(offset + 2)?;
        let millis = component(offset + 3)?;
        if minutes >= 60 || seconds >= 60 {
            return Err(format!(
                "{:02}:{:02}:{:02},{:03} has minutes or seconds out of range",
                hours, minutes, seconds, millis
            ));
        }
        hours
            .checked_mul(3_600_000)
            .and_then(|total| total.checked_add((minutes * 60 + seconds) * 1_000 + millis))
            .map(Duration::from_millis)
            .ok_or_else(|| format!("{hours} hours is out of range"))
    };

    Ok((timestamp(1)?, timestamp(5)?))
}

fn parse_number(token: &str) -> Result<f64, String> {
    token
        .parse::<f64>()
        .map_err(|_| format!("{token:?} is not a number"))
}

/// Parse a coordinate, folding any hemisphere letter into the sign.
///
/// The letter may be attached (`40.12N`, `S33.9`) or separate (`40.12 N`).
fn parse_coordinate(
    token: &str,
    separate: Option<&str>,
    positive: char,
    negative: char,
) -> Result<f64, String> {
    let mut hemisphere = separate.and_then(|s| s.chars().next());
    let mut digits = token;

    let first = digits.chars().next();
    let last = digits.chars().last();
    if let Some(letter) = first.filter(char::is_ascii_alphabetic) {
        hemisphere = Some(letter);
        digits = &digits[1..];
    } else if let Some(letter) = last.filter(char::is_ascii_alphabetic) {
        hemisphere = Some(letter);
        digits = &digits[..digits.len() - 1];
    }

    let value = parse_number(digits.trim())?;
    match hemisphere.map(|c| c.to_ascii_uppercase()) {
        None => Ok(value),
        Some(letter) if letter == positive => Ok(value.abs()),
        Some(letter) if letter == negative => Ok(-value.abs()),
        Some(letter) => Err(format!(
            "hemisphere {letter:?} is not {positive:?} or {negative:?}"
        )),
    }
}
