//! Geodetic and optical value encoding.
//!
//! Converts a [`TelemetryRecord`] into the EXIF representation that
//! photogrammetry tools read:
//!
//! | Value | Tags | Encoding |
//! |-------|------|----------|
//! | latitude | `GPSLatitude`, `GPSLatitudeRef` | `d/1, m/1, s/1000000`, `N`/`S` |
//! | longitude | `GPSLongitude`, `GPSLongitudeRef` | `d/1, m/1, s/1000000`, `E`/`W` |
//! | altitude | `GPSAltitude`, `GPSAltitudeRef` | magnitude over 1000 (or finer), 0 above / 1 below |
//! | focal length | `FocalLength` | millimetres over 100 (or finer) |
//!
//! DMS values are computed from the coordinate rounded to whole
//! micro-arcseconds, so degrees and minutes are exact truncations and the
//! seconds never round up to 60.
//!
//! Every conversion rounds to nearest. Encoding is a pure function of the
//! record.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{
    exif::{EncodedMetadata, ExifTag, ExifValue},
    rational::URational,
    telemetry::TelemetryRecord,
};

/// Denominator of the DMS seconds component.
pub const SECONDS_DENOMINATOR: u32 = 1_000_000;

/// Starting denominator for altitude (millimetre resolution).
pub const ALTITUDE_DENOMINATOR: u32 = 1_000;

/// Starting denominator for focal length (hundredth-millimetre resolution).
pub const FOCAL_LENGTH_DENOMINATOR: u32 = 100;

/// `GPSVersionID` written with every image.
pub const GPS_VERSION: [u8; 4] = [2, 3, 0, 0];

const MICRO_ARCSECONDS_PER_DEGREE: u64 = 3_600 * SECONDS_DENOMINATOR as u64;
const MICRO_ARCSECONDS_PER_MINUTE: u64 = 60 * SECONDS_DENOMINATOR as u64;

/// Unsigned degrees, minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dms {
    /// Whole degrees.
    pub degrees: u32,
    /// Whole minutes, `0..60`.
    pub minutes: u32,
    /// Seconds as a rational over [`SECONDS_DENOMINATOR`], below 60.
    pub seconds: URational,
}

impl Dms {
    /// Convert the magnitude of `decimal` degrees.
    pub fn from_decimal(decimal: f64) -> Self {
        let total = (decimal.abs() * MICRO_ARCSECONDS_PER_DEGREE as f64).round() as u64;
        let degrees = total / MICRO_ARCSECONDS_PER_DEGREE;
        let remainder = total % MICRO_ARCSECONDS_PER_DEGREE;
        let minutes = remainder / MICRO_ARCSECONDS_PER_MINUTE;
        let micro_seconds = remainder % MICRO_ARCSECONDS_PER_MINUTE;
        Self {
            degrees: degrees as u32,
            minutes: minutes as u32,
            seconds: URational::new(micro_seconds as u32, SECONDS_DENOMINATOR),
        }
    }

    /// Back to unsigned decimal degrees.
    pub fn to_decimal(self) -> f64 {
        f64::from(self.degrees) + f64::from(self.minutes) / 60.0 + self.seconds.to_f64() / 3_600.0
    }

    /// The three EXIF rationals.
    pub fn to_rationals(self) -> Vec<URational> {
        vec![
            URational::integer(self.degrees),
            URational::integer(self.minutes),
            self.seconds,
        ]
    }

    /// Rebuild from three EXIF rationals. Degrees and minutes may carry
    /// fractions, as some writers emit them; they are folded into the
    /// decimal value by [`decode_coordinate`].
    fn rationals_to_decimal(parts: &[URational]) -> Option<f64> {
        match parts {
            [degrees, minutes, seconds] => Some(
                degrees.to_f64() + minutes.to_f64() / 60.0 + seconds.to_f64() / 3_600.0,
            ),
            _ => None,
        }
    }
}

impl Display for Dms {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}°{:02}'{:09.6}\"",
            self.degrees,
            self.minutes,
            self.seconds.to_f64()
        )
    }
}

/// Which coordinate axis a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// North/south.
    Latitude,
    /// East/west.
    Longitude,
}

/// Hemisphere reference letter for a signed coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    /// `N`
    North,
    /// `S`
    South,
    /// `E`
    East,
    /// `W`
    West,
}

impl Hemisphere {
    /// Hemisphere of a signed coordinate. Zero is north/east.
    pub fn of(axis: Axis, decimal: f64) -> Self {
        let negative = decimal < 0.0;
        match (axis, negative) {
            (Axis::Latitude, false) => Hemisphere::North,
            (Axis::Latitude, true) => Hemisphere::South,
            (Axis::Longitude, false) => Hemisphere::East,
            (Axis::Longitude, true) => Hemisphere::West,
        }
    }

    /// The single-letter reference string.
    pub fn as_str(self) -> &'static str {
        match self {
            Hemisphere::North => "N",
            Hemisphere::South => "S",
            Hemisphere::East => "E",
            Hemisphere::West => "W",
        }
    }

    /// `-1.0` for south and west, `1.0` otherwise.
    pub fn sign(self) -> f64 {
        match self {
            Hemisphere::South | Hemisphere::West => -1.0,
            Hemisphere::North | Hemisphere::East => 1.0,
        }
    }

    fn parse(reference: &str) -> Option<Self> {
        match reference.trim() {
            "N" => Some(Hemisphere::North),
            "S" => Some(Hemisphere::South),
            "E" => Some(Hemisphere::East),
            "W" => Some(Hemisphere::West),
            _ => None,
        }
    }
}

impl Display for Hemisphere {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// `GPSAltitudeRef` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AltitudeReference {
    /// 0: at or above the reference.
    Above,
    /// 1: below the reference.
    Below,
}

impl AltitudeReference {
    /// Reference for a signed altitude.
    pub fn of(altitude: f64) -> Self {
        if altitude < 0.0 {
            AltitudeReference::Below
        } else {
            AltitudeReference::Above
        }
    }

    /// The EXIF byte value.
    pub fn as_byte(self) -> u8 {
        match self {
            AltitudeReference::Above => 0,
            AltitudeReference::Below => 1,
        }
    }
}

/// Encode a record's position, altitude and focal length as EXIF tags.
pub fn encode_record(record: &TelemetryRecord) -> EncodedMetadata {
    let mut metadata = EncodedMetadata::new();
    metadata.insert(ExifTag::GpsVersionId, ExifValue::Byte(GPS_VERSION.to_vec()));

    for (axis, decimal, reference_tag, value_tag) in [
        (
            Axis::Latitude,
            record.latitude,
            ExifTag::GpsLatitudeRef,
            ExifTag::GpsLatitude,
        ),
        (
            Axis::Longitude,
            record.longitude,
            ExifTag::GpsLongitudeRef,
            ExifTag::GpsLongitude,
        ),
    ] {
        let hemisphere = Hemisphere::of(axis, decimal);
        metadata.insert(reference_tag, ExifValue::Ascii(hemisphere.as_str().to_string()));
        metadata.insert(
            value_tag,
            ExifValue::Rational(Dms::from_decimal(decimal).to_rationals()),
        );
    }

    metadata.insert(
        ExifTag::GpsAltitudeRef,
        ExifValue::Byte(vec![AltitudeReference::of(record.altitude).as_byte()]),
    );
    metadata.insert(
        ExifTag::GpsAltitude,
        ExifValue::Rational(vec![URational::approximate(
            record.altitude,
            ALTITUDE_DENOMINATOR,
        )]),
    );
    metadata.insert(
        ExifTag::FocalLength,
        ExifValue::Rational(vec![URational::approximate(
            record.focal_length,
            FOCAL_LENGTH_DENOMINATOR,
        )]),
    );

    metadata
}

/// Read a signed decimal coordinate back out of encoded metadata.
pub fn decode_coordinate(metadata: &EncodedMetadata, axis: Axis) -> Option<f64> {
    let (reference_tag, value_tag) = match axis {
        Axis::Latitude => (ExifTag::GpsLatitudeRef, ExifTag::GpsLatitude),
        Axis::Longitude => (ExifTag::GpsLongitudeRef, ExifTag::GpsLongitude),
    };
    let hemisphere = Hemisphere::parse(metadata.get(reference_tag)?.as_ascii()?)?;
    let magnitude = Dms::rationals_to_decimal(metadata.get(value_tag)?.as_rationals()?)?;
    Some(hemisphere.sign() * magnitude)
}

/// Read the signed altitude back out of encoded metadata.
pub fn decode_altitude(metadata: &EncodedMetadata) -> Option<f64> {
    let magnitude = metadata.get(ExifTag::GpsAltitude)?.as_rationals()?.first()?.to_f64();
    let below = metadata
        .get(ExifTag::GpsAltitudeRef)
        .and_then(ExifValue::as_bytes)
        .and_then(|bytes| bytes.first())
        .is_some_and(|&byte| byte == 1);
    Some(if below { -magnitude } else { magnitude })
}

/// Read the focal length back out of encoded metadata.
pub fn decode_focal_length(metadata: &EncodedMetadata) -> Option<f64> {
    Some(metadata.get(ExifTag::FocalLength)?.as_rationals()?.first()?.to_f64())
}
