//! EXIF metadata: tag model, TIFF serialization, and JPEG embedding.
//!
//! [`EncodedMetadata`] maps each [`ExifTag`] to the [`ExifValue`] that will
//! be stored for it. [`serialize_tiff`] lays the tags out as a big-endian
//! TIFF structure (IFD0 pointing at an Exif IFD and a GPS IFD), and
//! [`embed_exif`] places that structure in a JPEG `APP1` segment right
//! after the JFIF header, replacing any existing EXIF segment.
//!
//! [`read_metadata`] goes the other way, for checking what an image
//! actually carries. It understands both byte orders but only collects the
//! tags listed in [`ExifTag`].

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::Path,
};

use crate::{error::GeoFrameError, rational::URational};

const TYPE_BYTE: u16 = 1;
const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_UNDEFINED: u16 = 7;

const TAG_EXIF_IFD_POINTER: u16 = 0x8769;
const TAG_GPS_IFD_POINTER: u16 = 0x8825;
const TAG_EXIF_VERSION: u16 = 0x9000;

const EXIF_VERSION: &[u8; 4] = b"0232";
const EXIF_HEADER: &[u8; 6] = b"Exif\0\0";
const TIFF_HEADER_LEN: u32 = 8;

const MARKER_SOI: u8 = 0xD8;
const MARKER_APP0: u8 = 0xE0;
const MARKER_APP1: u8 = 0xE1;
const MARKER_APP15: u8 = 0xEF;

/// The IFD a tag lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfdKind {
    /// The Exif sub-IFD (camera and optics tags).
    Exif,
    /// The GPS sub-IFD.
    Gps,
}

/// The EXIF tags this crate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExifTag {
    /// `GPSVersionID`, four bytes.
    GpsVersionId,
    /// `GPSLatitudeRef`, `"N"` or `"S"`.
    GpsLatitudeRef,
    /// `GPSLatitude`, degrees/minutes/seconds rationals.
    GpsLatitude,
    /// `GPSLongitudeRef`, `"E"` or `"W"`.
    GpsLongitudeRef,
    /// `GPSLongitude`, degrees/minutes/seconds rationals.
    GpsLongitude,
    /// `GPSAltitudeRef`, 0 above and 1 below the reference.
    GpsAltitudeRef,
    /// `GPSAltitude`, metres as an unsigned rational.
    GpsAltitude,
    /// `FocalLength`, millimetres as an unsigned rational.
    FocalLength,
}

impl ExifTag {
    /// Every tag, in declaration order.
    pub const ALL: [ExifTag; 8] = [
        ExifTag::GpsVersionId,
        ExifTag::GpsLatitudeRef,
        ExifTag::GpsLatitude,
        ExifTag::GpsLongitudeRef,
        ExifTag::GpsLongitude,
        ExifTag::GpsAltitudeRef,
        ExifTag::GpsAltitude,
        ExifTag::FocalLength,
    ];

    /// Numeric tag identifier.
    pub fn id(self) -> u16 {
        match self {
            ExifTag::GpsVersionId => 0x0000,
            ExifTag::GpsLatitudeRef => 0x0001,
            ExifTag::GpsLatitude => 0x0002,
            ExifTag::GpsLongitudeRef => 0x0003,
            ExifTag::GpsLongitude => 0x0004,
            ExifTag::GpsAltitudeRef => 0x0005,
            ExifTag::GpsAltitude => 0x0006,
            ExifTag::FocalLength => 0x920A,
        }
    }

    /// The IFD the tag belongs in.
    pub fn ifd(self) -> IfdKind {
        match self {
            ExifTag::FocalLength => IfdKind::Exif,
            _ => IfdKind::Gps,
        }
    }

    fn from_id(ifd: IfdKind, id: u16) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.ifd() == ifd && tag.id() == id)
    }
}

impl Display for ExifTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            ExifTag::GpsVersionId => "GPSVersionID",
            ExifTag::GpsLatitudeRef => "GPSLatitudeRef",
            ExifTag::GpsLatitude => "GPSLatitude",
            ExifTag::GpsLongitudeRef => "GPSLongitudeRef",
            ExifTag::GpsLongitude => "GPSLongitude",
            ExifTag::GpsAltitudeRef => "GPSAltitudeRef",
            ExifTag::GpsAltitude => "GPSAltitude",
            ExifTag::FocalLength => "FocalLength",
        };
        write!(f, "{name}")
    }
}

/// A typed EXIF field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExifValue {
    /// `BYTE` values.
    Byte(Vec<u8>),
    /// `ASCII` text, written with a trailing NUL.
    Ascii(String),
    /// `SHORT` values.
    Short(Vec<u16>),
    /// `LONG` values.
    Long(Vec<u32>),
    /// `RATIONAL` values.
    Rational(Vec<URational>),
    /// `UNDEFINED` bytes.
    Undefined(Vec<u8>),
}

impl ExifValue {
    fn type_code(&self) -> u16 {
        match self {
            ExifValue::Byte(_) => TYPE_BYTE,
            ExifValue::Ascii(_) => TYPE_ASCII,
            ExifValue::Short(_) => TYPE_SHORT,
            ExifValue::Long(_) => TYPE_LONG,
            ExifValue::Rational(_) => TYPE_RATIONAL,
            ExifValue::Undefined(_) => TYPE_UNDEFINED,
        }
    }

    fn count(&self) -> u32 {
        let count = match self {
            ExifValue::Byte(bytes) | ExifValue::Undefined(bytes) => bytes.len(),
            ExifValue::Ascii(text) => text.len() + 1,
            ExifValue::Short(values) => values.len(),
            ExifValue::Long(values) => values.len(),
            ExifValue::Rational(values) => values.len(),
        };
        count as u32
    }

    fn to_be_bytes(&self) -> Vec<u8> {
        match self {
            ExifValue::Byte(bytes) | ExifValue::Undefined(bytes) => bytes.clone(),
            ExifValue::Ascii(text) => {
                let mut bytes = text.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
            ExifValue::Short(values) => values.iter().flat_map(|v| v.to_be_bytes()).collect(),
            ExifValue::Long(values) => values.iter().flat_map(|v| v.to_be_bytes()).collect(),
            ExifValue::Rational(values) => values
                .iter()
                .flat_map(|r| {
                    let mut pair = [0u8; 8];
                    pair[..4].copy_from_slice(&r.numerator.to_be_bytes());
                    pair[4..].copy_from_slice(&r.denominator.to_be_bytes());
                    pair
                })
                .collect(),
        }
    }

    /// The rationals, if this is a `RATIONAL` value.
    pub fn as_rationals(&self) -> Option<&[URational]> {
        match self {
            ExifValue::Rational(values) => Some(values),
            _ => None,
        }
    }

    /// The text, if this is an `ASCII` value.
    pub fn as_ascii(&self) -> Option<&str> {
        match self {
            ExifValue::Ascii(text) => Some(text),
            _ => None,
        }
    }

    /// The bytes, if this is a `BYTE` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ExifValue::Byte(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl Display for ExifValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ExifValue::Ascii(text) => write!(f, "{text:?}"),
            ExifValue::Byte(bytes) | ExifValue::Undefined(bytes) => write!(f, "{bytes:?}"),
            ExifValue::Short(values) => write!(f, "{values:?}"),
            ExifValue::Long(values) => write!(f, "{values:?}"),
            ExifValue::Rational(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Tag-to-value mapping ready to be written into an image.
///
/// Iteration order is the tag order, so equal mappings serialize to
/// identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedMetadata {
    tags: BTreeMap<ExifTag, ExifValue>,
}

impl EncodedMetadata {
    /// An empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `tag` to `value`, returning the previous value.
    pub fn insert(&mut self, tag: ExifTag, value: ExifValue) -> Option<ExifValue> {
        self.tags.insert(tag, value)
    }

    /// The value stored for `tag`.
    pub fn get(&self, tag: ExifTag) -> Option<&ExifValue> {
        self.tags.get(&tag)
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether there are no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// All tags and values, in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (ExifTag, &ExifValue)> {
        self.tags.iter().map(|(tag, value)| (*tag, value))
    }

    fn entries_for(&self, ifd: IfdKind) -> Vec<(u16, &ExifValue)> {
        let mut entries: Vec<(u16, &ExifValue)> = self
            .iter()
            .filter(|(tag, _)| tag.ifd() == ifd)
            .map(|(tag, value)| (tag.id(), value))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

/// Size in bytes of an IFD plus its out-of-line data.
fn ifd_size(entries: &[(u16, &ExifValue)]) -> u32 {
    let external: usize = entries
        .iter()
        .map(|(_, value)| {
            let len = value.to_be_bytes().len();
            if len > 4 { len + len % 2 } else { 0 }
        })
        .sum();
    2 + 12 * entries.len() as u32 + 4 + external as u32
}

/// Append an IFD located at `offset` (relative to the TIFF header).
fn write_ifd(out: &mut Vec<u8>, entries: &[(u16, &ExifValue)], offset: u32) {
    let mut data: Vec<u8> = Vec::new();
    let data_start = offset + 2 + 12 * entries.len() as u32 + 4;

    out.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for (id, value) in entries {
        let bytes = value.to_be_bytes();
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&value.type_code().to_be_bytes());
        out.extend_from_slice(&value.count().to_be_bytes());
        if bytes.len() <= 4 {
            let mut inline = [0u8; 4];
            inline[..bytes.len()].copy_from_slice(&bytes);
            out.extend_from_slice(&inline);
        } else {
            let value_offset = data_start + data.len() as u32;
            out.extend_from_slice(&value_offset.to_be_bytes());
            data.extend_from_slice(&bytes);
            if data.len() % 2 == 1 {
                data.push(0);
            }
        }
    }
    // No chained IFD.
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&data);
}

/// Serialize `metadata` as a big-endian TIFF structure.
///
/// IFD0 holds only the pointers to the Exif and GPS IFDs; each sub-IFD is
/// present only when it has tags. The Exif IFD always carries
/// `ExifVersion`.
pub fn serialize_tiff(metadata: &EncodedMetadata) -> Vec<u8> {
    let version = ExifValue::Undefined(EXIF_VERSION.to_vec());
    let mut exif_entries = metadata.entries_for(IfdKind::Exif);
    if !exif_entries.is_empty() {
        exif_entries.insert(0, (TAG_EXIF_VERSION, &version));
        exif_entries.sort_by_key(|(id, _)| *id);
    }
    let gps_entries = metadata.entries_for(IfdKind::Gps);

    let pointer_count = u32::from(!exif_entries.is_empty()) + u32::from(!gps_entries.is_empty());
    let ifd0_size = 2 + 12 * pointer_count + 4;
    let exif_offset = TIFF_HEADER_LEN + ifd0_size;
    let gps_offset = exif_offset
        + if exif_entries.is_empty() {
            0
        } else {
            ifd_size(&exif_entries)
        };

    let exif_pointer = ExifValue::Long(vec![exif_offset]);
    let gps_pointer = ExifValue::Long(vec![gps_offset]);
    let mut ifd0: Vec<(u16, &ExifValue)> = Vec::new();
    if !exif_entries.is_empty() {
        ifd0.push((TAG_EXIF_IFD_POINTER, &exif_pointer));
    }
    if !gps_entries.is_empty() {
        ifd0.push((TAG_GPS_IFD_POINTER, &gps_pointer));
    }

    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(b"MM");
    out.extend_from_slice(&42u16.to_be_bytes());
    out.extend_from_slice(&TIFF_HEADER_LEN.to_be_bytes());
    write_ifd(&mut out, &ifd0, TIFF_HEADER_LEN);
    if !exif_entries.is_empty() {
        write_ifd(&mut out, &exif_entries, exif_offset);
    }
    if !gps_entries.is_empty() {
        write_ifd(&mut out, &gps_entries, gps_offset);
    }
    out
}

/// Length-prefixed JPEG marker segments at the start of a file.
struct Segment {
    marker: u8,
    start: usize,
    end: usize,
}

/// Walk the `APPn` segments that directly follow SOI.
fn leading_app_segments(jpeg: &[u8]) -> Result<Vec<Segment>, String> {
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != MARKER_SOI {
        return Err("not a JPEG file (missing SOI marker)".to_string());
    }

    let mut segments = Vec::new();
    let mut pos = 2;
    while pos + 4 <= jpeg.len() && jpeg[pos] == 0xFF {
        let marker = jpeg[pos + 1];
        if !(MARKER_APP0..=MARKER_APP15).contains(&marker) {
            break;
        }
        let length = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + length;
        if length < 2 || end > jpeg.len() {
            return Err(format!("truncated APP{} segment", marker - MARKER_APP0));
        }
        segments.push(Segment {
            marker,
            start: pos,
            end,
        });
        pos = end;
    }
    Ok(segments)
}

fn is_exif_segment(jpeg: &[u8], segment: &Segment) -> bool {
    segment.marker == MARKER_APP1 && jpeg[segment.start + 4..segment.end].starts_with(EXIF_HEADER)
}

/// Insert a TIFF structure into a JPEG as its EXIF `APP1` segment.
///
/// The segment goes after any leading `APP0` (JFIF) segments. Existing
/// EXIF segments are dropped; every other byte is kept as is.
///
/// # Errors
///
/// Returns a description if `jpeg` is not a JPEG or the TIFF data does not
/// fit in a single segment.
pub fn embed_exif(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>, String> {
    let segment_length = 2 + EXIF_HEADER.len() + tiff.len();
    let segment_length = u16::try_from(segment_length)
        .map_err(|_| format!("EXIF data of {} bytes exceeds one APP1 segment", tiff.len()))?;

    let segments = leading_app_segments(jpeg)?;
    let mut out = Vec::with_capacity(jpeg.len() + segment_length as usize + 2);
    out.extend_from_slice(&jpeg[..2]);

    let mut inserted = false;
    let mut pos = 2;
    for segment in &segments {
        if segment.marker != MARKER_APP0 && !inserted {
            write_app1(&mut out, segment_length, tiff);
            inserted = true;
        }
        if !is_exif_segment(jpeg, segment) {
            out.extend_from_slice(&jpeg[segment.start..segment.end]);
        }
        pos = segment.end;
    }
    if !inserted {
        write_app1(&mut out, segment_length, tiff);
    }
    out.extend_from_slice(&jpeg[pos..]);
    Ok(out)
}

fn write_app1(out: &mut Vec<u8>, segment_length: u16, tiff: &[u8]) {
    out.extend_from_slice(&[0xFF, MARKER_APP1]);
    out.extend_from_slice(&segment_length.to_be_bytes());
    out.extend_from_slice(EXIF_HEADER);
    out.extend_from_slice(tiff);
}

/// Reads TIFF integers in either byte order.
struct TiffReader<'a> {
    data: &'a [u8],
    big_endian: bool,
}

impl<'a> TiffReader<'a> {
    fn new(data: &'a [u8]) -> Result<Self, String> {
        let big_endian = match data.get(..2) {
            Some(b"MM") => true,
            Some(b"II") => false,
            _ => return Err("unknown TIFF byte order".to_string()),
        };
        let reader = Self { data, big_endian };
        if reader.u16_at(2)? != 42 {
            return Err("bad TIFF magic number".to_string());
        }
        Ok(reader)
    }

    fn bytes_at(&self, offset: usize, len: usize) -> Result<&'a [u8], String> {
        self.data
            .get(offset..offset + len)
            .ok_or_else(|| format!("offset {offset} is outside the TIFF data"))
    }

    fn u16_at(&self, offset: usize) -> Result<u16, String> {
        let b = self.bytes_at(offset, 2)?;
        let pair = [b[0], b[1]];
        Ok(if self.big_endian {
            u16::from_be_bytes(pair)
        } else {
            u16::from_le_bytes(pair)
        })
    }

    fn u32_at(&self, offset: usize) -> Result<u32, String> {
        let b = self.bytes_at(offset, 4)?;
        let quad = [b[0], b[1], b[2], b[3]];
        Ok(if self.big_endian {
            u32::from_be_bytes(quad)
        } else {
            u32::from_le_bytes(quad)
        })
    }

    /// `(tag id, type, count, value field offset)` for each entry.
    fn entries(&self, ifd_offset: usize) -> Result<Vec<(u16, u16, u32, usize)>, String> {
        let count = self.u16_at(ifd_offset)? as usize;
        (0..count)
            .map(|i| {
                let entry = ifd_offset + 2 + 12 * i;
                Ok((
                    self.u16_at(entry)?,
                    self.u16_at(entry + 2)?,
                    self.u32_at(entry + 4)?,
                    entry + 8,
                ))
            })
            .collect()
    }

    fn value(&self, kind: u16, count: u32, field: usize) -> Result<Option<ExifValue>, String> {
        let count = count as usize;
        let unit = match kind {
            TYPE_BYTE | TYPE_ASCII | TYPE_UNDEFINED => 1,
            TYPE_SHORT => 2,
            TYPE_LONG => 4,
            TYPE_RATIONAL => 8,
            _ => return Ok(None),
        };
        let len = unit * count;
        let start = if len <= 4 {
            field
        } else {
            self.u32_at(field)? as usize
        };
        let bytes = self.bytes_at(start, len)?;

        let value = match kind {
            TYPE_BYTE => ExifValue::Byte(bytes.to_vec()),
            TYPE_UNDEFINED => ExifValue::Undefined(bytes.to_vec()),
            TYPE_ASCII => {
                let text = bytes.split(|&b| b == 0).next().unwrap_or_default();
                ExifValue::Ascii(String::from_utf8_lossy(text).into_owned())
            }
            TYPE_SHORT => ExifValue::Short(
                (0..count)
                    .map(|i| self.u16_at(start + 2 * i))
                    .collect::<Result<_, _>>()?,
            ),
            TYPE_LONG => ExifValue::Long(
                (0..count)
                    .map(|i| self.u32_at(start + 4 * i))
                    .collect::<Result<_, _>>()?,
            ),
            _ => ExifValue::Rational(
                (0..count)
                    .map(|i| {
                        Ok(URational::new(
                            self.u32_at(start + 8 * i)?,
                            self.u32_at(start + 8 * i + 4)?,
                        ))
                    })
                    .collect::<Result<_, String>>()?,
            ),
        };
        Ok(Some(value))
    }
}

/// Parse a TIFF structure and collect the known tags.
pub fn parse_tiff(tiff: &[u8]) -> Result<EncodedMetadata, String> {
    let reader = TiffReader::new(tiff)?;
    let ifd0 = reader.u32_at(4)? as usize;
    let mut metadata = EncodedMetadata::new();

    for (id, _, _, field) in reader.entries(ifd0)? {
        let ifd = match id {
            TAG_EXIF_IFD_POINTER => IfdKind::Exif,
            TAG_GPS_IFD_POINTER => IfdKind::Gps,
            _ => continue,
        };
        let offset = reader.u32_at(field)? as usize;
        for (tag_id, kind, count, value_field) in reader.entries(offset)? {
            let Some(tag) = ExifTag::from_id(ifd, tag_id) else {
                continue;
            };
            if let Some(value) = reader.value(kind, count, value_field)? {
                metadata.insert(tag, value);
            }
        }
    }

    Ok(metadata)
}

/// Read the known EXIF tags from JPEG bytes.
///
/// A JPEG without an EXIF segment yields an empty mapping.
///
/// # Errors
///
/// Returns a description if the bytes are not a JPEG or the EXIF segment
/// is malformed.
pub fn read_metadata(jpeg: &[u8]) -> Result<EncodedMetadata, String> {
    let segments = leading_app_segments(jpeg)?;
    match segments.iter().find(|s| is_exif_segment(jpeg, s)) {
        Some(segment) => parse_tiff(&jpeg[segment.start + 4 + EXIF_HEADER.len()..segment.end]),
        None => Ok(EncodedMetadata::new()),
    }
}

/// Writes encoded metadata into an image file that already exists.
pub trait MetadataWriter {
    /// Attach `metadata` to the image at `path`.
    ///
    /// # Errors
    ///
    /// [`GeoFrameError::MetadataWrite`] if the file cannot be read, is not
    /// a supported image, or cannot be rewritten.
    fn write_metadata(
        &mut self,
        path: &Path,
        metadata: &EncodedMetadata,
    ) -> Result<(), GeoFrameError>;
}

/// [`MetadataWriter`] that embeds EXIF into JPEG files.
///
/// The file is rewritten through a sibling temporary file and a rename, so
/// an interrupted write never leaves a half-written image behind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifJpegWriter;

impl ExifJpegWriter {
    /// Create a writer.
    pub fn new() -> Self {
        Self
    }
}

impl MetadataWriter for ExifJpegWriter {
    fn write_metadata(
        &mut self,
        path: &Path,
        metadata: &EncodedMetadata,
    ) -> Result<(), GeoFrameError> {
        let failure = |reason: String| GeoFrameError::MetadataWrite {
            path: path.to_path_buf(),
            reason,
        };

        let jpeg = fs::read(path).map_err(|error| failure(error.to_string()))?;
        let tiff = serialize_tiff(metadata);
        let tagged = embed_exif(&jpeg, &tiff).map_err(failure)?;

        let mut temporary = path.as_os_str().to_owned();
        temporary.push(".exif-tmp");
        fs::write(&temporary, &tagged).map_err(|error| failure(error.to_string()))?;
        fs::rename(&temporary, path).map_err(|error| {
            let _ = fs::remove_file(&temporary);
            failure(error.to_string())
        })?;

        log::debug!(
            "Wrote {} EXIF tags ({} bytes) to {}",
            metadata.len(),
            tiff.len(),
            path.display()
        );
        Ok(())
    }
}
