//! Geodetic encoding and EXIF embedding tests.

use std::time::Duration;

use geoframes::{
    AltitudeReference, Axis, Dms, ExifJpegWriter, ExifTag, ExifValue, GeoFrameError, Hemisphere,
    MetadataWriter, TelemetryRecord, URational, decode_altitude, decode_coordinate,
    decode_focal_length, encode_record,
    exif::{embed_exif, serialize_tiff},
    read_metadata,
};
use image::{RgbImage, codecs::jpeg::JpegEncoder};

/// Largest coordinate error allowed after a round trip, in degrees.
const COORDINATE_TOLERANCE: f64 = 6e-7;

fn record(latitude: f64, longitude: f64, altitude: f64, focal_length: f64) -> TelemetryRecord {
    TelemetryRecord {
        sequence_index: 1,
        start_time: Duration::ZERO,
        end_time: Duration::from_millis(33),
        latitude,
        longitude,
        altitude,
        focal_length,
    }
}

fn small_jpeg() -> Vec<u8> {
    let image = RgbImage::from_fn(16, 8, |x, y| image::Rgb([x as u8 * 16, y as u8 * 32, 128]));
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode_image(&image)
        .unwrap();
    bytes
}

fn rationals(value: Option<&ExifValue>) -> Vec<URational> {
    value.and_then(ExifValue::as_rationals).unwrap().to_vec()
}

fn count_exif_segments(jpeg: &[u8]) -> usize {
    jpeg.windows(6).filter(|w| *w == b"Exif\0\0").count()
}

#[test]
fn encodes_known_coordinates_as_dms() {
    let metadata = encode_record(&record(40.123456, -74.654321, 50.2, 24.0));

    assert_eq!(
        rationals(metadata.get(ExifTag::GpsLatitude)),
        vec![
            URational::new(40, 1),
            URational::new(7, 1),
            URational::new(24_441_600, 1_000_000),
        ]
    );
    assert_eq!(
        rationals(metadata.get(ExifTag::GpsLongitude)),
        vec![
            URational::new(74, 1),
            URational::new(39, 1),
            URational::new(15_555_600, 1_000_000),
        ]
    );
    assert_eq!(
        metadata.get(ExifTag::GpsLatitudeRef).and_then(ExifValue::as_ascii),
        Some("N")
    );
    assert_eq!(
        metadata.get(ExifTag::GpsLongitudeRef).and_then(ExifValue::as_ascii),
        Some("W")
    );
    assert_eq!(
        rationals(metadata.get(ExifTag::GpsAltitude)),
        vec![URational::new(50_200, 1_000)]
    );
    assert_eq!(
        metadata.get(ExifTag::GpsAltitudeRef).and_then(ExifValue::as_bytes),
        Some(&[0u8][..])
    );
    assert_eq!(
        rationals(metadata.get(ExifTag::FocalLength)),
        vec![URational::new(2_400, 100)]
    );
    assert_eq!(
        metadata.get(ExifTag::GpsVersionId),
        Some(&ExifValue::Byte(vec![2, 3, 0, 0]))
    );
}

#[test]
fn coordinates_round_trip_within_tolerance() {
    let samples = [
        (0.0, 0.0),
        (90.0, 180.0),
        (-90.0, -180.0),
        (40.123456, -74.654321),
        (-33.868820, 151.209296),
        (51.477928, -0.001545),
        (-0.000001, 0.0000004),
        (12.99999999, -45.99999999),
        (64.1265, -21.8174),
    ];

    for (latitude, longitude) in samples {
        let metadata = encode_record(&record(latitude, longitude, 0.0, 24.0));
        let decoded_latitude = decode_coordinate(&metadata, Axis::Latitude).unwrap();
        let decoded_longitude = decode_coordinate(&metadata, Axis::Longitude).unwrap();
        assert!(
            (decoded_latitude - latitude).abs() <= COORDINATE_TOLERANCE,
            "latitude {latitude} decoded as {decoded_latitude}"
        );
        assert!(
            (decoded_longitude - longitude).abs() <= COORDINATE_TOLERANCE,
            "longitude {longitude} decoded as {decoded_longitude}"
        );
    }
}

#[test]
fn dms_never_carries_sixty_seconds_or_minutes() {
    for decimal in [12.99999999, 0.016666666, 179.9999999, 45.5, 1.0 / 3.0] {
        let dms = Dms::from_decimal(decimal);
        assert!(dms.minutes < 60, "{decimal} -> {dms}");
        assert!(dms.seconds.to_f64() < 60.0, "{decimal} -> {dms}");
        assert_eq!(dms.seconds.denominator, 1_000_000);
        assert!((dms.to_decimal() - decimal).abs() <= COORDINATE_TOLERANCE);
    }
    assert_eq!(
        Dms::from_decimal(13.0 - 1e-10),
        Dms {
            degrees: 13,
            minutes: 0,
            seconds: URational::new(0, 1_000_000),
        }
    );
}

#[test]
fn hemisphere_and_altitude_references() {
    assert_eq!(Hemisphere::of(Axis::Latitude, 0.0), Hemisphere::North);
    assert_eq!(Hemisphere::of(Axis::Latitude, -0.5), Hemisphere::South);
    assert_eq!(Hemisphere::of(Axis::Longitude, 0.0), Hemisphere::East);
    assert_eq!(Hemisphere::of(Axis::Longitude, -120.0), Hemisphere::West);
    assert_eq!(AltitudeReference::of(0.0).as_byte(), 0);
    assert_eq!(AltitudeReference::of(-0.1).as_byte(), 1);

    let metadata = encode_record(&record(-33.8688, 151.2093, -12.5, 24.0));
    assert_eq!(
        metadata.get(ExifTag::GpsLatitudeRef).and_then(ExifValue::as_ascii),
        Some("S")
    );
    assert_eq!(
        metadata.get(ExifTag::GpsLongitudeRef).and_then(ExifValue::as_ascii),
        Some("E")
    );
    assert_eq!(
        metadata.get(ExifTag::GpsAltitudeRef).and_then(ExifValue::as_bytes),
        Some(&[1u8][..])
    );
    assert_eq!(
        rationals(metadata.get(ExifTag::GpsAltitude)),
        vec![URational::new(12_500, 1_000)]
    );
    assert_eq!(decode_altitude(&metadata), Some(-12.5));
}

#[test]
fn fractional_focal_length_keeps_its_digits() {
    let metadata = encode_record(&record(1.0, 1.0, 1.0, 4.125));
    assert_eq!(
        rationals(metadata.get(ExifTag::FocalLength)),
        vec![URational::new(4_125, 1_000)]
    );
    assert_eq!(decode_focal_length(&metadata), Some(4.125));

    let rounded = encode_record(&record(1.0, 1.0, 152.4173, 12.29));
    assert_eq!(
        rationals(rounded.get(ExifTag::GpsAltitude)),
        vec![URational::new(1_524_173, 10_000)]
    );
}

#[test]
fn encoding_is_deterministic() {
    let input = record(40.123456, -74.654321, 50.2, 24.0);
    let first = encode_record(&input);
    let second = encode_record(&input);
    assert_eq!(first, second);
    assert_eq!(serialize_tiff(&first), serialize_tiff(&second));
}

#[test]
fn tiff_is_big_endian_with_gps_and_exif_pointers() {
    let tiff = serialize_tiff(&encode_record(&record(1.0, 2.0, 3.0, 4.0)));
    assert_eq!(&tiff[..4], b"MM\0\x2a");
    assert_eq!(u32::from_be_bytes([tiff[4], tiff[5], tiff[6], tiff[7]]), 8);
    // IFD0 holds exactly the two sub-IFD pointers.
    assert_eq!(u16::from_be_bytes([tiff[8], tiff[9]]), 2);
    assert_eq!(u16::from_be_bytes([tiff[10], tiff[11]]), 0x8769);
    assert_eq!(u16::from_be_bytes([tiff[22], tiff[23]]), 0x8825);
}

#[test]
fn embedded_metadata_reads_back_and_image_still_decodes() {
    let metadata = encode_record(&record(40.123456, -74.654321, 50.2, 24.0));
    let jpeg = small_jpeg();
    let tagged = embed_exif(&jpeg, &serialize_tiff(&metadata)).unwrap();

    assert_eq!(read_metadata(&tagged).unwrap(), metadata);
    assert_eq!(count_exif_segments(&tagged), 1);

    let decoded = image::load_from_memory(&tagged).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (16, 8));
}

#[test]
fn embedding_replaces_existing_exif() {
    let jpeg = small_jpeg();
    let first = encode_record(&record(10.0, 20.0, 30.0, 24.0));
    let second = encode_record(&record(-10.0, -20.0, 40.0, 35.0));

    let once = embed_exif(&jpeg, &serialize_tiff(&first)).unwrap();
    let twice = embed_exif(&once, &serialize_tiff(&second)).unwrap();

    assert_eq!(count_exif_segments(&twice), 1);
    assert_eq!(read_metadata(&twice).unwrap(), second);
    assert_eq!(twice.len(), jpeg.len() + 10 + serialize_tiff(&second).len());
}

#[test]
fn plain_jpeg_has_no_metadata_and_non_jpeg_is_rejected() {
    assert!(read_metadata(&small_jpeg()).unwrap().is_empty());
    assert!(read_metadata(b"\x89PNG\r\n").is_err());
    assert!(embed_exif(b"not a jpeg", &[]).is_err());
}

#[test]
fn writer_tags_files_in_place() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("frame_000000.jpeg");
    std::fs::write(&path, small_jpeg()).unwrap();

    let metadata = encode_record(&record(-33.8688, 151.2093, 12.0, 6.72));
    ExifJpegWriter::new().write_metadata(&path, &metadata).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(read_metadata(&bytes).unwrap(), metadata);
    // The temporary sibling is gone.
    let leftovers: Vec<_> = std::fs::read_dir(directory.path()).unwrap().collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn writer_reports_unreadable_and_invalid_files() {
    let directory = tempfile::tempdir().unwrap();
    let metadata = encode_record(&record(1.0, 2.0, 3.0, 4.0));
    let mut writer = ExifJpegWriter::new();

    let missing = directory.path().join("missing.jpeg");
    assert!(matches!(
        writer.write_metadata(&missing, &metadata),
        Err(GeoFrameError::MetadataWrite { .. })
    ));

    let text = directory.path().join("notes.jpeg");
    std::fs::write(&text, "plain text").unwrap();
    match writer.write_metadata(&text, &metadata) {
        Err(GeoFrameError::MetadataWrite { path, .. }) => assert_eq!(path, text),
        other => panic!("expected MetadataWrite, got {other:?}"),
    }
    assert_eq!(std::fs::read_to_string(&text).unwrap(), "plain text");
}
