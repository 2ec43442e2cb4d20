//! Embedded-metadata codec.
//!
//! The pipeline only needs "read these slots" and "write these slots". The
//! kamadak-exif backed [`ExifCodec`] reads every container kamadak-exif
//! understands and writes into JPEG files only.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Cursor};
use std::path::Path;

use exif::{Field, In, Reader, Tag, Value};
use tracing::debug;

use crate::error::TagError;

/// Metadata slots the pipeline reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagSlot {
    DateTimeOriginal,
    DateTimeDigitized,
    DateTime,
    GpsVersionId,
    GpsLatitudeRef,
    GpsLatitude,
    GpsLongitudeRef,
    GpsLongitude,
    GpsAltitudeRef,
    GpsAltitude,
}

impl TagSlot {
    pub const ALL: [TagSlot; 10] = [
        TagSlot::DateTimeOriginal,
        TagSlot::DateTimeDigitized,
        TagSlot::DateTime,
        TagSlot::GpsVersionId,
        TagSlot::GpsLatitudeRef,
        TagSlot::GpsLatitude,
        TagSlot::GpsLongitudeRef,
        TagSlot::GpsLongitude,
        TagSlot::GpsAltitudeRef,
        TagSlot::GpsAltitude,
    ];

    fn exif_tag(self) -> Tag {
        match self {
            TagSlot::DateTimeOriginal => Tag::DateTimeOriginal,
            TagSlot::DateTimeDigitized => Tag::DateTimeDigitized,
            TagSlot::DateTime => Tag::DateTime,
            TagSlot::GpsVersionId => Tag::GPSVersionID,
            TagSlot::GpsLatitudeRef => Tag::GPSLatitudeRef,
            TagSlot::GpsLatitude => Tag::GPSLatitude,
            TagSlot::GpsLongitudeRef => Tag::GPSLongitudeRef,
            TagSlot::GpsLongitude => Tag::GPSLongitude,
            TagSlot::GpsAltitudeRef => Tag::GPSAltitudeRef,
            TagSlot::GpsAltitude => Tag::GPSAltitude,
        }
    }
}

/// Unsigned rational as stored in Exif.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: u32,
    pub denom: u32,
}

impl Rational {
    pub const fn new(num: u32, denom: u32) -> Self {
        Self { num, denom }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Ascii(String),
    Byte(Vec<u8>),
    Rational(Vec<Rational>),
}

pub type TagMap = BTreeMap<TagSlot, TagValue>;

/// Read/write capability over a file's embedded metadata.
pub trait MetadataCodec {
    /// Known slots present in the file. Fails on unreadable or metadata-less files.
    fn read_tags(&self, path: &Path) -> Result<TagMap, TagError>;

    /// Overlay `tags` onto the file's existing metadata block and save it.
    /// A missing or corrupt block is replaced by one holding just `tags`.
    fn write_tags(&self, path: &Path, tags: &TagMap) -> Result<(), TagError>;
}

/// Exif codec on top of kamadak-exif.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifCodec;

impl MetadataCodec for ExifCodec {
    fn read_tags(&self, path: &Path) -> Result<TagMap, TagError> {
        let file = File::open(path).map_err(|source| TagError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let exif = Reader::new()
            .read_from_container(&mut BufReader::new(file))
            .map_err(|e| match e {
                exif::Error::NotFound(_) => TagError::NotFound {
                    path: path.to_path_buf(),
                },
                e => TagError::Read {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                },
            })?;

        let mut tags = TagMap::new();
        for slot in TagSlot::ALL {
            if let Some(field) = exif.get_field(slot.exif_tag(), In::PRIMARY) {
                if let Some(value) = from_exif_value(&field.value) {
                    tags.insert(slot, value);
                }
            }
        }
        Ok(tags)
    }

    fn write_tags(&self, path: &Path, tags: &TagMap) -> Result<(), TagError> {
        let io_err = |source| TagError::Io {
            path: path.to_path_buf(),
            source,
        };
        let bytes = fs::read(path).map_err(io_err)?;
        if !is_jpeg(&bytes) {
            return Err(TagError::UnsupportedContainer {
                path: path.to_path_buf(),
            });
        }

        let replaced: Vec<Tag> = tags.keys().map(|slot| slot.exif_tag()).collect();
        let mut fields: Vec<Field> = match Reader::new().read_from_container(&mut Cursor::new(&bytes)) {
            Ok(exif) => exif
                .fields()
                .filter(|f| f.ifd_num == In::PRIMARY && !replaced.contains(&f.tag))
                .filter(|f| !matches!(f.value, Value::Unknown(..)))
                .cloned()
                .collect(),
            Err(e) => {
                debug!(file = %path.display(), error = %e, "no usable metadata block, starting empty");
                Vec::new()
            }
        };
        fields.extend(tags.iter().map(|(slot, value)| Field {
            tag: slot.exif_tag(),
            ifd_num: In::PRIMARY,
            value: to_exif_value(value),
        }));

        let encode_err = |reason: String| TagError::Encode {
            path: path.to_path_buf(),
            reason,
        };
        let mut writer = exif::experimental::Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).map_err(|e| encode_err(e.to_string()))?;

        let updated = splice_exif_segment(&bytes, tiff.get_ref()).map_err(encode_err)?;
        replace_file(path, &updated).map_err(io_err)
    }
}

/// Swap `path`'s content for `bytes` through a temporary sibling file,
/// which never outlives the call.
fn replace_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("exif-tmp");
    let result = fs::write(&tmp, bytes).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn from_exif_value(value: &Value) -> Option<TagValue> {
    match value {
        Value::Ascii(parts) => {
            let first = parts.first()?;
            Some(TagValue::Ascii(String::from_utf8_lossy(first).trim_end_matches('\0').to_string()))
        }
        Value::Byte(bytes) => Some(TagValue::Byte(bytes.clone())),
        Value::Rational(values) => Some(TagValue::Rational(
            values.iter().map(|r| Rational::new(r.num, r.denom)).collect(),
        )),
        _ => None,
    }
}

fn to_exif_value(value: &TagValue) -> Value {
    match value {
        TagValue::Ascii(s) => Value::Ascii(vec![s.as_bytes().to_vec()]),
        TagValue::Byte(bytes) => Value::Byte(bytes.clone()),
        TagValue::Rational(values) => Value::Rational(
            values
                .iter()
                .map(|r| exif::Rational { num: r.num, denom: r.denom })
                .collect(),
        ),
    }
}

const MARKER: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const EXIF_HEADER: &[u8] = b"Exif\0\0";

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == MARKER && bytes[1] == SOI
}

/// Marker segments between SOI and the first scan, plus the offset where
/// the scan data begins.
fn header_segments(jpeg: &[u8]) -> Result<(Vec<(u8, &[u8])>, usize), String> {
    let mut segments = Vec::new();
    let mut pos = 2;
    while pos + 4 <= jpeg.len() && jpeg[pos] == MARKER {
        let marker = jpeg[pos + 1];
        if marker == SOS || marker == EOI {
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return Err(format!("truncated JPEG segment at offset {}", pos));
        }
        segments.push((marker, &jpeg[pos..end]));
        pos = end;
    }
    Ok((segments, pos))
}

fn is_exif_segment(marker: u8, segment: &[u8]) -> bool {
    marker == APP1 && segment[4..].starts_with(EXIF_HEADER)
}

/// Replace any Exif APP1 segment of `jpeg` with one holding `tiff`.
/// The new segment goes right after SOI and any leading APP0 (JFIF) segments.
fn splice_exif_segment(jpeg: &[u8], tiff: &[u8]) -> Result<Vec<u8>, String> {
    let seg_len = 2 + EXIF_HEADER.len() + tiff.len();
    let seg_len = u16::try_from(seg_len).map_err(|_| format!("Exif block too large ({} bytes)", seg_len))?;

    let mut app1 = Vec::with_capacity(seg_len as usize + 2);
    app1.extend_from_slice(&[MARKER, APP1]);
    app1.extend_from_slice(&seg_len.to_be_bytes());
    app1.extend_from_slice(EXIF_HEADER);
    app1.extend_from_slice(tiff);

    let (segments, scan_start) = header_segments(jpeg)?;
    let mut out = Vec::with_capacity(jpeg.len() + app1.len());
    out.extend_from_slice(&jpeg[..2]);
    let mut inserted = false;
    for (marker, segment) in segments {
        if is_exif_segment(marker, segment) {
            continue;
        }
        if marker != APP0 && !inserted {
            out.extend_from_slice(&app1);
            inserted = true;
        }
        out.extend_from_slice(segment);
    }

    if !inserted {
        out.extend_from_slice(&app1);
    }
    out.extend_from_slice(&jpeg[scan_start..]);
    Ok(out)
}

/// The JPEG with every Exif segment dropped. Two files that differ only in
/// their Exif block give the same result. `None` for anything that is not a
/// well-formed JPEG.
pub fn jpeg_without_exif(jpeg: &[u8]) -> Option<Vec<u8>> {
    if !is_jpeg(jpeg) {
        return None;
    }
    let (segments, scan_start) = header_segments(jpeg).ok()?;
    let mut out = Vec::with_capacity(jpeg.len());
    out.extend_from_slice(&jpeg[..2]);
    for (marker, segment) in segments {
        if !is_exif_segment(marker, segment) {
            out.extend_from_slice(segment);
        }
    }
    out.extend_from_slice(&jpeg[scan_start..]);
    Some(out)
}
