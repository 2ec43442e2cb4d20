//! End-to-end runs of `process()` over a small export tree.

use std::fs;
use std::path::Path;

use filetime::FileTime;
use takeout_fix_core::fs_times::set_modified_time;
use takeout_fix_core::tags::{ExifCodec, MetadataCodec, TagSlot, TagValue};
use takeout_fix_core::{process, ProcessOptions, Provenance};
use tempfile::TempDir;

/// Minimal JPEG: SOI, JFIF APP0, a fake scan carrying `payload`, EOI
fn jpeg(payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xD8];
    bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
    bytes.extend_from_slice(b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
    bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

fn write(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

fn mtime(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

fn report_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect()
}

/// in/
///   Photos from 2021/  IMG_0001.jpg (+json), A.jpg, A(1).jpg (same bytes),
///                      beach(2).jpg (+ beach.jpg(2).json), unknown.mp4
///   Trip/              metadata.json (album), trip.mp4, A.jpg (same bytes as above)
fn export_tree(root: &Path) {
    let photos = root.join("in").join("Photos from 2021");
    let trip = root.join("in").join("Trip");

    write(&photos.join("IMG_0001.jpg"), &jpeg(b"first"));
    write(
        &photos.join("IMG_0001.jpg.json"),
        br#"{"title": "IMG_0001.jpg", "photoTakenTime": {"timestamp": "1609459200"},
            "geoData": {"latitude": 48.8584, "longitude": 2.2945, "altitude": 35.0}}"#,
    );
    write(&photos.join("A.jpg"), &jpeg(b"same"));
    write(&photos.join("A(1).jpg"), &jpeg(b"same"));
    write(&photos.join("beach(2).jpg"), &jpeg(b"beach"));
    write(
        &photos.join("beach.jpg(2).json"),
        br#"{"photoTakenTime": {"timestamp": "1500000000"}}"#,
    );
    write(&photos.join("unknown.mp4"), b"no date anywhere");

    write(
        &trip.join("metadata.json"),
        br#"{"albumData": {"title": "Trip", "date": {"timestamp": "1262304000"}}}"#,
    );
    write(&trip.join("trip.mp4"), b"trip video");
    write(&trip.join("A.jpg"), &jpeg(b"same"));
}

fn options(root: &Path) -> ProcessOptions {
    ProcessOptions {
        input: root.join("in"),
        output: root.join("out"),
        albums: true,
        ..Default::default()
    }
}

fn noop(_: &str, _: u64, _: u64, _: &str) {}

#[test]
fn pipeline_dedups_dates_and_reports() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    export_tree(root);
    let photos = root.join("in").join("Photos from 2021");
    let out = root.join("out");

    let result = process(&options(root), &noop).unwrap();

    assert_eq!(result.total_media, 7);
    assert_eq!(result.duplicates_removed, 2);
    assert_eq!(result.files_written, 5);

    // plain name survives, numbered copy and the album copy are gone
    assert!(photos.join("A.jpg").exists());
    assert!(!photos.join("A(1).jpg").exists());
    assert!(!root.join("in").join("Trip").join("A.jpg").exists());

    // sidecar date lands in the copy's file times and Exif slots
    let img = out.join("IMG_0001.jpg");
    assert_eq!(mtime(&img), 1609459200);
    let tags = ExifCodec.read_tags(&img).unwrap();
    assert_eq!(
        tags.get(&TagSlot::DateTimeOriginal),
        Some(&TagValue::Ascii("2021:01:01 00:00:00".to_string()))
    );
    assert!(tags.contains_key(&TagSlot::GpsLatitude));
    assert_eq!(tags.get(&TagSlot::GpsLatitudeRef), Some(&TagValue::Ascii("N".to_string())));

    // the input is never edited
    assert_eq!(fs::read(photos.join("IMG_0001.jpg")).unwrap(), jpeg(b"first"));

    // "beach(2).jpg" pairs with "beach.jpg(2).json"
    assert_eq!(mtime(&out.join("beach(2).jpg")), 1500000000);

    // album date as the last resort before giving up
    assert_eq!(mtime(&out.join("trip.mp4")), 1262304000);
    let report = &result.report;
    assert_eq!(report.dates_by_provenance[&Provenance::SidecarJson], 2);
    assert_eq!(report.dates_by_provenance[&Provenance::AlbumFallback], 1);

    let fallback = report_lines(&out.join("fallback_dates.txt"));
    assert_eq!(fallback.len(), 1);
    assert!(fallback[0].ends_with("trip.mp4"));

    let no_date = report_lines(&out.join("no_date.txt"));
    assert_eq!(no_date.len(), 2);
    assert!(no_date.iter().any(|l| l.ends_with("A.jpg")));
    assert!(no_date.iter().any(|l| l.ends_with("unknown.mp4")));

    // the .mp4 files cannot hold Exif, but they are not photos so nothing is attempted
    assert!(!out.join("failed_metadata_write.txt").exists());
    assert!(result.report_files.contains(&out.join("no_sidecar.txt")));
}

#[test]
fn pipeline_writes_album_membership_through_dedup() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    export_tree(root);

    let result = process(&options(root), &noop).unwrap();

    let json_path = result.albums_json.clone().unwrap();
    assert_eq!(json_path, root.join("out").join("albums.json"));
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    let albums = value["albums"].as_object().unwrap();
    assert_eq!(albums.len(), 1);

    let names: Vec<&str> = albums["Trip"]["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["output_path"].as_str().unwrap())
        .collect();
    // Trip/A.jpg was removed as a duplicate; its album entry points at the survivor's copy
    assert_eq!(names, vec!["A.jpg", "trip.mp4"]);
}

#[test]
fn pipeline_keep_duplicates_and_divide_to_dates() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    export_tree(root);
    let out = root.join("out");

    let opts = ProcessOptions {
        keep_duplicates: true,
        divide_to_dates: true,
        albums: false,
        ..options(root)
    };
    let result = process(&opts, &noop).unwrap();

    assert_eq!(result.duplicates_removed, 0);
    assert!(root.join("in").join("Photos from 2021").join("A(1).jpg").exists());
    assert!(out.join("2021").join("01").join("IMG_0001.jpg").exists());
    assert!(out.join("2010").join("01").join("trip.mp4").exists());
    assert!(out.join("date-unknown").join("unknown.mp4").exists());
    let unknown = out.join("date-unknown");
    assert!(unknown.join("A(1).jpg").exists());
    assert!(unknown.join("A.jpg").exists());
    // the Trip copy of A.jpg takes its album's date
    assert!(out.join("2010").join("01").join("A.jpg").exists());
    assert!(!unknown.join("A(2).jpg").exists());
    assert!(result.albums_json.is_none());
}

#[test]
fn pipeline_ignores_output_inside_input() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    export_tree(root);

    let opts = ProcessOptions {
        output: root.join("in").join("sorted"),
        ..options(root)
    };
    let first = process(&opts, &noop).unwrap();
    let second = process(&opts, &noop).unwrap();

    assert_eq!(first.total_media, 7);
    assert_eq!(second.total_media, 5);
}

#[test]
fn pipeline_undated_copy_keeps_mtime() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let clip = root.join("in").join("nodate.mp4");
    write(&clip, b"no date anywhere");
    set_modified_time(&clip, 1000000000).unwrap();

    let result = process(&options(root), &noop).unwrap();

    assert_eq!(result.files_written, 1);
    assert_eq!(mtime(&root.join("out").join("nodate.mp4")), 1000000000);
}

#[test]
fn pipeline_second_run_reuses_dated_photo() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    let photos = root.join("in").join("Photos from 2021");
    write(&photos.join("IMG_0001.jpg"), &jpeg(b"first"));
    write(
        &photos.join("IMG_0001.jpg.json"),
        br#"{"photoTakenTime": {"timestamp": "1609459200"}}"#,
    );
    let out = root.join("out");

    let first = process(&options(root), &noop).unwrap();
    assert_eq!(first.files_written, 1);
    let second = process(&options(root), &noop).unwrap();

    assert_eq!(second.files_written, 0);
    assert_eq!(second.files_skipped, 1);
    assert!(!out.join("IMG_0001(1).jpg").exists());
    assert_eq!(mtime(&out.join("IMG_0001.jpg")), 1609459200);
}

#[test]
fn pipeline_dont_fix_divides_by_modified_time() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    export_tree(root);
    let photos = root.join("in").join("Photos from 2021");
    set_modified_time(&photos.join("IMG_0001.jpg"), 1000000000).unwrap();
    set_modified_time(&photos.join("unknown.mp4"), 1000000000).unwrap();
    let out = root.join("out");

    let opts = ProcessOptions {
        dont_fix: true,
        divide_to_dates: true,
        albums: false,
        ..options(root)
    };
    let result = process(&opts, &noop).unwrap();

    assert_eq!(result.duplicates_removed, 2);
    assert_eq!(result.files_written, 5);
    assert!(result.report.dates_by_provenance.is_empty());
    assert!(result.report.no_date.is_empty());

    // the sidecar date is ignored; the file's own time picks the folder
    let img = out.join("2001").join("09").join("IMG_0001.jpg");
    assert_eq!(mtime(&img), 1000000000);
    assert!(ExifCodec.read_tags(&img).is_err());
    assert!(out.join("2001").join("09").join("unknown.mp4").exists());
    assert!(!out.join("date-unknown").exists());
}

#[test]
fn pipeline_dont_copy_only_dedups_and_reports() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    export_tree(root);
    let out = root.join("out");

    let opts = ProcessOptions {
        dont_copy: true,
        ..options(root)
    };
    let result = process(&opts, &noop).unwrap();

    assert_eq!(result.duplicates_removed, 2);
    assert!(!root.join("in").join("Photos from 2021").join("A(1).jpg").exists());
    assert_eq!(result.files_written, 0);
    assert!(result.albums_json.is_none());
    assert!(!out.join("IMG_0001.jpg").exists());
    assert!(!out.join("albums.json").exists());
    assert_eq!(report_lines(&out.join("no_date.txt")).len(), 2);
}
