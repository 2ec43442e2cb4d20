use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use filetime::FileTime;
use tracing::{debug, warn};

use crate::date::{ResolvedDate, TimeBasis};
use crate::fs_times;
use crate::hasher::ContentHasher;
use crate::media::{MediaFile, MediaKind};
use crate::report::RunReport;
use crate::tags;
use crate::writer::MetadataWriter;
use crate::ThrottledProgress;

/// Folder for files without a resolved date when dividing by date
pub const UNKNOWN_DATE_DIR: &str = "date-unknown";

/// Where every copied input file ended up. Built once by the copy phase and
/// only read afterwards.
#[derive(Debug, Default)]
pub struct FinalizedNames {
    by_source: HashMap<PathBuf, PathBuf>,
    /// naive destination -> disambiguated destination
    renamed: HashMap<PathBuf, PathBuf>,
}

impl FinalizedNames {
    pub fn final_path(&self, source: &Path) -> Option<&Path> {
        self.by_source.get(source).map(PathBuf::as_path)
    }

    /// The RenameMap: naive destination -> the path actually used
    pub fn renamed(&self) -> &HashMap<PathBuf, PathBuf> {
        &self.renamed
    }

    pub fn len(&self) -> usize {
        self.by_source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }
}

/// Where files without a resolved date go when dividing by date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndatedPlacement {
    /// All of them under `date-unknown/`
    UnknownDateDir,
    /// `YYYY/MM` of the file's modification time
    ModifiedTime(TimeBasis),
}

/// Settings of the copy phase
pub struct CopyPlan<'a> {
    pub output_dir: &'a Path,
    pub divide_to_dates: bool,
    /// Reuse a taken destination that already holds the same file
    pub reuse_identical: bool,
    pub undated: UndatedPlacement,
}

impl<'a> CopyPlan<'a> {
    /// Flat copy into `output_dir`, reusing identical destinations
    pub fn new(output_dir: &'a Path) -> Self {
        Self {
            output_dir,
            divide_to_dates: false,
            reuse_identical: true,
            undated: UndatedPlacement::UnknownDateDir,
        }
    }
}

fn month_dir(output_dir: &Path, at: &NaiveDateTime) -> PathBuf {
    output_dir.join(at.format("%Y").to_string()).join(at.format("%m").to_string())
}

fn destination_dir(plan: &CopyPlan, source: &Path, date: Option<&ResolvedDate>) -> PathBuf {
    if !plan.divide_to_dates {
        return plan.output_dir.to_path_buf();
    }
    if let Some(d) = date {
        return month_dir(plan.output_dir, &d.at);
    }
    if let UndatedPlacement::ModifiedTime(basis) = plan.undated {
        let modified = fs::metadata(source)
            .ok()
            .and_then(|meta| basis.to_naive(FileTime::from_last_modification_time(&meta).unix_seconds()));
        if let Some(at) = modified {
            return month_dir(plan.output_dir, &at);
        }
    }
    plan.output_dir.join(UNKNOWN_DATE_DIR)
}

/// `photo.jpg` -> `photo(3).jpg`
fn numbered_name(filename: &str, n: u32) -> String {
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{}({}).{}", stem, n, ext),
        None => format!("{}({})", stem, n),
    }
}

/// Whether `dest` already holds `source`. A photo copy whose Exif block was
/// rewritten by an earlier run still counts.
fn same_content(hasher: &mut ContentHasher, source: &MediaFile, dest: &Path) -> bool {
    let Ok(meta) = fs::metadata(dest) else {
        return false;
    };
    if meta.len() == source.size {
        if let (Some(x), Some(y)) = (hasher.full_hash(&source.path, source.size), hasher.full_hash(dest, meta.len())) {
            if x == y {
                return true;
            }
        }
    }
    source.kind == MediaKind::Photo && same_image_data(&source.path, dest)
}

fn same_image_data(a: &Path, b: &Path) -> bool {
    let (Ok(a), Ok(b)) = (fs::read(a), fs::read(b)) else {
        return false;
    };
    match (tags::jpeg_without_exif(&a), tags::jpeg_without_exif(&b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Copy every file to the output tree and apply its resolved date there.
///
/// A taken destination is reused when it already holds the same file and
/// the plan allows it; otherwise the first free `name(N).ext` is chosen and
/// recorded as a rename. Undated copies keep the source's file times.
pub fn copy_to_output(
    items: &[(MediaFile, Option<ResolvedDate>)],
    plan: &CopyPlan,
    hasher: &mut ContentHasher,
    writer: &MetadataWriter,
    report: &mut RunReport,
    progress: &ThrottledProgress,
) -> FinalizedNames {
    let mut finalized = FinalizedNames::default();
    // Use counters per base path to avoid O(n²) worst case
    let mut name_counters: HashMap<PathBuf, u32> = HashMap::new();
    let mut used_paths: HashSet<PathBuf> = HashSet::new();
    let mut created_dirs: HashSet<PathBuf> = HashSet::new();
    let total = items.len() as u64;

    for (idx, (m, date)) in items.iter().enumerate() {
        progress.report("write", idx as u64, total, "Writing files");

        let sub_dir = destination_dir(plan, &m.path, date.as_ref());
        if !created_dirs.contains(&sub_dir) {
            if let Err(e) = fs::create_dir_all(&sub_dir) {
                report.record_copy_failure(&m.path, format!("cannot create {}: {}", sub_dir.display(), e));
                continue;
            }
            created_dirs.insert(sub_dir.clone());
        }

        let base_dest = sub_dir.join(&m.filename);
        let counter = name_counters.entry(base_dest.clone()).or_insert(0);
        let base_free = *counter == 0 && !used_paths.contains(&base_dest);

        let identical =
            plan.reuse_identical && base_free && base_dest.exists() && same_content(hasher, m, &base_dest);
        let dest = if identical || (base_free && !base_dest.exists()) {
            base_dest.clone()
        } else {
            loop {
                *counter += 1;
                let candidate = sub_dir.join(numbered_name(&m.filename, *counter));
                if !used_paths.contains(&candidate) && !candidate.exists() {
                    break candidate;
                }
            }
        };
        used_paths.insert(dest.clone());
        if dest != base_dest {
            debug!(from = %base_dest.display(), to = %dest.display(), "name taken, renaming");
            finalized.renamed.insert(base_dest, dest.clone());
        }

        if identical {
            report.files_skipped += 1;
        } else if let Err(e) = fs::copy(&m.path, &dest) {
            warn!(file = %m.path.display(), error = %e, "copy failed");
            report.record_copy_failure(&m.path, format!("cannot copy {}: {}", m.path.display(), e));
            continue;
        } else {
            report.files_written += 1;
            if date.is_none() {
                if let Err(e) = fs_times::copy_file_times(&m.path, &dest) {
                    warn!(file = %dest.display(), error = %e, "cannot carry file times over");
                    report.warn(format!("cannot set file times on {}: {}", dest.display(), e));
                }
            }
        }

        if let Some(date) = date {
            // embedded writes rewrite the file, so filesystem times go last
            if let Some(geo) = &date.geolocation {
                writer.apply_geolocation(&dest, m.kind, geo, report);
            }
            writer.apply_date(&dest, m.kind, date, report);
        }
        finalized.by_source.insert(m.path.clone(), dest);
    }

    progress.report("write", total, total, "Files written");
    finalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::Provenance;
    use crate::tags::memory::MemoryCodec;
    use crate::tags::MetadataCodec;
    use tempfile::tempdir;

    fn noop(_: &str, _: u64, _: u64, _: &str) {}

    fn input(dir: &Path, rel: &str, bytes: &[u8]) -> MediaFile {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, bytes).unwrap();
        MediaFile::new(path, MediaKind::Video, bytes.len() as u64)
    }

    fn dated(ts: i64) -> ResolvedDate {
        ResolvedDate {
            at: TimeBasis::Utc.to_naive(ts).unwrap(),
            timestamp: ts,
            provenance: Provenance::SidecarJson,
            geolocation: None,
        }
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("photo.jpg", 3), "photo(3).jpg");
        assert_eq!(numbered_name("README", 1), "README(1)");
    }

    #[test]
    fn test_collisions_get_numbered_and_recorded() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let a = input(dir.path(), "in/2019/clip.mp4", b"first");
        let b = input(dir.path(), "in/2020/clip.mp4", b"second");
        let items = vec![(a.clone(), Some(dated(1609459200))), (b.clone(), None)];

        let codec = MemoryCodec::default();
        let writer = MetadataWriter::new(&codec);
        let mut report = RunReport::default();
        let tp = ThrottledProgress::new(&noop);
        let plan = CopyPlan::new(&out);
        let finalized = copy_to_output(&items, &plan, &mut ContentHasher::new(), &writer, &mut report, &tp);

        assert_eq!(finalized.final_path(&a.path), Some(out.join("clip.mp4").as_path()));
        assert_eq!(finalized.final_path(&b.path), Some(out.join("clip(1).mp4").as_path()));
        assert_eq!(finalized.renamed().get(&out.join("clip.mp4")), Some(&out.join("clip(1).mp4")));
        assert_eq!(fs::read(out.join("clip(1).mp4")).unwrap(), b"second");
        assert_eq!(report.files_written, 2);

        let mtime = filetime::FileTime::from_last_modification_time(&fs::metadata(out.join("clip.mp4")).unwrap());
        assert_eq!(mtime.unix_seconds(), 1609459200);
    }

    #[test]
    fn test_identical_existing_file_is_reused() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("same.mp4"), b"payload").unwrap();
        fs::write(out.join("other.mp4"), b"differs").unwrap();
        let same = input(dir.path(), "in/same.mp4", b"payload");
        let other = input(dir.path(), "in/other.mp4", b"changed");
        let items = vec![(same.clone(), None), (other.clone(), None)];

        let codec = MemoryCodec::default();
        let mut report = RunReport::default();
        let tp = ThrottledProgress::new(&noop);
        let plan = CopyPlan::new(&out);
        let finalized = copy_to_output(
            &items,
            &plan,
            &mut ContentHasher::new(),
            &MetadataWriter::new(&codec),
            &mut report,
            &tp,
        );

        assert_eq!(finalized.final_path(&same.path), Some(out.join("same.mp4").as_path()));
        assert_eq!(finalized.final_path(&other.path), Some(out.join("other(1).mp4").as_path()));
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_written, 1);
    }

    #[test]
    fn test_divide_to_dates() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let a = input(dir.path(), "in/a.mp4", b"a");
        let b = input(dir.path(), "in/b.mp4", b"b");
        let items = vec![(a.clone(), Some(dated(1609459200))), (b.clone(), None)];

        let codec = MemoryCodec::default();
        let mut report = RunReport::default();
        let tp = ThrottledProgress::new(&noop);
        let plan = CopyPlan {
            divide_to_dates: true,
            ..CopyPlan::new(&out)
        };
        let finalized = copy_to_output(
            &items,
            &plan,
            &mut ContentHasher::new(),
            &MetadataWriter::new(&codec),
            &mut report,
            &tp,
        );

        assert_eq!(finalized.final_path(&a.path), Some(out.join("2021/01/a.mp4").as_path()));
        assert_eq!(
            finalized.final_path(&b.path),
            Some(out.join(UNKNOWN_DATE_DIR).join("b.mp4").as_path())
        );
        assert_eq!(finalized.len(), 2);
    }

    fn run(items: &[(MediaFile, Option<ResolvedDate>)], plan: &CopyPlan) -> (FinalizedNames, RunReport) {
        let codec = MemoryCodec::default();
        let mut report = RunReport::default();
        let tp = ThrottledProgress::new(&noop);
        let finalized = copy_to_output(
            items,
            plan,
            &mut ContentHasher::new(),
            &MetadataWriter::new(&codec),
            &mut report,
            &tp,
        );
        (finalized, report)
    }

    fn mtime(path: &Path) -> i64 {
        FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
    }

    #[test]
    fn test_undated_copy_keeps_source_mtime() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let clip = input(dir.path(), "in/nodate.mp4", b"clip");
        fs_times::set_modified_time(&clip.path, 1000000000).unwrap();

        let (finalized, report) = run(&[(clip.clone(), None)], &CopyPlan::new(&out));

        assert_eq!(report.files_written, 1);
        assert_eq!(mtime(finalized.final_path(&clip.path).unwrap()), 1000000000);
    }

    #[test]
    fn test_identical_file_numbered_when_reuse_is_off() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("same.mp4"), b"payload").unwrap();
        let same = input(dir.path(), "in/same.mp4", b"payload");

        let plan = CopyPlan {
            reuse_identical: false,
            ..CopyPlan::new(&out)
        };
        let (finalized, report) = run(&[(same.clone(), None)], &plan);

        assert_eq!(finalized.final_path(&same.path), Some(out.join("same(1).mp4").as_path()));
        assert_eq!(report.files_skipped, 0);
        assert_eq!(report.files_written, 1);
    }

    #[test]
    fn test_photo_with_rewritten_exif_is_reused() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let jpeg = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xDA, 0x00, 0x02, 0x12, 0x34, 0xFF, 0xD9,
        ];
        let photo = input(dir.path(), "in/IMG_0001.jpg", &jpeg);
        let photo = MediaFile::new(photo.path, MediaKind::Photo, photo.size);
        fs::create_dir_all(&out).unwrap();
        fs::copy(&photo.path, out.join("IMG_0001.jpg")).unwrap();
        let mut stamp = tags::TagMap::new();
        stamp.insert(
            tags::TagSlot::DateTimeOriginal,
            tags::TagValue::Ascii("2021:01:01 00:00:00".to_string()),
        );
        tags::ExifCodec.write_tags(&out.join("IMG_0001.jpg"), &stamp).unwrap();

        let (finalized, report) = run(&[(photo.clone(), Some(dated(1609459200)))], &CopyPlan::new(&out));

        assert_eq!(finalized.final_path(&photo.path), Some(out.join("IMG_0001.jpg").as_path()));
        assert_eq!(report.files_skipped, 1);
        assert!(!out.join("IMG_0001(1).jpg").exists());
    }

    #[test]
    fn test_undated_placed_by_modified_time() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out");
        let clip = input(dir.path(), "in/clip.mp4", b"clip");
        fs_times::set_modified_time(&clip.path, 1000000000).unwrap();

        let plan = CopyPlan {
            divide_to_dates: true,
            undated: UndatedPlacement::ModifiedTime(TimeBasis::Utc),
            ..CopyPlan::new(&out)
        };
        let (finalized, _) = run(&[(clip.clone(), None)], &plan);

        // 1000000000 is 2001-09-09 UTC
        assert_eq!(finalized.final_path(&clip.path), Some(out.join("2001/09/clip.mp4").as_path()));
        assert_eq!(mtime(&out.join("2001/09/clip.mp4")), 1000000000);
    }
}
