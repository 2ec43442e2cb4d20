pub mod album;
pub mod date;
pub mod dedup;
pub mod error;
pub mod extras;
pub mod fs_times;
pub mod hasher;
pub mod media;
pub mod output;
pub mod report;
pub mod scan;
pub mod sidecar;
pub mod tags;
pub mod writer;

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::date::{DateResolver, TimeBasis};
use crate::error::ProcessError;
use crate::hasher::ContentHasher;
use crate::output::{CopyPlan, UndatedPlacement};
use crate::report::RunReport;
use crate::sidecar::SidecarResolver;
use crate::tags::{ExifCodec, MetadataCodec};
use crate::writer::MetadataWriter;

pub use crate::date::{Provenance, ResolvedDate};
pub use crate::media::{MediaFile, MediaKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessOptions {
    #[serde(default)]
    pub input: PathBuf,
    #[serde(default)]
    pub output: PathBuf,
    #[serde(default)]
    pub divide_to_dates: bool,
    /// Leave byte-identical files alone
    #[serde(default)]
    pub keep_duplicates: bool,
    #[serde(default)]
    pub skip_extras: bool,
    #[serde(default)]
    pub no_guess: bool,
    #[serde(default)]
    pub albums: bool,
    #[serde(default)]
    pub album_json: Option<PathBuf>,
    /// Where the diagnostic lists go; defaults to the output folder
    #[serde(default)]
    pub report_dir: Option<PathBuf>,
    /// Read and write wall-clock timestamps in the local zone instead of UTC
    #[serde(default)]
    pub local_time: bool,
    /// Copy without resolving or writing dates
    #[serde(default)]
    pub dont_fix: bool,
    /// Stop after deduplication and date resolution; no output tree
    #[serde(default)]
    pub dont_copy: bool,
}

impl ProcessOptions {
    pub fn time_basis(&self) -> TimeBasis {
        if self.local_time {
            TimeBasis::Local
        } else {
            TimeBasis::Utc
        }
    }

    pub fn report_dir(&self) -> PathBuf {
        self.report_dir.clone().unwrap_or_else(|| self.output.clone())
    }

    pub fn album_json_path(&self) -> PathBuf {
        self.album_json
            .clone()
            .unwrap_or_else(|| self.output.join("albums.json"))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub total_media: u64,
    pub duplicates_removed: u64,
    pub files_written: u64,
    pub files_skipped: u64,
    /// Counters and per-category lists
    pub report: RunReport,
    /// Diagnostic lists that were written
    pub report_files: Vec<PathBuf>,
    pub albums_json: Option<PathBuf>,
    pub warnings: Vec<String>,
}

impl ProcessResult {
    fn new(total_media: u64, report: RunReport, report_files: Vec<PathBuf>, albums_json: Option<PathBuf>) -> Self {
        Self {
            total_media,
            duplicates_removed: report.duplicates_removed,
            files_written: report.files_written,
            files_skipped: report.files_skipped,
            warnings: report.warnings.clone(),
            report,
            report_files,
            albums_json,
        }
    }
}

/// Type alias for progress callback; the closure may borrow from the caller
pub type ProgressCallback<'a> = dyn Fn(&str, u64, u64, &str) + Send + Sync + 'a;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Throttled progress reporter: emits at most every 200ms, and always on
/// completion. `total == 0` means the total is not known yet.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback<'a>,
    last_emit: Cell<Option<Instant>>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback<'a>) -> Self {
        Self {
            inner,
            last_emit: Cell::new(None),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = total > 0 && current + 1 >= total;
        if !is_done {
            if let Some(last) = self.last_emit.get() {
                if last.elapsed() < PROGRESS_INTERVAL {
                    return;
                }
            }
            self.last_emit.set(Some(Instant::now()));
        }
        (self.inner)(stage, current, total, message);
    }
}

/// The output folder spelled under `input`, when it lives inside it
fn output_inside_input(input: &Path, output: &Path) -> Option<PathBuf> {
    let input_abs = fs::canonicalize(input).ok()?;
    let output_abs = fs::canonicalize(output).ok()?;
    let rel = output_abs.strip_prefix(&input_abs).ok()?;
    Some(input.join(rel))
}

/// Run the full pipeline over `options.input` with the Exif codec.
pub fn process(options: &ProcessOptions, progress_callback: &ProgressCallback<'_>) -> anyhow::Result<ProcessResult> {
    process_with_codec(options, &ExifCodec, progress_callback)
}

/// Run the full pipeline with a caller-supplied metadata codec.
///
/// Stages: scan, deduplicate (deletes redundant input files), resolve dates,
/// copy to the output folder and apply dates there, track albums, write the
/// diagnostic lists. `dont_fix` skips date resolution and `dont_copy` stops
/// before the copy. Only structural problems and invariant violations fail
/// the run; everything per file ends up in the report.
pub fn process_with_codec(
    options: &ProcessOptions,
    codec: &dyn MetadataCodec,
    progress_callback: &ProgressCallback<'_>,
) -> anyhow::Result<ProcessResult> {
    let tp = ThrottledProgress::new(progress_callback);

    if !options.input.is_dir() {
        return Err(ProcessError::InputNotFound {
            path: options.input.clone(),
        }
        .into());
    }
    fs::create_dir_all(&options.output).map_err(|source| ProcessError::OutputNotCreated {
        path: options.output.clone(),
        source,
    })?;
    let output_in_input = output_inside_input(&options.input, &options.output);

    let mut report = RunReport::default();

    // Stage 1: Scan
    let mut scan = scan::scan_input(&options.input, options.skip_extras, &tp);
    let in_output = |p: &Path| output_in_input.as_deref().is_some_and(|out| p.starts_with(out));
    scan.media.retain(|m| !in_output(&m.path));
    scan.folders.retain(|f| !in_output(f));
    scan.skipped_extras.retain(|p| !in_output(p));

    let total_media = scan.media.len() as u64;
    report.scanned = total_media;
    report.skipped_extras = scan.skipped_extras;
    info!(files = total_media, folders = scan.folders.len(), "input scanned");

    // Stage 2: Deduplicate
    let mut hasher = ContentHasher::new();
    let members = scan.media;
    let (media_list, canonical_of) = if options.keep_duplicates {
        (members.clone(), Default::default())
    } else {
        let dedup_result = dedup::deduplicate(members.clone(), &mut hasher, &tp)?;
        report.duplicates_removed = dedup_result.removed;
        for w in dedup_result.warnings {
            report.warn(w);
        }
        (dedup_result.media, dedup_result.canonical_of)
    };
    report.unreadable = hasher.failed().map(Path::to_path_buf).collect();
    report.unreadable.sort();

    // Stage 3: Resolve dates
    let mut sidecars = SidecarResolver::new();
    let total = media_list.len() as u64;
    let dated: Vec<(MediaFile, Option<ResolvedDate>)> = if options.dont_fix {
        info!("date resolution disabled");
        media_list.into_iter().map(|m| (m, None)).collect()
    } else {
        let mut dated = Vec::with_capacity(media_list.len());
        let mut resolver = DateResolver::new(codec, &mut sidecars, options.time_basis(), !options.no_guess);
        for (i, m) in media_list.into_iter().enumerate() {
            tp.report("date", i as u64, total, "Resolving dates");
            let date = resolver.resolve(&m, &mut report);
            dated.push((m, date));
        }
        tp.report("date", total, total, "Dates resolved");
        info!(
            resolved = total - report.no_date.len() as u64,
            unresolved = report.no_date.len(),
            "dates resolved"
        );
        dated
    };

    if options.dont_copy {
        info!("copying disabled, no output tree");
        let report_files = write_report_files(&mut report, &options.report_dir());
        return Ok(ProcessResult::new(total_media, report, report_files, None));
    }

    // Stage 4: Copy and apply metadata
    let writer = MetadataWriter::new(codec);
    let plan = CopyPlan {
        output_dir: &options.output,
        divide_to_dates: options.divide_to_dates,
        reuse_identical: !options.keep_duplicates,
        undated: if options.dont_fix {
            UndatedPlacement::ModifiedTime(options.time_basis())
        } else {
            UndatedPlacement::UnknownDateDir
        },
    };
    let finalized = output::copy_to_output(&dated, &plan, &mut hasher, &writer, &mut report, &tp);
    info!(
        written = report.files_written,
        skipped = report.files_skipped,
        renamed = finalized.renamed().len(),
        "files copied"
    );

    // Stage 5: Albums
    let albums_json = if options.albums {
        let albums = album::track_albums(&scan.folders, &members, &mut sidecars, &canonical_of, &finalized);
        if albums.is_empty() {
            None
        } else {
            let path = options.album_json_path();
            album::write_albums_json(&albums, &path)?;
            info!(albums = albums.len(), path = %path.display(), "albums.json written");
            Some(path)
        }
    } else {
        None
    };

    // Stage 6: Diagnostic lists
    let report_files = write_report_files(&mut report, &options.report_dir());
    Ok(ProcessResult::new(total_media, report, report_files, albums_json))
}

/// A failed report write is a warning, not a failed run
fn write_report_files(report: &mut RunReport, dir: &Path) -> Vec<PathBuf> {
    match report.write_reports(dir) {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "cannot write report files");
            report.warn(format!("cannot write report files: {}", e));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_throttle_always_emits_completion() {
        let seen = Mutex::new(Vec::new());
        let callback = |stage: &str, current: u64, total: u64, _: &str| {
            seen.lock().unwrap().push((stage.to_string(), current, total));
        };
        let tp = ThrottledProgress::new(&callback);
        for i in 0..1000 {
            tp.report("dedup", i, 1000, "");
        }
        tp.report("dedup", 1000, 1000, "");

        let seen = seen.into_inner().unwrap();
        // first emission, then throttled until the end
        assert_eq!(seen[0], ("dedup".to_string(), 0, 1000));
        assert!(seen.len() < 10);
        assert_eq!(seen.last().unwrap().1, 1000);
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let options = ProcessOptions {
            input: dir.path().join("nope"),
            output: dir.path().join("out"),
            ..Default::default()
        };
        let noop = |_: &str, _: u64, _: u64, _: &str| {};
        let err = process(&options, &noop).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProcessError>(),
            Some(ProcessError::InputNotFound { .. })
        ));
    }

    #[test]
    fn test_options_json_defaults() {
        let options: ProcessOptions = serde_json::from_str(r#"{"input": "in", "output": "out"}"#).unwrap();
        assert!(!options.albums);
        assert_eq!(options.time_basis(), TimeBasis::Utc);
        assert_eq!(options.report_dir(), PathBuf::from("out"));
        assert_eq!(options.album_json_path(), PathBuf::from("out").join("albums.json"));
    }
}
