use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::date::Provenance;

/// Everything worth telling the user after a run: counters plus per-category
/// file lists. Passed by `&mut` through every stage.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub scanned: u64,
    pub duplicates_removed: u64,
    pub files_written: u64,
    /// Destination already held identical content
    pub files_skipped: u64,
    pub dates_by_provenance: BTreeMap<Provenance, u64>,
    pub no_sidecar: Vec<PathBuf>,
    pub failed_metadata_write: Vec<PathBuf>,
    pub fallback_dates: Vec<PathBuf>,
    pub no_date: Vec<PathBuf>,
    pub skipped_extras: Vec<PathBuf>,
    pub failed_copy: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// A diagnostic list and the file it is written to
pub struct Category<'a> {
    pub file_name: &'static str,
    pub header: &'static str,
    pub paths: &'a [PathBuf],
}

impl RunReport {
    pub fn record_resolved(&mut self, path: &Path, provenance: Provenance) {
        *self.dates_by_provenance.entry(provenance).or_default() += 1;
        if provenance.is_fallback() {
            self.fallback_dates.push(path.to_path_buf());
        }
    }

    pub fn record_unresolved(&mut self, path: &Path) {
        self.no_date.push(path.to_path_buf());
    }

    pub fn record_no_sidecar(&mut self, path: &Path) {
        self.no_sidecar.push(path.to_path_buf());
    }

    pub fn record_write_failure(&mut self, path: &Path) {
        if !self.failed_metadata_write.iter().any(|p| p == path) {
            self.failed_metadata_write.push(path.to_path_buf());
        }
    }

    pub fn record_copy_failure(&mut self, path: &Path, reason: String) {
        self.failed_copy.push(path.to_path_buf());
        self.warnings.push(reason);
    }

    pub fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    pub fn categories(&self) -> [Category<'_>; 7] {
        [
            Category {
                file_name: "no_sidecar.txt",
                header: "# Files without a discoverable sidecar JSON",
                paths: &self.no_sidecar,
            },
            Category {
                file_name: "failed_metadata_write.txt",
                header: "# Files whose embedded metadata could not be written",
                paths: &self.failed_metadata_write,
            },
            Category {
                file_name: "fallback_dates.txt",
                header: "# Files dated only from their album, folder name or filename",
                paths: &self.fallback_dates,
            },
            Category {
                file_name: "no_date.txt",
                header: "# Files with no resolvable date; timestamps left untouched",
                paths: &self.no_date,
            },
            Category {
                file_name: "skipped_extras.txt",
                header: "# Edited/effect variants that were skipped",
                paths: &self.skipped_extras,
            },
            Category {
                file_name: "failed_copy.txt",
                header: "# Files that could not be copied to the output",
                paths: &self.failed_copy,
            },
            Category {
                file_name: "unreadable.txt",
                header: "# Files that could not be read for duplicate detection",
                paths: &self.unreadable,
            },
        ]
    }

    /// Write one plain-text list per non-empty category into `dir`.
    pub fn write_reports(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for category in self.categories() {
            if category.paths.is_empty() {
                continue;
            }
            let path = dir.join(category.file_name);
            let mut out = BufWriter::new(fs::File::create(&path)?);
            writeln!(out, "{}", category.header)?;
            for p in category.paths {
                writeln!(out, "{}", p.display())?;
            }
            out.flush()?;
            written.push(path);
        }
        Ok(written)
    }
}
