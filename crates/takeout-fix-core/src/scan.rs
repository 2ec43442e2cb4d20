use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::extras;
use crate::media::{self, MediaFile, MediaKind};
use crate::ThrottledProgress;

/// Recursively visit every file and folder under `root`.
/// `on_folder` fires before the folder's contents are visited; `on_file` only
/// fires for files accepted by `filter`. Entries are visited in name order so
/// that "first encountered" is stable across platforms.
pub fn visit(
    root: &Path,
    on_file: &mut dyn FnMut(&Path),
    on_folder: &mut dyn FnMut(&Path),
    filter: &dyn Fn(&Path) -> bool,
) {
    let Ok(entries) = fs::read_dir(root) else {
        warn!(folder = %root.display(), "cannot list folder, skipping");
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            on_folder(&path);
            visit(&path, on_file, on_folder, filter);
        } else if path.is_file() {
            if filter(&path) {
                on_file(&path);
            }
        } else {
            debug!(path = %path.display(), "not a regular file or folder, ignoring");
        }
    }
}

/// Result of scanning the input tree
pub struct ScanResult {
    /// Eligible photos and videos, in visit order
    pub media: Vec<MediaFile>,
    /// Every folder under the root (root included), in visit order
    pub folders: Vec<PathBuf>,
    /// "-edited"-style variants left out because of `skip_extras`
    pub skipped_extras: Vec<PathBuf>,
}

/// Collect media files and folders under `root`.
pub fn scan_input(root: &Path, skip_extras: bool, progress: &ThrottledProgress) -> ScanResult {
    let mut media_files = Vec::new();
    let mut folders = vec![root.to_path_buf()];
    let mut skipped_extras = Vec::new();

    visit(
        root,
        &mut |path| {
            if skip_extras {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
                if extras::is_extra(stem) {
                    debug!(file = %path.display(), "skipping extra variant");
                    skipped_extras.push(path.to_path_buf());
                    return;
                }
            }
            let Some(kind) = MediaKind::from_path(path) else {
                return;
            };
            let size = match fs::metadata(path) {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "cannot stat file, skipping");
                    return;
                }
            };
            media_files.push(MediaFile::new(path.to_path_buf(), kind, size));
            // total unknown until the walk ends
            progress.report("scan", media_files.len() as u64, 0, "Scanning input");
        },
        &mut |folder| folders.push(folder.to_path_buf()),
        &media::is_media,
    );

    let found = media_files.len() as u64;
    progress.report("scan", found, found, "Input scanned");

    ScanResult {
        media: media_files,
        folders,
        skipped_extras,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_visit_filters_and_recurses() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("2020-01-01/inner")).unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        fs::write(root.join("a.jpg.json"), b"{}").unwrap();
        fs::write(root.join("2020-01-01/b.mp4"), b"b").unwrap();
        fs::write(root.join("2020-01-01/inner/c.png"), b"c").unwrap();

        let mut files = Vec::new();
        let mut folders = Vec::new();
        visit(
            root,
            &mut |p| files.push(p.to_path_buf()),
            &mut |f| folders.push(f.to_path_buf()),
            &media::is_media,
        );

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| media::is_media(p)));
        assert_eq!(folders.len(), 2);
    }

    #[test]
    fn test_scan_skips_extras_when_asked() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("IMG_1.jpg"), b"x").unwrap();
        fs::write(dir.path().join("IMG_1-edited.jpg"), b"y").unwrap();

        let noop = |_: &str, _: u64, _: u64, _: &str| {};
        let tp = ThrottledProgress::new(&noop);
        let scan = scan_input(dir.path(), true, &tp);
        assert_eq!(scan.media.len(), 1);
        assert_eq!(scan.media[0].filename, "IMG_1.jpg");
        assert_eq!(scan.skipped_extras.len(), 1);

        let scan = scan_input(dir.path(), false, &tp);
        assert_eq!(scan.media.len(), 2);
        assert!(scan.skipped_extras.is_empty());
    }
}
