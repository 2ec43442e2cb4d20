use std::path::{Path, PathBuf};

/// Photo extensions that get embedded-metadata treatment (lowercase, with dot)
pub const PHOTO_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".webp", ".bmp", ".tif", ".tiff", ".svg", ".heic",
];

/// Video extensions: filesystem timestamps only
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".gif", ".mov", ".webm", ".avi", ".wmv", ".rm", ".mpg", ".mpe", ".mpeg", ".mkv",
    ".m4v", ".mts", ".m2ts",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Classify a path by its extension against the allow-lists.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        let dotted = format!(".{}", ext);
        if PHOTO_EXTENSIONS.contains(&dotted.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&dotted.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

/// Filter predicate handed to the directory walker.
pub fn is_media(path: &Path) -> bool {
    MediaKind::from_path(path).is_some()
}

#[derive(Debug, Clone)]
pub struct MediaFile {
    /// Path under the input root
    pub path: PathBuf,
    /// Just the filename
    pub filename: String,
    pub kind: MediaKind,
    /// File size in bytes
    pub size: u64,
}

impl MediaFile {
    pub fn new(path: PathBuf, kind: MediaKind, size: u64) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            filename,
            kind,
            size,
        }
    }

    /// Containing folder; media files always have one under the input root.
    pub fn folder(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}
