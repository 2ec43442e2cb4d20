//! Sidecar JSON lookup for media files and album folders.
//!
//! Exports put `<name>.json` next to each media file and one album-level JSON
//! into album folders. Filenames do not always line up, so lookup tries several
//! name rules before scanning the whole folder by `title`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::date::geo::GeoData;
use crate::error::SidecarError;
use crate::extras;

/// `beach(2).jpg` -> stem `beach`, index `2`, ext `.jpg`
static DISAMBIGUATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<stem>.*)\((?P<n>\d+)\)(?P<ext>\.[^.()]+)$").unwrap());

/// Exported sidecar names are cut at this many bytes, `.json` included
const MAX_SIDECAR_NAME_LEN: usize = 51;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimestampField {
    #[serde(default, deserialize_with = "de_epoch")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<TimestampField>,
}

/// One parsed sidecar record, per-file or per-album.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub photo_taken_time: Option<TimestampField>,
    #[serde(default)]
    pub geo_data: Option<GeoData>,
    #[serde(default)]
    pub geo_data_exif: Option<GeoData>,
    #[serde(default)]
    pub album_data: Option<AlbumData>,
}

impl SidecarMetadata {
    /// Capture time in Unix seconds
    pub fn taken_at(&self) -> Option<i64> {
        self.photo_taken_time.as_ref()?.timestamp
    }

    /// Album-level fallback time in Unix seconds
    pub fn album_date(&self) -> Option<i64> {
        self.album_data.as_ref()?.date.as_ref()?.timestamp
    }
}

/// Accept `"1609459200"` as well as `1609459200`.
fn de_epoch<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    })
}

pub fn parse_sidecar(bytes: &[u8]) -> Result<SidecarMetadata, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Which naming rule located a file's sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupRule {
    /// `<filename>.json`
    Exact,
    /// `name(1).jpg` -> `name.jpg(1).json`
    MovedDisambiguator,
    /// sidecar name cut to the export length limit
    Truncated,
    /// `name-edited.jpg` -> `name.jpg.json`
    WithoutExtra,
    /// some JSON in the folder declares `title == filename`
    Title,
}

#[derive(Debug, Clone)]
pub struct SidecarHit {
    pub path: PathBuf,
    pub rule: LookupRule,
    pub metadata: SidecarMetadata,
}

#[derive(Debug, Clone)]
pub struct AlbumSidecar {
    pub path: PathBuf,
    pub title: Option<String>,
    /// Unix seconds
    pub date: i64,
}

/// Per-folder title index: title -> (sidecar path, record)
type TitleIndex = HashMap<String, (PathBuf, SidecarMetadata)>;

/// Sidecar lookup with run-lifetime caches keyed by path.
///
/// Each JSON file is parsed at most once, each folder is scanned at most once
/// for its title index and at most once for its album sidecar.
#[derive(Default)]
pub struct SidecarResolver {
    /// `None` records a missing or malformed file
    parsed: HashMap<PathBuf, Option<SidecarMetadata>>,
    titles: HashMap<PathBuf, TitleIndex>,
    albums: HashMap<PathBuf, Option<AlbumSidecar>>,
}

impl SidecarResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the sidecar of one media file; first matching rule wins.
    pub fn find_file_sidecar(&mut self, media_path: &Path) -> Result<SidecarHit, SidecarError> {
        let not_found = || SidecarError::NotFound {
            path: media_path.to_path_buf(),
        };
        let folder = media_path.parent().ok_or_else(not_found)?;
        let filename = media_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(not_found)?;

        for (rule, candidate) in candidate_names(filename) {
            let path = folder.join(&candidate);
            if let Some(metadata) = self.load(&path) {
                debug!(file = %media_path.display(), sidecar = %path.display(), ?rule, "sidecar found");
                return Ok(SidecarHit {
                    path,
                    rule,
                    metadata,
                });
            }
        }

        let index = self.title_index(folder);
        if let Some((path, metadata)) = index.get(filename) {
            debug!(file = %media_path.display(), sidecar = %path.display(), "sidecar found by title");
            return Ok(SidecarHit {
                path: path.clone(),
                rule: LookupRule::Title,
                metadata: metadata.clone(),
            });
        }

        Err(not_found())
    }

    /// First JSON in `folder` carrying an album date block.
    pub fn find_album_sidecar(&mut self, folder: &Path) -> Option<AlbumSidecar> {
        if let Some(cached) = self.albums.get(folder) {
            return cached.clone();
        }

        let mut found = None;
        for path in json_files(folder) {
            let Some(metadata) = self.load(&path) else {
                continue;
            };
            if let Some(date) = metadata.album_date() {
                let title = metadata.album_data.as_ref().and_then(|a| a.title.clone());
                found = Some(AlbumSidecar { path, title, date });
                break;
            }
        }

        self.albums.insert(folder.to_path_buf(), found.clone());
        found
    }

    /// Parse a JSON file once; missing and malformed files both yield `None`.
    fn load(&mut self, path: &Path) -> Option<SidecarMetadata> {
        if let Some(cached) = self.parsed.get(path) {
            return cached.clone();
        }
        let parsed = match fs::read(path) {
            Ok(bytes) => match parse_sidecar(&bytes) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    let error = SidecarError::Malformed {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    };
                    warn!(%error, "ignoring sidecar");
                    None
                }
            },
            Err(_) => None,
        };
        self.parsed.insert(path.to_path_buf(), parsed.clone());
        parsed
    }

    fn title_index(&mut self, folder: &Path) -> &TitleIndex {
        if !self.titles.contains_key(folder) {
            let mut index = TitleIndex::new();
            for path in json_files(folder) {
                if let Some(metadata) = self.load(&path) {
                    if let Some(title) = metadata.title.clone() {
                        index.entry(title).or_insert((path, metadata));
                    }
                }
            }
            self.titles.insert(folder.to_path_buf(), index);
        }
        &self.titles[folder]
    }
}

/// Candidate sidecar names for `filename`, in lookup order, without repeats.
fn candidate_names(filename: &str) -> Vec<(LookupRule, String)> {
    let mut names: Vec<(LookupRule, String)> = vec![(LookupRule::Exact, format!("{}.json", filename))];

    if let Some(caps) = DISAMBIGUATOR_RE.captures(filename) {
        names.push((
            LookupRule::MovedDisambiguator,
            format!("{}{}({}).json", &caps["stem"], &caps["ext"], &caps["n"]),
        ));
    }

    if filename.len() + ".json".len() > MAX_SIDECAR_NAME_LEN {
        let mut end = MAX_SIDECAR_NAME_LEN - ".json".len();
        while end > 0 && !filename.is_char_boundary(end) {
            end -= 1;
        }
        names.push((LookupRule::Truncated, format!("{}.json", &filename[..end])));
    }

    if let Some(plain) = extras::strip_extra(filename) {
        names.push((LookupRule::WithoutExtra, format!("{}.json", plain)));
    }

    let mut seen = std::collections::HashSet::new();
    names.retain(|(_, name)| seen.insert(name.clone()));
    names
}

/// `*.json` files directly inside `folder`, sorted by name.
fn json_files(folder: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(folder) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();
    files
}
