use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::ProcessError;
use crate::hasher::ContentHasher;
use crate::media::MediaFile;
use crate::ThrottledProgress;

/// `name(3).jpg`: the exporter's disambiguator for a renamed duplicate
static NUMBERED_DUPLICATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d+\)(\.[^.]*)?$").unwrap());

/// Files sharing one full-content hash. `canonical` survives, `redundant` go.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub hash: String,
    pub canonical: PathBuf,
    pub redundant: Vec<PathBuf>,
}

/// Result of the deduplication stage.
pub struct DedupResult {
    /// Surviving media, input order preserved
    pub media: Vec<MediaFile>,
    /// Number of files removed from disk
    pub removed: u64,
    /// redundant path -> canonical path
    pub canonical_of: HashMap<PathBuf, PathBuf>,
    /// Redundant files whose deletion failed
    pub warnings: Vec<String>,
}

pub fn is_numbered_duplicate(filename: &str) -> bool {
    NUMBERED_DUPLICATE_RE.is_match(filename)
}

/// Group byte-identical files with the size -> partial hash -> full hash funnel.
///
/// Only sizes shared by at least two files get a partial hash, and only
/// (size, partial) pairs shared by at least two files get a full hash.
pub fn find_duplicates(
    media: &[MediaFile],
    hasher: &mut ContentHasher,
    progress: &ThrottledProgress,
) -> Result<Vec<DuplicateGroup>, ProcessError> {
    // Pass 1: size
    let mut size_groups: HashMap<u64, Vec<usize>> = HashMap::new();
    for (i, m) in media.iter().enumerate() {
        size_groups.entry(m.size).or_default().push(i);
    }

    // Pass 2: partial hash within shared sizes
    let mut partial_groups: HashMap<(u64, String), Vec<usize>> = HashMap::new();
    for indices in size_groups.values().filter(|g| g.len() > 1) {
        for &i in indices {
            let m = &media[i];
            if let Some(hash) = hasher.partial_hash(&m.path, m.size) {
                partial_groups.entry((m.size, hash)).or_default().push(i);
            }
        }
    }

    // Pass 3: full hash within shared prefixes
    let needs_full: Vec<&Vec<usize>> = partial_groups.values().filter(|g| g.len() > 1).collect();
    let total = needs_full.iter().map(|g| g.len()).sum::<usize>() as u64;
    let mut done = 0u64;
    let mut full_groups: HashMap<String, Vec<usize>> = HashMap::new();
    for indices in needs_full {
        for &i in indices {
            let m = &media[i];
            progress.report("dedup", done, total, "Hashing duplicate candidates");
            done += 1;
            if let Some(hash) = hasher.full_hash(&m.path, m.size) {
                full_groups.entry(hash).or_default().push(i);
            }
        }
    }

    let mut groups = Vec::new();
    for (hash, mut indices) in full_groups {
        if indices.len() < 2 {
            continue;
        }
        indices.sort_unstable();
        let canonical_idx = elect_canonical(media, &indices);
        let canonical = media[canonical_idx].path.clone();

        let redundant = indices
            .iter()
            .filter(|&&i| i != canonical_idx)
            .map(|&i| media[i].path.clone())
            .collect();
        groups.push(DuplicateGroup {
            hash,
            canonical,
            redundant,
        });
    }

    // HashMap iteration order is random
    groups.sort_by(|a, b| a.canonical.cmp(&b.canonical));
    Ok(groups)
}

/// Prefer the first member without a `(N)` disambiguator; otherwise the first member.
fn elect_canonical(media: &[MediaFile], indices: &[usize]) -> usize {
    indices
        .iter()
        .copied()
        .find(|&i| !is_numbered_duplicate(&media[i].filename))
        .unwrap_or(indices[0])
}

/// Map every redundant path to its survivor. Nothing is deleted unless this
/// succeeds: a path mapped to two survivors, or a survivor that is itself
/// redundant, is a [`ProcessError::CanonicalConflict`].
pub fn canonical_map(groups: &[DuplicateGroup]) -> Result<HashMap<PathBuf, PathBuf>, ProcessError> {
    let mut canonical_of: HashMap<PathBuf, PathBuf> = HashMap::new();
    for group in groups {
        for path in &group.redundant {
            if let Some(existing) = canonical_of.insert(path.clone(), group.canonical.clone()) {
                if existing != group.canonical {
                    return Err(ProcessError::CanonicalConflict {
                        hash: group.hash.clone(),
                        existing,
                        candidate: group.canonical.clone(),
                    });
                }
            }
        }
    }
    for group in groups {
        if let Some(other) = canonical_of.get(&group.canonical) {
            return Err(ProcessError::CanonicalConflict {
                hash: group.hash.clone(),
                existing: other.clone(),
                candidate: group.canonical.clone(),
            });
        }
    }
    Ok(canonical_of)
}

/// Find duplicates and delete every redundant member from disk.
pub fn deduplicate(
    media: Vec<MediaFile>,
    hasher: &mut ContentHasher,
    progress: &ThrottledProgress,
) -> Result<DedupResult, ProcessError> {
    let groups = find_duplicates(&media, hasher, progress)?;
    let canonical_of = canonical_map(&groups)?;

    let mut removed = 0u64;
    let mut warnings = Vec::new();
    for group in &groups {
        debug!(canonical = %group.canonical.display(), count = group.redundant.len(), "duplicate group");
        for path in &group.redundant {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "failed to delete duplicate");
                    warnings.push(format!("failed to delete duplicate {}: {}", path.display(), e));
                }
            }
            hasher.forget(path);
        }
    }

    let media: Vec<MediaFile> = media
        .into_iter()
        .filter(|m| !canonical_of.contains_key(&m.path))
        .collect();
    info!(removed, groups = groups.len(), "duplicates removed");

    Ok(DedupResult {
        media,
        removed,
        canonical_of,
        warnings,
    })
}
