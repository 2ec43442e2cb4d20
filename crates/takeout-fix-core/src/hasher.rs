use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::warn;

/// Bytes covered by the partial hash
pub const PARTIAL_HASH_BYTES: usize = 1024;

const CHUNK_SIZE: usize = 64 * 1024; // 64 KiB

/// (size, partial-hash, full-hash) for one file; hashes fill in lazily.
#[derive(Debug, Clone, Default)]
pub struct ContentFingerprint {
    pub size: u64,
    pub partial: Option<String>,
    pub full: Option<String>,
}

/// SHA-256 content hasher with per-run memoization.
///
/// Unreadable files fail open: the hash is `None`, the path is remembered in
/// [`ContentHasher::failed`] and the file takes part in no duplicate group.
#[derive(Default)]
pub struct ContentHasher {
    fingerprints: HashMap<PathBuf, ContentFingerprint>,
    failed: HashSet<PathBuf>,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash of at most the first [`PARTIAL_HASH_BYTES`] bytes.
    pub fn partial_hash(&mut self, path: &Path, size: u64) -> Option<String> {
        if let Some(hash) = self.fingerprints.get(path).and_then(|f| f.partial.clone()) {
            return Some(hash);
        }
        if self.failed.contains(path) {
            return None;
        }
        match hash_prefix(path, PARTIAL_HASH_BYTES) {
            Ok(hash) => {
                self.entry(path, size).partial = Some(hash.clone());
                Some(hash)
            }
            Err(e) => self.fail(path, e),
        }
    }

    /// Hash of the whole byte stream, read in bounded chunks.
    pub fn full_hash(&mut self, path: &Path, size: u64) -> Option<String> {
        if let Some(hash) = self.fingerprints.get(path).and_then(|f| f.full.clone()) {
            return Some(hash);
        }
        if self.failed.contains(path) {
            return None;
        }
        match hash_stream(path) {
            Ok(hash) => {
                self.entry(path, size).full = Some(hash.clone());
                Some(hash)
            }
            Err(e) => self.fail(path, e),
        }
    }

    pub fn fingerprint(&self, path: &Path) -> Option<&ContentFingerprint> {
        self.fingerprints.get(path)
    }

    /// Files that could not be read during this run
    pub fn failed(&self) -> impl Iterator<Item = &Path> {
        self.failed.iter().map(PathBuf::as_path)
    }

    /// Forget a file, e.g. after it was deleted.
    pub fn forget(&mut self, path: &Path) {
        self.fingerprints.remove(path);
    }

    fn entry(&mut self, path: &Path, size: u64) -> &mut ContentFingerprint {
        self.fingerprints
            .entry(path.to_path_buf())
            .or_insert_with(|| ContentFingerprint {
                size,
                ..Default::default()
            })
    }

    fn fail(&mut self, path: &Path, error: io::Error) -> Option<String> {
        warn!(file = %path.display(), %error, "cannot hash file, treating it as unique");
        self.failed.insert(path.to_path_buf());
        None
    }
}

fn hash_prefix(path: &Path, limit: usize) -> io::Result<String> {
    let mut file = File::open(path)?.take(limit as u64);
    let mut buf = Vec::with_capacity(limit);
    file.read_to_end(&mut buf)?;
    Ok(hex::encode(Sha256::digest(&buf)))
}

fn hash_stream(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
