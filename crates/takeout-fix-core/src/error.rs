//! Error types.
//!
//! Only [`ProcessError`] ever aborts a run. Everything else is recovered per
//! file and ends up in the [`RunReport`](crate::report::RunReport).

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors: the batch does not start, or stops immediately.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Input folder not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Failed to create output folder {path}: {source}")]
    OutputNotCreated {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file was about to be removed in favour of two different survivors,
    /// or a survivor was itself scheduled for removal.
    #[error("Internal error: duplicate group {hash} conflicts over {existing} and {candidate}")]
    CanonicalConflict {
        hash: String,
        existing: PathBuf,
        candidate: PathBuf,
    },
}

/// Failure to turn a textual timestamp into a date.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateParseError {
    #[error("no timestamp value present")]
    Empty,

    #[error("malformed timestamp {0:?}")]
    Malformed(String),
}

/// Embedded-metadata codec failures.
#[derive(Error, Debug)]
pub enum TagError {
    #[error("no embedded metadata in {path}")]
    NotFound { path: PathBuf },

    #[error("cannot read embedded metadata of {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("container of {path} has no writable metadata slot")]
    UnsupportedContainer { path: PathBuf },

    #[error("failed to encode metadata for {path}: {reason}")]
    Encode { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sidecar lookup failures. Malformed files are treated as absent by callers.
#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("no sidecar found for {path}")]
    NotFound { path: PathBuf },

    #[error("malformed sidecar {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}
