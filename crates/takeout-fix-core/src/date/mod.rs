//! Capture-date resolution.
//!
//! Sources are tried in a fixed order and the first one that yields a date
//! wins: embedded metadata, the sidecar JSON, the album sidecar of the
//! containing folder, a `YYYY-MM-DD` folder name, and a timestamp in the
//! filename.

pub mod exif;
pub mod folder;
pub mod geo;
pub mod guess;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::{DateParseError, SidecarError, TagError};
use crate::media::MediaFile;
use crate::report::RunReport;
use crate::sidecar::SidecarResolver;
use crate::tags::{MetadataCodec, TagSlot, TagValue};
use geo::Geolocation;

/// Embedded timestamp slots, most trusted first
const EMBEDDED_DATE_SLOTS: [TagSlot; 3] = [
    TagSlot::DateTimeOriginal,
    TagSlot::DateTimeDigitized,
    TagSlot::DateTime,
];

/// How wall-clock strings relate to Unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBasis {
    #[default]
    Utc,
    Local,
}

impl TimeBasis {
    pub fn to_naive(self, timestamp: i64) -> Option<NaiveDateTime> {
        let utc = DateTime::from_timestamp(timestamp, 0)?;
        Some(match self {
            TimeBasis::Utc => utc.naive_utc(),
            TimeBasis::Local => utc.with_timezone(&Local).naive_local(),
        })
    }

    pub fn to_timestamp(self, dt: &NaiveDateTime) -> Option<i64> {
        match self {
            TimeBasis::Utc => Some(dt.and_utc().timestamp()),
            TimeBasis::Local => Local.from_local_datetime(dt).earliest().map(|t| t.timestamp()),
        }
    }
}

/// Where a resolved date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    EmbeddedMetadata,
    SidecarJson,
    AlbumFallback,
    FolderName,
    FilenameGuess,
}

impl Provenance {
    /// Dates that only describe the folder or the name, not the file itself
    pub fn is_fallback(self) -> bool {
        matches!(
            self,
            Provenance::AlbumFallback | Provenance::FolderName | Provenance::FilenameGuess
        )
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Provenance::EmbeddedMetadata => "embedded-metadata",
            Provenance::SidecarJson => "sidecar-json",
            Provenance::AlbumFallback => "album-fallback",
            Provenance::FolderName => "folder-name",
            Provenance::FilenameGuess => "filename-guess",
        };
        f.write_str(name)
    }
}

/// The authoritative capture time of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDate {
    /// Wall-clock time in the run's [`TimeBasis`]
    pub at: NaiveDateTime,
    /// Unix seconds
    pub timestamp: i64,
    pub provenance: Provenance,
    /// Only ever set from a sidecar
    pub geolocation: Option<Geolocation>,
}

/// One step of the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Embedded,
    Sidecar,
    Album,
    FolderName,
    FilenameGuess,
}

/// Why a strategy produced nothing. Never fatal.
#[derive(Error, Debug)]
pub enum StrategyMiss {
    #[error(transparent)]
    Tags(#[from] TagError),

    #[error("no usable embedded timestamp: {0}")]
    EmbeddedDate(DateParseError),

    #[error(transparent)]
    Sidecar(#[from] SidecarError),

    #[error("sidecar has no capture time")]
    SidecarWithoutDate,

    #[error("folder has no album sidecar")]
    NoAlbum,

    #[error("folder name: {0}")]
    FolderName(DateParseError),

    #[error("filename: {0}")]
    Filename(DateParseError),

    #[error("timestamp {0} is out of range")]
    OutOfRange(i64),

    /// Wall-clock time skipped by a daylight-saving jump
    #[error("{provenance} date {at} does not exist in the local time zone")]
    NonexistentLocalTime { at: NaiveDateTime, provenance: Provenance },
}

/// Runs the strategy chain for each file.
pub struct DateResolver<'a> {
    codec: &'a dyn MetadataCodec,
    sidecars: &'a mut SidecarResolver,
    basis: TimeBasis,
    chain: Vec<Strategy>,
}

impl<'a> DateResolver<'a> {
    pub fn new(
        codec: &'a dyn MetadataCodec,
        sidecars: &'a mut SidecarResolver,
        basis: TimeBasis,
        allow_guess: bool,
    ) -> Self {
        let mut chain = vec![
            Strategy::Embedded,
            Strategy::Sidecar,
            Strategy::Album,
            Strategy::FolderName,
        ];
        if allow_guess {
            chain.push(Strategy::FilenameGuess);
        }
        Self {
            codec,
            sidecars,
            basis,
            chain,
        }
    }

    pub fn chain(&self) -> &[Strategy] {
        &self.chain
    }

    /// Resolve one file; records misses and fallbacks in `report`.
    pub fn resolve(&mut self, file: &MediaFile, report: &mut RunReport) -> Option<ResolvedDate> {
        for i in 0..self.chain.len() {
            let strategy = self.chain[i];
            match self.attempt(strategy, file) {
                Ok(resolved) => {
                    debug!(file = %file.path.display(), provenance = %resolved.provenance, at = %resolved.at, "date resolved");
                    report.record_resolved(&file.path, resolved.provenance);
                    return Some(resolved);
                }
                Err(miss) => {
                    debug!(file = %file.path.display(), ?strategy, %miss, "strategy missed");
                    if let StrategyMiss::Sidecar(SidecarError::NotFound { .. }) = miss {
                        report.record_no_sidecar(&file.path);
                    }
                }
            }
        }
        report.record_unresolved(&file.path);
        None
    }

    fn attempt(&mut self, strategy: Strategy, file: &MediaFile) -> Result<ResolvedDate, StrategyMiss> {
        match strategy {
            Strategy::Embedded => self.from_embedded(file),
            Strategy::Sidecar => self.from_sidecar(file),
            Strategy::Album => {
                let album = self
                    .sidecars
                    .find_album_sidecar(file.folder())
                    .ok_or(StrategyMiss::NoAlbum)?;
                self.from_timestamp(album.date, Provenance::AlbumFallback, None)
            }
            Strategy::FolderName => {
                let name = file
                    .folder()
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let at = folder::date_from_folder_name(&name).map_err(StrategyMiss::FolderName)?;
                self.from_naive(at, Provenance::FolderName)
            }
            Strategy::FilenameGuess => {
                let at = guess::guess_date_from_filename(&file.filename).map_err(StrategyMiss::Filename)?;
                self.from_naive(at, Provenance::FilenameGuess)
            }
        }
    }

    /// First embedded slot holding a parseable timestamp.
    fn from_embedded(&self, file: &MediaFile) -> Result<ResolvedDate, StrategyMiss> {
        let tags = self.codec.read_tags(&file.path)?;
        let mut last = DateParseError::Empty;
        for slot in EMBEDDED_DATE_SLOTS {
            let Some(TagValue::Ascii(raw)) = tags.get(&slot) else {
                continue;
            };
            match exif::parse_exif_datetime(raw) {
                Ok(at) => return self.from_naive(at, Provenance::EmbeddedMetadata),
                Err(e) => last = e,
            }
        }
        Err(StrategyMiss::EmbeddedDate(last))
    }

    fn from_sidecar(&mut self, file: &MediaFile) -> Result<ResolvedDate, StrategyMiss> {
        let hit = self.sidecars.find_file_sidecar(&file.path)?;
        let taken_at = hit.metadata.taken_at().ok_or(StrategyMiss::SidecarWithoutDate)?;
        let geolocation = geo::merge(hit.metadata.geo_data.as_ref(), hit.metadata.geo_data_exif.as_ref());
        self.from_timestamp(taken_at, Provenance::SidecarJson, geolocation)
    }

    fn from_timestamp(
        &self,
        timestamp: i64,
        provenance: Provenance,
        geolocation: Option<Geolocation>,
    ) -> Result<ResolvedDate, StrategyMiss> {
        let at = self
            .basis
            .to_naive(timestamp)
            .ok_or(StrategyMiss::OutOfRange(timestamp))?;
        Ok(ResolvedDate {
            at,
            timestamp,
            provenance,
            geolocation,
        })
    }

    fn from_naive(&self, at: NaiveDateTime, provenance: Provenance) -> Result<ResolvedDate, StrategyMiss> {
        let timestamp = self
            .basis
            .to_timestamp(&at)
            .ok_or(StrategyMiss::NonexistentLocalTime { at, provenance })?;
        Ok(ResolvedDate {
            at,
            timestamp,
            provenance,
            geolocation: None,
        })
    }
}
