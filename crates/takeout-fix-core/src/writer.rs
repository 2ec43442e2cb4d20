use std::path::Path;

use tracing::{debug, warn};

use crate::date::exif::format_exif_datetime;
use crate::date::geo::Geolocation;
use crate::date::ResolvedDate;
use crate::fs_times;
use crate::media::MediaKind;
use crate::report::RunReport;
use crate::tags::{MetadataCodec, TagMap, TagSlot, TagValue};

/// Slots that all receive the resolved capture time
const TIMESTAMP_SLOTS: [TagSlot; 3] = [TagSlot::DateTime, TagSlot::DateTimeOriginal, TagSlot::DateTimeDigitized];

/// Applies resolved dates and geolocation to output files. Every failure is
/// recorded in the report; nothing here aborts the run.
pub struct MetadataWriter<'a> {
    codec: &'a dyn MetadataCodec,
}

impl<'a> MetadataWriter<'a> {
    pub fn new(codec: &'a dyn MetadataCodec) -> Self {
        Self { codec }
    }

    /// Embedded timestamp slots for photos, then filesystem times for all.
    pub fn apply_date(&self, path: &Path, kind: MediaKind, date: &ResolvedDate, report: &mut RunReport) {
        if kind == MediaKind::Photo {
            let stamp = format_exif_datetime(&date.at);
            let tags: TagMap = TIMESTAMP_SLOTS
                .iter()
                .map(|slot| (*slot, TagValue::Ascii(stamp.clone())))
                .collect();
            self.write(path, &tags, report);
        }

        if let Err(e) = fs_times::set_file_times(path, date.timestamp) {
            warn!(file = %path.display(), error = %e, "cannot set file times");
            report.warn(format!("cannot set file times on {}: {}", path.display(), e));
        }
    }

    /// Geolocation block, photos only.
    pub fn apply_geolocation(&self, path: &Path, kind: MediaKind, geo: &Geolocation, report: &mut RunReport) {
        if kind != MediaKind::Photo {
            return;
        }
        self.write(path, &geo.to_tags(), report);
    }

    fn write(&self, path: &Path, tags: &TagMap, report: &mut RunReport) {
        match self.codec.write_tags(path, tags) {
            Ok(()) => debug!(file = %path.display(), slots = tags.len(), "metadata written"),
            Err(e) => {
                debug!(file = %path.display(), error = %e, "metadata write failed");
                report.record_write_failure(path);
            }
        }
    }
}
