use chrono::NaiveDateTime;

use crate::error::DateParseError;

/// The one textual shape written into embedded metadata
pub const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Length of `YYYY:MM:DD HH:MM:SS`
const EXIF_DATETIME_LEN: usize = 19;

/// Date and separating space
const DATE_PART_LEN: usize = 11;

/// Parse an embedded-metadata timestamp.
///
/// Exif writers are sloppy: `2019-01-01`, `2019/01/01` and `2019.01.01` all
/// turn up, as do hours rendered as `12: 5: 3`. Separators are normalized to
/// `:`, a space right after a colon in the time part becomes `0`, and anything
/// past the canonical length (sub-seconds, zone suffixes) is cut off.
pub fn parse_exif_datetime(raw: &str) -> Result<NaiveDateTime, DateParseError> {
    let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.is_empty() {
        return Err(DateParseError::Empty);
    }
    if !trimmed.is_ascii() {
        return Err(DateParseError::Malformed(raw.to_string()));
    }

    let mut cleaned: String = trimmed
        .chars()
        .map(|c| match c {
            '-' | '/' | '.' | '\\' => ':',
            c => c,
        })
        .collect();

    if cleaned.len() > DATE_PART_LEN {
        let time = cleaned.split_off(DATE_PART_LEN);
        cleaned.push_str(&time.replace(": ", ":0"));
    }
    cleaned.truncate(EXIF_DATETIME_LEN);

    NaiveDateTime::parse_from_str(&cleaned, EXIF_DATETIME_FORMAT)
        .map_err(|_| DateParseError::Malformed(raw.to_string()))
}

pub fn format_exif_datetime(dt: &NaiveDateTime) -> String {
    dt.format(EXIF_DATETIME_FORMAT).to_string()
}
