use chrono::NaiveDateTime;

use super::exif::parse_exif_datetime;
use crate::error::DateParseError;

/// Date of a `YYYY-MM-DD...` folder, at noon.
///
/// Exports name day folders `2016-06-16` or `2016-06-16 #2`; only the first
/// ten characters are looked at.
pub fn date_from_folder_name(name: &str) -> Result<NaiveDateTime, DateParseError> {
    let prefix: String = name.chars().take(10).collect();
    if prefix.is_empty() {
        return Err(DateParseError::Empty);
    }
    if prefix.len() != 10 || prefix.contains(' ') {
        return Err(DateParseError::Malformed(name.to_string()));
    }
    parse_exif_datetime(&format!("{} 12:00:00", prefix))
        .map_err(|_| DateParseError::Malformed(name.to_string()))
}
