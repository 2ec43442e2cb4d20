use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::error::DateParseError;

const YEAR: &str = r"(?:20|19|18)\d{2}";
const MONTH: &str = r"(?:0[1-9]|1[0-2])";
const DAY: &str = r"[0-3]\d";

/// Filename timestamp shapes: `(capture regex, chrono format)`, tried in order
static NAME_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let build = |body: String, format: &'static str| {
        (Regex::new(&format!("(?P<date>{})", body)).unwrap(), format)
    };
    vec![
        // Screenshot_20190919-053857.jpg
        build(format!(r"{YEAR}{MONTH}{DAY}-\d{{6}}"), "%Y%m%d-%H%M%S"),
        // IMG_20190509_154733.jpg, PXL_20210101_101010123.jpg
        build(format!(r"{YEAR}{MONTH}{DAY}_\d{{6}}"), "%Y%m%d_%H%M%S"),
        // Screenshot_2019-04-16-11-19-37-232.jpg
        build(format!(r"{YEAR}-{MONTH}-{DAY}-\d{{2}}-\d{{2}}-\d{{2}}"), "%Y-%m-%d-%H-%M-%S"),
        // signal-2020-10-26-163832.jpg
        build(format!(r"{YEAR}-{MONTH}-{DAY}-\d{{6}}"), "%Y-%m-%d-%H%M%S"),
        // 201801261147521000.jpg: keep only the first 14 digits
        build(format!(r"{YEAR}{MONTH}{DAY}\d{{6}}"), "%Y%m%d%H%M%S"),
        // 2016_01_30_11_49_15.mp4
        build(format!(r"{YEAR}_{MONTH}_{DAY}_\d{{2}}_\d{{2}}_\d{{2}}"), "%Y_%m_%d_%H_%M_%S"),
    ]
});

/// Guess a capture time from a timestamp embedded in the filename.
pub fn guess_date_from_filename(filename: &str) -> Result<NaiveDateTime, DateParseError> {
    for (regex, format) in NAME_PATTERNS.iter() {
        let Some(found) = regex.captures(filename).and_then(|c| c.name("date")) else {
            continue;
        };
        if let Ok(dt) = NaiveDateTime::parse_from_str(found.as_str(), format) {
            return Ok(dt);
        }
    }
    Err(DateParseError::Malformed(filename.to_string()))
}
