use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use filetime::FileTime;

/// Set access and modification time.
pub fn set_modified_time(path: &Path, timestamp: i64) -> io::Result<()> {
    let ft = FileTime::from_unix_time(timestamp, 0);
    filetime::set_file_times(path, ft, ft)
}

/// Set creation time where the platform has one.
/// Returns `Ok(false)` when it does not, which is not an error.
#[cfg(any(windows, target_os = "macos"))]
pub fn set_created_time(path: &Path, timestamp: i64) -> io::Result<bool> {
    #[cfg(target_os = "macos")]
    use std::os::macos::fs::FileTimesExt;
    #[cfg(windows)]
    use std::os::windows::fs::FileTimesExt;

    let file = std::fs::OpenOptions::new().write(true).open(path)?;
    file.set_times(std::fs::FileTimes::new().set_created(system_time(timestamp)))?;
    Ok(true)
}

#[cfg(not(any(windows, target_os = "macos")))]
pub fn set_created_time(_path: &Path, _timestamp: i64) -> io::Result<bool> {
    Ok(false)
}

/// Creation time first: on some platforms touching it bumps mtime.
pub fn set_file_times(path: &Path, timestamp: i64) -> io::Result<()> {
    set_created_time(path, timestamp)?;
    set_modified_time(path, timestamp)
}

/// Give `dest` the access and modification time of `src`.
pub fn copy_file_times(src: &Path, dest: &Path) -> io::Result<()> {
    let meta = std::fs::metadata(src)?;
    filetime::set_file_times(
        dest,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
}

#[cfg_attr(not(any(windows, target_os = "macos")), allow(dead_code))]
fn system_time(timestamp: i64) -> SystemTime {
    if timestamp >= 0 {
        UNIX_EPOCH + Duration::from_secs(timestamp as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(timestamp.unsigned_abs())
    }
}
