use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::media::MediaFile;
use crate::output::FinalizedNames;
use crate::sidecar::SidecarResolver;

/// Album folder name -> final output paths of its members, in scan order.
/// A path may appear under several albums.
pub type AlbumMap = BTreeMap<String, Vec<PathBuf>>;

/// Collect album membership in terms of output files.
///
/// `members` is the scan result before deduplication, so files removed as
/// duplicates still count for their album through `canonical_of`.
pub fn track_albums(
    folders: &[PathBuf],
    members: &[MediaFile],
    sidecars: &mut SidecarResolver,
    canonical_of: &HashMap<PathBuf, PathBuf>,
    finalized: &FinalizedNames,
) -> AlbumMap {
    let mut by_folder: HashMap<&Path, Vec<&MediaFile>> = HashMap::new();
    for m in members {
        by_folder.entry(m.folder()).or_default().push(m);
    }

    let mut albums = AlbumMap::new();
    for folder in folders {
        if sidecars.find_album_sidecar(folder).is_none() {
            continue;
        }
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.to_string_lossy().into_owned());
        let files = albums.entry(name.clone()).or_default();

        for m in by_folder.get(folder.as_path()).into_iter().flatten() {
            let source = canonical_of.get(&m.path).unwrap_or(&m.path);
            let Some(dest) = finalized.final_path(source) else {
                debug!(album = %name, file = %m.path.display(), "album member has no output file");
                continue;
            };
            if !files.iter().any(|f| f == dest) {
                files.push(dest.to_path_buf());
            }
        }
    }
    albums
}

#[derive(Serialize)]
struct AlbumFile {
    filename: String,
    output_path: String,
}

#[derive(Serialize)]
struct AlbumInfo {
    files: Vec<AlbumFile>,
}

#[derive(Serialize)]
struct AlbumsJson {
    albums: BTreeMap<String, AlbumInfo>,
}

/// Write albums.json; `output_path` is relative to the file's own folder.
pub fn write_albums_json(albums: &AlbumMap, album_json_path: &Path) -> anyhow::Result<()> {
    let base = album_json_path.parent().unwrap_or(Path::new(""));
    let json = AlbumsJson {
        albums: albums
            .iter()
            .map(|(name, paths)| {
                let files = paths
                    .iter()
                    .map(|dest| AlbumFile {
                        filename: dest
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        output_path: pathdiff::diff_paths(dest, base)
                            .unwrap_or_else(|| dest.clone())
                            .to_string_lossy()
                            .replace('\\', "/"),
                    })
                    .collect();
                (name.clone(), AlbumInfo { files })
            })
            .collect(),
    };

    if !base.as_os_str().is_empty() {
        fs::create_dir_all(base)?;
    }
    let file = fs::File::create(album_json_path)?;
    serde_json::to_writer_pretty(file, &json)?;
    Ok(())
}
