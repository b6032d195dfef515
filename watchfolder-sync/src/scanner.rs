//! Directory scanner: current modification times of matching files.

use std::ffi::OsStr;
use std::path::Path;

use watchfolder_core::types::{DirectoryListing, FileName, Timestamp};

use crate::error::{scan_err, SyncError};

/// List the regular files directly inside `dir` whose extension matches
/// `extension` (ASCII case-insensitive), with mtimes truncated to seconds.
///
/// Fails if `dir` is missing or unreadable. Individual entries that vanish
/// mid-scan are skipped; they will be picked up (or not) next cycle.
pub fn scan(dir: &Path, extension: &str) -> Result<DirectoryListing, SyncError> {
    let entries = std::fs::read_dir(dir).map_err(|e| scan_err(dir, e))?;
    let mut listing = DirectoryListing::new(dir);

    for entry in entries {
        let entry = entry.map_err(|e| scan_err(dir, e))?;
        let path = entry.path();
        if !has_extension(&path, extension) {
            continue;
        }

        // Follows symlinks, so a linked file counts as a file.
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::debug!("skipping {}: {}", path.display(), err);
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            tracing::warn!("skipping non UTF-8 file name: {}", path.display());
            continue;
        };
        if !FileName::is_storable(&name) {
            tracing::warn!("skipping file name the state record cannot hold: {name:?}");
            continue;
        }

        let modified = meta.modified().map_err(|e| scan_err(&path, e))?;
        listing
            .files
            .insert(FileName::from(name), Timestamp::from_system_time(modified));
    }

    Ok(listing)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
