use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// `<target>.bak`
pub fn backup_path(target: &Path) -> PathBuf {
    let mut path = OsString::from(target.as_os_str());
    path.push(".bak");
    PathBuf::from(path)
}

/// Copies `target` to `<target>.bak` unless that file already exists
///
/// The first backup ever taken is the one that is kept: later runs, which see an already shrunk
/// target, never replace it.
pub fn ensure_backup(target: &Path) -> Result<PathBuf, Error> {
    let backup = backup_path(target);

    if backup.exists() {
        log::debug!("keeping existing backup {}", backup.display());
        return Ok(backup);
    }

    fs::copy(target, &backup).map_err(|source| Error::Backup {
        path: backup.clone(),
        source,
    })?;
    log::debug!("backed up {} to {}", target.display(), backup.display());

    Ok(backup)
}
