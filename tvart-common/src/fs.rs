//! File helpers

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Write `contents` to `path` atomically.
///
/// The bytes go to a hidden sibling file first, which is then renamed over
/// the target. Readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path)?;

    if let Err(e) = std::fs::write(&tmp, contents) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }

    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(Error::Io(e));
    }

    Ok(())
}

/// Hidden, uniquely named sibling of `path` (same directory, so a rename is atomic)
pub fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", path.display())))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple())))
}

/// File size in bytes, or `None` when the file does not exist
pub fn file_len(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
