//! File-backed storage for pipeline artifacts

pub mod holdings;
pub mod token;

pub use holdings::{HoldingsFile, HoldingsStore, ReportFile};
pub use token::TokenFile;

use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Write `data` next to `path` and rename it into place
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Delete every file in `dir` and one level of subdirectories. Returns the number removed.
pub fn clean_directory(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        info!("Directory does not exist: {:?}", dir);
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            removed += remove_file(&path);
        } else if path.is_dir() {
            for sub in fs::read_dir(&path)? {
                let sub = sub?.path();
                if sub.is_file() {
                    removed += remove_file(&sub);
                }
            }
        }
    }

    info!("Removed {} files from {:?}", removed, dir);
    Ok(removed)
}

fn remove_file(path: &Path) -> usize {
    match fs::remove_file(path) {
        Ok(()) => 1,
        Err(e) => {
            warn!("Error deleting {:?}: {}", path, e);
            0
        }
    }
}
