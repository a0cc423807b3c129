// src/utils/lockfile.rs
//! Advisory exclusive lock per category, held across append-or-rotate.
//! Two processes touching the same live log otherwise race the rename
//! inside rotation.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, TrackerError};

/// Guard that unlocks on drop. Blocking acquire: append-or-rotate is short,
/// so waiting beats failing the caller.
#[derive(Debug)]
pub struct CategoryLock {
    file: File,
    path: PathBuf,
}

impl CategoryLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| TrackerError::io(path, e))?;
        file.lock_exclusive()
            .map_err(|e| TrackerError::io(path, e))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for CategoryLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!("failed to release lock {}: {e}", self.path.display());
        }
    }
}
