// src/storage/lock.rs
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::utils::error::StorageError;

/// Fail-fast lock file preventing two instances of a job from running
/// against the same working directory on one machine.
///
/// Not a true mutex: there is no staleness detection and no automatic
/// release after a hard crash. A leftover lock must be removed manually.
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                let stamp = chrono::Utc::now().to_rfc3339();
                f.write_all(stamp.as_bytes())?;
                tracing::debug!("Acquired lock at {}", path.display());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StorageError::LockHeld(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}
