//! Filesystem lock that keeps two processes from writing the same vector store
//!
//! Uses flock() through fs2, so a crashed holder releases the lock automatically.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Guard that holds an exclusive filesystem lock
///
/// The lock is released when this guard is dropped.
pub struct FsLockGuard {
    _file: File,
    path: PathBuf,
}

impl FsLockGuard {
    /// Try to acquire an exclusive lock on `lock_path`, non-blocking
    ///
    /// Returns:
    /// - `Ok(Some(guard))` if the lock was acquired
    /// - `Ok(None)` if another process holds the lock
    /// - `Err(...)` on IO errors
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>> {
        tracing::debug!("Attempting to acquire index lock: {}", lock_path.display());

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = File::create(lock_path)
            .with_context(|| format!("Failed to create lock file {}", lock_path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired index lock: {}", lock_path.display());
                Ok(Some(Self {
                    _file: file,
                    path: lock_path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!("Index lock held elsewhere: {}", lock_path.display());
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to acquire filesystem lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FsLockGuard {
    fn drop(&mut self) {
        // The lock file itself is left in place and reused
        tracing::debug!("Releasing index lock: {}", self.path.display());
    }
}
