//! Per-volume exclusive lock
//!
//! Serializes the probe/create/seed sequence for a cache volume across
//! tasks and processes on the same host using `flock(2)` on a lock file.
//! The lock is released when the guard is dropped.

use crate::error::{FlakeboxError, FlakeboxResult};
use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Held exclusive lock on a cache volume
#[derive(Debug)]
pub struct VolumeLock {
    // flock is released when the descriptor closes
    _file: File,
    path: PathBuf,
}

impl VolumeLock {
    /// Path of the lock file for `volume` under `lock_dir`
    pub fn lock_path(lock_dir: &Path, volume: &str) -> PathBuf {
        lock_dir.join(format!("{}.lock", volume))
    }

    /// Acquire the lock for `volume`, waiting if another holder has it
    pub async fn acquire(lock_dir: &Path, volume: &str) -> FlakeboxResult<Self> {
        let lock_err = |source| FlakeboxError::CacheLock {
            name: volume.to_string(),
            source,
        };

        tokio::fs::create_dir_all(lock_dir).await.map_err(lock_err)?;

        let path = Self::lock_path(lock_dir, volume);
        let blocking_path = path.clone();

        let file = tokio::task::spawn_blocking(move || -> io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&blocking_path)?;

            match file.try_lock_exclusive() {
                Ok(()) => Ok(file),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    info!("Waiting for cache lock {}", blocking_path.display());
                    file.lock_exclusive()?;
                    Ok(file)
                }
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(|e| FlakeboxError::Internal(format!("lock task failed: {}", e)))?
        .map_err(lock_err)?;

        debug!("Acquired cache lock {}", path.display());
        Ok(Self { _file: file, path })
    }

    /// Path of the held lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
