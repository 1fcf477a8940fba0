//! Cross-process run lock.
//!
//! At most one run may be active per working directory across all
//! processes. The lock is a file in the OS temp directory whose name is
//! derived from the md5 digest of the canonical working directory, so every
//! process arrives at the same path. The file holds a JSON payload
//! identifying the holder; a second acquirer fails fast and reports it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a lock holder, stored inside the lock file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockInfo {
    pub program: String,
    pub version: String,
    pub start_time: String,
}

/// Error type for lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run holds the lock for this directory.
    #[error(
        "another run is active in this directory: version {}, started {}",
        .0.version,
        .0.start_time
    )]
    Held(LockInfo),

    /// The lock file exists but its payload could not be read.
    #[error("existing lock file is unreadable: {0}")]
    Unreadable(String),

    /// IO error while acquiring or releasing.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Held run lock. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    info: LockInfo,
}

/// Lock file path for a working directory. Canonicalizes the directory so
/// every spelling of the same path maps to the same lock.
pub fn lock_path_for(work_dir: &Path) -> std::io::Result<PathBuf> {
    let canonical = work_dir.canonicalize()?;
    let digest = md5::compute(format!("riprun:dir:{}", canonical.display()));
    Ok(std::env::temp_dir().join(format!("riprun-{:x}.lock", digest)))
}

impl RunLock {
    /// Acquires the run lock for `work_dir`, writing this process's
    /// identity into the lock file. Fails with [`LockError::Held`] and the
    /// holder's recorded identity when the lock already exists.
    pub fn acquire(work_dir: &Path) -> Result<Self, LockError> {
        let path = lock_path_for(work_dir)?;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let info = LockInfo {
                    program: "riprun".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    start_time: chrono::Local::now()
                        .format("%Y.%m.%d %H:%M:%S%.3f")
                        .to_string(),
                };
                let payload = serde_json::to_vec(&info)
                    .map_err(|e| LockError::Unreadable(e.to_string()))?;
                file.write_all(&payload)?;
                file.flush()?;
                tracing::debug!(path = %path.display(), "run lock acquired");
                Ok(RunLock { path, info })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .map_err(|e| LockError::Unreadable(e.to_string()))
                    .and_then(|s| {
                        serde_json::from_str::<LockInfo>(&s)
                            .map_err(|e| LockError::Unreadable(e.to_string()))
                    })?;
                Err(LockError::Held(holder))
            }
            Err(e) => Err(LockError::Io(e)),
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to remove run lock {}: {}", self.path.display(), e);
        }
    }
}
