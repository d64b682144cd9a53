//! Single-writer lock around sync runs.
//!
//! Two runs against the same workbook and calendar must never interleave, so every
//! preview and commit holds an exclusive file lock. Waiting is bounded: the timeout
//! grows with the number of rows involved and is clamped to a maximum.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub base_timeout_secs: u64,
    pub per_row_millis: u64,
    pub max_timeout_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            path: None,
            base_timeout_secs: 10,
            per_row_millis: 250,
            max_timeout_secs: 60,
        }
    }
}

impl LockConfig {
    /// How long to wait for the lock when `rows` rows are about to be processed.
    pub fn timeout_for(&self, rows: usize) -> Duration {
        let base = Duration::from_secs(self.base_timeout_secs);
        let max = Duration::from_secs(self.max_timeout_secs).max(base);
        let scaled = base + Duration::from_millis(self.per_row_millis.saturating_mul(rows as u64));
        scaled.clamp(base, max)
    }

    /// Configured lock file, or `sync.lock` in the runtime (or cache) directory.
    pub fn lock_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.path {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            return Ok(PathBuf::from(expanded));
        }

        let runtime_dir = dirs::runtime_dir()
            .or_else(dirs::cache_dir)
            .ok_or_else(|| SyncError::Config("Could not determine runtime directory".into()))?;

        Ok(runtime_dir.join("rostersync").join("sync.lock"))
    }
}

/// Held lock. Released when dropped, whatever path the run leaves by.
#[derive(Debug)]
pub struct SyncLock {
    file: File,
    path: PathBuf,
}

impl SyncLock {
    /// Wait up to `timeout` for the exclusive lock on `path`.
    pub fn acquire(path: &Path, timeout: Duration) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        loop {
            if file.try_lock_exclusive().is_ok() {
                tracing::debug!(path = %path.display(), "sync lock acquired");
                return Ok(SyncLock {
                    file,
                    path: path.to_path_buf(),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::error!(path = %path.display(), "timed out waiting for sync lock");
                return Err(SyncError::LockTimeout {
                    path: path.display().to_string(),
                    waited: humantime::format_duration(timeout).to_string(),
                });
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release sync lock");
        } else {
            tracing::debug!(path = %self.path.display(), "sync lock released");
        }
    }
}
