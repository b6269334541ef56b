// ABOUTME: Lock files preventing concurrent writers to the same stack or document.
// ABOUTME: Uses atomic create-new with holder info, stale detection, and forced breaking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Information about who holds a lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    /// Process ID of the lock holder.
    pub pid: u32,
    /// When the lock was acquired.
    pub started_at: DateTime<Utc>,
    /// What the lock protects (stack name or document).
    pub subject: String,
}

impl LockInfo {
    /// Create new lock info for the current process.
    pub fn new(subject: &str) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            subject: subject.to_string(),
        }
    }

    /// Check if this lock is older than `max_age`.
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        Utc::now() - self.started_at >= max_age
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{subject} is locked by {holder} (pid {pid}) since {started_at}")]
    Held {
        subject: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("timed out after {0:?} waiting for lock {1}")]
    Timeout(Duration, PathBuf),

    #[error("lock I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A held lock file that is removed on release or drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    released: bool,
}

impl LockFile {
    /// Stacks are locked for the whole deploy or rollback; an hour-old lock is abandoned.
    pub fn stack_stale_after() -> chrono::Duration {
        chrono::Duration::hours(1)
    }

    /// Document locks cover one read-modify-write.
    pub fn document_stale_after() -> chrono::Duration {
        chrono::Duration::seconds(60)
    }

    /// Try to acquire the lock once.
    ///
    /// Creation uses `create_new`, so two processes racing for the same path
    /// cannot both succeed. Stale locks are broken with a warning; `force`
    /// breaks any lock.
    pub fn try_acquire(
        path: &Path,
        subject: &str,
        force: bool,
        stale_after: chrono::Duration,
    ) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        if Self::create(path, subject)? {
            return Ok(Self {
                path: path.to_path_buf(),
                released: false,
            });
        }

        match Self::read_existing(path) {
            Some(existing) if !force && !existing.is_stale(stale_after) => {
                return Err(LockError::Held {
                    subject: existing.subject,
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                });
            }
            Some(existing) => {
                tracing::warn!(
                    "Breaking lock on {} held by {} (pid {}) since {}",
                    existing.subject,
                    existing.holder,
                    existing.pid,
                    existing.started_at
                );
            }
            None => {
                tracing::warn!("Lock info at {} unreadable, breaking lock", path.display());
            }
        }

        let _ = std::fs::remove_file(path);

        if Self::create(path, subject)? {
            Ok(Self {
                path: path.to_path_buf(),
                released: false,
            })
        } else {
            match Self::read_existing(path) {
                Some(existing) => Err(LockError::Held {
                    subject: existing.subject,
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                }),
                None => Err(LockError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other("lock acquired by another process during break"),
                }),
            }
        }
    }

    /// Poll for the lock until `wait` elapses.
    pub async fn acquire_waiting(
        path: &Path,
        subject: &str,
        wait: Duration,
        stale_after: chrono::Duration,
    ) -> Result<Self, LockError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match Self::try_acquire(path, subject, false, stale_after) {
                Ok(lock) => return Ok(lock),
                Err(LockError::Held { .. }) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                Err(LockError::Held { .. }) => {
                    return Err(LockError::Timeout(wait, path.to_path_buf()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Atomically create the lock file. Returns false if it already exists.
    fn create(path: &Path, subject: &str) -> Result<bool, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(io_err(e)),
        };

        let info = serde_json::to_vec(&LockInfo::new(subject))
            .map_err(|e| io_err(std::io::Error::other(e)))?;
        file.write_all(&info).map_err(io_err)?;
        Ok(true)
    }

    fn read_existing(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read(path).ok()?;
        serde_json::from_slice(&content).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(LockError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
