//! Cross-process exclusive lock on a sidecar file.
//!
//! The lock is an OS advisory lock (`flock` on Unix, `LockFileEx` on
//! Windows) taken on `<document>.lock`. Every acquisition opens its own file
//! handle, so two threads of one process exclude each other exactly like two
//! processes do. The lock file itself is never removed; its presence means
//! nothing.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::storage::error::{Result, StoreError};

/// Upper bound for the sleep between two lock attempts.
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Lock path for a document path: same location, `lock` extension.
///
/// A document that already ends in `.lock` gets `.lock` appended instead,
/// so the sidecar is never the document itself.
pub fn lock_path_for(document_path: &Path) -> PathBuf {
    let sidecar = document_path.with_extension("lock");
    if sidecar != document_path {
        return sidecar;
    }
    let mut name = document_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// A held lock. Released when dropped, on every exit path.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
    acquired_at: Instant,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

/// Acquire the exclusive lock at `lock_path`, waiting at most `timeout`.
///
/// The lock file is created if absent. Contention is retried with a
/// doubling sleep starting at `poll_interval`; a zero `timeout` makes a
/// single attempt.
pub fn acquire(lock_path: &Path, timeout: Duration, poll_interval: Duration) -> Result<LockGuard> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(lock_path)
        .map_err(|source| StoreError::LockIo {
            path: lock_path.to_path_buf(),
            source,
        })?;

    let started = Instant::now();
    let mut backoff = poll_interval.max(Duration::from_millis(1));

    loop {
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let waited = started.elapsed();
                debug!(
                    path = %lock_path.display(),
                    waited_ms = waited.as_millis() as u64,
                    "lock acquired"
                );
                return Ok(LockGuard {
                    file,
                    path: lock_path.to_path_buf(),
                    acquired_at: Instant::now(),
                });
            }
            Err(e) if is_contended(&e) => {}
            Err(source) => {
                return Err(StoreError::LockIo {
                    path: lock_path.to_path_buf(),
                    source,
                });
            }
        }

        let waited = started.elapsed();
        if waited >= timeout {
            warn!(
                path = %lock_path.display(),
                waited_ms = waited.as_millis() as u64,
                "gave up waiting for lock"
            );
            return Err(StoreError::LockTimeout {
                path: lock_path.to_path_buf(),
                waited,
            });
        }

        std::thread::sleep(backoff.min(timeout - waited));
        backoff = next_backoff(backoff);
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}
