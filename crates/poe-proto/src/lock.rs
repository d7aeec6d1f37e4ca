//! Process-wide advisory lock (spec.md §3/§4.J), shared across the
//! daemon and the CLI: both processes touch the same chip, so "is
//! something else mid-transaction" has to be visible across process
//! boundaries, not just within one binary. Grounded in
//! `PoeAccessExclusiveLock` (`poe_common.py`): `flock(LOCK_EX)` on a
//! well-known file, retried `EXLOCK_RETRY` times with a 100ms backoff.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::fcntl::{flock, FlockArg};
use nix::errno::Errno;
use tracing::warn;

use crate::error::{PoeError, PoeResult};

pub const EXLOCK_RETRY: u32 = 5;
pub const EXLOCK_BACKOFF: Duration = Duration::from_millis(100);

/// A handle on the shared lock file. Cheap to construct; the actual
/// `flock` is taken per call via [`ProcessLock::acquire`].
pub struct ProcessLock {
    path: PathBuf,
}

impl ProcessLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProcessLock { path: path.into() }
    }

    /// Acquires the lock with up to `EXLOCK_RETRY` attempts, 100ms apart.
    /// Returns `PoeError::Busy` if every attempt is rejected, matching
    /// the original's behaviour of skipping the chip operation entirely
    /// rather than blocking indefinitely.
    pub fn acquire(&self) -> PoeResult<ProcessLockGuard> {
        let file = open_or_create(&self.path)?;
        let mut attempts_left = EXLOCK_RETRY;
        loop {
            match flock(std::os::unix::io::AsRawFd::as_raw_fd(&file), FlockArg::LockExclusiveNonblock) {
                Ok(()) => return Ok(ProcessLockGuard { file }),
                Err(Errno::EWOULDBLOCK) | Err(Errno::EAGAIN) => {
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        warn!(path = %self.path.display(), "exclusive lock unavailable after {EXLOCK_RETRY} attempts");
                        return Err(PoeError::Busy);
                    }
                    std::thread::sleep(EXLOCK_BACKOFF);
                }
                Err(e) => return Err(PoeError::Internal(format!("flock({}): {e}", self.path.display()))),
            }
        }
    }
}

fn open_or_create(path: &Path) -> PoeResult<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| PoeError::Internal(format!("open lock file {}: {e}", path.display())))
}

/// Releases the lock when dropped; `flock` is also released implicitly
/// when the underlying fd closes, but an explicit unlock documents the
/// intent and lets us log failures.
pub struct ProcessLockGuard {
    file: File,
}

impl Drop for ProcessLockGuard {
    fn drop(&mut self) {
        let _ = flock(std::os::unix::io::AsRawFd::as_raw_fd(&self.file), FlockArg::Unlock);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_nonblocking_attempt_from_same_process_succeeds() {
        // flock is per open-file-description, not per-process; re-opening
        // the same path from this test still exercises the retry path
        // when a distinct fd holds the lock.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poe_access.lock");
        let lock_a = ProcessLock::new(&path);
        let guard = lock_a.acquire().unwrap();

        let lock_b = ProcessLock::new(&path);
        let err = lock_b.acquire().unwrap_err();
        assert!(matches!(err, PoeError::Busy));

        drop(guard);
        let lock_c = ProcessLock::new(&path);
        assert!(lock_c.acquire().is_ok());
    }
}
