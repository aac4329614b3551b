//! Advisory lock shared with the inventory agent
//!
//! Held only while interfaces are being torn down, rewritten and brought
//! back up. The lock goes away with the guard, on error paths too.

use crate::config::LockSettings;
use crate::error::{Error, Result};
use log::{error, info};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;

/// Held exclusive lock; released on drop
pub struct LockGuard {
    path: PathBuf,
    _lock: Flock<File>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        info!("Releasing lock '{}'", self.path.display());
    }
}

/// Take the lock, retrying on contention
pub fn acquire(path: &Path, settings: &LockSettings) -> Result<LockGuard> {
    info!("Acquiring lock to synchronize with sysinv-agent audit");

    let lock_error = |message: String| Error::Lock {
        path: path.to_path_buf(),
        message,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| lock_error(e.to_string()))?;

    for attempt in 1..=settings.attempts {
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                info!("Successfully acquired lock '{}'", path.display());
                return Ok(LockGuard {
                    path: path.to_path_buf(),
                    _lock: lock,
                });
            }
            Err((returned, Errno::EWOULDBLOCK)) => {
                info!(
                    "Could not acquire lock '{}' ({}/{}), will retry",
                    path.display(),
                    attempt,
                    settings.attempts
                );
                file = returned;
                if attempt < settings.attempts {
                    thread::sleep(settings.interval());
                }
            }
            Err((_, errno)) => return Err(lock_error(errno.to_string())),
        }
    }

    error!("Failed to acquire lock '{}'. Stopped trying.", path.display());
    Err(Error::LockExhausted {
        path: path.to_path_buf(),
        attempts: settings.attempts,
    })
}
