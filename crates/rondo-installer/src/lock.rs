//! Process-wide transaction lock.
//!
//! An advisory exclusive lock on a file under the target root. It serializes
//! the commit phase within a process and prevents two rondo processes from
//! mutating the same rootfs concurrently. Dropping the guard releases the
//! lock.

use crate::error::{InstallerError, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default acquisition timeout.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Held transaction lock; releases on drop.
#[derive(Debug)]
pub struct TransactionLock {
    path: PathBuf,
    // Keeps the advisory lock alive.
    _file: File,
}

impl TransactionLock {
    /// Acquire the lock, polling until `timeout`.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| InstallerError::io(parent, &e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| InstallerError::io(path, &e))?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(path = %path.display(), "transaction lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        _file: file,
                    });
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    if start.elapsed() > timeout {
                        return Err(InstallerError::Lock {
                            path: path.to_path_buf(),
                            message: format!("timed out after {timeout:?}"),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(InstallerError::Lock {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// The lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransactionLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "transaction lock released");
    }
}
