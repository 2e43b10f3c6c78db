//! The target system: database plus rootfs.

use rondo_database::PackageDatabase;
use std::path::PathBuf;
use std::sync::Arc;

/// A system under management. The database is the sole authority on
/// installed state; the target is the root filesystem transactions mutate.
#[derive(Debug, Clone)]
pub struct System {
    /// The system package database.
    pub database: Arc<dyn PackageDatabase>,
    /// Target root filesystem.
    pub target: PathBuf,
}

impl System {
    /// Build a system handle.
    #[must_use]
    pub fn new(database: Arc<dyn PackageDatabase>, target: impl Into<PathBuf>) -> Self {
        Self {
            database,
            target: target.into(),
        }
    }

    /// Directory where fetched artifacts are cached, under the target root.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.target.join(".rondo-cache")
    }

    /// The transaction lock file under the target root.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.target.join(".rondo.lock")
    }
}
