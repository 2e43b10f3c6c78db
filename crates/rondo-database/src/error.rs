//! Database error types.

use rondo_core::{Fingerprint, PackageError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The fingerprint is not in the store.
    #[error("package '{0}' not found in database")]
    NotFound(Fingerprint),

    /// The definition violates a package model invariant.
    #[error("invalid package: {0}")]
    Invalid(#[from] PackageError),

    /// I/O failure with path context.
    #[error("database i/o error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A stored record did not parse.
    #[error("corrupt database record at {path}: {message}")]
    Corrupt {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

impl DatabaseError {
    /// I/O error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
