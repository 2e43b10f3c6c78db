//! Executor error taxonomy.

use rondo_core::Fingerprint;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the transaction executor.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Planning failed in the solver (includes unsatisfiable constraints
    /// and unknown packages).
    #[error(transparent)]
    Solver(#[from] rondo_solver::SolverError),

    /// Ordering failed (dependency cycle).
    #[error(transparent)]
    Order(#[from] rondo_solver::OrderError),

    /// Repository or artifact failure (missing artifact, integrity,
    /// network).
    #[error(transparent)]
    Repository(#[from] rondo_repository::RepositoryError),

    /// System database failure.
    #[error(transparent)]
    Database(#[from] rondo_database::DatabaseError),

    /// Two packages claim the same path.
    #[error("file conflict on '{path}': owned by '{owner}', claimed by '{newowner}'")]
    FileConflict {
        /// Conflicting path, relative to the target root.
        path: String,
        /// Current owner.
        owner: Fingerprint,
        /// Package attempting to claim the path.
        newowner: Fingerprint,
    },

    /// Removal blocked by the essential-data guard.
    #[error("'{0}' is marked essential and cannot be removed")]
    EssentialProtected(Fingerprint),

    /// A removal would leave installed packages with unsatisfiable
    /// requirements.
    #[error("removal would break installed packages: {}", victims.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    RequiresBroken {
        /// Installed packages that would lose a requirement.
        victims: Vec<Fingerprint>,
    },

    /// Cancelled by the user or OS at a safe boundary.
    #[error("transaction interrupted")]
    Interrupted,

    /// A package was left in an unrecoverable state; recorded in the
    /// system database.
    #[error("package '{fingerprint}' left broken: {message}")]
    Broken {
        /// Affected package.
        fingerprint: Fingerprint,
        /// What went wrong.
        message: String,
    },

    /// The transaction lock could not be acquired.
    #[error("cannot acquire transaction lock at {path}: {message}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Filesystem failure with path context.
    #[error("i/o error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

impl InstallerError {
    /// I/O error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Process exit code for this error per the CLI contract: 2 for
    /// unsatisfiable constraints, 3 for I/O and locking, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Solver(rondo_solver::SolverError::Unsatisfiable { .. }) => 2,
            Self::Io { .. } | Self::Lock { .. } | Self::Database(_) => 3,
            _ => 1,
        }
    }
}

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, InstallerError>;
