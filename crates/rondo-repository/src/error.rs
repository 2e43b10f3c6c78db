//! Repository error types.

use rondo_core::Fingerprint;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Network/HTTP error.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
        /// Whether retrying can help.
        retryable: bool,
    },

    /// Request timed out.
    #[error("timeout: {0}")]
    Timeout(String),

    /// I/O error with path context.
    #[error("i/o error at {path}: {message}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// No configured repository supplies the fingerprint.
    #[error("no repository provides an artifact for '{0}'")]
    NoArtifact(Fingerprint),

    /// Checksum mismatch.
    #[error("integrity error for '{fingerprint}': expected {expected}, got {actual}")]
    Integrity {
        /// The artifact's package.
        fingerprint: Fingerprint,
        /// Expected digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// Signature verification failed.
    #[error("signature error for '{fingerprint}': {message}")]
    SignatureInvalid {
        /// The artifact's package.
        fingerprint: Fingerprint,
        /// Error message.
        message: String,
    },

    /// Policy requires a signature and the artifact carries none.
    #[error("artifact '{0}' is unsigned but policy requires signatures")]
    SignatureMissing(Fingerprint),

    /// The repository index did not load or parse.
    #[error("invalid repository index at {location}: {message}")]
    InvalidIndex {
        /// Index location (path or URL).
        location: String,
        /// Error message.
        message: String,
    },

    /// A verifying key did not decode.
    #[error("invalid verifying key: {0}")]
    InvalidKey(String),

    /// Fetch was cancelled.
    #[error("fetch cancelled")]
    Cancelled,
}

impl RepositoryError {
    /// Network error without status context.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
            retryable: true,
        }
    }

    /// I/O error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Whether retrying the operation can help.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
            _ => false,
        }
    }

    /// Classify a reqwest error.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout(err.to_string());
        }
        if let Some(status) = err.status() {
            let code = status.as_u16();
            return Self::Network {
                message: err.to_string(),
                status: Some(code),
                retryable: matches!(code, 408 | 429 | 500 | 502 | 503 | 504),
            };
        }
        Self::Network {
            message: err.to_string(),
            status: None,
            retryable: err.is_connect() || err.is_request(),
        }
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest(&err)
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
