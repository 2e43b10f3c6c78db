//! Transaction audit log.
//!
//! One JSON line per finished (or failed) transaction, appended under the
//! system database path. Audit failures never fail a transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Audit log file name inside the database directory.
pub const AUDIT_FILE: &str = "audit.log";

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the transaction finished.
    pub timestamp: DateTime<Utc>,
    /// Operation name (install, uninstall, upgrade, swap).
    pub operation: String,
    /// Step descriptions in execution order.
    pub steps: Vec<String>,
    /// Digest of the assertion set the plan came from.
    pub assertion_digest: String,
    /// Outcome: `ok`, `failed: <reason>` or `download-only`.
    pub outcome: String,
}

impl AuditRecord {
    /// Record for a finished transaction.
    #[must_use]
    pub fn new(
        operation: &str,
        steps: Vec<String>,
        assertion_digest: String,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            steps,
            assertion_digest,
            outcome: outcome.into(),
        }
    }
}

/// Append a record to the audit log; best-effort.
pub fn append(db_path: &Path, record: &AuditRecord) {
    let path = db_path.join(AUDIT_FILE);
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(file, "{line}")?;
        file.sync_all()
    })();

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "could not append audit record");
    }
}
