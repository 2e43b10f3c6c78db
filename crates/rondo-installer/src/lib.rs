//! Transaction executor.
//!
//! Turns solver assertions into filesystem reality. Every transaction runs
//! the same pipeline:
//!
//! 1. **Plan** — solve, order, diff against the system database into steps.
//! 2. **Download** — fetch and verify every artifact before any rootfs
//!    change; a single failure aborts with no mutation.
//! 3. **Stage** — extract each artifact into a per-step temp directory
//!    under the target root.
//! 4. **Commit** — apply steps serially under the process-wide transaction
//!    lock, honoring config-protect, updating the system database inside
//!    each step's durability boundary, unwinding on failure.
//! 5. **Finalize** — release the lock and append an audit record.

mod audit;
mod commit;
mod download;
mod error;
mod installer;
mod lock;
mod options;
mod plan;
mod protect;
mod stage;
mod system;

pub use audit::AuditRecord;
pub use commit::CommitOutcome;
pub use download::DownloadedArtifact;
pub use error::{InstallerError, Result};
pub use installer::{Installer, TransactionSummary};
pub use lock::TransactionLock;
pub use options::InstallerOptions;
pub use plan::{Operation, Step, TransactionPlan, plan};
pub use protect::ConfigProtect;
pub use stage::{StagedArtifact, stage_artifact};
pub use system::System;
