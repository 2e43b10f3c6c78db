//! Solver and orderer error types.

use rondo_core::{Fingerprint, Selector};
use std::fmt;
use thiserror::Error;

/// One element of an unsatisfiable core: the package whose constraint could
/// not be honored (absent for request clauses) and the selector involved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CoreEntry {
    /// Package carrying the constraint, if any.
    pub package: Option<Fingerprint>,
    /// The selector that could not be satisfied (or that excludes a
    /// near-miss candidate).
    pub selector: Selector,
}

impl fmt::Display for CoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(fp) => write!(f, "{fp}: {}", self.selector),
            None => write!(f, "request: {}", self.selector),
        }
    }
}

/// Errors produced by compilation and solving.
#[derive(Debug, Error)]
pub enum SolverError {
    /// No assignment satisfies the hard clauses.
    #[error("unsatisfiable constraints: {}", format_core(core))]
    Unsatisfiable {
        /// Offending package/selector pairs for diagnosis.
        core: Vec<CoreEntry>,
    },

    /// A request selector matched nothing.
    #[error("no package matches '{selector}'")]
    UnknownPackage {
        /// The unmatched selector.
        selector: Selector,
    },

    /// The solve was cancelled at a safe boundary.
    #[error("solve interrupted")]
    Interrupted,
}

impl SolverError {
    /// Build an unsatisfiable error with a normalized (sorted, deduplicated)
    /// core.
    #[must_use]
    pub fn unsatisfiable(mut core: Vec<CoreEntry>) -> Self {
        core.sort();
        core.dedup();
        Self::Unsatisfiable { core }
    }
}

fn format_core(core: &[CoreEntry]) -> String {
    core.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors produced by assertion ordering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The dependency graph has a back-edge.
    #[error("dependency cycle detected: {}", cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> "))]
    Cycle {
        /// Packages participating in the cycle, sorted by fingerprint.
        cycle: Vec<Fingerprint>,
    },

    /// The requested root is not part of the assertion set.
    #[error("root '{0}' not found in assertion set")]
    RootNotFound(Fingerprint),
}
