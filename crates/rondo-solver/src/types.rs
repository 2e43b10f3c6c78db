//! Request and result types shared across solver backends.

use crate::assertion::Assertions;
use rondo_core::Selector;
use std::time::Duration;

/// Desired state for one request entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOp {
    /// The selector must resolve to an installed package in the final state.
    Install,
    /// No package matching the selector may remain installed.
    Uninstall,
}

/// A user request: selectors paired with the desired state.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Request entries in user order.
    pub entries: Vec<(Selector, RequestOp)>,
}

impl Request {
    /// An empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an install entry.
    #[must_use]
    pub fn install(mut self, selector: Selector) -> Self {
        self.entries.push((selector, RequestOp::Install));
        self
    }

    /// Add an uninstall entry.
    #[must_use]
    pub fn uninstall(mut self, selector: Selector) -> Self {
        self.entries.push((selector, RequestOp::Uninstall));
        self
    }

    /// Whether the request has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Diagnostics produced by a solve.
#[derive(Debug, Clone, Default)]
pub struct SolveStats {
    /// Branch decisions taken (QLearning: episodes played).
    pub attempts: u64,
    /// Conflicts that forced backtracking.
    pub backtracks: u64,
    /// Variables in the formula.
    pub variables: usize,
    /// Clauses in the formula.
    pub clauses: usize,
    /// Wall-clock time of the solve.
    pub duration: Duration,
}

/// A successful solve: a total assignment over the relevance cone plus
/// diagnostics.
#[derive(Debug, Clone)]
pub struct SolveResult {
    /// One assertion per package in the cone.
    pub assertions: Assertions,
    /// Solve diagnostics.
    pub stats: SolveStats,
}
