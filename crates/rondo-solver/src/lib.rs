//! Dependency solver for Rondo.
//!
//! The pipeline in this crate:
//!
//! 1. [`compile`] lowers a user request plus the world and system databases
//!    into a propositional [`Formula`] over the relevance cone.
//! 2. [`solve`] finds a total assignment satisfying every hard clause,
//!    using the backend selected by [`SolverType`], and yields
//!    [`Assertions`] — one presence boolean per relevant package.
//! 3. [`Assertions::ensure_order`] linearizes the true-valued assertions
//!    into a safe installation order.

mod assertion;
mod compiler;
mod error;
mod solver;
mod types;

pub use assertion::{Assertion, Assertions};
pub use compiler::{Clause, Formula, VarId, compile};
pub use error::{CoreEntry, OrderError, SolverError};
pub use solver::{SolveOptions, solve};
pub use types::{Request, RequestOp, SolveResult, SolveStats};

pub use rondo_core::SolverType;
