//! Core types for the Rondo package manager.
//!
//! This crate provides the foundational vocabulary shared by every other
//! Rondo crate:
//! - Package identity, fingerprints and file-ownership manifests
//! - The version grammar and version constraints
//! - Selectors (package patterns used in requires/conflicts/provides)
//! - Configuration types, loading and environment overrides
//! - The explicit [`Context`] value threaded through entry points

pub mod config;
mod context;
pub mod package;
pub mod selector;
pub mod version;

pub use config::{Config, ConfigError, GeneralConfig, RepositoryConfig, SolverConfig, SolverType, SystemConfig};
pub use context::Context;
pub use package::{FileEntry, FileManifest, Fingerprint, Package, PackageError};
pub use selector::{Selector, SelectorError};
pub use version::{Version, VersionConstraint, VersionError};

// Re-export commonly used types
pub use ahash::{AHashMap, AHashSet};
