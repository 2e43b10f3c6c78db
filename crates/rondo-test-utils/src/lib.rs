//! Shared fixtures and builders for integration tests.
//!
//! Provides a package builder over fingerprint strings and an on-disk
//! repository fixture that produces real artifacts (tar + zstd, BLAKE3
//! checksums, manifest sidecars) behind a `repository.json` index.

mod fixtures;
mod package;

pub use fixtures::{FixtureFile, RepositoryFixture, file};
pub use package::{PackageBuilder, package};
