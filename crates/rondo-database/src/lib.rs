//! Package databases.
//!
//! A [`PackageDatabase`] is an indexed store of package definitions plus,
//! for installed packages, the list of files each one owns. Two instances
//! coexist at runtime: the *world* (everything available from repositories)
//! and the *system* (what is currently installed). Both expose the same
//! read contract; only the system instance is mutated, and only by the
//! transaction executor.

mod error;
mod filesystem;
mod memory;

pub use error::{DatabaseError, Result};
pub use filesystem::FilesystemDatabase;
pub use memory::InMemoryDatabase;

use rondo_core::{FileManifest, Fingerprint, Package, Selector};

/// Store contract shared by every database implementation.
///
/// All methods take `&self`; implementations use interior mutability so a
/// database can be shared behind an `Arc`.
pub trait PackageDatabase: Send + Sync + std::fmt::Debug {
    /// Look up a package by fingerprint.
    fn get(&self, fingerprint: &Fingerprint) -> Option<Package>;

    /// All versions of `(category, name)`, sorted by version ascending.
    fn find_by_name(&self, category: &str, name: &str) -> Vec<Package>;

    /// Packages directly matching the selector, sorted by fingerprint.
    fn query(&self, selector: &Selector) -> Vec<Package>;

    /// Packages whose `provides` entries match the selector, sorted by
    /// fingerprint. Providers are not chained: only explicit entries count.
    fn providers_of(&self, selector: &Selector) -> Vec<Package>;

    /// Insert or replace a package definition. Definitions violating the
    /// package model invariants are rejected.
    fn create(&self, package: Package) -> Result<Fingerprint>;

    /// Remove a package and its file manifest.
    fn remove(&self, fingerprint: &Fingerprint) -> Result<()>;

    /// The file manifest recorded for an installed package.
    fn files_of(&self, fingerprint: &Fingerprint) -> Option<FileManifest>;

    /// Record the file manifest for an installed package.
    fn set_files(&self, fingerprint: &Fingerprint, manifest: FileManifest) -> Result<()>;

    /// Every package, sorted by fingerprint.
    fn all(&self) -> Vec<Package>;

    /// Whether the fingerprint is present.
    fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.get(fingerprint).is_some()
    }

    /// The installed package owning `path`, if any.
    fn owner_of(&self, path: &str) -> Option<Fingerprint>;

    /// Flag or clear the broken marker on a package left in an
    /// unrecoverable state by a failed transaction.
    fn mark_broken(&self, fingerprint: &Fingerprint, broken: bool) -> Result<()>;

    /// Fingerprints currently marked broken, sorted.
    fn broken(&self) -> Vec<Fingerprint>;

    /// Number of stored packages.
    fn len(&self) -> usize {
        self.all().len()
    }

    /// Whether the database is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Candidates for a selector: direct matches plus virtual providers,
/// deduplicated, sorted by fingerprint.
#[must_use]
pub fn candidates(db: &dyn PackageDatabase, selector: &Selector) -> Vec<Package> {
    let mut out = db.query(selector);
    for provider in db.providers_of(selector) {
        if !out
            .iter()
            .any(|p| p.fingerprint() == provider.fingerprint())
        {
            out.push(provider);
        }
    }
    out.sort_by_key(Package::fingerprint);
    out
}

/// A stored record: the package plus installation bookkeeping.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct Record {
    pub package: Package,
    #[serde(default)]
    pub files: FileManifest,
    #[serde(default)]
    pub broken: bool,
}

impl Record {
    pub(crate) fn new(package: Package) -> Self {
        Self {
            package,
            files: FileManifest::default(),
            broken: false,
        }
    }
}
