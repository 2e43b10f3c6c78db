//! Artifact resolver: binds fingerprints to descriptors across an ordered
//! repository list.

use crate::Repository;
use crate::error::{RepositoryError, Result};
use crate::types::ArtifactDescriptor;
use rondo_core::{FileManifest, Fingerprint};
use rondo_database::{InMemoryDatabase, PackageDatabase};
use std::sync::Arc;
use tracing::debug;

/// Consults repositories in priority order; the first one supplying a
/// fingerprint wins.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    repositories: Vec<Arc<dyn Repository>>,
}

impl ArtifactResolver {
    /// Build a resolver over the given repositories, sorted by priority
    /// then name for a stable consultation order.
    #[must_use]
    pub fn new(mut repositories: Vec<Arc<dyn Repository>>) -> Self {
        repositories.sort_by_key(|r| (r.priority(), r.name().to_string()));
        Self { repositories }
    }

    /// The repositories in consultation order.
    #[must_use]
    pub fn repositories(&self) -> &[Arc<dyn Repository>] {
        &self.repositories
    }

    /// Bind a fingerprint to a descriptor plus the repository that supplied
    /// it. [`RepositoryError::NoArtifact`] when nothing does.
    pub fn resolve(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<(ArtifactDescriptor, Arc<dyn Repository>)> {
        for repository in &self.repositories {
            if let Some(descriptor) = repository.descriptor(fingerprint) {
                debug!(
                    fingerprint = %fingerprint,
                    repository = repository.name(),
                    "artifact resolved"
                );
                return Ok((descriptor, Arc::clone(repository)));
            }
        }
        Err(RepositoryError::NoArtifact(fingerprint.clone()))
    }

    /// The file-manifest sidecar for a fingerprint, first repository wins.
    #[must_use]
    pub fn manifest_of(&self, fingerprint: &Fingerprint) -> Option<FileManifest> {
        self.repositories
            .iter()
            .find_map(|r| r.manifest_of(fingerprint))
    }

    /// Merge every repository's package definitions into a world database.
    /// Earlier repositories win on duplicate fingerprints.
    pub fn world(&self) -> rondo_database::Result<InMemoryDatabase> {
        let db = InMemoryDatabase::new();
        for repository in &self.repositories {
            for package in repository.packages() {
                if !db.contains(&package.fingerprint()) {
                    db.create(package)?;
                }
            }
        }
        Ok(db)
    }
}
