//! Directory-backed repository.

use crate::error::{RepositoryError, Result};
use crate::types::{ArtifactDescriptor, RepositoryIndex};
use crate::{INDEX_FILE, Repository};
use async_trait::async_trait;
use rondo_core::{FileManifest, Fingerprint, Package};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A repository rooted at a local directory: artifacts are plain files and
/// the index is `repository.json` at the root.
#[derive(Debug)]
pub struct LocalRepository {
    root: PathBuf,
    index: RepositoryIndex,
    priority: u32,
    verify_key: Option<String>,
}

impl LocalRepository {
    /// Open a repository directory and load its index.
    pub fn open(root: impl Into<PathBuf>, priority: u32, verify_key: Option<String>) -> Result<Self> {
        let root = root.into();
        let index_path = root.join(INDEX_FILE);
        let raw = std::fs::read(&index_path).map_err(|e| RepositoryError::InvalidIndex {
            location: index_path.display().to_string(),
            message: e.to_string(),
        })?;
        let index: RepositoryIndex =
            serde_json::from_slice(&raw).map_err(|e| RepositoryError::InvalidIndex {
                location: index_path.display().to_string(),
                message: e.to_string(),
            })?;

        debug!(
            root = %root.display(),
            name = index.name,
            packages = index.entries.len(),
            "opened local repository"
        );

        Ok(Self {
            root,
            index,
            priority,
            verify_key,
        })
    }

    /// The repository directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn name(&self) -> &str {
        &self.index.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn packages(&self) -> Vec<Package> {
        self.index.entries.iter().map(|e| e.package.clone()).collect()
    }

    fn descriptor(&self, fingerprint: &Fingerprint) -> Option<ArtifactDescriptor> {
        self.index.entry(fingerprint).map(|entry| ArtifactDescriptor {
            fingerprint: fingerprint.clone(),
            url: self.root.join(&entry.artifact.path).display().to_string(),
            checksum: entry.artifact.checksum.clone(),
            size: entry.artifact.size,
            signature: entry.artifact.signature.clone(),
            compression: entry.artifact.compression,
        })
    }

    fn manifest_of(&self, fingerprint: &Fingerprint) -> Option<FileManifest> {
        self.index
            .entry(fingerprint)
            .map(|e| e.files.clone())
            .filter(|m| !m.is_empty())
    }

    fn verify_key(&self) -> Option<&str> {
        self.verify_key.as_deref()
    }

    async fn fetch(
        &self,
        descriptor: &ArtifactDescriptor,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let source = PathBuf::from(&descriptor.url);
        let file_name = source
            .file_name()
            .ok_or_else(|| RepositoryError::NoArtifact(descriptor.fingerprint.clone()))?;
        let dest = dest_dir.join(file_name);
        tokio::fs::copy(&source, &dest)
            .await
            .map_err(|e| RepositoryError::io(&source, &e))?;
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArtifactRecord, Checksum, ChecksumAlgo, Compression, IndexEntry};
    use rondo_core::Version;

    fn write_fixture(dir: &Path) {
        let package = Package::new("apps", "foo", Version::parse("1.0").unwrap());
        std::fs::write(dir.join("foo-1.0.tar"), b"tar bytes").unwrap();
        let index = RepositoryIndex {
            name: "fixture".to_string(),
            entries: vec![IndexEntry {
                package,
                artifact: ArtifactRecord {
                    path: "foo-1.0.tar".to_string(),
                    checksum: Checksum {
                        algo: ChecksumAlgo::Blake3,
                        hex: "00".repeat(32),
                    },
                    size: 9,
                    signature: None,
                    compression: Compression::None,
                },
                files: FileManifest::default(),
            }],
        };
        std::fs::write(
            dir.join(INDEX_FILE),
            serde_json::to_vec_pretty(&index).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn opens_and_fetches() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path());

        let repo = LocalRepository::open(dir.path(), 0, None).unwrap();
        assert_eq!(repo.name(), "fixture");
        assert_eq!(repo.packages().len(), 1);

        let fp = Fingerprint::new("apps/foo-1.0");
        let descriptor = repo.descriptor(&fp).unwrap();
        assert_eq!(descriptor.size, 9);

        let dest = tempfile::tempdir().unwrap();
        let fetched = repo.fetch(&descriptor, dest.path()).await.unwrap();
        assert_eq!(std::fs::read(fetched).unwrap(), b"tar bytes");
    }

    #[test]
    fn missing_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalRepository::open(dir.path(), 0, None).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidIndex { .. }));
    }
}
