//! On-disk repository fixture.

use rondo_core::{FileEntry, FileManifest, Package};
use rondo_repository::{
    ArtifactRecord, Checksum, ChecksumAlgo, Compression, INDEX_FILE, IndexEntry, RepositoryIndex,
};
use std::fs::File;
use std::path::Path;
use tempfile::TempDir;

/// One file inside a fixture artifact.
#[derive(Debug, Clone)]
pub struct FixtureFile {
    /// Path relative to the install root.
    pub path: String,
    /// File content.
    pub content: Vec<u8>,
    /// Unix permission bits.
    pub mode: u32,
}

/// A regular file with default permissions.
#[must_use]
pub fn file(path: &str, content: &[u8]) -> FixtureFile {
    FixtureFile {
        path: path.to_string(),
        content: content.to_vec(),
        mode: 0o644,
    }
}

/// A repository directory with real artifacts, built package by package.
///
/// # Panics
/// All methods panic on I/O failure; fixtures run inside tests.
#[derive(Debug)]
pub struct RepositoryFixture {
    dir: TempDir,
    index: RepositoryIndex,
}

impl RepositoryFixture {
    /// Start an empty repository with the given name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            dir: TempDir::new().expect("fixture tempdir"),
            index: RepositoryIndex {
                name: name.to_string(),
                entries: Vec::new(),
            },
        }
    }

    /// Add a package with the given payload files. The artifact is a
    /// zstd-compressed tar with a BLAKE3 checksum.
    #[must_use]
    pub fn add(mut self, package: Package, files: &[FixtureFile]) -> Self {
        let artifact_name = format!(
            "{}.tar.zst",
            package.fingerprint().as_str().replace('/', "__")
        );
        let artifact_path = self.dir.path().join(&artifact_name);
        write_artifact(&artifact_path, files);

        let size = std::fs::metadata(&artifact_path)
            .expect("artifact metadata")
            .len();
        let checksum = Checksum {
            algo: ChecksumAlgo::Blake3,
            hex: hash_file(&artifact_path),
        };
        let manifest = FileManifest::new(
            files
                .iter()
                .map(|f| FileEntry {
                    path: f.path.clone(),
                    digest: hex::encode(blake3::hash(&f.content).as_bytes()),
                    mode: f.mode,
                })
                .collect(),
        );

        self.index.entries.push(IndexEntry {
            package,
            artifact: ArtifactRecord {
                path: artifact_name,
                checksum,
                size,
                signature: None,
                compression: Compression::Zstd,
            },
            files: manifest,
        });
        self
    }

    /// Write `repository.json` and hand back the directory (kept alive by
    /// the returned guard).
    #[must_use]
    pub fn write(self) -> TempDir {
        let index_path = self.dir.path().join(INDEX_FILE);
        std::fs::write(
            index_path,
            serde_json::to_vec_pretty(&self.index).expect("serialize index"),
        )
        .expect("write index");
        self.dir
    }
}

fn write_artifact(path: &Path, files: &[FixtureFile]) {
    let file = File::create(path).expect("create artifact");
    let encoder = zstd::stream::write::Encoder::new(file, 0).expect("zstd encoder");
    let mut builder = tar::Builder::new(encoder);

    for fixture in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(fixture.content.len() as u64);
        header.set_mode(fixture.mode);
        header.set_cksum();
        builder
            .append_data(&mut header, &fixture.path, fixture.content.as_slice())
            .expect("append artifact entry");
    }

    let encoder = builder.into_inner().expect("finish tar");
    encoder.finish().expect("finish zstd");
}

fn hash_file(path: &Path) -> String {
    let bytes = std::fs::read(path).expect("read artifact");
    hex::encode(blake3::hash(&bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package;
    use rondo_repository::{LocalRepository, Repository};

    #[test]
    fn fixture_repository_is_loadable() {
        let repo_dir = RepositoryFixture::new("fixture")
            .add(
                package("apps/hello-1.0").build(),
                &[file("usr/bin/hello", b"#!/bin/sh\necho hello\n")],
            )
            .write();

        let repo = LocalRepository::open(repo_dir.path(), 0, None).unwrap();
        assert_eq!(repo.name(), "fixture");
        assert_eq!(repo.packages().len(), 1);

        let fp = rondo_core::Fingerprint::new("apps/hello-1.0");
        let descriptor = repo.descriptor(&fp).unwrap();
        assert!(descriptor.size > 0);
        assert_eq!(repo.manifest_of(&fp).unwrap().len(), 1);
    }
}
