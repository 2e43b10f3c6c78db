//! Artifact and index types.

use rondo_core::{FileManifest, Fingerprint, Package};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Checksum algorithm for artifact verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgo {
    /// BLAKE3, the native digest.
    #[default]
    Blake3,
    /// SHA-256, accepted for compatibility.
    Sha256,
}

/// An artifact checksum: algorithm plus hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Digest algorithm.
    pub algo: ChecksumAlgo,
    /// Hex-encoded digest.
    pub hex: String,
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algo = match self.algo {
            ChecksumAlgo::Blake3 => "blake3",
            ChecksumAlgo::Sha256 => "sha256",
        };
        write!(f, "{algo}:{}", self.hex)
    }
}

/// Archive compression of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Zstandard-compressed tar.
    #[default]
    Zstd,
    /// Gzip-compressed tar.
    Gzip,
    /// Plain tar.
    None,
}

/// Everything the executor needs to obtain and verify one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Package the artifact belongs to.
    pub fingerprint: Fingerprint,
    /// Location: a path relative to the repository root, or an absolute
    /// URL once resolved by an HTTP repository.
    pub url: String,
    /// Archive checksum.
    pub checksum: Checksum,
    /// Archive size in bytes.
    pub size: u64,
    /// Base64 ed25519 detached signature over the checksum hex bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Archive compression.
    #[serde(default)]
    pub compression: Compression,
}

/// The artifact portion of an index entry, relative to the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Archive path relative to the repository root.
    pub path: String,
    /// Archive checksum.
    pub checksum: Checksum,
    /// Archive size in bytes.
    pub size: u64,
    /// Base64 ed25519 detached signature over the checksum hex bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Archive compression.
    #[serde(default)]
    pub compression: Compression,
}

/// One package in a repository index: definition, artifact and the
/// file-manifest sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// The package definition.
    pub package: Package,
    /// Its artifact.
    pub artifact: ArtifactRecord,
    /// Files the artifact installs, with digests and modes.
    #[serde(default)]
    pub files: FileManifest,
}

/// The `repository.json` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// Repository name.
    pub name: String,
    /// Indexed packages.
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}

impl RepositoryIndex {
    /// Find the entry for a fingerprint.
    #[must_use]
    pub fn entry(&self, fingerprint: &Fingerprint) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .find(|e| e.package.fingerprint() == *fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rondo_core::Version;

    #[test]
    fn index_roundtrip() {
        let package = Package::new("apps", "foo", Version::parse("1.0").unwrap());
        let index = RepositoryIndex {
            name: "main".to_string(),
            entries: vec![IndexEntry {
                package: package.clone(),
                artifact: ArtifactRecord {
                    path: "apps/foo-1.0.tar.zst".to_string(),
                    checksum: Checksum {
                        algo: ChecksumAlgo::Blake3,
                        hex: "ab".repeat(32),
                    },
                    size: 1234,
                    signature: None,
                    compression: Compression::Zstd,
                },
                files: FileManifest::default(),
            }],
        };

        let json = serde_json::to_string_pretty(&index).unwrap();
        let back: RepositoryIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, index);
        assert!(back.entry(&package.fingerprint()).is_some());
    }
}
