//! Repository interface and artifact resolution.
//!
//! A [`Repository`] supplies package definitions (the world contribution)
//! and concrete artifacts: for each fingerprint an [`ArtifactDescriptor`]
//! naming the archive, its checksum, size and optional detached signature,
//! plus a file-manifest sidecar used by the executor and by `reclaim`.
//!
//! Two implementations ship here: [`LocalRepository`] over a directory and
//! [`HttpRepository`] over HTTP(S). The [`ArtifactResolver`] consults an
//! ordered list of repositories, first hit wins.

mod error;
mod http;
mod local;
mod resolver;
mod retry;
mod types;
mod verify;

pub use error::{RepositoryError, Result};
pub use http::HttpRepository;
pub use local::LocalRepository;
pub use resolver::ArtifactResolver;
pub use retry::{RetryConfig, with_retry};
pub use types::{
    ArtifactDescriptor, ArtifactRecord, Checksum, ChecksumAlgo, Compression, IndexEntry,
    RepositoryIndex,
};
pub use verify::{VerifyPolicy, compute_checksum, verify_artifact};

use async_trait::async_trait;
use rondo_core::{FileManifest, Fingerprint, Package};
use std::path::{Path, PathBuf};

/// Index file name inside every repository.
pub const INDEX_FILE: &str = "repository.json";

/// Abstract contract the executor uses to obtain artifact bytes and
/// metadata.
#[async_trait]
pub trait Repository: Send + Sync + std::fmt::Debug {
    /// Repository name, for logs and errors.
    fn name(&self) -> &str;

    /// Consultation order; lower values win.
    fn priority(&self) -> u32;

    /// Every package definition this repository carries.
    fn packages(&self) -> Vec<Package>;

    /// The artifact descriptor for a fingerprint, if this repository
    /// supplies it.
    fn descriptor(&self, fingerprint: &Fingerprint) -> Option<ArtifactDescriptor>;

    /// The file-manifest sidecar for a fingerprint.
    fn manifest_of(&self, fingerprint: &Fingerprint) -> Option<FileManifest>;

    /// Base64 ed25519 verifying key for this repository's signatures.
    fn verify_key(&self) -> Option<&str>;

    /// Fetch the artifact into `dest_dir`; returns the downloaded path.
    async fn fetch(
        &self,
        descriptor: &ArtifactDescriptor,
        dest_dir: &Path,
    ) -> Result<PathBuf>;
}
