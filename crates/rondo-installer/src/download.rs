//! Download phase: parallel fetch and verification.
//!
//! Every artifact is fetched into the cache and verified (checksum, and
//! signature when policy requires) before the transaction touches the
//! rootfs. A single failure aborts the whole phase with no side effects
//! beyond cache files.

use crate::error::{InstallerError, Result};
use crate::options::InstallerOptions;
use crate::plan::Step;
use ahash::AHashMap;
use futures_util::stream::{self, StreamExt};
use rondo_core::{Context, Fingerprint};
use rondo_repository::{
    ArtifactDescriptor, ArtifactResolver, Repository, VerifyPolicy, verify_artifact,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A fetched, verified artifact ready for staging.
#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    /// The bound descriptor.
    pub descriptor: ArtifactDescriptor,
    /// Local path of the verified archive.
    pub path: PathBuf,
}

/// Fetch and verify the artifacts for every step that installs something.
///
/// Fan-out is bounded by `options.concurrency`; each fetch already retries
/// transient failures internally.
pub async fn download_all(
    ctx: &Context,
    resolver: &ArtifactResolver,
    steps: &[Step],
    options: &InstallerOptions,
    cache_dir: &Path,
) -> Result<AHashMap<Fingerprint, DownloadedArtifact>> {
    let targets: Vec<Fingerprint> = steps
        .iter()
        .filter_map(Step::target)
        .map(rondo_core::Package::fingerprint)
        .collect();
    if targets.is_empty() {
        return Ok(AHashMap::new());
    }

    std::fs::create_dir_all(cache_dir).map_err(|e| InstallerError::io(cache_dir, &e))?;

    // Bind all descriptors up front; a missing artifact fails the plan
    // before a single byte moves.
    let mut bound: Vec<(ArtifactDescriptor, Arc<dyn Repository>)> =
        Vec::with_capacity(targets.len());
    for fingerprint in &targets {
        bound.push(resolver.resolve(fingerprint)?);
    }

    info!(artifacts = bound.len(), "download phase starting");

    let policy = if options.check_signatures {
        VerifyPolicy::ChecksumAndSignature
    } else {
        VerifyPolicy::Checksum
    };

    let results: Vec<Result<DownloadedArtifact>> = stream::iter(bound)
        .map(|(descriptor, repository)| {
            let cache_dir = cache_dir.to_path_buf();
            let ctx = ctx.clone();
            async move {
                if ctx.is_cancelled() {
                    return Err(InstallerError::Interrupted);
                }
                let path = repository.fetch(&descriptor, &cache_dir).await?;
                verify_artifact(&path, &descriptor, repository.verify_key(), policy)?;
                debug!(fingerprint = %descriptor.fingerprint, "artifact ready");
                Ok(DownloadedArtifact { descriptor, path })
            }
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    let mut artifacts = AHashMap::with_capacity(results.len());
    for result in results {
        let artifact = result?;
        artifacts.insert(artifact.descriptor.fingerprint.clone(), artifact);
    }

    info!(artifacts = artifacts.len(), "download phase complete");
    Ok(artifacts)
}
