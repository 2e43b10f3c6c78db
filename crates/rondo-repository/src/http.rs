//! HTTP(S)-backed repository.

use crate::error::{RepositoryError, Result};
use crate::retry::{RetryConfig, with_retry};
use crate::types::{ArtifactDescriptor, RepositoryIndex};
use crate::{INDEX_FILE, Repository};
use async_trait::async_trait;
use futures_util::StreamExt;
use rondo_core::{FileManifest, Fingerprint, Package};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

/// A repository served over HTTP(S). The index is fetched once at open;
/// artifacts are streamed to disk on demand with retry.
#[derive(Debug)]
pub struct HttpRepository {
    base: Url,
    index: RepositoryIndex,
    priority: u32,
    verify_key: Option<String>,
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpRepository {
    /// Fetch the index from `base` and build the repository.
    pub async fn open(
        base: &str,
        priority: u32,
        verify_key: Option<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self> {
        let mut base = Url::parse(base).map_err(|e| RepositoryError::InvalidIndex {
            location: base.to_string(),
            message: e.to_string(),
        })?;
        // Url::join replaces the last segment unless the base ends in '/'.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RepositoryError::network(e.to_string()))?;

        let index_url = join_url(&base, INDEX_FILE)?;
        let index: RepositoryIndex = with_retry(&retry, || async {
            let response = client
                .get(index_url.clone())
                .send()
                .await?
                .error_for_status()?;
            let body = response.bytes().await?;
            serde_json::from_slice(&body).map_err(|e| RepositoryError::InvalidIndex {
                location: index_url.to_string(),
                message: e.to_string(),
            })
        })
        .await?;

        debug!(base = %base, name = index.name, packages = index.entries.len(), "opened http repository");

        Ok(Self {
            base,
            index,
            priority,
            verify_key,
            client,
            retry,
        })
    }
}

fn join_url(base: &Url, path: &str) -> Result<Url> {
    base.join(path).map_err(|e| RepositoryError::InvalidIndex {
        location: base.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl Repository for HttpRepository {
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
        let entry = self.index.entry(fingerprint)?;
        let url = join_url(&self.base, &entry.artifact.path).ok()?;
        Some(ArtifactDescriptor {
            fingerprint: fingerprint.clone(),
            url: url.to_string(),
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
        let url = Url::parse(&descriptor.url).map_err(|e| RepositoryError::InvalidIndex {
            location: descriptor.url.clone(),
            message: e.to_string(),
        })?;
        let file_name = url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| RepositoryError::NoArtifact(descriptor.fingerprint.clone()))?
            .to_string();
        let dest = dest_dir.join(file_name);

        with_retry(&self.retry, || async {
            // Stream into a temp sibling, rename once complete so partial
            // downloads never masquerade as artifacts.
            let tmp = dest.with_extension("part");
            let response = self
                .client
                .get(url.clone())
                .send()
                .await?
                .error_for_status()?;

            let mut file = tokio::fs::File::create(&tmp)
                .await
                .map_err(|e| RepositoryError::io(&tmp, &e))?;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(RepositoryError::from)?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| RepositoryError::io(&tmp, &e))?;
            }
            file.sync_all()
                .await
                .map_err(|e| RepositoryError::io(&tmp, &e))?;
            drop(file);

            tokio::fs::rename(&tmp, &dest)
                .await
                .map_err(|e| RepositoryError::io(&dest, &e))?;
            Ok(dest.clone())
        })
        .await
    }
}
