//! Stage phase: extract artifacts into per-step temp directories.

use crate::error::{InstallerError, Result};
use rondo_core::{FileEntry, FileManifest, Fingerprint};
use rondo_repository::Compression;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

/// An extracted artifact awaiting commit: the staged tree plus the
/// manifest computed from it.
#[derive(Debug)]
pub struct StagedArtifact {
    /// Package the stage belongs to.
    pub fingerprint: Fingerprint,
    /// Extracted tree; removed from disk on drop.
    pub dir: TempDir,
    /// Files found in the stage, with digests and modes.
    pub manifest: FileManifest,
}

/// Extract an archive into a fresh stage directory under the target root.
///
/// Staging under the target keeps the final rename within one filesystem.
pub fn stage_artifact(
    fingerprint: &Fingerprint,
    archive: &Path,
    compression: Compression,
    target: &Path,
) -> Result<StagedArtifact> {
    std::fs::create_dir_all(target).map_err(|e| InstallerError::io(target, &e))?;
    let dir = tempfile::Builder::new()
        .prefix(".rondo-stage-")
        .tempdir_in(target)
        .map_err(|e| InstallerError::io(target, &e))?;

    let file = File::open(archive).map_err(|e| InstallerError::io(archive, &e))?;
    let reader: Box<dyn Read> = match compression {
        Compression::Zstd => Box::new(
            zstd::stream::read::Decoder::new(file).map_err(|e| InstallerError::io(archive, &e))?,
        ),
        Compression::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        Compression::None => Box::new(file),
    };

    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.unpack(dir.path())
        .map_err(|e| InstallerError::io(archive, &e))?;

    let manifest = scan_stage(dir.path())?;
    debug!(
        fingerprint = %fingerprint,
        files = manifest.len(),
        "artifact staged"
    );

    Ok(StagedArtifact {
        fingerprint: fingerprint.clone(),
        dir,
        manifest,
    })
}

/// Walk a staged tree computing the file manifest: relative path, BLAKE3
/// digest, permission bits.
fn scan_stage(root: &Path) -> Result<FileManifest> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| InstallerError::Io {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .map_err(|e| InstallerError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
            .to_string_lossy()
            .replace('\\', "/");

        let digest = hash_file(path)?;
        let mode = file_mode(&entry);
        files.push(FileEntry {
            path: rel,
            digest,
            mode,
        });
    }
    Ok(FileManifest::new(files))
}

fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| InstallerError::io(path, &e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| InstallerError::io(path, &e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize().as_bytes()))
}

#[cfg(unix)]
fn file_mode(entry: &walkdir::DirEntry) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    entry
        .metadata()
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
fn file_mode(_entry: &walkdir::DirEntry) -> u32 {
    0o644
}
