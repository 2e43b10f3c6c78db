//! Artifact verification: checksums and detached signatures.
//!
//! Checksums are computed by streaming the archive through the configured
//! digest. Signatures are ed25519 over the checksum hex bytes, so large
//! artifacts never need to be buffered for verification.

use crate::error::{RepositoryError, Result};
use crate::types::{ArtifactDescriptor, Checksum, ChecksumAlgo};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// How strictly to verify fetched artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyPolicy {
    /// Checksum only.
    #[default]
    Checksum,
    /// Checksum plus a mandatory valid signature.
    ChecksumAndSignature,
}

/// Compute the checksum of a file with the given algorithm, streaming.
pub fn compute_checksum(path: &Path, algo: ChecksumAlgo) -> Result<Checksum> {
    let mut file = File::open(path).map_err(|e| RepositoryError::io(path, &e))?;
    let mut buf = [0u8; 64 * 1024];

    let hex = match algo {
        ChecksumAlgo::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            loop {
                let n = file.read(&mut buf).map_err(|e| RepositoryError::io(path, &e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            hex::encode(hasher.finalize().as_bytes())
        }
        ChecksumAlgo::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let n = file.read(&mut buf).map_err(|e| RepositoryError::io(path, &e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
            hex::encode(hasher.finalize())
        }
    };

    Ok(Checksum { algo, hex })
}

/// Decode a base64 ed25519 verifying key.
pub fn decode_key(key: &str) -> Result<VerifyingKey> {
    let bytes = BASE64
        .decode(key)
        .map_err(|e| RepositoryError::InvalidKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| RepositoryError::InvalidKey("key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| RepositoryError::InvalidKey(e.to_string()))
}

/// Verify a downloaded artifact against its descriptor before any
/// filesystem change: checksum always, signature when the policy says so.
pub fn verify_artifact(
    path: &Path,
    descriptor: &ArtifactDescriptor,
    key: Option<&str>,
    policy: VerifyPolicy,
) -> Result<()> {
    let computed = compute_checksum(path, descriptor.checksum.algo)?;
    if computed.hex != descriptor.checksum.hex {
        return Err(RepositoryError::Integrity {
            fingerprint: descriptor.fingerprint.clone(),
            expected: descriptor.checksum.to_string(),
            actual: computed.to_string(),
        });
    }

    if policy == VerifyPolicy::ChecksumAndSignature {
        let signature = descriptor
            .signature
            .as_deref()
            .ok_or_else(|| RepositoryError::SignatureMissing(descriptor.fingerprint.clone()))?;
        let key = key
            .ok_or_else(|| RepositoryError::SignatureInvalid {
                fingerprint: descriptor.fingerprint.clone(),
                message: "repository has no verifying key".to_string(),
            })
            .and_then(decode_key)?;

        let sig_bytes = BASE64
            .decode(signature)
            .map_err(|e| RepositoryError::SignatureInvalid {
                fingerprint: descriptor.fingerprint.clone(),
                message: e.to_string(),
            })?;
        let signature = Signature::from_slice(&sig_bytes).map_err(|e| {
            RepositoryError::SignatureInvalid {
                fingerprint: descriptor.fingerprint.clone(),
                message: e.to_string(),
            }
        })?;

        key.verify(descriptor.checksum.hex.as_bytes(), &signature)
            .map_err(|e| RepositoryError::SignatureInvalid {
                fingerprint: descriptor.fingerprint.clone(),
                message: e.to_string(),
            })?;
    }

    debug!(fingerprint = %descriptor.fingerprint, "artifact verified");
    Ok(())
}
