//! Content-addressed change detection for feed archives.

use bytes::Bytes;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hashes on the blocking pool; archives can be tens of megabytes.
#[tracing::instrument(skip_all, fields(bytes = bytes.len()))]
pub async fn digest_archive(bytes: Bytes) -> Result<String, tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || digest(&bytes)).await
}

pub fn has_changed(new_digest: &str, stored_digest: &str) -> bool {
    new_digest != stored_digest
}
