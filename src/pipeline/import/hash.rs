use std::path::Path;

use base64::Engine;
use sha2::{Digest, Sha256};

use crate::pipeline::IngestError;

/// SHA-256 of the bytes, URL-safe base64 so it can double as a file name.
pub fn hash_bytes(content: &[u8]) -> String {
    let hash = Sha256::digest(content);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// Compute the SHA-256 content hash of a file
pub fn compute_content_hash(path: &Path) -> Result<String, IngestError> {
    let content = std::fs::read(path).map_err(|e| IngestError::FileUnreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(hash_bytes(&content))
}
