//! Checksum utilities for transferred content

use sha2::{Digest, Sha256};

/// SHA-256 of an in-memory buffer, lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
