//! Digest helpers for checksum endpoints

use sha1::{Digest, Sha1};

/// SHA-1 hex digest, the checksum format repository clients expect
pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
