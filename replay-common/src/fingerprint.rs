//! Content fingerprints for source audio
//!
//! A fingerprint is the leading 16 hex characters of the SHA-256 digest of
//! the file's bytes. It names copies of the source under `originals/` and
//! tags job records, so identical uploads share one copy on disk.

use crate::Result;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Hex characters kept from the digest
pub const FINGERPRINT_LEN: usize = 16;

/// Fingerprint a file by streaming its contents through SHA-256
pub fn file_fingerprint(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(truncate_digest(&hasher.finalize()))
}

/// Fingerprint an in-memory byte slice
pub fn bytes_fingerprint(bytes: &[u8]) -> String {
    truncate_digest(&Sha256::digest(bytes))
}

fn truncate_digest(digest: &[u8]) -> String {
    let mut hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex.truncate(FINGERPRINT_LEN);
    hex
}
