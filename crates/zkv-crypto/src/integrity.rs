//! SHA-256 hash chain binding stored chunks to their upload
//!
//! `H_i = base64(SHA-256(nonce || ciphertext))` for each stored chunk and
//! `H_file = base64(SHA-256(H_0 || H_1 || ...))` over the base64 strings
//! in chunk order. All comparisons are constant time.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zkv_core::{ZkvError, ZkvResult};

/// `base64(SHA-256(stored))`
pub fn chunk_hash(stored: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(stored))
}

/// `base64(SHA-256(concat(chunk_hashes)))`
pub fn file_hash<S: AsRef<str>>(chunk_hashes: &[S]) -> String {
    let mut hasher = Sha256::new();
    for h in chunk_hashes {
        hasher.update(h.as_ref().as_bytes());
    }
    STANDARD.encode(hasher.finalize())
}

/// Constant-time string equality (length is not secret).
pub fn hashes_match(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

/// Recompute `H_i` from received bytes and compare with the claimed hash.
pub fn verify_chunk(stored: &[u8], expected: &str) -> ZkvResult<()> {
    let actual = chunk_hash(stored);
    if !hashes_match(&actual, expected) {
        tracing::warn!(size = stored.len(), "chunk hash mismatch");
        return Err(ZkvError::integrity("chunk hash mismatch"));
    }
    Ok(())
}

/// Recompute `H_file` from verified chunk hashes and compare with the claim.
pub fn verify_file_hash<S: AsRef<str>>(chunk_hashes: &[S], expected: &str) -> ZkvResult<()> {
    let actual = file_hash(chunk_hashes);
    if !hashes_match(&actual, expected) {
        tracing::warn!(chunks = chunk_hashes.len(), "file hash mismatch");
        return Err(ZkvError::integrity("file hash mismatch"));
    }
    Ok(())
}
