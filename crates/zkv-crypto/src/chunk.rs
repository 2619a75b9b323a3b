//! Per-chunk AES-256-GCM sealing
//!
//! Stored chunk format (binary):
//! ```text
//! [12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! No associated data is bound. Chunk position is pinned by the file hash,
//! which chains every chunk hash in index order.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zkv_core::{ZkvError, ZkvResult};

use crate::integrity::chunk_hash;
use crate::keys::FileKey;
use crate::{NONCE_SIZE, TAG_SIZE};

/// One encrypted chunk ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedChunk {
    pub index: u32,
    /// `nonce || ciphertext || tag`
    pub bytes: Vec<u8>,
    /// base64(SHA-256(bytes))
    pub hash: String,
}

/// Encrypt one chunk under a fresh random nonce.
///
/// Returns `[12-byte nonce][ciphertext][16-byte tag]`.
pub fn encrypt_chunk(file_key: &FileKey, chunk_index: u32, plaintext: &[u8]) -> ZkvResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(file_key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher.encrypt(nonce, plaintext).map_err(|e| {
        ZkvError::Other(anyhow::anyhow!(
            "chunk {chunk_index} encryption failed: {e}"
        ))
    })?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt one stored chunk. A wrong key or any modification of nonce,
/// ciphertext or tag is an integrity error. `chunk_index` only labels errors.
pub fn decrypt_chunk(file_key: &FileKey, chunk_index: u32, stored: &[u8]) -> ZkvResult<Vec<u8>> {
    if stored.len() < NONCE_SIZE + TAG_SIZE {
        return Err(ZkvError::integrity(format!(
            "chunk {chunk_index} too short: {} bytes (minimum {})",
            stored.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }

    let (nonce_bytes, ciphertext) = stored.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(file_key.as_bytes().into());

    cipher.decrypt(nonce, ciphertext).map_err(|_| {
        ZkvError::integrity(format!(
            "chunk {chunk_index} failed authentication (wrong key or tampered data)"
        ))
    })
}

/// Encrypt and hash one chunk.
pub fn seal_chunk(file_key: &FileKey, chunk_index: u32, plaintext: &[u8]) -> ZkvResult<SealedChunk> {
    let bytes = encrypt_chunk(file_key, chunk_index, plaintext)?;
    let hash = chunk_hash(&bytes);
    Ok(SealedChunk {
        index: chunk_index,
        bytes,
        hash,
    })
}
