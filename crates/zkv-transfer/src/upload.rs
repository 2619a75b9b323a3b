//! Client half of an upload: split, encrypt and hash a file into a bundle
//!
//! The bundle is everything the server needs to store and later prove the
//! integrity of the file. The key is returned separately and never goes into
//! the bundle.

use rayon::prelude::*;
use tracing::{debug, info};
use zkv_core::types::FileMetadata;
use zkv_core::{ZkvError, ZkvResult};
use zkv_crypto::{
    file_hash, generate_file_key, seal_chunk, verify_chunk, verify_file_hash, FileKey,
    SealedChunk, NONCE_SIZE, TAG_SIZE,
};

use crate::stage::UploadStage;

/// Bytes each stored chunk carries beyond its plaintext.
pub const SEAL_OVERHEAD: u64 = (NONCE_SIZE + TAG_SIZE) as u64;

/// One encrypted chunk and its position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPayload {
    pub index: u32,
    /// `nonce || ciphertext || tag`
    pub bytes: Vec<u8>,
}

/// An upload submission: metadata, hashes, and the sealed chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadBundle {
    pub metadata: FileMetadata,
    pub file_hash: String,
    /// `H_i` in index order
    pub chunk_hashes: Vec<String>,
    pub chunks: Vec<ChunkPayload>,
}

impl UploadBundle {
    pub fn stored_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.bytes.len() as u64).sum()
    }
}

/// A bundle plus the key that opens it.
#[derive(Debug)]
pub struct PreparedUpload {
    pub bundle: UploadBundle,
    pub key: FileKey,
}

/// Split `data` into `chunk_count` pieces and seal each under a fresh key.
///
/// Chunks are sealed in parallel; the result is ordered by index.
pub fn prepare_upload(
    filename: &str,
    mime: &str,
    data: &[u8],
    chunk_count: usize,
) -> ZkvResult<PreparedUpload> {
    debug!(stage = %UploadStage::Splitting, filename, size = data.len(), chunk_count);
    let pieces = zkv_chunks::split(data, chunk_count)?;
    let key = generate_file_key();

    debug!(stage = %UploadStage::Encrypting, chunks = pieces.len());
    let sealed: Vec<SealedChunk> = pieces
        .par_iter()
        .enumerate()
        .map(|(i, piece)| seal_chunk(&key, chunk_index(i)?, piece))
        .collect::<ZkvResult<Vec<_>>>()?;

    debug!(stage = %UploadStage::Hashing, chunks = sealed.len());
    let chunk_hashes: Vec<String> = sealed.iter().map(|c| c.hash.clone()).collect();
    let file_hash = file_hash(&chunk_hashes);
    let chunks = sealed
        .into_iter()
        .map(|c| ChunkPayload {
            index: c.index,
            bytes: c.bytes,
        })
        .collect();

    info!(filename, size = data.len(), chunks = chunk_hashes.len(), "upload prepared");

    Ok(PreparedUpload {
        bundle: UploadBundle {
            metadata: FileMetadata {
                filename: filename.to_string(),
                size: data.len() as u64,
                mime: mime.to_string(),
            },
            file_hash,
            chunk_hashes,
            chunks,
        },
        key,
    })
}

/// Receipt-side checks on a submitted bundle.
///
/// The chunk set must be exactly indices `0..k` (in any order), every chunk
/// must hash to its claimed `H_i`, the claimed hashes must chain to the file
/// hash, and the declared size must match the sealed sizes.
pub fn verify_bundle(bundle: &UploadBundle) -> ZkvResult<()> {
    let k = bundle.chunk_hashes.len();
    if bundle.chunks.len() != k {
        return Err(ZkvError::protocol(format!(
            "{} chunk parts for {k} chunk hashes",
            bundle.chunks.len()
        )));
    }

    let mut seen = vec![false; k];
    for chunk in &bundle.chunks {
        let i = chunk.index as usize;
        if i >= k || seen[i] {
            return Err(ZkvError::protocol(format!(
                "chunk index {} missing, duplicated or out of range",
                chunk.index
            )));
        }
        seen[i] = true;
    }

    if bundle.metadata.filename.is_empty() {
        return Err(ZkvError::protocol("empty filename"));
    }
    let plaintext: u64 = bundle
        .chunks
        .iter()
        .map(|c| (c.bytes.len() as u64).saturating_sub(SEAL_OVERHEAD))
        .sum();
    if plaintext != bundle.metadata.size {
        return Err(ZkvError::protocol(format!(
            "declared size {} does not match sealed chunks ({plaintext})",
            bundle.metadata.size
        )));
    }

    for chunk in &bundle.chunks {
        verify_chunk(&chunk.bytes, &bundle.chunk_hashes[chunk.index as usize]).map_err(|_| {
            ZkvError::integrity(format!("chunk {} does not match its hash", chunk.index))
        })?;
    }
    verify_file_hash(&bundle.chunk_hashes, &bundle.file_hash)
}

pub(crate) fn chunk_index(i: usize) -> ZkvResult<u32> {
    u32::try_from(i).map_err(|_| ZkvError::protocol(format!("chunk index {i} exceeds u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkv_crypto::decrypt_chunk;

    #[test]
    fn prepared_bundle_verifies() {
        let data = b"ten bytes!".repeat(7);
        let prepared = prepare_upload("a.txt", "text/plain", &data, 3).unwrap();
        let bundle = &prepared.bundle;

        assert_eq!(bundle.chunks.len(), 3);
        assert_eq!(bundle.metadata.size, 70);
        assert!(bundle.chunks.iter().enumerate().all(|(i, c)| c.index as usize == i));
        assert_eq!(bundle.stored_bytes(), 70 + 3 * SEAL_OVERHEAD);
        verify_bundle(bundle).unwrap();

        let plain: Vec<u8> = bundle
            .chunks
            .iter()
            .flat_map(|c| decrypt_chunk(&prepared.key, c.index, &c.bytes).unwrap())
            .collect();
        assert_eq!(plain, data);
    }

    #[test]
    fn empty_file_has_no_chunks() {
        let prepared = prepare_upload("empty", "application/octet-stream", b"", 3).unwrap();
        assert!(prepared.bundle.chunks.is_empty());
        verify_bundle(&prepared.bundle).unwrap();
    }

    #[test]
    fn zero_chunk_count_is_rejected() {
        assert!(matches!(
            prepare_upload("a", "text/plain", b"abc", 0),
            Err(ZkvError::Protocol(_))
        ));
    }

    #[test]
    fn shuffled_chunks_still_verify() {
        let mut bundle = prepare_upload("a", "text/plain", b"abcdefghij", 4)
            .unwrap()
            .bundle;
        bundle.chunks.reverse();
        verify_bundle(&bundle).unwrap();
    }

    #[test]
    fn missing_or_duplicate_chunk_is_rejected() {
        let bundle = prepare_upload("a", "text/plain", b"abcdefghij", 4)
            .unwrap()
            .bundle;

        let mut missing = bundle.clone();
        missing.chunks.pop();
        assert!(matches!(verify_bundle(&missing), Err(ZkvError::Protocol(_))));

        let mut duplicated = bundle.clone();
        duplicated.chunks[3] = duplicated.chunks[0].clone();
        assert!(matches!(
            verify_bundle(&duplicated),
            Err(ZkvError::Protocol(_))
        ));
    }

    #[test]
    fn tampered_chunk_is_integrity_error() {
        let mut bundle = prepare_upload("a", "text/plain", b"abcdefghij", 2)
            .unwrap()
            .bundle;
        bundle.chunks[1].bytes[NONCE_SIZE] ^= 0x01;
        assert!(matches!(verify_bundle(&bundle), Err(ZkvError::Integrity(_))));
    }

    #[test]
    fn wrong_file_hash_is_integrity_error() {
        let mut bundle = prepare_upload("a", "text/plain", b"abcdefghij", 2)
            .unwrap()
            .bundle;
        bundle.chunk_hashes.swap(0, 1);
        bundle.chunks.swap(0, 1);
        bundle.chunks[0].index = 0;
        bundle.chunks[1].index = 1;
        assert!(matches!(verify_bundle(&bundle), Err(ZkvError::Integrity(_))));
    }

    #[test]
    fn lying_about_size_is_rejected() {
        let mut bundle = prepare_upload("a", "text/plain", b"abcdefghij", 2)
            .unwrap()
            .bundle;
        bundle.metadata.size += 1;
        assert!(matches!(verify_bundle(&bundle), Err(ZkvError::Protocol(_))));
    }
}
