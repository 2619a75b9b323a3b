use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-supplied description of the plaintext file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    /// Original (plaintext) size in bytes
    pub size: u64,
    pub mime: String,
}

/// Where one encrypted chunk lives and how to check it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDescriptor {
    /// Position of this chunk within the file (0-based)
    pub index: u32,
    /// Opaque storage key on the owning backend
    pub key: String,
    pub url: String,
    /// Name of the backend the chunk was written to
    pub backend: String,
    /// Display name, e.g. `report.pdf.part2`; never parsed
    pub name: String,
    /// Stored size in bytes (nonce + ciphertext + tag)
    pub size: u64,
    /// base64(SHA-256(nonce || ciphertext))
    pub hash: String,
}

/// One logical uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: Uuid,
    pub filename: String,
    pub mime: String,
    pub size: u64,
    /// base64(SHA-256(H_0 || H_1 || ... )) over the base64 chunk hashes
    pub file_hash: String,
    /// Ordered by `index`
    pub chunks: Vec<ChunkDescriptor>,
    /// Unix timestamp (seconds) of commit
    pub created_at: u64,
}

impl UploadRecord {
    /// Chunk hashes in file order.
    pub fn chunk_hashes(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.hash.as_str()).collect()
    }

    /// True when `chunks[i].index == i` for every chunk.
    pub fn is_well_ordered(&self) -> bool {
        self.chunks
            .iter()
            .enumerate()
            .all(|(i, c)| c.index as usize == i)
    }

    pub fn stored_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }
}

/// The single registered public key `X = g^x mod p`, as a decimal string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub public_key: String,
    pub updated_at: u64,
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
