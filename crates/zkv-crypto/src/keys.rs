//! Per-upload file keys and their share-link encoding

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;
use zkv_core::{ZkvError, ZkvResult};

use crate::KEY_SIZE;

/// A per-upload 256-bit AES-GCM key. Zeroized on drop.
#[derive(Clone)]
pub struct FileKey {
    bytes: [u8; KEY_SIZE],
}

impl FileKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// base64url without padding, as carried in a share-link fragment.
    pub fn to_fragment(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.bytes)
    }

    /// Parse a share-link fragment back into a key.
    pub fn from_fragment(fragment: &str) -> ZkvResult<Self> {
        let mut decoded = URL_SAFE_NO_PAD
            .decode(fragment.trim())
            .map_err(|e| ZkvError::protocol(format!("invalid key encoding: {e}")))?;
        if decoded.len() != KEY_SIZE {
            let len = decoded.len();
            decoded.zeroize();
            return Err(ZkvError::protocol(format!(
                "invalid key length: {len} bytes (expected {KEY_SIZE})"
            )));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(bytes))
    }
}

impl Drop for FileKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for FileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a fresh random file key.
pub fn generate_file_key() -> FileKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    FileKey::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_key_generation() {
        let k1 = generate_file_key();
        let k2 = generate_file_key();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_fragment_roundtrip() {
        let key = generate_file_key();
        let fragment = key.to_fragment();
        assert_eq!(fragment.len(), 43);
        assert!(!fragment.contains('='));
        assert!(!fragment.contains('+') && !fragment.contains('/'));

        let parsed = FileKey::from_fragment(&fragment).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_fragment_rejects_bad_input() {
        assert!(FileKey::from_fragment("not base64!").is_err());
        let short = URL_SAFE_NO_PAD.encode([1u8; 16]);
        assert!(matches!(
            FileKey::from_fragment(&short),
            Err(ZkvError::Protocol(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = FileKey::from_bytes([0xAB; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }
}
