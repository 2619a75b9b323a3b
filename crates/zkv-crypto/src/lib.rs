//! zkv-crypto: everything numeric and cryptographic in zkvault
//!
//! Authentication (zero-knowledge password proof over a safe-prime group):
//! ```text
//! x = SHA-256(passphrase) mod (q-1) + 1        secret, never leaves the client
//! X = g^x mod p                                 registered public key
//! V = g^v mod p,   v <- [1, q-1]                move 1: commitment
//! c <- [1, q-1]                                 server challenge
//! b = (v + c*x) mod q                           move 2: response
//! accept iff g^b == V * X^c (mod p)
//! ```
//!
//! Content pipeline, per chunk i of an upload:
//! ```text
//! key    = random 256-bit, one per upload (never sent to the server)
//! N_i    = random 96-bit nonce
//! stored = N_i || AES-256-GCM(key, N_i, chunk_i)
//! H_i    = base64(SHA-256(stored))
//! H_file = base64(SHA-256(H_0 || H_1 || ... ))   over the base64 strings
//! ```

pub mod chunk;
pub mod group;
pub mod integrity;
pub mod keys;
pub mod modarith;
pub mod zkpp;

pub use chunk::{decrypt_chunk, encrypt_chunk, seal_chunk, SealedChunk};
pub use group::{group, GroupParams};
pub use integrity::{chunk_hash, file_hash, hashes_match, verify_chunk, verify_file_hash};
pub use keys::{generate_file_key, FileKey};
pub use modarith::{modpow, parse_decimal, secure_random_in_range, to_decimal};
pub use zkpp::{
    derive_secret, new_challenge, validate_commitment, validate_response, verify, Commitment,
    Prover, SecretExponent,
};

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes (96-bit)
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size
pub const TAG_SIZE: usize = 16;
