//! Zero-knowledge passphrase proof (Schnorr identification over the RFC 3526 group)
//!
//! ```text
//! client                                   server
//!   x = KDF(passphrase), X = g^x     ──X──▶  store X
//!   v ← [1, q-1],        V = g^v     ──V──▶  c ← [1, q-1]
//!                                    ◀──c──
//!   b = (v + c·x) mod q              ──b──▶  g^b == V · X^c (mod p)
//! ```
//!
//! Neither `x` nor `v` leaves the prover. A commitment is consumed by
//! [`Prover::respond`], so one `v` can never answer two challenges.

use num_bigint::BigUint;
use num_traits::One;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};
use zkv_core::{ZkvError, ZkvResult};

use crate::group::group;
use crate::modarith::{modpow, secure_random_in_range};

/// A secret exponent (`x` or `v`). The big-endian bytes are zeroized on drop
/// and the value never appears in `Debug` output.
pub struct SecretExponent {
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretExponent {
    fn new(value: &BigUint) -> Self {
        Self {
            bytes: Zeroizing::new(value.to_bytes_be()),
        }
    }

    fn value(&self) -> BigUint {
        BigUint::from_bytes_be(&self.bytes)
    }
}

impl std::fmt::Debug for SecretExponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretExponent([REDACTED])")
    }
}

/// Derive the long-term secret `x = SHA-256(passphrase) mod (q-1) + 1`.
///
/// Deterministic; the result always lies in `[1, q-1]`.
pub fn derive_secret(passphrase: &SecretString) -> SecretExponent {
    let mut digest: [u8; 32] = Sha256::digest(passphrase.expose_secret().as_bytes()).into();
    let x = BigUint::from_bytes_be(&digest) % group().q_minus_one() + 1u32;
    digest.zeroize();
    SecretExponent::new(&x)
}

/// First prover move: the secret nonce `v` and the public `V = g^v mod p`.
#[derive(Debug)]
pub struct Commitment {
    nonce: SecretExponent,
    value: BigUint,
}

impl Commitment {
    /// `V`, the value sent to the verifier.
    pub fn value(&self) -> &BigUint {
        &self.value
    }
}

/// Client half of the protocol, holding the derived secret `x`.
#[derive(Debug)]
pub struct Prover {
    secret: SecretExponent,
}

impl Prover {
    pub fn new(passphrase: &SecretString) -> Self {
        Self {
            secret: derive_secret(passphrase),
        }
    }

    /// `X = g^x mod p`, the only value ever registered with the server.
    pub fn public_key(&self) -> ZkvResult<BigUint> {
        group().exp_g(&self.secret.value())
    }

    /// Draw a fresh `v` in `[1, q-1]` and compute `V`.
    pub fn commit(&self) -> ZkvResult<Commitment> {
        let grp = group();
        let v = secure_random_in_range(&BigUint::one(), grp.q_minus_one())?;
        let value = grp.exp_g(&v)?;
        Ok(Commitment {
            nonce: SecretExponent::new(&v),
            value,
        })
    }

    /// Answer `challenge` with `b = (v + c·x) mod q`, consuming the commitment.
    pub fn respond(&self, commitment: Commitment, challenge: &BigUint) -> ZkvResult<BigUint> {
        validate_challenge(challenge)?;
        let q = group().q();
        let b = (commitment.nonce.value() + challenge * self.secret.value()) % q;
        Ok(b)
    }
}

/// Verifier move: a uniformly random challenge in `[1, q-1]`.
pub fn new_challenge() -> ZkvResult<BigUint> {
    secure_random_in_range(&BigUint::one(), group().q_minus_one())
}

/// `V` must be an integer in `[1, p-1]`.
pub fn validate_commitment(commitment: &BigUint) -> ZkvResult<()> {
    if !group().is_element(commitment) {
        return Err(ZkvError::protocol("commitment out of range"));
    }
    Ok(())
}

/// `c` must be an integer in `[1, q-1]`.
pub fn validate_challenge(challenge: &BigUint) -> ZkvResult<()> {
    let grp = group();
    if challenge < &BigUint::one() || challenge > grp.q_minus_one() {
        return Err(ZkvError::protocol("challenge out of range"));
    }
    Ok(())
}

/// `b` must be an integer in `[0, q-1]`.
pub fn validate_response(response: &BigUint) -> ZkvResult<()> {
    if response >= group().q() {
        return Err(ZkvError::protocol("response out of range"));
    }
    Ok(())
}

/// Check `g^b ≡ V · X^c (mod p)`.
///
/// Inputs are range-checked first; out-of-range values are a protocol error,
/// a well-formed but wrong proof is `Ok(false)`. The final comparison runs
/// in constant time over fixed-width encodings.
pub fn verify(
    public_key: &BigUint,
    commitment: &BigUint,
    challenge: &BigUint,
    response: &BigUint,
) -> ZkvResult<bool> {
    let grp = group();
    if !grp.is_element(public_key) {
        return Err(ZkvError::protocol("public key out of range"));
    }
    validate_commitment(commitment)?;
    validate_challenge(challenge)?;
    validate_response(response)?;

    let lhs = grp.exp_g(response)?;
    let rhs = (commitment * modpow(public_key, challenge, grp.p())?) % grp.p();

    let lhs = grp.to_fixed_bytes(&lhs);
    let rhs = grp.to_fixed_bytes(&rhs);
    Ok(bool::from(lhs.ct_eq(&rhs)))
}
