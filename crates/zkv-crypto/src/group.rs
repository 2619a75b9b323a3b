//! The fixed discrete-log group shared by client and server.
//!
//! `p` is the 2048-bit MODP prime from RFC 3526 (group 14), a safe prime with
//! `q = (p - 1) / 2` prime. Since `p ≡ 7 (mod 8)`, 2 is a quadratic residue
//! and generates the subgroup of order `q`.

use std::sync::OnceLock;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use zkv_core::{ZkvError, ZkvResult};

use crate::modarith::modpow;

/// RFC 3526 group 14 prime as little-endian 32-bit limbs.
const P_LIMBS: [u32; 64] = [
    0xffffffff, 0xffffffff, 0x8aacaa68, 0x15728e5a, 0x98fa0510, 0x15d22618,
    0xea956ae5, 0x3995497c, 0x95581718, 0xde2bcbf6, 0x6f4c52c9, 0xb5c55df0,
    0xec07a28f, 0x9b2783a2, 0x180e8603, 0xe39e772c, 0x2e36ce3b, 0x32905e46,
    0xca18217c, 0xf1746c08, 0x4abc9804, 0x670c354e, 0x7096966d, 0x9ed52907,
    0x208552bb, 0x1c62f356, 0xdca3ad96, 0x83655d23, 0xfd24cf5f, 0x69163fa8,
    0x1c55d39a, 0x98da4836, 0xa163bf05, 0xc2007cb8, 0xece45b3d, 0x49286651,
    0x7c4b1fe6, 0xae9f2411, 0x5a899fa5, 0xee386bfb, 0xf406b7ed, 0x0bff5cb6,
    0xa637ed6b, 0xf44c42e9, 0x625e7ec6, 0xe485b576, 0x6d51c245, 0x4fe1356d,
    0xf25f1437, 0x302b0a6d, 0xcd3a431b, 0xef9519b3, 0x8e3404dd, 0x514a0879,
    0x3b139b22, 0x020bbea6, 0x8a67cc74, 0x29024e08, 0x80dc1cd1, 0xc4c6628b,
    0x2168c234, 0xc90fdaa2, 0xffffffff, 0xffffffff,
];

const GENERATOR: u32 = 2;

/// Size of `p` in bytes; group elements are compared at this width.
pub const ELEMENT_BYTES: usize = 256;

/// `(p, q, g)`
#[derive(Debug, Clone)]
pub struct GroupParams {
    p: BigUint,
    q: BigUint,
    g: BigUint,
    q_minus_one: BigUint,
}

impl GroupParams {
    fn rfc3526_2048() -> Self {
        let p = BigUint::from_slice(&P_LIMBS);
        let q: BigUint = (&p - 1u32) >> 1usize;
        let q_minus_one = &q - 1u32;
        Self {
            p,
            q,
            g: BigUint::from(GENERATOR),
            q_minus_one,
        }
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn q(&self) -> &BigUint {
        &self.q
    }

    pub fn g(&self) -> &BigUint {
        &self.g
    }

    /// `q - 1`, the modulus of the passphrase KDF and upper bound of nonces.
    pub fn q_minus_one(&self) -> &BigUint {
        &self.q_minus_one
    }

    /// `g^exponent mod p`
    pub fn exp_g(&self, exponent: &BigUint) -> ZkvResult<BigUint> {
        modpow(&self.g, exponent, &self.p)
    }

    /// True for integers in `[1, p-1]`.
    pub fn is_element(&self, x: &BigUint) -> bool {
        !x.is_zero() && x < &self.p
    }

    /// True when `x` lies in the order-q subgroup generated by `g`.
    pub fn is_subgroup_member(&self, x: &BigUint) -> ZkvResult<bool> {
        if !self.is_element(x) {
            return Ok(false);
        }
        Ok(modpow(x, &self.q, &self.p)?.is_one())
    }

    /// Reject anything that is not a valid registered public key.
    pub fn validate_public_key(&self, x: &BigUint) -> ZkvResult<()> {
        if !self.is_subgroup_member(x)? {
            return Err(ZkvError::protocol(
                "public key is not an element of the prime-order subgroup",
            ));
        }
        Ok(())
    }

    /// Fixed-width big-endian encoding used for constant-time comparison.
    pub(crate) fn to_fixed_bytes(&self, x: &BigUint) -> [u8; ELEMENT_BYTES] {
        let mut out = [0u8; ELEMENT_BYTES];
        let bytes = (x % &self.p).to_bytes_be();
        out[ELEMENT_BYTES - bytes.len()..].copy_from_slice(&bytes);
        out
    }
}

/// The process-wide group parameters.
pub fn group() -> &'static GroupParams {
    static GROUP: OnceLock<GroupParams> = OnceLock::new();
    GROUP.get_or_init(GroupParams::rfc3526_2048)
}
