//! Arbitrary-precision modular arithmetic and uniform sampling
//!
//! `modpow` is a left-to-right square-and-multiply that performs the multiply
//! on every bit and keeps or discards it, so the number of big-integer
//! multiplications depends only on the exponent's byte length.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;
use zkv_core::{ZkvError, ZkvResult};

/// Longest decimal string accepted from the wire (a 2048-bit value has 617 digits).
pub const MAX_DECIMAL_DIGITS: usize = 700;

/// Compute `base^exponent mod modulus`.
///
/// Returns 0 when `modulus == 1`; a zero modulus is a protocol error.
pub fn modpow(base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> ZkvResult<BigUint> {
    if modulus.is_zero() {
        return Err(ZkvError::protocol("modpow: modulus must be positive"));
    }
    if modulus.is_one() {
        return Ok(BigUint::zero());
    }

    let base = base % modulus;
    let mut result = BigUint::one();

    for byte in exponent.to_bytes_be() {
        for shift in (0..8).rev() {
            result = (&result * &result) % modulus;
            let multiplied = (&result * &base) % modulus;
            if (byte >> shift) & 1 == 1 {
                result = multiplied;
            }
        }
    }

    Ok(result)
}

/// Uniform random integer in `[min, max]` from the operating system CSPRNG.
pub fn secure_random_in_range(min: &BigUint, max: &BigUint) -> ZkvResult<BigUint> {
    random_in_range_with(&mut OsRng, min, max)
}

/// Uniform random integer in `[min, max]` drawn from `rng`.
///
/// Draws the fewest bytes that cover the bit length of the range, masks the
/// surplus high bits, and resamples any draw that lands outside the range.
pub fn random_in_range_with<R: RngCore + CryptoRng>(
    rng: &mut R,
    min: &BigUint,
    max: &BigUint,
) -> ZkvResult<BigUint> {
    if max < min {
        return Err(ZkvError::protocol(
            "random range: max must not be less than min",
        ));
    }

    let range = max - min + 1u32;
    let bits = range.bits();
    let byte_len = bits.div_ceil(8) as usize;
    let surplus = (byte_len as u64 * 8 - bits) as u32;
    let top_mask = 0xFFu8 >> surplus;

    let mut buf = vec![0u8; byte_len];
    loop {
        rng.fill_bytes(&mut buf);
        buf[0] &= top_mask;
        let candidate = BigUint::from_bytes_be(&buf);
        if candidate < range {
            buf.zeroize();
            return Ok(min + candidate);
        }
    }
}

/// Parse a non-negative decimal integer as sent on the wire.
pub fn parse_decimal(s: &str) -> ZkvResult<BigUint> {
    if s.is_empty() {
        return Err(ZkvError::protocol("empty integer"));
    }
    if s.len() > MAX_DECIMAL_DIGITS {
        return Err(ZkvError::protocol(format!(
            "integer too long: {} digits",
            s.len()
        )));
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ZkvError::protocol("integer must be decimal digits only"));
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
        .ok_or_else(|| ZkvError::protocol("invalid decimal integer"))
}

/// Decimal wire encoding.
pub fn to_decimal(n: &BigUint) -> String {
    n.to_str_radix(10)
}
