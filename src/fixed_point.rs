//! Signed fixed-point arithmetic over the scalar field
//!
//! Neural-network activations are real-valued; the proof system works over a
//! prime field. This module carries the standard two's-complement-in-field
//! encoding: a real `x` is stored as `round(|x|·2^s) mod p`, with negatives
//! mapped to the upper half of the field (`p − q`). The halfway point `p/2`
//! partitions positive from negative on decode.
//!
//! Invariants:
//! - every encoded value lies in `[0, p)`;
//! - `qadd` is plain field addition (scales match);
//! - `qmul` rescales the product by `2^s`, tracking sign via the `p/2` rule;
//! - comparisons are defined on the decoded reals, never on raw residues.
//!
//! `PRECISION_BITS` is 16. A wider encoding (64 bits was considered) buys
//! accuracy but eats the headroom that keeps `|a|·|b|` below `p` during the
//! integer product step, so multiplications would wrap much earlier.

#![forbid(unsafe_code)]

use ark_ff::{BigInteger, PrimeField, Zero};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::sync::OnceLock;

use crate::F;

/// Fractional bits carried by every encoded value.
pub const PRECISION_BITS: u32 = 16;

/// `2^PRECISION_BITS`, the fixed-point scale factor.
pub const SCALE: u64 = 1 << PRECISION_BITS;

/// Errors signalled by the fixed-point layer.
#[derive(Debug, thiserror::Error)]
pub enum FixedPointError {
    /// `qdiv` was asked to divide by an encoded zero.
    #[error("fixed-point division by zero")]
    DivisionByZero,
}

/// Field modulus as an arbitrary-precision integer.
fn modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| BigUint::from_bytes_be(&F::MODULUS.to_bytes_be()))
}

/// Residue of `a` as an arbitrary-precision integer in `[0, p)`.
fn to_biguint(a: &F) -> BigUint {
    BigUint::from_bytes_be(&a.into_bigint().to_bytes_be())
}

fn from_biguint(n: &BigUint) -> F {
    F::from_be_bytes_mod_order(&n.to_bytes_be())
}

/// Encode a real number at `PRECISION_BITS` fractional bits.
pub fn quantize(x: f64) -> F {
    assert!(x.is_finite(), "cannot quantize a non-finite value");
    let q = (x.abs() * SCALE as f64).round();
    let q_int = BigUint::from(q as u128);
    let fe = from_biguint(&q_int);
    if x < 0.0 {
        -fe
    } else {
        fe
    }
}

/// Decode a field element back to a real number.
///
/// Residues above `p/2` decode to the negative reals.
pub fn dequantize(a: &F) -> f64 {
    let p = modulus();
    let n = to_biguint(a);
    if n > (p >> 1) {
        let mag = (p - &n).to_f64().unwrap_or(f64::INFINITY);
        -(mag / SCALE as f64)
    } else {
        n.to_f64().unwrap_or(f64::INFINITY) / SCALE as f64
    }
}

/// True when the residue sits in the negative half of the field.
fn is_negative(a: &F) -> bool {
    to_biguint(a) > (modulus() >> 1)
}

/// Magnitude of `a` as an integer: the residue itself for positives,
/// `p − residue` for negatives.
fn magnitude(a: &F) -> BigUint {
    let p = modulus();
    let n = to_biguint(a);
    if n > (p >> 1) {
        p - &n
    } else {
        n
    }
}

/// Fixed-point addition. Scales agree, so this is field addition.
#[inline]
pub fn qadd(a: &F, b: &F) -> F {
    *a + *b
}

/// Fixed-point negation.
#[inline]
pub fn qneg(a: &F) -> F {
    -*a
}

/// Fixed-point multiplication.
///
/// The integer product of the two magnitudes is reduced mod `p`, divided by
/// `2^s` (integer division — the last bits of precision round toward zero),
/// and the sign is reapplied. The product must stay below `p` for the
/// rescale to be exact; `PRECISION_BITS = 16` leaves ample headroom for
/// network-scale activations.
pub fn qmul(a: &F, b: &F) -> F {
    let p = modulus();
    let neg = is_negative(a) ^ is_negative(b);
    let product = (magnitude(a) * magnitude(b)) % p;
    let scaled = product / BigUint::from(SCALE);
    let fe = from_biguint(&scaled);
    if neg {
        -fe
    } else {
        fe
    }
}

/// Fixed-point division. Fails on an encoded-zero divisor.
pub fn qdiv(a: &F, b: &F) -> Result<F, FixedPointError> {
    if b.is_zero() {
        return Err(FixedPointError::DivisionByZero);
    }
    Ok(quantize(dequantize(a) / dequantize(b)))
}

/// Fixed-point exponentiation by an integer power.
///
/// Square-and-multiply over `qmul`; the identity is `quantize(1)`. Negative
/// exponents invert through `qdiv`, so `qexp(0, -1)` fails.
pub fn qexp(a: &F, k: i64) -> Result<F, FixedPointError> {
    let mut acc = quantize(1.0);
    let mut base = *a;
    let mut e = k.unsigned_abs();
    while e > 0 {
        if e & 1 == 1 {
            acc = qmul(&acc, &base);
        }
        base = qmul(&base, &base);
        e >>= 1;
    }
    if k < 0 {
        qdiv(&quantize(1.0), &acc)
    } else {
        Ok(acc)
    }
}

/// Round to five decimal places.
///
/// Applied to every non-linear activation before quantization; the rounding
/// pins the synthesized operand of `x · (f(x)/x)` to the same value on every
/// platform.
#[inline]
pub fn round5(x: f64) -> f64 {
    (x * 100_000.0).round() / 100_000.0
}

// ============================================================================
// Comparisons (on decoded reals)
// ============================================================================

/// `a < b` on the decoded values.
#[inline]
pub fn qlt(a: &F, b: &F) -> bool {
    dequantize(a) < dequantize(b)
}

/// `a > b` on the decoded values.
#[inline]
pub fn qgt(a: &F, b: &F) -> bool {
    dequantize(a) > dequantize(b)
}

/// `a <= b` on the decoded values.
#[inline]
pub fn qle(a: &F, b: &F) -> bool {
    dequantize(a) <= dequantize(b)
}

/// `a >= b` on the decoded values.
#[inline]
pub fn qge(a: &F, b: &F) -> bool {
    dequantize(a) >= dequantize(b)
}

/// `a == b` on the decoded values.
#[inline]
pub fn qeq(a: &F, b: &F) -> bool {
    dequantize(a) == dequantize(b)
}

/// `a != b` on the decoded values.
#[inline]
pub fn qne(a: &F, b: &F) -> bool {
    !qeq(a, b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::One;

    const SIGNS: [(f64, f64); 4] = [(1.0, 1.0), (-1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)];

    fn assert_close(actual: f64, expected: f64) {
        // One encoded unit of slack per operand.
        let eps = 4.0 / SCALE as f64;
        assert!(
            (actual - expected).abs() <= eps,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn round_trip_exact_for_representable_values() {
        for x in [0.0, 1.0, -1.0, 0.5, -0.5, 16.0, -1024.25, 3.140625] {
            assert_eq!(dequantize(&quantize(x)), x);
        }
    }

    #[test]
    fn addition_tracks_the_reals() {
        for (sa, sb) in SIGNS {
            let a = 3.1 * sa;
            let b = 4.0 * sb;
            assert_close(dequantize(&qadd(&quantize(a), &quantize(b))), a + b);
        }
    }

    #[test]
    fn multiplication_tracks_the_reals() {
        for (sa, sb) in SIGNS {
            let a = 32.0 * sa;
            let b = 2.0 * sb;
            assert_eq!(dequantize(&qmul(&quantize(a), &quantize(b))), a * b);
            let c = 3.25 * sa;
            let d = 0.5 * sb;
            assert_close(dequantize(&qmul(&quantize(c), &quantize(d))), c * d);
        }
    }

    #[test]
    fn division_tracks_the_reals() {
        for (sa, sb) in SIGNS {
            let a = 32.0 * sa;
            let b = 2.0 * sb;
            let q = qdiv(&quantize(a), &quantize(b)).unwrap();
            assert_eq!(dequantize(&q), a / b);
        }
        assert_eq!(
            dequantize(&qdiv(&quantize(1.0), &quantize(2.0)).unwrap()),
            0.5
        );
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(matches!(
            qdiv(&quantize(1.0), &F::zero()),
            Err(FixedPointError::DivisionByZero)
        ));
    }

    #[test]
    fn exponentiation_uses_the_quantized_identity() {
        assert_eq!(qexp(&quantize(3.0), 0).unwrap(), quantize(1.0));
        assert_eq!(dequantize(&qexp(&quantize(2.0), 5).unwrap()), 32.0);
        assert_eq!(dequantize(&qexp(&quantize(2.0), -1).unwrap()), 0.5);
    }

    #[test]
    fn negation_matches_quantizing_the_negative() {
        let a = quantize(3.1);
        assert_eq!(qneg(&a), quantize(-3.1));
    }

    #[test]
    fn comparisons_match_the_reals() {
        for (sa, sb) in SIGNS {
            let a = 3.14 * sa;
            let b = 2.78 * sb;
            let (aq, bq) = (quantize(a), quantize(b));
            assert_eq!(qlt(&aq, &bq), a < b);
            assert_eq!(qgt(&aq, &bq), a > b);
            assert_eq!(qle(&aq, &bq), a <= b);
            assert_eq!(qge(&aq, &bq), a >= b);
        }
    }

    #[test]
    fn mixed_sign_chain_stays_consistent() {
        for (sa, sb) in SIGNS {
            let a = 3.1 * sa;
            let b = 4.0 * sb;
            let aq = quantize(a);
            let bq = quantize(b);
            let c = qadd(&aq, &bq);
            let d = qmul(&c, &bq);
            assert_close(dequantize(&d), (a + b) * b);
        }
    }

    #[test]
    fn one_is_the_multiplicative_identity() {
        let one = quantize(1.0);
        assert_eq!(one, F::from(SCALE));
        let x = quantize(-7.25);
        assert_eq!(qmul(&x, &one), x);
        assert!(F::one() != one);
    }
}
