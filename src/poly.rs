//! Small dense univariate polynomials over the scalar field
//!
//! The sumcheck rounds only ever exchange polynomials of degree two and five
//! (the zero-knowledge extension bumps the last round of each phase), so the
//! crate carries one concrete type per degree instead of a general dense
//! polynomial. Coefficients are listed highest degree first, matching the
//! coefficient lists that travel through the transcript.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::Zero;
use std::ops::{Add, Mul};

use crate::F;

/// `a·x + b`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinearPoly {
    pub a: F,
    pub b: F,
}

/// `a·x² + b·x + c`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuadraticPoly {
    pub a: F,
    pub b: F,
    pub c: F,
}

/// `a·x³ + … + d`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CubicPoly {
    pub a: F,
    pub b: F,
    pub c: F,
    pub d: F,
}

/// `a·x⁴ + … + e`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuarticPoly {
    pub a: F,
    pub b: F,
    pub c: F,
    pub d: F,
    pub e: F,
}

/// `a·x⁵ + … + f`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuinticPoly {
    pub a: F,
    pub b: F,
    pub c: F,
    pub d: F,
    pub e: F,
    pub f: F,
}

impl LinearPoly {
    /// Construct from coefficients, highest degree first.
    pub fn new(a: F, b: F) -> Self {
        Self { a, b }
    }

    /// Constant polynomial `b`.
    pub fn constant(b: F) -> Self {
        Self { a: F::zero(), b }
    }

    /// Evaluate at `x`.
    #[inline]
    pub fn eval(&self, x: F) -> F {
        self.a * x + self.b
    }

    /// Coefficient list, highest degree first.
    pub fn coefficients(&self) -> Vec<F> {
        vec![self.a, self.b]
    }
}

impl Add for LinearPoly {
    type Output = LinearPoly;
    fn add(self, rhs: LinearPoly) -> LinearPoly {
        LinearPoly::new(self.a + rhs.a, self.b + rhs.b)
    }
}

impl Mul for LinearPoly {
    type Output = QuadraticPoly;
    fn mul(self, rhs: LinearPoly) -> QuadraticPoly {
        QuadraticPoly {
            a: self.a * rhs.a,
            b: self.a * rhs.b + self.b * rhs.a,
            c: self.b * rhs.b,
        }
    }
}

impl QuadraticPoly {
    /// Construct from coefficients, highest degree first.
    pub fn new(a: F, b: F, c: F) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn eval(&self, x: F) -> F {
        (self.a * x + self.b) * x + self.c
    }

    pub fn coefficients(&self) -> Vec<F> {
        vec![self.a, self.b, self.c]
    }
}

impl Add for QuadraticPoly {
    type Output = QuadraticPoly;
    fn add(self, rhs: QuadraticPoly) -> QuadraticPoly {
        QuadraticPoly::new(self.a + rhs.a, self.b + rhs.b, self.c + rhs.c)
    }
}

impl CubicPoly {
    pub fn new(a: F, b: F, c: F, d: F) -> Self {
        Self { a, b, c, d }
    }

    #[inline]
    pub fn eval(&self, x: F) -> F {
        ((self.a * x + self.b) * x + self.c) * x + self.d
    }

    pub fn coefficients(&self) -> Vec<F> {
        vec![self.a, self.b, self.c, self.d]
    }
}

impl Add for CubicPoly {
    type Output = CubicPoly;
    fn add(self, rhs: CubicPoly) -> CubicPoly {
        CubicPoly::new(
            self.a + rhs.a,
            self.b + rhs.b,
            self.c + rhs.c,
            self.d + rhs.d,
        )
    }
}

impl QuarticPoly {
    pub fn new(a: F, b: F, c: F, d: F, e: F) -> Self {
        Self { a, b, c, d, e }
    }

    #[inline]
    pub fn eval(&self, x: F) -> F {
        (((self.a * x + self.b) * x + self.c) * x + self.d) * x + self.e
    }

    pub fn coefficients(&self) -> Vec<F> {
        vec![self.a, self.b, self.c, self.d, self.e]
    }
}

impl Add for QuarticPoly {
    type Output = QuarticPoly;
    fn add(self, rhs: QuarticPoly) -> QuarticPoly {
        QuarticPoly::new(
            self.a + rhs.a,
            self.b + rhs.b,
            self.c + rhs.c,
            self.d + rhs.d,
            self.e + rhs.e,
        )
    }
}

impl QuinticPoly {
    pub fn new(a: F, b: F, c: F, d: F, e: F, f: F) -> Self {
        Self { a, b, c, d, e, f }
    }

    #[inline]
    pub fn eval(&self, x: F) -> F {
        ((((self.a * x + self.b) * x + self.c) * x + self.d) * x + self.e) * x + self.f
    }

    pub fn coefficients(&self) -> Vec<F> {
        vec![self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

impl Add for QuinticPoly {
    type Output = QuinticPoly;
    fn add(self, rhs: QuinticPoly) -> QuinticPoly {
        QuinticPoly::new(
            self.a + rhs.a,
            self.b + rhs.b,
            self.c + rhs.c,
            self.d + rhs.d,
            self.e + rhs.e,
            self.f + rhs.f,
        )
    }
}

/// The unique linear polynomial through `(0, y0)` and `(1, y1)`.
///
/// The only interpolation the protocol needs: sumcheck bookkeeping tables are
/// linear in the bound bit.
#[inline]
pub fn interpolate(y0: F, y1: F) -> LinearPoly {
    LinearPoly::new(y1 - y0, y0)
}

// ============================================================================
// Sumcheck round messages
// ============================================================================

/// A sumcheck round message: quadratic for ordinary rounds, quintic for the
/// zero-knowledge-extended last round of each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPoly {
    Quadratic(QuadraticPoly),
    Quintic(QuinticPoly),
}

impl RoundPoly {
    /// Evaluate at `x`.
    #[inline]
    pub fn eval(&self, x: F) -> F {
        match self {
            RoundPoly::Quadratic(p) => p.eval(x),
            RoundPoly::Quintic(p) => p.eval(x),
        }
    }

    /// Coefficient list, highest degree first (3 or 6 entries).
    pub fn coefficients(&self) -> Vec<F> {
        match self {
            RoundPoly::Quadratic(p) => p.coefficients(),
            RoundPoly::Quintic(p) => p.coefficients(),
        }
    }

    /// Rebuild from a coefficient list; the length selects the degree.
    pub fn from_coefficients(c: &[F]) -> Option<RoundPoly> {
        match c {
            [a, b, cc] => Some(RoundPoly::Quadratic(QuadraticPoly::new(*a, *b, *cc))),
            [a, b, cc, d, e, f] => Some(RoundPoly::Quintic(QuinticPoly::new(
                *a, *b, *cc, *d, *e, *f,
            ))),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn linear_times_linear_evaluates_as_the_product() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..32 {
            let p = LinearPoly::new(F::rand(&mut rng), F::rand(&mut rng));
            let q = LinearPoly::new(F::rand(&mut rng), F::rand(&mut rng));
            let x = F::rand(&mut rng);
            assert_eq!((p * q).eval(x), p.eval(x) * q.eval(x));
        }
    }

    #[test]
    fn addition_is_pointwise() {
        let mut rng = StdRng::seed_from_u64(12);
        let p = LinearPoly::new(F::rand(&mut rng), F::rand(&mut rng));
        let q = LinearPoly::new(F::rand(&mut rng), F::rand(&mut rng));
        let x = F::rand(&mut rng);
        assert_eq!((p + q).eval(x), p.eval(x) + q.eval(x));
    }

    #[test]
    fn interpolation_hits_both_anchors() {
        let mut rng = StdRng::seed_from_u64(13);
        let (y0, y1) = (F::rand(&mut rng), F::rand(&mut rng));
        let l = interpolate(y0, y1);
        assert_eq!(l.eval(F::from(0u64)), y0);
        assert_eq!(l.eval(F::from(1u64)), y1);
    }

    #[test]
    fn round_poly_codec_selects_degree_by_length() {
        let mut rng = StdRng::seed_from_u64(14);
        let q = RoundPoly::Quadratic(QuadraticPoly::new(
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
        ));
        let back = RoundPoly::from_coefficients(&q.coefficients()).unwrap();
        assert_eq!(q, back);

        let quint = RoundPoly::Quintic(QuinticPoly::new(
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
        ));
        let back = RoundPoly::from_coefficients(&quint.coefficients()).unwrap();
        assert_eq!(quint, back);

        assert!(RoundPoly::from_coefficients(&[F::zero(); 4]).is_none());
    }

    #[test]
    fn horner_matches_the_naive_expansion() {
        let mut rng = StdRng::seed_from_u64(15);
        let p = QuinticPoly::new(
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
            F::rand(&mut rng),
        );
        let x = F::rand(&mut rng);
        let x2 = x * x;
        let x3 = x2 * x;
        let naive =
            p.a * x3 * x2 + p.b * x2 * x2 + p.c * x3 + p.d * x2 + p.e * x + p.f;
        assert_eq!(p.eval(x), naive);
    }
}
