//! Multilinear KZG polynomial commitments
//!
//! Commitments bind sparse multivariate polynomials over the scalar field to
//! points of a pairing-friendly group. The public parameters tabulate
//! `g^{t₁^{e₁}·…·tₙ^{eₙ}}` in both source groups for a family of exponent
//! vectors; three families are supported:
//!
//! 1. **dense** — every exponent tuple in `{0,…,d}^n`;
//! 2. **univariate-in-each-variable** — only monomials touching one variable;
//! 3. **linear** (zk-sumcheck) — variables are doubled so that `tᵢ` and
//!    `tᵢ²` each get their own table slot, letting the quadratic-per-variable
//!    masking polynomial `a₀ + Σ aᵢxᵢ + aᵢ′xᵢ²` commit with linear-size
//!    tables.
//!
//! Commitments live in G2; quotient openings are committed in G1, except the
//! last quotient which stays in the clear and is re-committed by the
//! verifier. Opening decomposes `f(x) − f(r)` by iterated division against
//! `rᵢ·xᵢ + xᵢ₊₁ − rᵢ² − rᵢ₊₁` and finally `xₙ₋₁ − rₙ₋₁`; a nonzero final
//! remainder is a hard error.
//!
//! The trusted setup here is a toy powers-of-tau (see `setup`): it does NOT
//! tabulate the knowledge-of-exponent companion points `g^{α·t^e}`, so an
//! adversarial committer is not bound the way a production deployment needs.
//! Real deployments must add that tabulation.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ec::pairing::Pairing;
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{Field, One, PrimeField, Zero};
use ark_serialize::{
    CanonicalDeserialize, CanonicalSerialize, Compress, Read, SerializationError, Valid, Validate,
    Write,
};
use std::collections::BTreeMap;

use crate::proof::ProofRecord;
use crate::{Curve, G1Affine, G2Affine, F};

/// Errors signalled by the commitment scheme.
#[derive(Debug, thiserror::Error)]
pub enum MkzgError {
    /// A monomial's exponent vector is absent from the parameter tables.
    #[error("monomial exponent vector {0:?} is not tabulated in the public parameters")]
    MissingMonomial(Vec<u32>),
    /// The opening decomposition left a nonzero remainder.
    #[error("polynomial decomposition left a nonzero remainder")]
    InvalidDecomposition,
    /// Point length does not match the table's variable count.
    #[error("variable count mismatch: parameters carry {expected}, caller supplied {got}")]
    VariableMismatch { expected: usize, got: usize },
    /// The parameter family cannot serve this polynomial family.
    #[error("public parameters of kind {0:?} cannot serve this polynomial family")]
    WrongParamsKind(PpKind),
    /// An opening bundle failed to decode.
    #[error("malformed opening encoding: {0}")]
    MalformedOpening(&'static str),
}

// ============================================================================
// Sparse multivariate polynomials
// ============================================================================

/// Sparse multivariate polynomial: exponent vector → coefficient.
///
/// Zero coefficients are never stored, and the `BTreeMap` key order is the
/// lexicographic monomial order (first variable most significant), which the
/// division routine leans on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPoly {
    nvars: usize,
    terms: BTreeMap<Vec<u32>, F>,
}

impl MultiPoly {
    /// The zero polynomial in `nvars` variables.
    pub fn zero(nvars: usize) -> Self {
        MultiPoly {
            nvars,
            terms: BTreeMap::new(),
        }
    }

    /// Constant polynomial.
    pub fn constant(nvars: usize, c: F) -> Self {
        let mut p = Self::zero(nvars);
        p.add_term(vec![0; nvars], c);
        p
    }

    /// Number of variables.
    #[inline]
    pub fn nvars(&self) -> usize {
        self.nvars
    }

    /// Iterate `(exponents, coefficient)` pairs in lexicographic order.
    pub fn terms(&self) -> impl Iterator<Item = (&Vec<u32>, &F)> {
        self.terms.iter()
    }

    /// Number of stored monomials.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Accumulate `coeff · x^exps`, dropping the monomial if it cancels.
    pub fn add_term(&mut self, exps: Vec<u32>, coeff: F) {
        debug_assert_eq!(exps.len(), self.nvars);
        if coeff.is_zero() {
            return;
        }
        match self.terms.entry(exps) {
            std::collections::btree_map::Entry::Occupied(mut o) => {
                *o.get_mut() += coeff;
                if o.get().is_zero() {
                    o.remove();
                }
            }
            std::collections::btree_map::Entry::Vacant(v) => {
                v.insert(coeff);
            }
        }
    }

    /// Evaluate at `point`.
    pub fn eval(&self, point: &[F]) -> F {
        debug_assert_eq!(point.len(), self.nvars);
        let mut acc = F::zero();
        for (exps, coeff) in &self.terms {
            let mut term = *coeff;
            for (x, &e) in point.iter().zip(exps.iter()) {
                if e > 0 {
                    term *= x.pow([e as u64]);
                }
            }
            acc += term;
        }
        acc
    }

    /// Lexicographically greatest monomial.
    fn leading(&self) -> Option<(&Vec<u32>, &F)> {
        self.terms.iter().next_back()
    }

    /// Polynomial division with remainder against a single divisor, reducing
    /// by the divisor's lexicographic leading term.
    pub fn div_rem(&self, divisor: &MultiPoly) -> (MultiPoly, MultiPoly) {
        let (lead_exp, lead_coeff) = match divisor.leading() {
            Some((e, c)) => (e.clone(), *c),
            None => return (MultiPoly::zero(self.nvars), self.clone()),
        };
        let lead_inv = lead_coeff.inverse().expect("leading coefficient is nonzero");

        let mut remainder = self.clone();
        let mut quotient = MultiPoly::zero(self.nvars);
        loop {
            // Lex-greatest remaining term divisible by the leading monomial.
            let target = remainder
                .terms
                .iter()
                .rev()
                .find(|(e, _)| divides(&lead_exp, e))
                .map(|(e, c)| (e.clone(), *c));
            let (t_exp, t_coeff) = match target {
                Some(t) => t,
                None => break,
            };
            let q_exp: Vec<u32> = t_exp
                .iter()
                .zip(lead_exp.iter())
                .map(|(a, b)| a - b)
                .collect();
            let q_coeff = t_coeff * lead_inv;
            quotient.add_term(q_exp.clone(), q_coeff);
            for (d_exp, d_coeff) in &divisor.terms {
                let sum: Vec<u32> = q_exp.iter().zip(d_exp.iter()).map(|(a, b)| a + b).collect();
                remainder.add_term(sum, -(q_coeff * *d_coeff));
            }
        }
        (quotient, remainder)
    }
}

/// Componentwise `lead ≤ exp`.
fn divides(lead: &[u32], exp: &[u32]) -> bool {
    lead.iter().zip(exp.iter()).all(|(l, e)| l <= e)
}

// ============================================================================
// Public parameters
// ============================================================================

/// Parameter family marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpKind {
    /// Dense or univariate exponent tables.
    Exponential,
    /// Doubled-variable tables for the zk-sumcheck polynomial.
    Linear,
}

impl CanonicalSerialize for PpKind {
    fn serialize_with_mode<W: Write>(
        &self,
        mut w: W,
        _cm: Compress,
    ) -> Result<(), SerializationError> {
        let byte = match self {
            PpKind::Exponential => 0u8,
            PpKind::Linear => 1u8,
        };
        w.write_all(&[byte])?;
        Ok(())
    }
    fn serialized_size(&self, _cm: Compress) -> usize {
        1
    }
}

impl CanonicalDeserialize for PpKind {
    fn deserialize_with_mode<R: Read>(
        mut r: R,
        _cm: Compress,
        _validate: Validate,
    ) -> Result<Self, SerializationError> {
        let mut b = [0u8; 1];
        r.read_exact(&mut b)?;
        match b[0] {
            0 => Ok(PpKind::Exponential),
            1 => Ok(PpKind::Linear),
            _ => Err(SerializationError::InvalidData),
        }
    }
}

impl Valid for PpKind {
    fn check(&self) -> Result<(), SerializationError> {
        Ok(())
    }
}

/// Tabulated powers of the trapdoor in both source groups.
///
/// `nvars` is the table's variable count — for the linear family that is
/// twice the caller-facing variable count, since `tᵢ` and `tᵢ²` occupy
/// separate slots.
#[derive(Debug, Clone, CanonicalSerialize, CanonicalDeserialize)]
pub struct PublicParams {
    pub kind: PpKind,
    pub nvars: u32,
    pub g1_table: BTreeMap<Vec<u32>, G1Affine>,
    pub g2_table: BTreeMap<Vec<u32>, G2Affine>,
}

impl PublicParams {
    /// Table variable count as a `usize`.
    #[inline]
    pub fn nvars(&self) -> usize {
        self.nvars as usize
    }

    fn check_vars(&self, got: usize) -> Result<(), MkzgError> {
        if got != self.nvars() {
            return Err(MkzgError::VariableMismatch {
                expected: self.nvars(),
                got,
            });
        }
        Ok(())
    }
}

/// Unit exponent vector `x_i`.
fn unit(nvars: usize, i: usize) -> Vec<u32> {
    let mut e = vec![0; nvars];
    e[i] = 1;
    e
}

// ============================================================================
// Commit
// ============================================================================

/// Commit to `poly` in G2 (the commitment group).
pub fn commit_g2(pp: &PublicParams, poly: &MultiPoly) -> Result<G2Affine, MkzgError> {
    pp.check_vars(poly.nvars())?;
    let mut acc = <Curve as Pairing>::G2::zero();
    for (exps, coeff) in poly.terms() {
        let base = pp
            .g2_table
            .get(exps)
            .ok_or_else(|| MkzgError::MissingMonomial(exps.clone()))?;
        acc += base.into_group() * *coeff;
    }
    Ok(acc.into_affine())
}

/// Commit to `poly` in G1 (used for quotient openings).
pub fn commit_g1(pp: &PublicParams, poly: &MultiPoly) -> Result<G1Affine, MkzgError> {
    pp.check_vars(poly.nvars())?;
    let mut acc = <Curve as Pairing>::G1::zero();
    for (exps, coeff) in poly.terms() {
        let base = pp
            .g1_table
            .get(exps)
            .ok_or_else(|| MkzgError::MissingMonomial(exps.clone()))?;
        acc += base.into_group() * *coeff;
    }
    Ok(acc.into_affine())
}

// ============================================================================
// Open
// ============================================================================

/// An opening of a committed polynomial at one point.
#[derive(Debug, Clone)]
pub struct Opening {
    /// `f(r)`.
    pub value: F,
    /// G1 commitments to the first `n − 1` quotients.
    pub quotients: Vec<G1Affine>,
    /// The last quotient, kept in the clear; the verifier commits it itself.
    pub last_quotient: MultiPoly,
}

/// Divisor `rᵢ·xᵢ + xᵢ₊₁ − rᵢ² − rᵢ₊₁` over `nvars` variables.
fn step_divisor(nvars: usize, i: usize, point: &[F]) -> MultiPoly {
    let mut d = MultiPoly::zero(nvars);
    d.add_term(unit(nvars, i), point[i]);
    d.add_term(unit(nvars, i + 1), F::one());
    d.add_term(vec![0; nvars], -(point[i] * point[i] + point[i + 1]));
    d
}

/// Decompose `f(x) − f(r)` and commit the quotients.
pub fn open(pp: &PublicParams, poly: &MultiPoly, point: &[F]) -> Result<Opening, MkzgError> {
    let n = poly.nvars();
    pp.check_vars(n)?;
    if point.len() != n {
        return Err(MkzgError::VariableMismatch {
            expected: n,
            got: point.len(),
        });
    }
    let value = poly.eval(point);
    let mut remainder = poly.clone();
    remainder.add_term(vec![0; n], -value);

    let mut quotients = Vec::with_capacity(n.saturating_sub(1));
    for i in 0..n.saturating_sub(1) {
        let divisor = step_divisor(n, i, point);
        let (q, r) = remainder.div_rem(&divisor);
        quotients.push(commit_g1(pp, &q)?);
        remainder = r;
    }

    let mut last_divisor = MultiPoly::zero(n);
    last_divisor.add_term(unit(n, n - 1), F::one());
    last_divisor.add_term(vec![0; n], -point[n - 1]);
    let (last_quotient, rest) = remainder.div_rem(&last_divisor);
    if !rest.is_zero() {
        return Err(MkzgError::InvalidDecomposition);
    }

    Ok(Opening {
        value,
        quotients,
        last_quotient,
    })
}

// ============================================================================
// Verify
// ============================================================================

/// Pairing-product check of an opening against a G2 commitment.
pub fn verify(
    pp: &PublicParams,
    commitment: &G2Affine,
    opening: &Opening,
    point: &[F],
) -> Result<bool, MkzgError> {
    let n = point.len();
    pp.check_vars(n)?;
    if opening.quotients.len() + 1 != n {
        return Err(MkzgError::MalformedOpening("quotient count mismatch"));
    }

    let g1_gen = G1Affine::generator();
    let g2_gen = G2Affine::generator();

    let mut g1s: Vec<<Curve as Pairing>::G1Prepared> = Vec::with_capacity(n + 1);
    let mut g2s: Vec<<Curve as Pairing>::G2Prepared> = Vec::with_capacity(n + 1);

    for (i, w) in opening.quotients.iter().enumerate() {
        let t_i = pp
            .g2_table
            .get(&unit(n, i))
            .ok_or_else(|| MkzgError::MissingMonomial(unit(n, i)))?;
        let t_ip1 = pp
            .g2_table
            .get(&unit(n, i + 1))
            .ok_or_else(|| MkzgError::MissingMonomial(unit(n, i + 1)))?;
        let divisor = t_i.into_group() * point[i] + t_ip1.into_group()
            - g2_gen.into_group() * (point[i] * point[i])
            - g2_gen.into_group() * point[i + 1];
        g1s.push((*w).into());
        g2s.push(divisor.into_affine().into());
    }

    let t_last = pp
        .g2_table
        .get(&unit(n, n - 1))
        .ok_or_else(|| MkzgError::MissingMonomial(unit(n, n - 1)))?;
    let last_divisor = t_last.into_group() - g2_gen.into_group() * point[n - 1];
    let q_comm = commit_g1(pp, &opening.last_quotient)?;
    g1s.push(q_comm.into());
    g2s.push(last_divisor.into_affine().into());

    // Fold the left-hand side into the product: e(−g, C − v·g₂) closes the
    // equation to 1 iff the opening is consistent.
    let c_minus_v = (commitment.into_group() - g2_gen.into_group() * opening.value).into_affine();
    g1s.push((-g1_gen).into());
    g2s.push(c_minus_v.into());

    let mlo = Curve::multi_miller_loop(g1s, g2s);
    Ok(Curve::final_exponentiation(mlo)
        .map(|out| out.0.is_one())
        .unwrap_or(false))
}

// ============================================================================
// Mask-binding parameter bundle
// ============================================================================

/// Commitment parameters binding the per-layer sumcheck masks into the
/// transcript: a dense two-variable table (degree ≥ 2) for the auxiliary R
/// polynomial and a linear (doubled-variable) table for the masking
/// polynomial's quadratic core. Prover and verifier must hold the same
/// bundle.
#[derive(Debug, Clone)]
pub struct MaskBinding {
    pub r_params: PublicParams,
    pub zk_params: PublicParams,
}

impl MaskBinding {
    /// Caller-facing variable budget of the zk-sumcheck table.
    pub fn zk_vars(&self) -> usize {
        self.zk_params.nvars() / 2
    }
}

// ============================================================================
// Auxiliary R polynomial (six coefficients, two variables)
// ============================================================================

/// `R(x₀,x₁) = a₀ + a₁x₀ + a₂x₁ + a₃x₀x₁ + a₄x₀² + a₅x₁²`.
pub fn random_r_poly(values: &[F; 6]) -> MultiPoly {
    let mut p = MultiPoly::zero(2);
    p.add_term(vec![0, 0], values[0]);
    p.add_term(vec![1, 0], values[1]);
    p.add_term(vec![0, 1], values[2]);
    p.add_term(vec![1, 1], values[3]);
    p.add_term(vec![2, 0], values[4]);
    p.add_term(vec![0, 2], values[5]);
    p
}

pub fn commit_random_r(pp: &PublicParams, values: &[F; 6]) -> Result<G2Affine, MkzgError> {
    commit_g2(pp, &random_r_poly(values))
}

pub fn open_random_r(
    pp: &PublicParams,
    values: &[F; 6],
    point: &[F; 2],
) -> Result<Opening, MkzgError> {
    open(pp, &random_r_poly(values), point)
}

pub fn verify_random_r(
    pp: &PublicParams,
    commitment: &G2Affine,
    opening: &Opening,
    point: &[F; 2],
) -> Result<bool, MkzgError> {
    verify(pp, commitment, opening, point)
}

// ============================================================================
// zk-sumcheck polynomial (doubled variables, linear tables)
// ============================================================================

/// `v₀ + Σᵢ vᵢ·yᵢ₋₁` over `values.len() − 1` doubled variables: `y₂ᵢ`
/// stands for `xᵢ` and `y₂ᵢ₊₁` for `xᵢ²`.
pub fn zk_sumcheck_poly(values: &[F]) -> MultiPoly {
    let m = values.len().saturating_sub(1);
    let mut p = MultiPoly::zero(m);
    p.add_term(vec![0; m], values[0]);
    for (i, v) in values.iter().enumerate().skip(1) {
        p.add_term(unit(m, i - 1), *v);
    }
    p
}

/// Doubled evaluation point `(r₀, r₀², r₁, r₁², …)`.
pub fn double_point(point: &[F]) -> Vec<F> {
    let mut out = Vec::with_capacity(point.len() * 2);
    for r in point {
        out.push(*r);
        out.push(*r * *r);
    }
    out
}

fn require_linear(pp: &PublicParams) -> Result<(), MkzgError> {
    if pp.kind != PpKind::Linear {
        return Err(MkzgError::WrongParamsKind(pp.kind));
    }
    Ok(())
}

pub fn commit_zk_sumcheck(pp: &PublicParams, values: &[F]) -> Result<G2Affine, MkzgError> {
    require_linear(pp)?;
    commit_g2(pp, &zk_sumcheck_poly(values))
}

pub fn open_zk_sumcheck(
    pp: &PublicParams,
    values: &[F],
    point: &[F],
) -> Result<Opening, MkzgError> {
    require_linear(pp)?;
    open(pp, &zk_sumcheck_poly(values), &double_point(point))
}

pub fn verify_zk_sumcheck(
    pp: &PublicParams,
    commitment: &G2Affine,
    opening: &Opening,
    point: &[F],
) -> Result<bool, MkzgError> {
    require_linear(pp)?;
    verify(pp, commitment, opening, &double_point(point))
}

// ============================================================================
// Opening codec (for the transcript)
// ============================================================================

impl Opening {
    /// Encode the quotient commitments and clear quotient; the value travels
    /// under its own transcript label.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.quotients.len() as u32).to_le_bytes());
        for q in &self.quotients {
            let mut bytes = Vec::with_capacity(48);
            q.serialize_compressed(&mut bytes).expect("serialize G1");
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }
        out.extend_from_slice(&(self.last_quotient.nvars() as u32).to_le_bytes());
        out.extend_from_slice(&(self.last_quotient.term_count() as u32).to_le_bytes());
        for (exps, coeff) in self.last_quotient.terms() {
            for e in exps {
                out.extend_from_slice(&e.to_le_bytes());
            }
            out.extend_from_slice(&ProofRecord::scalar_bytes(coeff));
        }
        out
    }

    /// Decode an opening bundle; `value` is supplied by the caller from its
    /// own transcript label.
    pub fn from_bytes(data: &[u8], value: F) -> Result<Self, MkzgError> {
        fn take<'a>(data: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], MkzgError> {
            let end = cursor
                .checked_add(n)
                .ok_or(MkzgError::MalformedOpening("length overflow"))?;
            if end > data.len() {
                return Err(MkzgError::MalformedOpening("truncated"));
            }
            let s = &data[*cursor..end];
            *cursor = end;
            Ok(s)
        }
        fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, MkzgError> {
            let bytes = take(data, cursor, 4)?;
            Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
        }

        let mut cursor = 0usize;
        let count = read_u32(data, &mut cursor)? as usize;
        let mut quotients = Vec::with_capacity(count);
        for _ in 0..count {
            let len = read_u32(data, &mut cursor)? as usize;
            let bytes = take(data, &mut cursor, len)?;
            let point = G1Affine::deserialize_compressed(bytes)
                .map_err(|_| MkzgError::MalformedOpening("bad G1 point"))?;
            quotients.push(point);
        }

        let nvars = read_u32(data, &mut cursor)? as usize;
        let nterms = read_u32(data, &mut cursor)? as usize;
        let mut last_quotient = MultiPoly::zero(nvars);
        for _ in 0..nterms {
            let mut exps = Vec::with_capacity(nvars);
            for _ in 0..nvars {
                exps.push(read_u32(data, &mut cursor)?);
            }
            let coeff = F::from_be_bytes_mod_order(take(data, &mut cursor, 32)?);
            last_quotient.add_term(exps, coeff);
        }
        if cursor != data.len() {
            return Err(MkzgError::MalformedOpening("trailing bytes"));
        }
        Ok(Opening {
            value,
            quotients,
            last_quotient,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::{keygen, keygen_sequential};
    use rand::{rngs::StdRng, SeedableRng};

    fn f(v: u64) -> F {
        F::from(v)
    }

    #[test]
    fn division_reconstructs_the_dividend() {
        // f = x0²·x1 + 3x1 + 7, divided by (2x0 + x1 − 5).
        let mut poly = MultiPoly::zero(2);
        poly.add_term(vec![2, 1], f(1));
        poly.add_term(vec![0, 1], f(3));
        poly.add_term(vec![0, 0], f(7));

        let mut divisor = MultiPoly::zero(2);
        divisor.add_term(vec![1, 0], f(2));
        divisor.add_term(vec![0, 1], f(1));
        divisor.add_term(vec![0, 0], -f(5));

        let (q, r) = poly.div_rem(&divisor);
        // q·d + r == f at random-ish points.
        for point in [[f(3), f(4)], [f(11), f(2)], [f(0), f(9)]] {
            assert_eq!(
                q.eval(&point) * divisor.eval(&point) + r.eval(&point),
                poly.eval(&point)
            );
        }
    }

    #[test]
    fn dense_commitment_verifies() {
        let mut rng = StdRng::seed_from_u64(41);
        let pp = keygen(3, 3, false, false, &mut rng).unwrap();

        // f(x0,x1,x2) = x0³ + 3x1² − x2
        let mut poly = MultiPoly::zero(3);
        poly.add_term(vec![3, 0, 0], f(1));
        poly.add_term(vec![0, 2, 0], f(3));
        poly.add_term(vec![0, 0, 1], -f(1));

        let point = [f(5), f(6), f(7)];
        let commitment = commit_g2(&pp, &poly).unwrap();
        let opening = open(&pp, &poly, &point).unwrap();
        assert_eq!(opening.value, poly.eval(&point));
        assert!(verify(&pp, &commitment, &opening, &point).unwrap());
    }

    #[test]
    fn univariate_commitment_verifies() {
        let mut rng = StdRng::seed_from_u64(42);
        let pp = keygen(3, 3, true, false, &mut rng).unwrap();

        // f = x0 + x1 + x2
        let mut poly = MultiPoly::zero(3);
        poly.add_term(vec![1, 0, 0], f(1));
        poly.add_term(vec![0, 1, 0], f(1));
        poly.add_term(vec![0, 0, 1], f(1));

        let point = [f(5), f(6), f(7)];
        let commitment = commit_g2(&pp, &poly).unwrap();
        let opening = open(&pp, &poly, &point).unwrap();
        assert!(verify(&pp, &commitment, &opening, &point).unwrap());
    }

    #[test]
    fn zk_sumcheck_commitment_verifies() {
        let mut rng = StdRng::seed_from_u64(43);
        let pp = keygen(3, 3, false, true, &mut rng).unwrap();

        // f = 1 + 2x0 + 3x0² + 4x1 + 5x1² + 6x2 + 7x2²
        let values: Vec<F> = (1..=7).map(f).collect();
        let point = [f(5), f(6), f(7)];

        let commitment = commit_zk_sumcheck(&pp, &values).unwrap();
        let opening = open_zk_sumcheck(&pp, &values, &point).unwrap();
        assert!(verify_zk_sumcheck(&pp, &commitment, &opening, &point).unwrap());
    }

    #[test]
    fn tampered_evaluation_is_rejected() {
        let mut rng = StdRng::seed_from_u64(44);
        let pp = keygen(2, 2, false, false, &mut rng).unwrap();
        let mut poly = MultiPoly::zero(2);
        poly.add_term(vec![1, 1], f(4));
        poly.add_term(vec![0, 1], f(9));

        let point = [f(3), f(8)];
        let commitment = commit_g2(&pp, &poly).unwrap();
        let mut opening = open(&pp, &poly, &point).unwrap();
        opening.value += f(1);
        assert!(!verify(&pp, &commitment, &opening, &point).unwrap());
    }

    #[test]
    fn commit_rejects_untabulated_monomials() {
        let mut rng = StdRng::seed_from_u64(45);
        let pp = keygen_sequential(2, 1, false, false, &mut rng).unwrap();
        let mut poly = MultiPoly::zero(2);
        poly.add_term(vec![2, 0], f(1));
        assert!(matches!(
            commit_g2(&pp, &poly),
            Err(MkzgError::MissingMonomial(_))
        ));
    }

    #[test]
    fn zk_helpers_reject_exponential_tables() {
        let mut rng = StdRng::seed_from_u64(46);
        let pp = keygen(2, 2, false, false, &mut rng).unwrap();
        let values: Vec<F> = (1..=5).map(f).collect();
        assert!(matches!(
            commit_zk_sumcheck(&pp, &values),
            Err(MkzgError::WrongParamsKind(PpKind::Exponential))
        ));
    }

    #[test]
    fn opening_codec_round_trips() {
        let mut rng = StdRng::seed_from_u64(47);
        let pp = keygen(3, 2, false, false, &mut rng).unwrap();
        let mut poly = MultiPoly::zero(3);
        poly.add_term(vec![1, 1, 0], f(2));
        poly.add_term(vec![0, 0, 2], f(5));
        let point = [f(2), f(3), f(4)];
        let opening = open(&pp, &poly, &point).unwrap();
        let bytes = opening.to_bytes();
        let back = Opening::from_bytes(&bytes, opening.value).unwrap();
        assert_eq!(back.quotients, opening.quotients);
        assert_eq!(back.last_quotient, opening.last_quotient);
        let commitment = commit_g2(&pp, &poly).unwrap();
        assert!(verify(&pp, &commitment, &back, &point).unwrap());
    }
}
