//! Fiat–Shamir transcript
//!
//! A duplex-sponge transcript built on Merlin (STROBE over Keccak-f[1600],
//! 200-byte state). Every absorb is label-framed by Merlin with a 4-byte
//! little-endian length, so the byte schedule is unambiguous; challenges are
//! squeezed from the sponge, reduced into the field big-endian, zero-rejected
//! and then re-absorbed under the same label so that both sides keep an
//! identical state.
//!
//! The transcript owns the [`ProofRecord`]: prover-side `append_*` calls both
//! absorb into the sponge and record the message, while the verifier uses the
//! `absorb_*` twins after reading each message back out of the record. The
//! two sides replay exactly the same absorb/challenge sequence; any deviation
//! desynchronizes every later challenge.

#![forbid(unsafe_code)]

use ark_ff::{PrimeField, Zero};

use crate::proof::{ProofLabel, ProofRecord};
use crate::F;

/// Bytes squeezed per challenge before the modular reduction.
const CHALLENGE_BYTES: usize = 64;

/// Fiat–Shamir transcript with an attached proof record.
pub struct Transcript {
    sponge: merlin::Transcript,
    record: ProofRecord,
}

impl Transcript {
    /// New transcript under a protocol `label` (domain separation).
    pub fn new(label: &'static [u8]) -> Self {
        Transcript {
            sponge: merlin::Transcript::new(label),
            record: ProofRecord::new(),
        }
    }

    // ------------------------------------------------------------------
    // Prover side: absorb + record
    // ------------------------------------------------------------------

    /// Absorb a field element and record it under `label`.
    pub fn append_scalar(&mut self, label: ProofLabel, v: &F) {
        let bytes = ProofRecord::scalar_bytes(v);
        self.record.push(label, bytes.clone());
        self.sponge.append_message(label.as_bytes(), &bytes);
    }

    /// Absorb a coefficient list element-by-element and record it as a
    /// single concatenated message.
    pub fn append_scalar_list(&mut self, label: ProofLabel, vs: &[F]) {
        let mut joined = Vec::with_capacity(vs.len() * 32);
        for v in vs {
            let bytes = ProofRecord::scalar_bytes(v);
            self.sponge.append_message(label.as_bytes(), &bytes);
            joined.extend_from_slice(&bytes);
        }
        self.record.push(label, joined);
    }

    /// Absorb opaque bytes (commitments, opening bundles) and record them.
    pub fn append_bytes(&mut self, label: ProofLabel, bytes: Vec<u8>) {
        self.sponge.append_message(label.as_bytes(), &bytes);
        self.record.push(label, bytes);
    }

    // ------------------------------------------------------------------
    // Verifier side: absorb only (the message came out of the record)
    // ------------------------------------------------------------------

    /// Absorb a field element without recording it.
    pub fn absorb_scalar(&mut self, label: ProofLabel, v: &F) {
        self.sponge
            .append_message(label.as_bytes(), &ProofRecord::scalar_bytes(v));
    }

    /// Absorb a coefficient list without recording it.
    pub fn absorb_scalar_list(&mut self, label: ProofLabel, vs: &[F]) {
        for v in vs {
            self.absorb_scalar(label, v);
        }
    }

    /// Absorb opaque bytes without recording them.
    pub fn absorb_bytes(&mut self, label: ProofLabel, bytes: &[u8]) {
        self.sponge.append_message(label.as_bytes(), bytes);
    }

    // ------------------------------------------------------------------
    // Challenges
    // ------------------------------------------------------------------

    /// Derive one nonzero field challenge under `label`.
    ///
    /// Squeezes 64 bytes, reduces big-endian mod `p`, and rejects zero (each
    /// rejection advances the sponge, so both sides skip the same draws).
    /// The accepted scalar is absorbed back under the same label; it is not
    /// recorded, since the verifier re-derives it.
    pub fn challenge_scalar(&mut self, label: ProofLabel) -> F {
        loop {
            let mut buf = [0u8; CHALLENGE_BYTES];
            self.sponge.challenge_bytes(label.as_bytes(), &mut buf);
            let candidate = F::from_be_bytes_mod_order(&buf);
            if !candidate.is_zero() {
                self.sponge
                    .append_message(label.as_bytes(), &ProofRecord::scalar_bytes(&candidate));
                return candidate;
            }
        }
    }

    /// Derive `n` independent challenges under `label`.
    pub fn challenge_scalars(&mut self, label: ProofLabel, n: usize) -> Vec<F> {
        (0..n).map(|_| self.challenge_scalar(label)).collect()
    }

    // ------------------------------------------------------------------
    // Record access
    // ------------------------------------------------------------------

    /// Borrow the accumulated record (prover side, for serialization).
    pub fn record(&self) -> &ProofRecord {
        &self.record
    }

    /// Take ownership of the record.
    pub fn into_record(self) -> ProofRecord {
        self.record
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::ProofLabel;
    use ark_ff::UniformRand;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn identical_schedules_yield_identical_challenges() {
        let mut rng = StdRng::seed_from_u64(31);
        let v = F::rand(&mut rng);

        let mut t1 = Transcript::new(b"zerok");
        t1.append_scalar(ProofLabel::AlphaBetaSum, &v);
        let a = t1.challenge_scalar(ProofLabel::Alpha);

        let mut t2 = Transcript::new(b"zerok");
        t2.absorb_scalar(ProofLabel::AlphaBetaSum, &v);
        let b = t2.challenge_scalar(ProofLabel::Alpha);

        assert_eq!(a, b);
    }

    #[test]
    fn different_labels_fork_the_challenge() {
        let mut rng = StdRng::seed_from_u64(32);
        let v = F::rand(&mut rng);

        let mut t1 = Transcript::new(b"zerok");
        t1.append_scalar(ProofLabel::VU, &v);
        let a = t1.challenge_scalar(ProofLabel::Alpha);

        let mut t2 = Transcript::new(b"zerok");
        t2.append_scalar(ProofLabel::VV, &v);
        let b = t2.challenge_scalar(ProofLabel::Alpha);

        assert_ne!(a, b);
    }

    #[test]
    fn challenges_are_nonzero_and_sequential_draws_differ() {
        let mut t = Transcript::new(b"zerok");
        let xs = t.challenge_scalars(ProofLabel::R0, 8);
        for x in &xs {
            assert!(!x.is_zero());
        }
        assert_ne!(xs[0], xs[1]);
    }

    #[test]
    fn list_absorption_matches_elementwise_absorption() {
        let mut rng = StdRng::seed_from_u64(33);
        let coeffs = [F::rand(&mut rng), F::rand(&mut rng), F::rand(&mut rng)];

        let mut t1 = Transcript::new(b"zerok");
        t1.append_scalar_list(ProofLabel::Phase1, &coeffs);
        let a = t1.challenge_scalar(ProofLabel::RU);

        let mut t2 = Transcript::new(b"zerok");
        t2.absorb_scalar_list(ProofLabel::Phase1, &coeffs);
        let b = t2.challenge_scalar(ProofLabel::RU);

        assert_eq!(a, b);
    }
}
