//! Label-addressed proof record (the proof's wire format)
//!
//! The prover's side of the Fiat–Shamir channel produces an ordered stream of
//! messages per label; the verifier consumes each label strictly first-in
//! first-out. The record is that mapping plus a deterministic byte codec:
//!
//! ```text
//! magic "ZKGPROOF" | u16 version | per label in declaration order:
//!     u32 message count | (u32 length | bytes)*
//! ```
//!
//! Field elements travel as 32-byte big-endian; coefficient lists as the
//! concatenation of their elements; group data as opaque byte strings whose
//! encoding is owned by the commitment module. Challenge draws are *not*
//! recorded — both sides re-derive them from the sponge, so recording them
//! would only add bytes the verifier never reads.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::{BigInteger, PrimeField};
use std::collections::VecDeque;

use crate::poly::RoundPoly;
use crate::F;

/// File magic for serialized proof records.
const PROOF_MAGIC: &[u8; 8] = b"ZKGPROOF";
/// Record format version.
const PROOF_VERSION: u16 = 1;

/// Transcript labels. The declaration order is the serialization order and
/// is part of the wire format; append only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofLabel {
    Phase1,
    Phase2,
    FinalGkrRound,
    AlphaBetaSum,
    VU,
    VV,
    VUDirectRelay,
    DirectRelayValue,
    Input,
    R0,
    R1,
    RU,
    RV,
    Alpha,
    Beta,
    Rho,
    RC,
    RandomRCommitment,
    RandomROpenings,
    RandomREvaluation,
    MaskpolyCommitment,
    MaskpolyOpenings,
    MaskpolyEvaluation,
}

/// All labels in declaration order.
pub const ALL_LABELS: [ProofLabel; 23] = [
    ProofLabel::Phase1,
    ProofLabel::Phase2,
    ProofLabel::FinalGkrRound,
    ProofLabel::AlphaBetaSum,
    ProofLabel::VU,
    ProofLabel::VV,
    ProofLabel::VUDirectRelay,
    ProofLabel::DirectRelayValue,
    ProofLabel::Input,
    ProofLabel::R0,
    ProofLabel::R1,
    ProofLabel::RU,
    ProofLabel::RV,
    ProofLabel::Alpha,
    ProofLabel::Beta,
    ProofLabel::Rho,
    ProofLabel::RC,
    ProofLabel::RandomRCommitment,
    ProofLabel::RandomROpenings,
    ProofLabel::RandomREvaluation,
    ProofLabel::MaskpolyCommitment,
    ProofLabel::MaskpolyOpenings,
    ProofLabel::MaskpolyEvaluation,
];

impl ProofLabel {
    /// Stable byte string used for sponge domain separation.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            ProofLabel::Phase1 => b"phase_1",
            ProofLabel::Phase2 => b"phase_2",
            ProofLabel::FinalGkrRound => b"final_gkr_round",
            ProofLabel::AlphaBetaSum => b"alpha_beta_sum",
            ProofLabel::VU => b"v_u",
            ProofLabel::VV => b"v_v",
            ProofLabel::VUDirectRelay => b"v_u_direct_relay",
            ProofLabel::DirectRelayValue => b"direct_relay_value",
            ProofLabel::Input => b"input",
            ProofLabel::R0 => b"r_0",
            ProofLabel::R1 => b"r_1",
            ProofLabel::RU => b"r_u",
            ProofLabel::RV => b"r_v",
            ProofLabel::Alpha => b"alpha",
            ProofLabel::Beta => b"beta",
            ProofLabel::Rho => b"rho",
            ProofLabel::RC => b"r_c",
            ProofLabel::RandomRCommitment => b"random_r_commitment",
            ProofLabel::RandomROpenings => b"random_r_openings",
            ProofLabel::RandomREvaluation => b"random_r_evaluation",
            ProofLabel::MaskpolyCommitment => b"maskpoly_commitment",
            ProofLabel::MaskpolyOpenings => b"maskpoly_openings",
            ProofLabel::MaskpolyEvaluation => b"maskpoly_evaluation",
        }
    }

    #[inline]
    fn index(&self) -> usize {
        ALL_LABELS.iter().position(|l| l == self).unwrap_or(0)
    }
}

/// Errors raised while consuming or decoding a proof record.
#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    /// The verifier asked for a label whose queue is empty.
    #[error("transcript exhausted for label `{0}`")]
    TranscriptExhausted(&'static str),
    /// The serialized record is structurally invalid.
    #[error("malformed proof record: {0}")]
    Malformed(&'static str),
}

/// Ordered, label-addressed message queues.
#[derive(Debug, Clone, Default)]
pub struct ProofRecord {
    queues: Vec<VecDeque<Vec<u8>>>,
}

impl ProofRecord {
    /// Empty record with one queue per label.
    pub fn new() -> Self {
        ProofRecord {
            queues: (0..ALL_LABELS.len()).map(|_| VecDeque::new()).collect(),
        }
    }

    /// Append a message under `label`.
    pub fn push(&mut self, label: ProofLabel, message: Vec<u8>) {
        self.queues[label.index()].push_back(message);
    }

    /// Pop the next message under `label`, first-appended first.
    pub fn next(&mut self, label: ProofLabel) -> Result<Vec<u8>, ProofError> {
        self.queues[label.index()]
            .pop_front()
            .ok_or(ProofError::TranscriptExhausted(label_name(label)))
    }

    /// Pop and decode a single field element.
    pub fn next_scalar(&mut self, label: ProofLabel) -> Result<F, ProofError> {
        let bytes = self.next(label)?;
        if bytes.len() != 32 {
            return Err(ProofError::Malformed("scalar message is not 32 bytes"));
        }
        Ok(F::from_be_bytes_mod_order(&bytes))
    }

    /// Pop and decode a coefficient list (concatenated 32-byte scalars).
    pub fn next_scalar_list(&mut self, label: ProofLabel) -> Result<Vec<F>, ProofError> {
        let bytes = self.next(label)?;
        if bytes.is_empty() || bytes.len() % 32 != 0 {
            return Err(ProofError::Malformed("scalar list length not a multiple of 32"));
        }
        Ok(bytes
            .chunks_exact(32)
            .map(F::from_be_bytes_mod_order)
            .collect())
    }

    /// Pop and decode a sumcheck round message; the coefficient count (3 or
    /// 6) selects the degree.
    pub fn next_round_poly(&mut self, label: ProofLabel) -> Result<RoundPoly, ProofError> {
        let coeffs = self.next_scalar_list(label)?;
        RoundPoly::from_coefficients(&coeffs)
            .ok_or(ProofError::Malformed("round polynomial must have 3 or 6 coefficients"))
    }

    /// Serialize field element bytes (32-byte big-endian) for recording.
    pub fn scalar_bytes(v: &F) -> Vec<u8> {
        v.into_bigint().to_bytes_be()
    }

    /// Number of messages not yet consumed, across all labels.
    pub fn remaining(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    // ------------------------------------------------------------------
    // Wire codec
    // ------------------------------------------------------------------

    /// Deterministic byte encoding of the whole record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(PROOF_MAGIC);
        out.extend_from_slice(&PROOF_VERSION.to_le_bytes());
        for queue in &self.queues {
            out.extend_from_slice(&(queue.len() as u32).to_le_bytes());
            for msg in queue {
                out.extend_from_slice(&(msg.len() as u32).to_le_bytes());
                out.extend_from_slice(msg);
            }
        }
        out
    }

    /// Decode a record produced by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProofError> {
        fn take<'a>(
            data: &'a [u8],
            cursor: &mut usize,
            n: usize,
        ) -> Result<&'a [u8], ProofError> {
            let end = cursor
                .checked_add(n)
                .ok_or(ProofError::Malformed("length overflow"))?;
            if end > data.len() {
                return Err(ProofError::Malformed("record truncated"));
            }
            let slice = &data[*cursor..end];
            *cursor = end;
            Ok(slice)
        }
        fn read_u32(data: &[u8], cursor: &mut usize) -> Result<u32, ProofError> {
            let bytes = take(data, cursor, 4)?;
            Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
        }

        let mut cursor = 0usize;
        if take(data, &mut cursor, 8)? != PROOF_MAGIC {
            return Err(ProofError::Malformed("bad magic"));
        }
        let version_bytes = take(data, &mut cursor, 2)?;
        let version = u16::from_le_bytes(version_bytes.try_into().expect("2 bytes"));
        if version != PROOF_VERSION {
            return Err(ProofError::Malformed("unsupported version"));
        }

        let mut record = ProofRecord::new();
        for queue in record.queues.iter_mut() {
            let count = read_u32(data, &mut cursor)?;
            for _ in 0..count {
                let len = read_u32(data, &mut cursor)?;
                queue.push_back(take(data, &mut cursor, len as usize)?.to_vec());
            }
        }
        if cursor != data.len() {
            return Err(ProofError::Malformed("trailing bytes"));
        }
        Ok(record)
    }
}

fn label_name(label: ProofLabel) -> &'static str {
    // Safe: every label string is valid UTF-8.
    std::str::from_utf8(label.as_bytes()).unwrap_or("unknown")
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
    fn fifo_order_per_label() {
        let mut rec = ProofRecord::new();
        rec.push(ProofLabel::VU, vec![1]);
        rec.push(ProofLabel::VU, vec![2]);
        rec.push(ProofLabel::VV, vec![3]);
        assert_eq!(rec.next(ProofLabel::VU).unwrap(), vec![1]);
        assert_eq!(rec.next(ProofLabel::VV).unwrap(), vec![3]);
        assert_eq!(rec.next(ProofLabel::VU).unwrap(), vec![2]);
        assert!(matches!(
            rec.next(ProofLabel::VU),
            Err(ProofError::TranscriptExhausted(_))
        ));
    }

    #[test]
    fn codec_round_trips() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut rec = ProofRecord::new();
        for _ in 0..3 {
            rec.push(
                ProofLabel::Phase1,
                [F::rand(&mut rng), F::rand(&mut rng), F::rand(&mut rng)]
                    .iter()
                    .flat_map(ProofRecord::scalar_bytes)
                    .collect(),
            );
        }
        rec.push(ProofLabel::Input, ProofRecord::scalar_bytes(&F::rand(&mut rng)));

        let bytes = rec.to_bytes();
        let mut back = ProofRecord::from_bytes(&bytes).unwrap();
        for _ in 0..3 {
            let coeffs = back.next_scalar_list(ProofLabel::Phase1).unwrap();
            assert_eq!(coeffs.len(), 3);
        }
        assert!(back.next_scalar(ProofLabel::Input).is_ok());
    }

    #[test]
    fn rejects_corrupt_framing() {
        let rec = ProofRecord::new();
        let mut bytes = rec.to_bytes();
        bytes[0] ^= 0xFF;
        assert!(ProofRecord::from_bytes(&bytes).is_err());
        let bytes = rec.to_bytes();
        assert!(ProofRecord::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn scalar_round_trip_is_big_endian_32_bytes() {
        let mut rng = StdRng::seed_from_u64(22);
        let v = F::rand(&mut rng);
        let bytes = ProofRecord::scalar_bytes(&v);
        assert_eq!(bytes.len(), 32);
        assert_eq!(F::from_be_bytes_mod_order(&bytes), v);
    }
}
