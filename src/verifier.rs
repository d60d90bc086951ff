//! Transcript-replaying verifier
//!
//! The verifier holds the compiled circuit and a serialized proof record.
//! It re-derives every challenge in exactly the prover's order — consistency
//! hangs on absorbing every read message before drawing the next challenge —
//! and replays the claim chain layer by layer:
//!
//! - each phase-1 round message must satisfy `p(0) + p(1) = claim`, after
//!   which the claim becomes `p(r_u[j])`;
//! - each phase-2 round deducts the direct-relay contribution (round 0 by
//!   convention carries it inside the claim already);
//! - the final-round message is checked against the claim, the absorbed
//!   direct-relay value is checked against the verifier's own recomputation,
//!   and the message's linear coefficient is checked against
//!   `add·(v_u+v_v) + mult·v_u·v_v + drelay·v_u + relay·v_u`, with the
//!   `add`/`mult`/`relay` predicate extensions rebuilt from the compiled
//!   circuit at the fully-bound point — this gate-level recomputation and
//!   the closing input fold are the verifier's only non-transcript work;
//! - when mask commitments ride along, each layer's two
//!   `(commitment, openings, evaluation)` triples are checked against the
//!   commitment scheme.
//!
//! After the last layer the claim must equal both the absorbed `input` value
//! and the verifier's own multilinear fold of the input gates. Any failed
//! check rejects the whole proof; there is no partial acceptance.

#![forbid(unsafe_code)]

use ark_ff::{Field, One, Zero};
use ark_serialize::CanonicalDeserialize;

use crate::circuit::{fold_multilinear, GateType, LayeredCircuit};
use crate::mkzg::{self, MaskBinding, MkzgError, Opening};
use crate::poly::RoundPoly;
use crate::proof::{ProofError, ProofLabel, ProofRecord};
use crate::transcript::Transcript;
use crate::{G2Affine, F};

/// Which check rejected the proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStage {
    /// A phase-1 round identity failed at this bit.
    Phase1 {
        /// Zero-based round index.
        bit: usize,
    },
    /// A phase-2 round identity failed at this bit.
    Phase2 {
        /// Zero-based round index.
        bit: usize,
    },
    /// The final GKR round identity failed.
    FinalRound,
    /// The final-round message disagrees with the layer's gate wiring.
    GateWiring,
    /// The absorbed direct-relay value disagrees with the circuit.
    DirectRelay,
    /// A mask commitment opening failed to verify.
    MaskOpening,
    /// The input-layer fold disagrees with the claim chain.
    InputLayer,
}

impl std::fmt::Display for CheckStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStage::Phase1 { bit } => write!(f, "phase 1 round {bit}"),
            CheckStage::Phase2 { bit } => write!(f, "phase 2 round {bit}"),
            CheckStage::FinalRound => write!(f, "final GKR round"),
            CheckStage::GateWiring => write!(f, "final-round gate-wiring recomputation"),
            CheckStage::DirectRelay => write!(f, "direct-relay recomputation"),
            CheckStage::MaskOpening => write!(f, "mask commitment opening"),
            CheckStage::InputLayer => write!(f, "input-layer fold"),
        }
    }
}

/// Errors raised while verifying.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// A protocol check failed at a specific layer and stage.
    #[error("verification failure at layer {layer}: {stage}")]
    VerificationFailure {
        /// Layer being checked when the failure occurred.
        layer: usize,
        /// The specific check that failed.
        stage: CheckStage,
    },
    /// The proof record was exhausted or malformed.
    #[error(transparent)]
    Proof(#[from] ProofError),
    /// A mask commitment bundle failed to decode or verify.
    #[error(transparent)]
    Mkzg(#[from] MkzgError),
}

/// The GKR verifier.
pub struct ZkVerifier<'a> {
    circuit: &'a LayeredCircuit,
    binding: Option<MaskBinding>,
    transcript: Transcript,
    r_0: Vec<F>,
    r_1: Vec<F>,
    r_u: Vec<F>,
    r_v: Vec<F>,
    one_minus_r_0: Vec<F>,
    one_minus_r_1: Vec<F>,
    one_minus_r_u: Vec<F>,
    one_minus_r_v: Vec<F>,
    pre_u1: F,

    // Full beta tables for the final-round predicate recomputation.
    beta_g_r0: Vec<F>,
    beta_g_r1: Vec<F>,
    beta_u: Vec<F>,
    beta_v: Vec<F>,
}

impl<'a> ZkVerifier<'a> {
    /// Verifier over `circuit`.
    pub fn new(circuit: &'a LayeredCircuit) -> Self {
        ZkVerifier {
            circuit,
            binding: None,
            transcript: Transcript::new(b"zerok"),
            r_0: Vec::new(),
            r_1: Vec::new(),
            r_u: Vec::new(),
            r_v: Vec::new(),
            one_minus_r_0: Vec::new(),
            one_minus_r_1: Vec::new(),
            one_minus_r_u: Vec::new(),
            one_minus_r_v: Vec::new(),
            pre_u1: F::zero(),
            beta_g_r0: Vec::new(),
            beta_g_r1: Vec::new(),
            beta_u: Vec::new(),
            beta_v: Vec::new(),
        }
    }

    /// Attach the mask-commitment parameters the prover used.
    pub fn with_mask_binding(mut self, binding: MaskBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Verify a serialized proof, collapsing every failure to `false`.
    pub fn run(&mut self, proof_bytes: &[u8]) -> bool {
        match self.run_checked(proof_bytes) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(%err, "proof rejected");
                false
            }
        }
    }

    /// Verify a serialized proof, reporting which check failed.
    pub fn run_checked(&mut self, proof_bytes: &[u8]) -> Result<(), VerifierError> {
        let mut record = ProofRecord::from_bytes(proof_bytes)?;
        let depth = self.circuit.total_depth();
        let full = 1usize << self.circuit.max_bit_length();
        self.beta_g_r0 = vec![F::zero(); full];
        self.beta_g_r1 = vec![F::zero(); full];
        self.beta_u = vec![F::zero(); full];
        self.beta_v = vec![F::zero(); full];

        let mut alpha = F::one();
        let mut beta = F::zero();

        let out_bits = self.circuit.layers[depth - 1].bit_len();
        self.r_0 = self.transcript.challenge_scalars(ProofLabel::R0, out_bits);
        self.r_1 = self.transcript.challenge_scalars(ProofLabel::R1, out_bits);
        self.one_minus_r_0 = self.r_0.iter().map(|r| F::one() - r).collect();
        self.one_minus_r_1 = self.r_1.iter().map(|r| F::one() - r).collect();

        let mut alpha_beta_sum = F::zero();
        for i in (1..depth).rev() {
            let previous_bits = self.circuit.layers[i - 1].bit_len();
            let _rho = self.transcript.challenge_scalar(ProofLabel::Rho);

            alpha_beta_sum = record.next_scalar(ProofLabel::AlphaBetaSum)?;
            self.transcript
                .absorb_scalar(ProofLabel::AlphaBetaSum, &alpha_beta_sum);

            self.r_u = self
                .transcript
                .challenge_scalars(ProofLabel::RU, previous_bits);
            self.r_v = self
                .transcript
                .challenge_scalars(ProofLabel::RV, previous_bits);
            self.one_minus_r_u = self.r_u.iter().map(|r| F::one() - r).collect();
            self.one_minus_r_v = self.r_v.iter().map(|r| F::one() - r).collect();

            let direct_relay_value = record.next_scalar(ProofLabel::DirectRelayValue)?;
            self.transcript
                .absorb_scalar(ProofLabel::DirectRelayValue, &direct_relay_value);
            let r_c = self.transcript.challenge_scalar(ProofLabel::RC);

            self.check_mask_openings(&mut record, i, r_c)?;

            // The direct-relay extension is a closed form over the
            // challenges; the absorbed value must match it.
            let expected_drelay = alpha * self.direct_relay(i, &self.r_0, &self.r_u)
                + beta * self.direct_relay(i, &self.r_1, &self.r_u);
            if direct_relay_value != expected_drelay {
                return Err(VerifierError::VerificationFailure {
                    layer: i,
                    stage: CheckStage::DirectRelay,
                });
            }

            // Phase 1: bind the u bits.
            for j in 0..previous_bits {
                let poly = record.next_round_poly(ProofLabel::Phase1)?;
                self.transcript
                    .absorb_scalar_list(ProofLabel::Phase1, &poly.coefficients());
                if poly.eval(F::zero()) + poly.eval(F::one()) != alpha_beta_sum {
                    return Err(VerifierError::VerificationFailure {
                        layer: i,
                        stage: CheckStage::Phase1 { bit: j },
                    });
                }
                alpha_beta_sum = poly.eval(self.r_u[j]);
            }

            // Phase 2: bind the v bits; each round carries the direct-relay
            // share of v_u alongside its message.
            for j in 0..previous_bits {
                let poly = record.next_round_poly(ProofLabel::Phase2)?;
                let vu_term = record.next_scalar(ProofLabel::VU)?;
                self.transcript
                    .absorb_scalar_list(ProofLabel::Phase2, &poly.coefficients());
                self.transcript.absorb_scalar(ProofLabel::VU, &vu_term);
                let hypercube = poly.eval(F::zero()) + poly.eval(F::one());
                let consistent = if j == 0 {
                    hypercube == alpha_beta_sum
                } else {
                    hypercube + vu_term == alpha_beta_sum
                };
                if !consistent {
                    return Err(VerifierError::VerificationFailure {
                        layer: i,
                        stage: CheckStage::Phase2 { bit: j },
                    });
                }
                alpha_beta_sum = poly.eval(self.r_v[j]) + vu_term;
            }

            // Final GKR round.
            let v_u = record.next_scalar(ProofLabel::VU)?;
            let v_v = record.next_scalar(ProofLabel::VV)?;
            self.transcript.absorb_scalar(ProofLabel::VU, &v_u);
            self.transcript.absorb_scalar(ProofLabel::VV, &v_v);
            let final_poly = record.next_round_poly(ProofLabel::FinalGkrRound)?;
            let drelay_final = record.next_scalar(ProofLabel::VUDirectRelay)?;
            self.transcript
                .absorb_scalar_list(ProofLabel::FinalGkrRound, &final_poly.coefficients());
            self.transcript
                .absorb_scalar(ProofLabel::VUDirectRelay, &drelay_final);

            if drelay_final != expected_drelay {
                return Err(VerifierError::VerificationFailure {
                    layer: i,
                    stage: CheckStage::DirectRelay,
                });
            }

            let hypercube = final_poly.eval(F::zero()) + final_poly.eval(F::one());
            let expected = if i == 1 {
                hypercube
            } else {
                hypercube + drelay_final * v_u
            };
            if alpha_beta_sum != expected {
                return Err(VerifierError::VerificationFailure {
                    layer: i,
                    stage: CheckStage::FinalRound,
                });
            }

            // Gate-level recomputation: rebuild the add/mult/relay predicate
            // extensions from the compiled circuit at the fully-bound point
            // and hold the message's linear coefficient to the wiring
            // combination. Final-round messages are always quadratic.
            self.beta_init(i, alpha, beta);
            let add_value = self.predicate_sum(i, GateType::Add);
            let mult_value = self.predicate_sum(i, GateType::Mul);
            let relay_value = self.predicate_sum(i, GateType::Relay);
            let expected_wiring = add_value * (v_u + v_v)
                + mult_value * v_u * v_v
                + drelay_final * v_u
                + relay_value * v_u;
            let linear_coeff = match final_poly {
                RoundPoly::Quadratic(p) => p.b,
                RoundPoly::Quintic(_) => {
                    return Err(VerifierError::VerificationFailure {
                        layer: i,
                        stage: CheckStage::GateWiring,
                    })
                }
            };
            if linear_coeff != expected_wiring {
                return Err(VerifierError::VerificationFailure {
                    layer: i,
                    stage: CheckStage::GateWiring,
                });
            }

            alpha = self.transcript.challenge_scalar(ProofLabel::Alpha);
            beta = self.transcript.challenge_scalar(ProofLabel::Beta);
            alpha_beta_sum = if i != 1 {
                alpha * v_u + beta * v_v
            } else {
                v_u
            };
            self.pre_u1 = self.r_u[previous_bits - 1];
            self.r_0 = self.r_u.clone();
            self.r_1 = self.r_v.clone();
            self.one_minus_r_0 = self.r_0.iter().map(|r| F::one() - r).collect();
            self.one_minus_r_1 = self.r_1.iter().map(|r| F::one() - r).collect();
        }

        self.check_input_layer(&mut record, alpha_beta_sum)?;

        // Every recorded message must have been consumed; trailing data is
        // not an honest transcript.
        if record.remaining() != 0 {
            return Err(VerifierError::Proof(ProofError::Malformed(
                "unconsumed transcript messages",
            )));
        }
        Ok(())
    }

    /// Rebuild the full beta tables at `(α@r_0, β@r_1)` and `(r_u, r_v)`.
    fn beta_init(&mut self, depth: usize, alpha: F, beta: F) {
        self.beta_g_r0[0] = alpha;
        self.beta_g_r1[0] = beta;
        for i in 0..self.circuit.layers[depth].bit_len() {
            for j in 0..(1usize << i) {
                let hi = j | (1 << i);
                self.beta_g_r0[hi] = self.beta_g_r0[j] * self.r_0[i];
                self.beta_g_r1[hi] = self.beta_g_r1[j] * self.r_1[i];
            }
            for j in 0..(1usize << i) {
                self.beta_g_r0[j] *= self.one_minus_r_0[i];
                self.beta_g_r1[j] *= self.one_minus_r_1[i];
            }
        }
        self.beta_u[0] = F::one();
        self.beta_v[0] = F::one();
        for i in 0..self.circuit.layers[depth - 1].bit_len() {
            for j in 0..(1usize << i) {
                let hi = j | (1 << i);
                self.beta_u[hi] = self.beta_u[j] * self.r_u[i];
                self.beta_v[hi] = self.beta_v[j] * self.r_v[i];
            }
            for j in 0..(1usize << i) {
                self.beta_u[j] *= self.one_minus_r_u[i];
                self.beta_v[j] *= self.one_minus_r_v[i];
            }
        }
    }

    /// Predicate extension of one gate type at the fully-bound point.
    fn predicate_sum(&self, depth: usize, wanted: GateType) -> F {
        let mut ret = F::zero();
        for i in 0..(1usize << self.circuit.layers[depth].bit_len()) {
            let gate = &self.circuit.layers[depth].gates[i];
            if gate.ty == wanted {
                ret += (self.beta_g_r0[i] + self.beta_g_r1[i])
                    * self.beta_u[gate.u as usize]
                    * self.beta_v[gate.v as usize];
            }
        }
        ret
    }

    /// Closed-form direct-relay extension; nonzero only for the layer that
    /// copies inputs.
    fn direct_relay(&self, depth: usize, r_g: &[F], r_u: &[F]) -> F {
        if depth != 1 {
            return F::zero();
        }
        let mut ret = F::one();
        for i in 0..self.circuit.layers[depth].bit_len() {
            ret *= F::one() - r_g[i] - r_u[i] + (r_g[i] * r_u[i]).double();
        }
        ret
    }

    /// Read and verify the two mask-commitment triples for this layer.
    fn check_mask_openings(
        &mut self,
        record: &mut ProofRecord,
        layer: usize,
        r_c: F,
    ) -> Result<(), VerifierError> {
        let binding = match self.binding.clone() {
            Some(b) => b,
            None => return Ok(()),
        };

        let r_comm_bytes = record.next(ProofLabel::RandomRCommitment)?;
        let r_open_bytes = record.next(ProofLabel::RandomROpenings)?;
        let r_eval = record.next_scalar(ProofLabel::RandomREvaluation)?;
        self.transcript
            .absorb_bytes(ProofLabel::RandomRCommitment, &r_comm_bytes);
        self.transcript
            .absorb_bytes(ProofLabel::RandomROpenings, &r_open_bytes);
        self.transcript
            .absorb_scalar(ProofLabel::RandomREvaluation, &r_eval);

        let r_comm = G2Affine::deserialize_compressed(r_comm_bytes.as_slice())
            .map_err(|_| MkzgError::MalformedOpening("bad G2 commitment"))?;
        let r_opening = Opening::from_bytes(&r_open_bytes, r_eval)?;
        let r_point = [self.pre_u1, r_c];
        if !mkzg::verify_random_r(&binding.r_params, &r_comm, &r_opening, &r_point)? {
            return Err(VerifierError::VerificationFailure {
                layer,
                stage: CheckStage::MaskOpening,
            });
        }

        let m_comm_bytes = record.next(ProofLabel::MaskpolyCommitment)?;
        let m_open_bytes = record.next(ProofLabel::MaskpolyOpenings)?;
        let m_eval = record.next_scalar(ProofLabel::MaskpolyEvaluation)?;
        self.transcript
            .absorb_bytes(ProofLabel::MaskpolyCommitment, &m_comm_bytes);
        self.transcript
            .absorb_bytes(ProofLabel::MaskpolyOpenings, &m_open_bytes);
        self.transcript
            .absorb_scalar(ProofLabel::MaskpolyEvaluation, &m_eval);

        let m_comm = G2Affine::deserialize_compressed(m_comm_bytes.as_slice())
            .map_err(|_| MkzgError::MalformedOpening("bad G2 commitment"))?;
        let m_opening = Opening::from_bytes(&m_open_bytes, m_eval)?;
        let zk_vars = binding.zk_vars();
        let mut point = Vec::with_capacity(zk_vars);
        point.extend_from_slice(&self.r_u);
        point.extend_from_slice(&self.r_v);
        point.push(r_c);
        point.resize(zk_vars, F::zero());
        if !mkzg::verify_zk_sumcheck(&binding.zk_params, &m_comm, &m_opening, &point)? {
            return Err(VerifierError::VerificationFailure {
                layer,
                stage: CheckStage::MaskOpening,
            });
        }
        Ok(())
    }

    /// Read the closing `input` value, recompute the fold, check both.
    fn check_input_layer(
        &mut self,
        record: &mut ProofRecord,
        claim: F,
    ) -> Result<(), VerifierError> {
        let layer0 = &self.circuit.layers[0];
        let mut inputs = Vec::with_capacity(layer0.len());
        for gate in &layer0.gates {
            if gate.ty != GateType::Input {
                return Err(VerifierError::VerificationFailure {
                    layer: 0,
                    stage: CheckStage::InputLayer,
                });
            }
            inputs.push(gate.c);
        }
        let input_read = record.next_scalar(ProofLabel::Input)?;
        self.transcript.absorb_scalar(ProofLabel::Input, &input_read);

        let folded = fold_multilinear(&self.r_0, &self.one_minus_r_0, &inputs);
        if input_read != claim || input_read != folded {
            return Err(VerifierError::VerificationFailure {
                layer: 0,
                stage: CheckStage::InputLayer,
            });
        }
        Ok(())
    }
}
