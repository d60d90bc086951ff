//! Zero-knowledge GKR prover
//!
//! Runs the interactive GKR protocol over a compiled layered circuit with a
//! Libra-style zero-knowledge two-phase sumcheck per layer, driving the
//! Fiat–Shamir transcript that the verifier later replays.
//!
//! Per layer, top down:
//!
//! 1. a masking polynomial (degree two per variable plus six boundary
//!    coefficients) and the six-coefficient `maskR` vector are drawn and
//!    scaled by the transcript challenge `ρ`; the perturbed claim
//!    `claim + Σ mask` is absorbed;
//! 2. **phase 1** binds the `u` bits: each round combines three linear
//!    bookkeeping tables (`v_mult_add`, `add_v_array`, `add_mult_sum`) into
//!    a quadratic round message, extended by the running mask sums; the last
//!    round picks up the degree-five boundary terms;
//! 3. **phase 2** binds the `v` bits with the same shape, deducting the
//!    direct-relay contribution from the claim;
//! 4. the **final round** message carries
//!    `add·(v_u+v_v) + mult·v_u·v_v + drelay·v_u + relay·v_u`
//!    on its linear coefficient (mask terms occupy the quadratic and
//!    constant coefficients), so the verifier can recompute that wiring
//!    combination from the circuit and hold the message to it; fresh
//!    `α, β` then fold the two boundary claims into the next layer's claim.
//!
//! Every round identity `p(0) + p(1) = claim` is checked as it is emitted; a
//! failure indicates a prover bug, never a property of the input, and aborts
//! without producing a transcript.
//!
//! The input layer is deliberately left unmasked: the compiled circuit —
//! including its input values — is public to the verifier, so masking the
//! final `V₀(r_u)` fold would hide nothing and would break the verifier's
//! recomputation of that fold.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::{Field, One, UniformRand, Zero};
use ark_serialize::CanonicalSerialize;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::circuit::{fold_multilinear, GateType, LayeredCircuit};
use crate::mkzg::{self, MaskBinding, MkzgError};
use crate::poly::{interpolate, LinearPoly, QuadraticPoly, QuinticPoly, RoundPoly};
use crate::proof::ProofLabel;
use crate::transcript::Transcript;
use crate::F;

/// Errors raised while proving.
#[derive(Debug, thiserror::Error)]
pub enum ProverError {
    /// A gate references an operand outside the previous layer.
    #[error("invalid circuit: gate {gate} in layer {layer} references a missing operand")]
    Connectivity { layer: usize, gate: usize },
    /// A gate type the evaluator cannot execute at this position.
    #[error("unsupported gate type {ty:?} at layer {layer}")]
    UnsupportedGate { layer: usize, ty: GateType },
    /// A sumcheck round identity failed; this is a prover bug.
    #[error("prover logic error at layer {layer} ({stage}): round identity failed")]
    Logic { layer: usize, stage: &'static str },
    /// Mask commitment machinery failed.
    #[error(transparent)]
    Mkzg(#[from] MkzgError),
}

/// Scratch coefficients for one sumcheck round message.
///
/// `a, b, c` accumulate the quadratic part; `d, e, f` pick up the
/// degree-5/4/3 boundary terms of the phase-closing rounds.
#[derive(Debug, Clone, Copy, Default)]
struct RoundAcc {
    a: F,
    b: F,
    c: F,
    d: F,
    e: F,
    f: F,
}

/// The zero-knowledge GKR prover.
pub struct ZkProver<'a> {
    circuit: &'a LayeredCircuit,
    rng: StdRng,
    binding: Option<MaskBinding>,
    transcript: Transcript,

    circuit_value: Vec<Vec<F>>,

    // Sumcheck window.
    sumcheck_layer_id: usize,
    length_g: usize,
    length_u: usize,
    length_v: usize,
    total_uv: usize,
    alpha: F,
    beta: F,
    r_0: Vec<F>,
    r_1: Vec<F>,
    r_u: Vec<F>,
    r_v: Vec<F>,
    one_minus_r_0: Vec<F>,
    one_minus_r_1: Vec<F>,
    one_minus_r_u: Vec<F>,
    one_minus_r_v: Vec<F>,

    // Linear bookkeeping tables.
    v_mult_add: Vec<LinearPoly>,
    add_v_array: Vec<LinearPoly>,
    add_mult_sum: Vec<LinearPoly>,

    // Split beta tables for the two phases.
    beta_g_r0_fhalf: Vec<F>,
    beta_g_r0_shalf: Vec<F>,
    beta_g_r1_fhalf: Vec<F>,
    beta_g_r1_shalf: Vec<F>,
    beta_u_fhalf: Vec<F>,
    beta_u_shalf: Vec<F>,

    // Full beta tables for the final-round predicate evaluations.
    beta_g_r0: Vec<F>,
    beta_g_r1: Vec<F>,
    beta_u: Vec<F>,
    beta_v: Vec<F>,

    // Boundary values.
    v_u: F,
    v_v: F,

    // Masking state.
    inv_2: F,
    rho: F,
    maskpoly: Vec<F>,
    maskpoly_sumc: F,
    maskpoly_sumr: F,
    mask_r: [F; 6],
    mask_r_sumcu: F,
    mask_r_sumcv: F,
    z_u: F,
    z_v: F,
    pre_z_u: F,
    pre_z_v: F,
    i_uv: F,
    pre_u1: F,
    pre_v1: F,
    r_g1: QuadraticPoly,
    r_g2: QuadraticPoly,
    sum_r_c: QuadraticPoly,
}

impl<'a> ZkProver<'a> {
    /// Prover over `circuit` with entropy-seeded masking randomness.
    pub fn new(circuit: &'a LayeredCircuit) -> Self {
        Self::with_rng(circuit, StdRng::from_entropy())
    }

    /// Prover with caller-supplied randomness; a fixed seed makes the whole
    /// transcript reproducible byte-for-byte.
    pub fn with_rng(circuit: &'a LayeredCircuit, rng: StdRng) -> Self {
        ZkProver {
            circuit,
            rng,
            binding: None,
            transcript: Transcript::new(b"zerok"),
            circuit_value: Vec::new(),
            sumcheck_layer_id: 0,
            length_g: 0,
            length_u: 0,
            length_v: 0,
            total_uv: 0,
            alpha: F::one(),
            beta: F::zero(),
            r_0: Vec::new(),
            r_1: Vec::new(),
            r_u: Vec::new(),
            r_v: Vec::new(),
            one_minus_r_0: Vec::new(),
            one_minus_r_1: Vec::new(),
            one_minus_r_u: Vec::new(),
            one_minus_r_v: Vec::new(),
            v_mult_add: Vec::new(),
            add_v_array: Vec::new(),
            add_mult_sum: Vec::new(),
            beta_g_r0_fhalf: Vec::new(),
            beta_g_r0_shalf: Vec::new(),
            beta_g_r1_fhalf: Vec::new(),
            beta_g_r1_shalf: Vec::new(),
            beta_u_fhalf: Vec::new(),
            beta_u_shalf: Vec::new(),
            beta_g_r0: Vec::new(),
            beta_g_r1: Vec::new(),
            beta_u: Vec::new(),
            beta_v: Vec::new(),
            v_u: F::zero(),
            v_v: F::zero(),
            inv_2: F::from(2u64).inverse().expect("2 is invertible"),
            rho: F::zero(),
            maskpoly: Vec::new(),
            maskpoly_sumc: F::zero(),
            maskpoly_sumr: F::zero(),
            mask_r: [F::zero(); 6],
            mask_r_sumcu: F::zero(),
            mask_r_sumcv: F::zero(),
            z_u: F::zero(),
            z_v: F::zero(),
            pre_z_u: F::zero(),
            pre_z_v: F::zero(),
            i_uv: F::zero(),
            pre_u1: F::zero(),
            pre_v1: F::zero(),
            r_g1: QuadraticPoly::default(),
            r_g2: QuadraticPoly::default(),
            sum_r_c: QuadraticPoly::default(),
        }
    }

    /// Attach mask-commitment parameters; every layer's masks then travel
    /// with `(commitment, openings, evaluation)` triples.
    pub fn with_mask_binding(mut self, binding: MaskBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    // ------------------------------------------------------------------
    // Circuit evaluation
    // ------------------------------------------------------------------

    fn check_connectivity(&self) -> Result<(), ProverError> {
        for (l, layer) in self.circuit.layers.iter().enumerate().skip(1) {
            let prev = self.circuit.layers[l - 1].len();
            for (g, gate) in layer.gates.iter().enumerate() {
                if gate.u as usize >= prev || gate.v as usize >= prev {
                    return Err(ProverError::Connectivity { layer: l, gate: g });
                }
            }
        }
        Ok(())
    }

    /// Evaluate every layer with plain field semantics.
    fn evaluate(&mut self) -> Result<(), ProverError> {
        self.check_connectivity()?;
        let depth = self.circuit.total_depth();
        self.circuit_value = Vec::with_capacity(depth);

        let input_layer = &self.circuit.layers[0];
        let mut inputs = Vec::with_capacity(input_layer.len());
        for gate in &input_layer.gates {
            if gate.ty != GateType::Input {
                return Err(ProverError::UnsupportedGate {
                    layer: 0,
                    ty: gate.ty,
                });
            }
            inputs.push(gate.c);
        }
        self.circuit_value.push(inputs);

        let two = F::from(2u64);
        for l in 1..depth {
            let layer = &self.circuit.layers[l];
            let mut values = Vec::with_capacity(layer.len());
            for gate in &layer.gates {
                let u = self.circuit_value[l - 1][gate.u as usize];
                let v = self.circuit_value[l - 1][gate.v as usize];
                let out = match gate.ty {
                    GateType::Add => u + v,
                    GateType::Sub => u - v,
                    GateType::AntiSub => v - u,
                    GateType::Mul => u * v,
                    GateType::Naab => v - u * v,
                    GateType::AntiNaab => u - u * v,
                    GateType::Addc => u + gate.c,
                    GateType::Mulc => u * gate.c,
                    GateType::Copy => u,
                    GateType::Not => F::one() - u,
                    GateType::Xor => u + v - two * u * v,
                    GateType::Relay => u,
                    ty => return Err(ProverError::UnsupportedGate { layer: l, ty }),
                };
                values.push(out);
            }
            self.circuit_value.push(values);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Array sizing
    // ------------------------------------------------------------------

    fn read_circuit(&mut self) {
        let max_bit = self.circuit.max_bit_length();
        let full = 1usize << max_bit;
        let half = 1usize << ((max_bit >> 1) + 1);
        self.v_mult_add = vec![LinearPoly::default(); full];
        self.add_v_array = vec![LinearPoly::default(); full];
        self.add_mult_sum = vec![LinearPoly::default(); full];
        self.beta_g_r0_fhalf = vec![F::zero(); half];
        self.beta_g_r0_shalf = vec![F::zero(); half];
        self.beta_g_r1_fhalf = vec![F::zero(); half];
        self.beta_g_r1_shalf = vec![F::zero(); half];
        self.beta_u_fhalf = vec![F::zero(); half];
        self.beta_u_shalf = vec![F::zero(); half];
        self.beta_g_r0 = vec![F::zero(); full];
        self.beta_g_r1 = vec![F::zero(); full];
        self.beta_u = vec![F::zero(); full];
        self.beta_v = vec![F::zero(); full];
    }

    // ------------------------------------------------------------------
    // Masking
    // ------------------------------------------------------------------

    /// Refresh the boundary mask for the coming layer and fold the previous
    /// layer's mask sums into the running claim bookkeeping.
    fn generate_mask_r(&mut self, layer_id: usize) {
        self.r_g1 = QuadraticPoly::new(
            self.mask_r[4],
            self.mask_r[3] + self.mask_r[5] * self.pre_u1,
            self.mask_r[0]
                + self.mask_r[1] * self.pre_u1
                + self.mask_r[2] * self.pre_u1 * self.pre_u1,
        );
        self.r_g2 = QuadraticPoly::new(
            self.mask_r[4],
            self.mask_r[3] + self.mask_r[5] * self.pre_v1,
            self.mask_r[0]
                + self.mask_r[1] * self.pre_v1
                + self.mask_r[2] * self.pre_v1 * self.pre_v1,
        );
        let sum_ru = self.r_g1.a + self.r_g1.b + self.r_g1.c + self.r_g1.c;
        let sum_rv = self.r_g2.a + self.r_g2.b + self.r_g2.c + self.r_g2.c;

        self.mask_r_sumcu = self.alpha * self.z_u * sum_ru;
        self.mask_r_sumcv = self.beta * self.z_v * sum_rv;

        self.pre_z_u = self.z_u;
        self.pre_z_v = self.z_v;
        self.z_u = F::one();
        self.z_v = F::one();
        self.i_uv = F::one();

        if layer_id > 1 {
            for slot in self.mask_r.iter_mut() {
                *slot = F::rand(&mut self.rng);
            }
            self.sum_r_c = QuadraticPoly::new(
                self.mask_r[2] + self.mask_r[2],
                self.mask_r[1] + self.mask_r[1] + self.mask_r[5],
                self.mask_r[0] + self.mask_r[0] + self.mask_r[3] + self.mask_r[4],
            );
        } else {
            // The input layer stays unmasked: its values are public, and the
            // verifier recomputes the V₀ fold directly.
            self.mask_r[0] = F::zero();
            self.mask_r[1] = F::zero();
            self.sum_r_c = QuadraticPoly::default();
        }
    }

    /// Draw the per-layer masking polynomial (before the `ρ` scaling).
    fn generate_maskpoly_pre_rho(&mut self, length: usize) {
        let size = length * 2 + 1 + 6;
        self.maskpoly = (0..size).map(|_| F::rand(&mut self.rng)).collect();
    }

    /// Scale the mask by `ρ` and precompute its hypercube sum.
    fn generate_maskpoly_after_rho(&mut self, length: usize) {
        for coeff in self.maskpoly.iter_mut() {
            *coeff *= self.rho;
        }
        let len2 = length * 2;
        let mut sumc = self.maskpoly[len2];
        for i in 0..len2 {
            sumc += self.maskpoly[i];
        }
        for i in 0..6 {
            sumc += self.maskpoly[len2 + i];
        }
        for _ in 0..length {
            sumc = sumc + sumc;
        }
        self.maskpoly_sumc = sumc;
        self.maskpoly_sumr = F::zero();
    }

    // ------------------------------------------------------------------
    // Sumcheck initialization
    // ------------------------------------------------------------------

    fn sumcheck_init(
        &mut self,
        layer_id: usize,
        bit_length_g: usize,
        bit_length_u: usize,
        bit_length_v: usize,
    ) {
        self.sumcheck_layer_id = layer_id;
        self.length_g = bit_length_g;
        self.length_u = bit_length_u;
        self.length_v = bit_length_v;
        self.generate_mask_r(layer_id);
    }

    fn sumcheck_phase1_init(&mut self) {
        let layer = self.sumcheck_layer_id;
        self.total_uv = 1usize << self.circuit.layers[layer - 1].bit_len();
        for i in 0..self.total_uv {
            self.v_mult_add[i] = LinearPoly::constant(self.circuit_value[layer - 1][i]);
            self.add_v_array[i] = LinearPoly::default();
            self.add_mult_sum[i] = LinearPoly::default();
        }

        self.beta_g_r0_fhalf[0] = self.alpha;
        self.beta_g_r1_fhalf[0] = self.beta;
        self.beta_g_r0_shalf[0] = F::one();
        self.beta_g_r1_shalf[0] = F::one();

        let first_half = self.length_g >> 1;
        let second_half = self.length_g - first_half;

        for i in 0..first_half {
            for j in 0..(1usize << i) {
                let hi = j | (1 << i);
                self.beta_g_r0_fhalf[hi] = self.beta_g_r0_fhalf[j] * self.r_0[i];
                self.beta_g_r0_fhalf[j] *= self.one_minus_r_0[i];
                self.beta_g_r1_fhalf[hi] = self.beta_g_r1_fhalf[j] * self.r_1[i];
                self.beta_g_r1_fhalf[j] *= self.one_minus_r_1[i];
            }
        }
        for i in 0..second_half {
            for j in 0..(1usize << i) {
                let hi = j | (1 << i);
                self.beta_g_r0_shalf[hi] = self.beta_g_r0_shalf[j] * self.r_0[i + first_half];
                self.beta_g_r0_shalf[j] *= self.one_minus_r_0[i + first_half];
                self.beta_g_r1_shalf[hi] = self.beta_g_r1_shalf[j] * self.r_1[i + first_half];
                self.beta_g_r1_shalf[j] *= self.one_minus_r_1[i + first_half];
            }
        }

        let mask_fhalf = (1usize << first_half) - 1;
        for i in 0..(1usize << self.length_g) {
            let gate = &self.circuit.layers[layer].gates[i];
            let u = gate.u as usize;
            let v = gate.v as usize;
            let tmp = self.beta_g_r0_fhalf[i & mask_fhalf] * self.beta_g_r0_shalf[i >> first_half]
                + self.beta_g_r1_fhalf[i & mask_fhalf] * self.beta_g_r1_shalf[i >> first_half];
            match gate.ty {
                GateType::Add => {
                    self.add_v_array[u].b += self.circuit_value[layer - 1][v] * tmp;
                    self.add_mult_sum[u].b += tmp;
                }
                GateType::Mul => {
                    self.add_mult_sum[u].b += self.circuit_value[layer - 1][v] * tmp;
                }
                GateType::Relay => {
                    self.add_mult_sum[u].b += tmp;
                }
                GateType::DirectRelay => {
                    let tmp_u = self.beta_g_r0_fhalf[u & mask_fhalf]
                        * self.beta_g_r0_shalf[u >> first_half]
                        + self.beta_g_r1_fhalf[u & mask_fhalf]
                            * self.beta_g_r1_shalf[u >> first_half];
                    self.add_mult_sum[u].b += tmp_u;
                }
                _ => {}
            }
        }
    }

    fn sumcheck_phase2_init(&mut self, previous_random: F) {
        self.pre_u1 = previous_random;
        let one_minus = F::one() - previous_random;
        self.mask_r_sumcu *= one_minus;
        self.mask_r_sumcv *= one_minus;
        self.i_uv *= one_minus;

        self.v_u = self.v_mult_add[0].eval(previous_random);
        self.z_u *= one_minus * previous_random;
        self.v_u += self.z_u * self.sum_r_c.eval(previous_random);

        let first_half = self.length_u >> 1;
        let second_half = self.length_u - first_half;

        self.beta_u_fhalf[0] = F::one();
        self.beta_u_shalf[0] = F::one();
        for i in 0..first_half {
            for j in 0..(1usize << i) {
                let hi = j | (1 << i);
                self.beta_u_fhalf[hi] = self.beta_u_fhalf[j] * self.r_u[i];
                self.beta_u_fhalf[j] *= self.one_minus_r_u[i];
            }
        }
        for i in 0..second_half {
            for j in 0..(1usize << i) {
                let hi = j | (1 << i);
                self.beta_u_shalf[hi] = self.beta_u_shalf[j] * self.r_u[i + first_half];
                self.beta_u_shalf[j] *= self.one_minus_r_u[i + first_half];
            }
        }

        let layer = self.sumcheck_layer_id;
        self.total_uv = 1usize << self.circuit.layers[layer - 1].bit_len();
        let total_g = 1usize << self.circuit.layers[layer].bit_len();
        for i in 0..self.total_uv {
            self.add_mult_sum[i] = LinearPoly::default();
            self.add_v_array[i] = LinearPoly::default();
            self.v_mult_add[i] = LinearPoly::constant(self.circuit_value[layer - 1][i]);
        }

        let mask_fhalf = (1usize << first_half) - 1;
        let first_g_half = self.length_g >> 1;
        let mask_g_fhalf = (1usize << first_g_half) - 1;
        for i in 0..total_g {
            let gate = &self.circuit.layers[layer].gates[i];
            let u = gate.u as usize;
            let v = gate.v as usize;
            let tmp_u = self.beta_u_fhalf[u & mask_fhalf] * self.beta_u_shalf[u >> first_half];
            let tmp_g = self.beta_g_r0_fhalf[i & mask_g_fhalf]
                * self.beta_g_r0_shalf[i >> first_g_half]
                + self.beta_g_r1_fhalf[i & mask_g_fhalf] * self.beta_g_r1_shalf[i >> first_g_half];
            match gate.ty {
                GateType::Add => {
                    self.add_mult_sum[v].b += tmp_g * tmp_u;
                    self.add_v_array[v].b += tmp_g * tmp_u * self.v_u;
                }
                GateType::Mul => {
                    self.add_mult_sum[v].b += tmp_g * tmp_u * self.v_u;
                }
                GateType::Relay => {
                    self.add_v_array[v].b += tmp_g * tmp_u * self.v_u;
                }
                _ => {}
            }
        }

        // Mask bookkeeping for the phase transition: the closing phase-1
        // round was quintic, so its boundary coefficients enter at degrees
        // five, four and three of the bound randomness.
        let pr = previous_random;
        let pr2 = pr * pr;
        let pr3 = pr2 * pr;
        let pr4 = pr3 * pr;
        let pr5 = pr4 * pr;
        let lu = self.length_u;
        let lv = self.length_v;
        self.maskpoly_sumr += self.maskpoly[lu * 2 - 2] * pr2 + self.maskpoly[lu * 2 - 1] * pr;
        self.maskpoly_sumr += self.maskpoly[(lu + lv + 1) * 2 + 1] * pr5;
        self.maskpoly_sumr += self.maskpoly[(lu + lv + 1) * 2 + 2] * pr4;
        self.maskpoly_sumr += self.maskpoly[(lu + lv + 1) * 2 + 3] * pr3;
    }

    // ------------------------------------------------------------------
    // Round updates
    // ------------------------------------------------------------------

    /// One fold of the three linear tables at `previous_random`, accumulating
    /// the pure round coefficients.
    fn sumcheck_update(&mut self, acc: &mut RoundAcc, previous_random: F) {
        for i in 0..(self.total_uv >> 1) {
            let g_zero = i << 1;
            let g_one = g_zero | 1;
            self.v_mult_add[i] = interpolate(
                self.v_mult_add[g_zero].eval(previous_random),
                self.v_mult_add[g_one].eval(previous_random),
            );
            self.add_v_array[i] = interpolate(
                self.add_v_array[g_zero].eval(previous_random),
                self.add_v_array[g_one].eval(previous_random),
            );
            self.add_mult_sum[i] = interpolate(
                self.add_mult_sum[g_zero].eval(previous_random),
                self.add_mult_sum[g_one].eval(previous_random),
            );
            acc.a += self.add_mult_sum[i].a * self.v_mult_add[i].a;
            acc.b += self.add_mult_sum[i].a * self.v_mult_add[i].b
                + self.add_mult_sum[i].b * self.v_mult_add[i].a
                + self.add_v_array[i].a;
            acc.c += self.add_mult_sum[i].b * self.v_mult_add[i].b + self.add_v_array[i].b;
        }
    }

    fn double_n(mut x: F, n: usize) -> F {
        for _ in 0..n {
            x = x + x;
        }
        x
    }

    /// Mask extension for an ordinary phase-1 round.
    fn phase1_extension(&mut self, acc: &mut RoundAcc, previous_random: F, current_bit: usize) {
        self.i_uv *= F::one() - previous_random;
        if current_bit > 0 {
            let one_minus = F::one() - previous_random;
            self.mask_r_sumcu *= one_minus;
            self.mask_r_sumcv *= one_minus;
            self.z_u *= one_minus * previous_random;
        }
        // Shifting the boundary-mask sum between b and c leaves p(0) + p(1)
        // carrying it exactly once.
        acc.b -= self.mask_r_sumcu + self.mask_r_sumcv;
        acc.c += self.mask_r_sumcu + self.mask_r_sumcv;

        let remaining = self.length_u + self.length_v - current_bit;
        let tmp1 = Self::double_n(self.maskpoly[current_bit << 1], remaining);
        let tmp2 = Self::double_n(self.maskpoly[(current_bit << 1) + 1], remaining);
        self.maskpoly_sumc = (self.maskpoly_sumc - tmp1 - tmp2) * self.inv_2;

        let mut tmp3 = F::zero();
        if current_bit > 0 {
            let pr = previous_random;
            self.maskpoly_sumr += self.maskpoly[(current_bit << 1) - 2] * pr * pr
                + self.maskpoly[(current_bit << 1) - 1] * pr;
            tmp3 = Self::double_n(self.maskpoly_sumr, remaining);
        }
        acc.a += tmp1;
        acc.b += tmp2;
        acc.c += self.maskpoly_sumc + tmp3;
    }

    /// Mask extension for the quintic round closing phase 1.
    fn phase1_last_extension(&mut self, acc: &mut RoundAcc, previous_random: F, current_bit: usize) {
        self.i_uv *= F::one() - previous_random;
        if current_bit > 0 {
            let one_minus = F::one() - previous_random;
            self.mask_r_sumcv *= one_minus;
            self.mask_r_sumcu *= one_minus;
            self.z_u *= one_minus * previous_random;
        }
        acc.b -= self.mask_r_sumcu + self.mask_r_sumcv;
        acc.c += self.mask_r_sumcu + self.mask_r_sumcv;

        if current_bit == self.length_u - 1 {
            let a = self.sum_r_c.a;
            let b = self.sum_r_c.b;
            let c = self.sum_r_c.c;
            let d = self.add_mult_sum[0].a;
            let e = self.add_mult_sum[0].b;
            acc.d = -a * d * self.z_u;
            acc.e = (a * (d - e) - b * d) * self.z_u;
            acc.f = (a * e + b * (d - e) - c * d) * self.z_u;
            acc.a += (c * (d - e) + b * e) * self.z_u;
            acc.b += c * e * self.z_u;
        }

        let lu = self.length_u;
        let lv = self.length_v;
        let remaining = lu + lv - current_bit;
        let tmp1 = Self::double_n(self.maskpoly[current_bit << 1], remaining);
        let tmp2 = Self::double_n(self.maskpoly[(current_bit << 1) + 1], remaining);
        let tmp4 = Self::double_n(self.maskpoly[((lu + lv + 1) << 1) + 1], remaining);
        let tmp5 = Self::double_n(self.maskpoly[((lu + lv + 1) << 1) + 2], remaining);
        let tmp6 = Self::double_n(self.maskpoly[((lu + lv + 1) << 1) + 3], remaining);
        self.maskpoly_sumc =
            (self.maskpoly_sumc - tmp1 - tmp2 - tmp4 - tmp5 - tmp6) * self.inv_2;

        let mut tmp3 = F::zero();
        if current_bit > 0 {
            let pr = previous_random;
            self.maskpoly_sumr += self.maskpoly[(current_bit << 1) - 2] * pr * pr
                + self.maskpoly[(current_bit << 1) - 1] * pr;
            tmp3 = Self::double_n(self.maskpoly_sumr, remaining);
        }
        acc.a += tmp1;
        acc.b += tmp2;
        acc.c += self.maskpoly_sumc + tmp3;
        acc.d += tmp4;
        acc.e += tmp5;
        acc.f += tmp6;
    }

    /// Mask extension for an ordinary phase-2 round.
    fn phase2_extension(&mut self, acc: &mut RoundAcc, previous_random: F, current_bit: usize) {
        if current_bit > 0 {
            let one_minus = F::one() - previous_random;
            self.i_uv *= one_minus;
            self.mask_r_sumcu *= one_minus;
            self.mask_r_sumcv *= one_minus;
            self.z_v *= one_minus * previous_random;
        }
        acc.b -= self.mask_r_sumcu + self.mask_r_sumcv;
        acc.c += self.mask_r_sumcu + self.mask_r_sumcv;

        let current = current_bit + self.length_u;
        let remaining = self.length_u + self.length_v - current;
        let tmp1 = Self::double_n(self.maskpoly[current << 1], remaining);
        let tmp2 = Self::double_n(self.maskpoly[(current << 1) + 1], remaining);
        self.maskpoly_sumc = (self.maskpoly_sumc - tmp1 - tmp2) * self.inv_2;

        let pr = previous_random;
        self.maskpoly_sumr +=
            self.maskpoly[(current << 1) - 2] * pr * pr + self.maskpoly[(current << 1) - 1] * pr;
        let tmp3 = Self::double_n(self.maskpoly_sumr, remaining);

        acc.a += tmp1;
        acc.b += tmp2;
        acc.c += self.maskpoly_sumc + tmp3;
    }

    /// Mask extension for the quintic round closing phase 2.
    fn phase2_last_extension(&mut self, acc: &mut RoundAcc, previous_random: F, current_bit: usize) {
        self.i_uv *= F::one() - previous_random;
        if current_bit > 0 {
            let one_minus = F::one() - previous_random;
            self.mask_r_sumcu *= one_minus;
            self.mask_r_sumcv *= one_minus;
            self.z_v *= one_minus * previous_random;
        }
        acc.b -= self.mask_r_sumcu + self.mask_r_sumcv;
        acc.c += self.mask_r_sumcu + self.mask_r_sumcv;

        if current_bit == self.length_v - 1 {
            let a = self.sum_r_c.a;
            let b = self.sum_r_c.b;
            let c = self.sum_r_c.c;
            let d = self.add_mult_sum[0].a;
            let e = self.add_mult_sum[0].b;
            acc.d = -a * d * self.z_v;
            acc.e = (a * (d - e) - b * d) * self.z_v;
            acc.f = (a * e + b * (d - e) - c * d) * self.z_v;
            acc.a += (c * (d - e) + b * e) * self.z_v;
            acc.b += c * e * self.z_v;
        }

        let lu = self.length_u;
        let lv = self.length_v;
        let current = current_bit + lu;
        let remaining = lu + lv - current;
        let tmp1 = Self::double_n(self.maskpoly[current << 1], remaining);
        let tmp2 = Self::double_n(self.maskpoly[(current << 1) + 1], remaining);
        let tmp4 = Self::double_n(self.maskpoly[(lu + lv + 1) * 2 + 4], remaining);
        let tmp5 = Self::double_n(self.maskpoly[(lu + lv + 1) * 2 + 5], remaining);
        let tmp6 = Self::double_n(self.maskpoly[(lu + lv + 1) * 2 + 6], remaining);
        self.maskpoly_sumc =
            (self.maskpoly_sumc - tmp1 - tmp2 - tmp4 - tmp5 - tmp6) * self.inv_2;

        let pr = previous_random;
        self.maskpoly_sumr +=
            self.maskpoly[(current << 1) - 2] * pr * pr + self.maskpoly[(current << 1) - 1] * pr;
        let tmp3 = Self::double_n(self.maskpoly_sumr, remaining);

        acc.d += tmp4;
        acc.e += tmp5;
        acc.f += tmp6;
        acc.a += tmp1;
        acc.b += tmp2;
        acc.c += self.maskpoly_sumc + tmp3;
    }

    fn phase1_update(&mut self, previous_random: F, current_bit: usize, last: bool) -> RoundPoly {
        let mut acc = RoundAcc::default();
        self.sumcheck_update(&mut acc, previous_random);
        self.total_uv >>= 1;
        if last {
            self.phase1_last_extension(&mut acc, previous_random, current_bit);
            RoundPoly::Quintic(QuinticPoly::new(acc.d, acc.e, acc.f, acc.a, acc.b, acc.c))
        } else {
            self.phase1_extension(&mut acc, previous_random, current_bit);
            RoundPoly::Quadratic(QuadraticPoly::new(acc.a, acc.b, acc.c))
        }
    }

    fn phase2_update(&mut self, previous_random: F, current_bit: usize, last: bool) -> RoundPoly {
        let mut acc = RoundAcc::default();
        self.sumcheck_update(&mut acc, previous_random);
        self.total_uv >>= 1;
        if last {
            self.phase2_last_extension(&mut acc, previous_random, current_bit);
            RoundPoly::Quintic(QuinticPoly::new(acc.d, acc.e, acc.f, acc.a, acc.b, acc.c))
        } else {
            self.phase2_extension(&mut acc, previous_random, current_bit);
            RoundPoly::Quadratic(QuadraticPoly::new(acc.a, acc.b, acc.c))
        }
    }

    /// Quadratic message for the final GKR round of the layer.
    ///
    /// The linear coefficient is exactly `general_value`, the gate-wiring
    /// combination the verifier recomputes from the circuit. Every mask
    /// share rides on the quadratic and constant coefficients instead;
    /// moving a term from `x` to `x²` leaves `p(0) + p(1)` unchanged.
    fn sumcheck_final_round(
        &mut self,
        previous_random: F,
        current: usize,
        general_value: F,
    ) -> QuadraticPoly {
        let mask_a = self.i_uv * self.pre_z_u * self.r_g1.a * self.alpha
            + self.i_uv * self.pre_z_v * self.r_g2.a * self.beta;
        let mask_b = self.i_uv * self.pre_z_u * self.r_g1.b * self.alpha
            + self.i_uv * self.pre_z_v * self.r_g2.b * self.beta;
        let mask_c = self.i_uv * self.pre_z_u * self.r_g1.c * self.alpha
            + self.i_uv * self.pre_z_v * self.r_g2.c * self.beta;

        let lu = self.length_u;
        let lv = self.length_v;
        let remaining = lu + lv - current;
        let tmp1 = Self::double_n(self.maskpoly[current << 1], remaining);
        let tmp2 = Self::double_n(self.maskpoly[(current << 1) + 1], remaining);
        self.maskpoly_sumc = (self.maskpoly_sumc - tmp1 - tmp2) * self.inv_2;

        let pr = previous_random;
        let pr2 = pr * pr;
        let pr3 = pr2 * pr;
        let pr4 = pr3 * pr;
        let pr5 = pr4 * pr;
        self.maskpoly_sumr +=
            self.maskpoly[(current << 1) - 2] * pr2 + self.maskpoly[(current << 1) - 1] * pr;
        self.maskpoly_sumr += self.maskpoly[(lu + lv + 1) * 2 + 4] * pr5;
        self.maskpoly_sumr += self.maskpoly[(lu + lv + 1) * 2 + 5] * pr4;
        self.maskpoly_sumr += self.maskpoly[(lu + lv + 1) * 2 + 6] * pr3;
        let tmp3 = Self::double_n(self.maskpoly_sumr, remaining);

        QuadraticPoly::new(
            mask_a + mask_b + tmp1 + tmp2,
            general_value,
            mask_c + self.maskpoly_sumc + tmp3,
        )
    }

    /// Bind the last `v` bit and lift out both boundary values.
    fn sumcheck_finalize(&mut self, previous_random: F) -> (F, F) {
        self.pre_v1 = previous_random;
        let one_minus = F::one() - previous_random;
        self.i_uv *= one_minus;
        self.v_v = self.v_mult_add[0].eval(previous_random);
        self.z_v *= one_minus * previous_random;
        self.v_v += self.z_v * self.sum_r_c.eval(previous_random);
        (self.v_u, self.v_v)
    }

    // ------------------------------------------------------------------
    // Gate-predicate evaluations for the final round
    // ------------------------------------------------------------------

    fn beta_init(&mut self, depth: usize) {
        self.beta_g_r0[0] = self.alpha;
        self.beta_g_r1[0] = self.beta;
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

    /// Identity-on-bits extension for the layer-1 wires that copy inputs.
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

    // ------------------------------------------------------------------
    // Phase drivers
    // ------------------------------------------------------------------

    fn run_phase1(&mut self, mut claim: F, bits: usize, layer: usize) -> Result<(F, F), ProverError> {
        let mut previous_random = F::zero();
        for j in 0..bits {
            let last = j == bits - 1;
            let poly = self.phase1_update(previous_random, j, last);
            self.transcript
                .append_scalar_list(ProofLabel::Phase1, &poly.coefficients());
            previous_random = self.r_u[j];
            if poly.eval(F::zero()) + poly.eval(F::one()) != claim {
                return Err(ProverError::Logic {
                    layer,
                    stage: "phase 1",
                });
            }
            claim = poly.eval(self.r_u[j]);
        }
        Ok((claim, previous_random))
    }

    fn run_phase2(
        &mut self,
        mut claim: F,
        bits: usize,
        direct_relay_value: F,
        layer: usize,
    ) -> Result<(F, F), ProverError> {
        let mut previous_random = F::zero();
        for j in 0..bits {
            let last = j == bits - 1;
            let poly = self.phase2_update(previous_random, j, last);
            self.transcript
                .append_scalar_list(ProofLabel::Phase2, &poly.coefficients());
            previous_random = self.r_v[j];
            let vu_term = direct_relay_value * self.v_u;
            self.transcript.append_scalar(ProofLabel::VU, &vu_term);
            let hypercube = poly.eval(F::zero()) + poly.eval(F::one());
            let consistent = if j == 0 {
                hypercube == claim
            } else {
                hypercube + vu_term == claim
            };
            if !consistent {
                return Err(ProverError::Logic {
                    layer,
                    stage: "phase 2",
                });
            }
            claim = poly.eval(self.r_v[j]) + vu_term;
        }
        Ok((claim, previous_random))
    }

    fn run_final_round(
        &mut self,
        claim: F,
        layer: usize,
        direct_relay_value: F,
        previous_random: F,
    ) -> Result<F, ProverError> {
        let (v_u, v_v) = self.sumcheck_finalize(previous_random);
        self.transcript.append_scalar(ProofLabel::VU, &v_u);
        self.transcript.append_scalar(ProofLabel::VV, &v_v);

        self.beta_init(layer);
        let add_value = self.predicate_sum(layer, GateType::Add);
        let mult_value = self.predicate_sum(layer, GateType::Mul);
        let relay_value = self.predicate_sum(layer, GateType::Relay);
        let correct_output = add_value * (v_u + v_v)
            + mult_value * v_u * v_v
            + direct_relay_value * v_u
            + relay_value * v_u;

        let current = self.circuit.layers[layer - 1].bit_len() << 1;
        let poly = self.sumcheck_final_round(previous_random, current, correct_output);
        self.transcript
            .append_scalar_list(ProofLabel::FinalGkrRound, &poly.coefficients());
        self.transcript
            .append_scalar(ProofLabel::VUDirectRelay, &direct_relay_value);

        let hypercube = poly.eval(F::zero()) + poly.eval(F::one());
        let expected = if layer == 1 {
            hypercube
        } else {
            hypercube + direct_relay_value * v_u
        };
        if claim != expected {
            return Err(ProverError::Logic {
                layer,
                stage: "final round",
            });
        }

        self.alpha = self.transcript.challenge_scalar(ProofLabel::Alpha);
        self.beta = self.transcript.challenge_scalar(ProofLabel::Beta);
        let next_claim = if layer != 1 {
            self.alpha * v_u + self.beta * v_v
        } else {
            v_u
        };
        self.r_0 = self.r_u.clone();
        self.r_1 = self.r_v.clone();
        self.one_minus_r_0 = self.one_minus_r_u.clone();
        self.one_minus_r_1 = self.one_minus_r_v.clone();
        Ok(next_claim)
    }

    /// Fold the input layer and close the claim chain.
    fn finalize_input(&mut self, claim: F) -> Result<(), ProverError> {
        let layer0 = &self.circuit.layers[0];
        let mut inputs = Vec::with_capacity(layer0.len());
        for gate in &layer0.gates {
            if gate.ty != GateType::Input {
                return Err(ProverError::UnsupportedGate {
                    layer: 0,
                    ty: gate.ty,
                });
            }
            inputs.push(gate.c);
        }
        // The input layer runs unmasked, so the fold itself closes the chain.
        let input_0 = fold_multilinear(&self.r_0, &self.one_minus_r_0, &inputs);
        self.transcript.append_scalar(ProofLabel::Input, &input_0);
        if claim != input_0 {
            return Err(ProverError::Logic {
                layer: 0,
                stage: "input layer",
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mask commitments
    // ------------------------------------------------------------------

    /// Commit and open this layer's masks, absorbing the triples.
    fn emit_mask_commitments(&mut self, r_c: F, bits: usize) -> Result<(), ProverError> {
        let binding = match self.binding.clone() {
            Some(b) => b,
            None => return Ok(()),
        };

        // Auxiliary R polynomial over the previous layer's boundary point.
        let r_point = [self.pre_u1, r_c];
        let commitment = mkzg::commit_random_r(&binding.r_params, &self.mask_r)?;
        let opening = mkzg::open_random_r(&binding.r_params, &self.mask_r, &r_point)?;
        let mut comm_bytes = Vec::new();
        commitment
            .serialize_compressed(&mut comm_bytes)
            .expect("serialize G2");
        self.transcript
            .append_bytes(ProofLabel::RandomRCommitment, comm_bytes);
        self.transcript
            .append_bytes(ProofLabel::RandomROpenings, opening.to_bytes());
        self.transcript
            .append_scalar(ProofLabel::RandomREvaluation, &opening.value);

        // Quadratic core of the masking polynomial, padded to the table's
        // variable budget.
        let vars = bits * 2 + 1;
        let zk_vars = binding.zk_vars();
        if vars > zk_vars {
            return Err(ProverError::Mkzg(MkzgError::VariableMismatch {
                expected: zk_vars,
                got: vars,
            }));
        }
        let mut values = Vec::with_capacity(zk_vars * 2 + 1);
        values.push(self.maskpoly[vars * 2]);
        for i in 0..vars {
            values.push(self.maskpoly[2 * i + 1]);
            values.push(self.maskpoly[2 * i]);
        }
        values.resize(zk_vars * 2 + 1, F::zero());

        let mut point = Vec::with_capacity(zk_vars);
        point.extend_from_slice(&self.r_u);
        point.extend_from_slice(&self.r_v);
        point.push(r_c);
        point.resize(zk_vars, F::zero());

        let commitment = mkzg::commit_zk_sumcheck(&binding.zk_params, &values)?;
        let opening = mkzg::open_zk_sumcheck(&binding.zk_params, &values, &point)?;
        let mut comm_bytes = Vec::new();
        commitment
            .serialize_compressed(&mut comm_bytes)
            .expect("serialize G2");
        self.transcript
            .append_bytes(ProofLabel::MaskpolyCommitment, comm_bytes);
        self.transcript
            .append_bytes(ProofLabel::MaskpolyOpenings, opening.to_bytes());
        self.transcript
            .append_scalar(ProofLabel::MaskpolyEvaluation, &opening.value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Top-level protocol
    // ------------------------------------------------------------------

    /// Run the full protocol and return the serialized transcript record.
    pub fn prove(&mut self) -> Result<Vec<u8>, ProverError> {
        tracing::debug!(depth = self.circuit.total_depth(), "prover start");
        self.read_circuit();
        self.evaluate()?;

        let depth = self.circuit.total_depth();
        self.alpha = F::one();
        self.beta = F::zero();

        let out_bits = self.circuit.layers[depth - 1].bit_len();
        self.r_0 = self.transcript.challenge_scalars(ProofLabel::R0, out_bits);
        self.r_1 = self.transcript.challenge_scalars(ProofLabel::R1, out_bits);
        self.one_minus_r_0 = self.r_0.iter().map(|r| F::one() - r).collect();
        self.one_minus_r_1 = self.r_1.iter().map(|r| F::one() - r).collect();

        let a_0 = self.alpha
            * fold_multilinear(
                &self.r_0,
                &self.one_minus_r_0,
                &self.circuit_value[depth - 1],
            );
        let mut alpha_beta_sum = a_0;

        for i in (1..depth).rev() {
            let current_bits = self.circuit.layers[i].bit_len();
            let previous_bits = self.circuit.layers[i - 1].bit_len();

            let rho = self.transcript.challenge_scalar(ProofLabel::Rho);
            self.sumcheck_init(i, current_bits, previous_bits, previous_bits);
            self.generate_maskpoly_pre_rho(previous_bits * 2 + 1);
            self.rho = rho;
            self.generate_maskpoly_after_rho(previous_bits * 2 + 1);

            alpha_beta_sum += self.maskpoly_sumc;
            self.transcript
                .append_scalar(ProofLabel::AlphaBetaSum, &alpha_beta_sum);

            self.sumcheck_phase1_init();
            self.r_u = self
                .transcript
                .challenge_scalars(ProofLabel::RU, previous_bits);
            self.r_v = self
                .transcript
                .challenge_scalars(ProofLabel::RV, previous_bits);

            let direct_relay_value = self.alpha * self.direct_relay(i, &self.r_0, &self.r_u)
                + self.beta * self.direct_relay(i, &self.r_1, &self.r_u);
            self.transcript
                .append_scalar(ProofLabel::DirectRelayValue, &direct_relay_value);
            let r_c = self.transcript.challenge_scalar(ProofLabel::RC);

            self.emit_mask_commitments(r_c, previous_bits)?;

            self.one_minus_r_u = self.r_u.iter().map(|r| F::one() - r).collect();
            self.one_minus_r_v = self.r_v.iter().map(|r| F::one() - r).collect();

            let (claim, previous_random) = self.run_phase1(alpha_beta_sum, previous_bits, i)?;
            self.sumcheck_phase2_init(previous_random);
            let (claim, previous_random) =
                self.run_phase2(claim, previous_bits, direct_relay_value, i)?;
            alpha_beta_sum = self.run_final_round(claim, i, direct_relay_value, previous_random)?;
        }

        self.finalize_input(alpha_beta_sum)?;
        tracing::debug!("prover done");
        Ok(self.transcript.record().to_bytes())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;

    fn chain_circuit() -> LayeredCircuit {
        let mut builder = GraphBuilder::new();
        let a = builder.input(-1.0);
        let b = builder.input(2.0);
        let mut c = builder.add(a, b);
        for k in 1..3 {
            let one = builder.input(k as f64);
            c = builder.mul(c, one);
        }
        builder.compile_layered_circuit(c).unwrap()
    }

    #[test]
    fn honest_prover_passes_its_own_round_checks() {
        let circuit = chain_circuit();
        let mut prover = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(1));
        assert!(prover.prove().is_ok());
    }

    #[test]
    fn proving_twice_with_one_seed_is_byte_identical() {
        let circuit = chain_circuit();
        let a = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(5))
            .prove()
            .unwrap();
        let b = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(5))
            .prove()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_change_the_masked_transcript() {
        let circuit = chain_circuit();
        let a = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(5))
            .prove()
            .unwrap();
        let b = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(6))
            .prove()
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn disconnected_gate_is_rejected() {
        let mut circuit = chain_circuit();
        let top = circuit.layers.len() - 1;
        circuit.layers[top].gates[0].u = 1 << 20;
        let mut prover = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(2));
        assert!(matches!(
            prover.prove(),
            Err(ProverError::Connectivity { .. })
        ));
    }
}
