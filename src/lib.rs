//! Crate root: public surface, core aliases, and protocol-wide invariants
//!
//! This crate is an end-to-end zero-knowledge proof system for the correct
//! evaluation of a layered arithmetic circuit over a prime field: quantized
//! inputs flow into an expression graph, the graph lowers into a padded
//! layered circuit, the prover runs the GKR protocol with a zero-knowledge
//! two-phase sumcheck per layer, and the verifier replays the resulting
//! transcript. A multilinear KZG commitment scheme optionally binds the
//! per-layer masking polynomials.
//!
//! ## Invariants
//!
//! - **One field.** All circuit arithmetic, transcript challenges, and
//!   commitment scalars live in `ark_bls12_381::Fr` (`F` in this crate) —
//!   the scalar field of the pairing curve the commitments use. There is no
//!   second modulus anywhere.
//! - **Fixed-point encoding.** Reals enter the field as
//!   `round(|x|·2^16) mod p`, negatives in the upper half; see
//!   [`fixed_point`].
//! - **Layered circuits.** Every wire connects layer `k` to layer `k − 1`,
//!   every layer size is a power of two (≥ 2 after padding), and layer 0
//!   holds the input gates; see [`graph`] and [`circuit`].
//! - **Fiat–Shamir discipline.** Prover and verifier replay the exact same
//!   sequence of labeled absorbs and challenge draws over a Merlin duplex
//!   sponge; every message is absorbed before the next challenge is drawn.
//! - **Failure is total.** The prover never emits a partial transcript; the
//!   verifier rejects the whole proof on the first failed check.
//!
//! The trusted setup shipped here is a toy powers-of-tau stand-in — see the
//! warnings in [`setup`] before deploying anything.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Compiled layered-circuit types and the multilinear fold.
pub mod circuit;
/// Signed fixed-point encoding over the scalar field.
pub mod fixed_point;
/// Expression graph construction and circuit lowering.
pub mod graph;
/// Multilinear KZG commitments (dense / univariate / zk-sumcheck).
pub mod mkzg;
/// End-to-end orchestration helpers and reference circuits.
pub mod pipeline;
/// Small dense univariate polynomials for the sumcheck rounds.
pub mod poly;
/// Label-addressed proof record and its wire codec.
pub mod proof;
/// Zero-knowledge GKR prover.
pub mod prover;
/// Trusted-setup generation, persistence and validation.
pub mod setup;
/// Fiat–Shamir transcript over a Merlin duplex sponge.
pub mod transcript;
/// Transcript-replaying verifier.
pub mod verifier;

// ============================================================================
// Canonical aliases
// ============================================================================

/// Scalar field used across the crate (the BLS12-381 scalar field).
pub type F = ark_bls12_381::Fr;

/// G1 affine group element (quotient openings).
pub type G1Affine = ark_bls12_381::G1Affine;

/// G2 affine group element (polynomial commitments).
pub type G2Affine = ark_bls12_381::G2Affine;

/// The pairing engine behind the commitment scheme.
pub type Curve = ark_bls12_381::Bls12_381;

// ============================================================================
// Root-level re-exports
// ============================================================================

pub use crate::circuit::{Gate, GateType, Layer, LayeredCircuit};
pub use crate::graph::{GraphBuilder, GraphError, NodeId};
pub use crate::mkzg::{MaskBinding, MkzgError, MultiPoly, PublicParams};
pub use crate::proof::{ProofError, ProofLabel, ProofRecord};
pub use crate::prover::{ProverError, ZkProver};
pub use crate::setup::SetupError;
pub use crate::verifier::{CheckStage, VerifierError, ZkVerifier};
