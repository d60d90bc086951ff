//! End-to-end orchestration
//!
//! Thin glue over the core: quantize inputs into a graph, lower it, prove,
//! serialize, verify. Also hosts the two reference circuits the integration
//! suite and the demo binary share.

#![forbid(unsafe_code)]

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::circuit::LayeredCircuit;
use crate::graph::{GraphBuilder, GraphError, NodeId};
use crate::mkzg::MaskBinding;
use crate::prover::{ProverError, ZkProver};
use crate::verifier::ZkVerifier;

/// Errors surfaced by the round-trip driver.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Graph construction or lowering failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Proving failed.
    #[error(transparent)]
    Prover(#[from] ProverError),
}

/// Prove `circuit` and immediately verify the produced transcript.
pub fn prove_and_verify(circuit: &LayeredCircuit) -> Result<bool, PipelineError> {
    prove_and_verify_with(circuit, None, StdRng::from_entropy())
}

/// Full sequence from an expression graph: lower `output` into a layered
/// circuit, prove it, and verify the transcript bytes.
pub fn round_trip_from_graph(
    builder: &mut GraphBuilder,
    output: NodeId,
) -> Result<bool, PipelineError> {
    let circuit = builder.compile_layered_circuit(output)?;
    prove_and_verify(&circuit)
}

/// Round trip with explicit prover randomness and optional mask binding.
pub fn prove_and_verify_with(
    circuit: &LayeredCircuit,
    binding: Option<MaskBinding>,
    rng: StdRng,
) -> Result<bool, PipelineError> {
    let mut prover = ZkProver::with_rng(circuit, rng);
    if let Some(b) = binding.clone() {
        prover = prover.with_mask_binding(b);
    }
    let proof_bytes = prover.prove()?;
    tracing::info!(bytes = proof_bytes.len(), "proof produced");

    let mut verifier = ZkVerifier::new(circuit);
    if let Some(b) = binding {
        verifier = verifier.with_mask_binding(b);
    }
    Ok(verifier.run(&proof_bytes))
}

/// The scalar reference circuit: `(1 + 2) · 1 · 2` with every operand a
/// quantized input.
pub fn scalar_chain_graph(builder: &mut GraphBuilder) -> NodeId {
    let a = builder.input(1.0);
    let b = builder.input(2.0);
    let mut c = builder.add(a, b);
    for k in 1..3 {
        let scale = builder.input(k as f64);
        c = builder.mul(c, scale);
    }
    c
}

/// The 2×2 matrix–vector reference circuit: first coordinate of
/// `[[1,2],[2,1]] · [3,4]`.
pub fn matvec_graph(builder: &mut GraphBuilder) -> NodeId {
    let a = [[1.0, 2.0], [2.0, 1.0]];
    let b = [3.0, 4.0];
    let a00 = builder.input(a[0][0]);
    let b0 = builder.input(b[0]);
    let a01 = builder.input(a[0][1]);
    let b1 = builder.input(b[1]);
    let m0 = builder.mul(a00, b0);
    let m1 = builder.mul(a01, b1);
    builder.add(m0, m1)
}

/// Compile the scalar reference circuit.
pub fn scalar_chain_circuit() -> Result<LayeredCircuit, GraphError> {
    let mut builder = GraphBuilder::new();
    let out = scalar_chain_graph(&mut builder);
    builder.compile_layered_circuit(out)
}

/// Compile the matrix–vector reference circuit.
pub fn matvec_circuit() -> Result<LayeredCircuit, GraphError> {
    let mut builder = GraphBuilder::new();
    let out = matvec_graph(&mut builder);
    builder.compile_layered_circuit(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_circuits_compile() {
        assert_eq!(scalar_chain_circuit().unwrap().total_depth(), 4);
        assert_eq!(matvec_circuit().unwrap().size(), 4);
    }

    #[test]
    fn graph_round_trip_accepts() {
        let mut builder = GraphBuilder::new();
        let out = scalar_chain_graph(&mut builder);
        assert!(round_trip_from_graph(&mut builder, out).unwrap());
    }
}
