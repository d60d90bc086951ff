//! End-to-end demo driver
//!
//! Builds the two reference circuits (the scalar chain and the 2×2
//! matrix–vector product), runs the full prove → serialize → verify round
//! trip for each, and reports sizes and timings. With `--with-masks` the
//! per-layer masking polynomials are additionally bound through the
//! commitment scheme; parameters are generated on the fly (toy setup — the
//! trapdoors live in this process, never do this outside a demo).

#![forbid(unsafe_code)]

use std::env;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use zkgraph::mkzg::MaskBinding;
use zkgraph::pipeline::{matvec_circuit, scalar_chain_circuit};
use zkgraph::prover::ZkProver;
use zkgraph::setup::keygen;
use zkgraph::verifier::ZkVerifier;
use zkgraph::LayeredCircuit;

fn run_round_trip(
    name: &str,
    circuit: &LayeredCircuit,
    binding: Option<&MaskBinding>,
) -> anyhow::Result<()> {
    tracing::info!(
        name,
        depth = circuit.total_depth(),
        max_bits = circuit.max_bit_length(),
        "proving"
    );

    let start = Instant::now();
    let mut prover = ZkProver::new(circuit);
    if let Some(b) = binding {
        prover = prover.with_mask_binding(b.clone());
    }
    let proof_bytes = prover.prove()?;
    tracing::info!(
        name,
        bytes = proof_bytes.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "proof produced"
    );

    let start = Instant::now();
    let mut verifier = ZkVerifier::new(circuit);
    if let Some(b) = binding {
        verifier = verifier.with_mask_binding(b.clone());
    }
    let accepted = verifier.run(&proof_bytes);
    tracing::info!(
        name,
        accepted,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "verification finished"
    );
    anyhow::ensure!(accepted, "verifier rejected an honest proof for {name}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let with_masks = env::args().any(|a| a == "--with-masks");

    let scalar = scalar_chain_circuit()?;
    let matvec = matvec_circuit()?;

    let binding = if with_masks {
        tracing::warn!("generating throwaway commitment parameters (toy setup, NOT secure)");
        let mut rng = StdRng::from_entropy();
        // Two-variable dense table for the R polynomial; the zk table must
        // cover 2·ℓ + 1 variables for the widest layer of both circuits.
        let widest = scalar.max_bit_length().max(matvec.max_bit_length());
        let r_params = keygen(2, 2, false, false, &mut rng)?;
        let zk_params = keygen(widest * 2 + 1, 2, false, true, &mut rng)?;
        Some(MaskBinding { r_params, zk_params })
    } else {
        None
    };

    run_round_trip("scalar-chain", &scalar, binding.as_ref())?;
    run_round_trip("matvec-2x2", &matvec, binding.as_ref())?;

    tracing::info!("all round trips accepted");
    Ok(())
}
