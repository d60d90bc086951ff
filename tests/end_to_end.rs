//! End-to-end round trips: graph → circuit → prover → bytes → verifier.

use rand::rngs::StdRng;
use rand::SeedableRng;

use zkgraph::mkzg::MaskBinding;
use zkgraph::pipeline::{matvec_circuit, scalar_chain_circuit};
use zkgraph::proof::{ProofLabel, ProofRecord, ALL_LABELS};
use zkgraph::prover::ZkProver;
use zkgraph::setup::keygen;
use zkgraph::verifier::{CheckStage, VerifierError, ZkVerifier};

#[test]
fn scalar_chain_round_trip_accepts() {
    let circuit = scalar_chain_circuit().unwrap();
    let proof = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(100))
        .prove()
        .unwrap();
    assert!(ZkVerifier::new(&circuit).run(&proof));
}

#[test]
fn matvec_round_trip_accepts() {
    let circuit = matvec_circuit().unwrap();
    assert_eq!(circuit.size(), 4);
    let proof = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(101))
        .prove()
        .unwrap();
    assert!(ZkVerifier::new(&circuit).run(&proof));
}

#[test]
fn byte_flip_in_the_transcript_is_rejected() {
    let circuit = scalar_chain_circuit().unwrap();
    let proof = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(102))
        .prove()
        .unwrap();

    // Flip a byte in the middle of the serialized record: it lands inside a
    // recorded protocol message, so some replayed check must fail.
    let mut tampered = proof.clone();
    let mid = tampered.len() / 2;
    tampered[mid] ^= 0x01;
    assert!(!ZkVerifier::new(&circuit).run(&tampered));

    // The untouched proof still verifies (the verifier is stateless per run).
    assert!(ZkVerifier::new(&circuit).run(&proof));
}

#[test]
fn transcripts_are_deterministic_under_a_fixed_seed() {
    let circuit = scalar_chain_circuit().unwrap();
    let a = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(7))
        .prove()
        .unwrap();
    let b = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(7))
        .prove()
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn final_round_wiring_forgery_is_rejected() {
    let circuit = scalar_chain_circuit().unwrap();
    let proof = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(106))
        .prove()
        .unwrap();

    // Swap the quadratic and linear coefficients of the last layer's
    // final-round message. The hypercube sum `a + b + 2c` survives the swap,
    // so every claim-chain check still passes; only the recomputed
    // gate-wiring combination on the linear coefficient can catch it.
    let mut record = ProofRecord::from_bytes(&proof).unwrap();
    let mut forged = ProofRecord::new();
    for label in ALL_LABELS {
        let mut messages = Vec::new();
        while let Ok(m) = record.next(label) {
            messages.push(m);
        }
        let last = messages.len().saturating_sub(1);
        for (idx, mut message) in messages.into_iter().enumerate() {
            if label == ProofLabel::FinalGkrRound && idx == last {
                assert_eq!(message.len(), 96);
                let mut head = [0u8; 32];
                head.copy_from_slice(&message[..32]);
                message.copy_within(32..64, 0);
                message[32..64].copy_from_slice(&head);
            }
            forged.push(label, message);
        }
    }

    let result = ZkVerifier::new(&circuit).run_checked(&forged.to_bytes());
    assert!(matches!(
        result,
        Err(VerifierError::VerificationFailure {
            layer: 1,
            stage: CheckStage::GateWiring,
        })
    ));
}

#[test]
fn proof_for_one_circuit_does_not_verify_another() {
    let scalar = scalar_chain_circuit().unwrap();
    let matvec = matvec_circuit().unwrap();
    let proof = ZkProver::with_rng(&scalar, StdRng::seed_from_u64(103))
        .prove()
        .unwrap();
    assert!(!ZkVerifier::new(&matvec).run(&proof));
}

#[test]
fn mask_committed_round_trip_accepts_and_binds() {
    let circuit = scalar_chain_circuit().unwrap();
    let mut rng = StdRng::seed_from_u64(104);
    let binding = MaskBinding {
        r_params: keygen(2, 2, false, false, &mut rng).unwrap(),
        zk_params: keygen(circuit.max_bit_length() * 2 + 1, 2, false, true, &mut rng).unwrap(),
    };

    let proof = ZkProver::with_rng(&circuit, StdRng::seed_from_u64(105))
        .with_mask_binding(binding.clone())
        .prove()
        .unwrap();

    assert!(ZkVerifier::new(&circuit)
        .with_mask_binding(binding.clone())
        .run(&proof));

    // A verifier without the binding expects a different absorb schedule.
    assert!(!ZkVerifier::new(&circuit).run(&proof));

    // Tampering with a commitment byte must break the mask-opening check.
    let mut tampered = proof.clone();
    let mid = tampered.len() / 2;
    tampered[mid] ^= 0x01;
    assert!(!ZkVerifier::new(&circuit)
        .with_mask_binding(binding)
        .run(&tampered));
}
