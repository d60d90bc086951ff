//! Trusted-setup generation and management
//!
//! # What the setup produces
//!
//! The commitment scheme needs, for every exponent vector `e` in its family,
//! the pair `(g₁^{t^e}, g₂^{t^e})` where `t = (t₁,…,tₙ)` are secret
//! trapdoors. This module samples the trapdoors, tabulates both groups,
//! and drops the secrets on return.
//!
//! # ⚠ Security
//!
//! This is a **toy powers-of-tau**: a single-party setup whose trapdoors
//! merely go out of scope. It also does not tabulate the
//! knowledge-of-exponent companion points `g^{α·t^e}`, which soundness
//! against an adversarial committer requires. A real deployment must obtain
//! parameters from a multi-party ceremony and add the companion tabulation;
//! nothing here is production-grade, by design.
//!
//! # Parallel generation
//!
//! Dense families above `2^14` entries route to an embarrassingly parallel
//! map: the exponent list is split into `⌈len / (cores·4)⌉`-sized chunks
//! (floor 1), each worker tabulates its chunk independently, and the chunk
//! outputs are merged into the final tables before returning. A failed
//! worker aborts the whole setup; partial state is discarded.
//!
//! # Files
//!
//! Parameters persist as `magic "ZKGSETUP" | u16 version | ark-compressed
//! tables`, loaded read-only and validated (magic, version, the all-zero
//! exponent vector must map to the group generators). BLAKE3 digests give
//! deployments an audit handle.

#![forbid(unsafe_code)]

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{Field, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

use crate::mkzg::{PpKind, PublicParams};
use crate::{G1Affine, G2Affine, F};

/// Dense-family entry budget for the sequential path.
const MAX_SEQUENTIAL_ENTRIES: usize = 1 << 14;

/// File magic for persisted parameters.
const SETUP_MAGIC: &[u8; 8] = b"ZKGSETUP";
/// Parameter file format version.
const SETUP_VERSION: u16 = 1;

/// Errors raised during setup generation, persistence and loading.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// The dense family is too large for the sequential path.
    #[error("unsupported size: dense family with {entries} entries exceeds 2^14; use the parallel path")]
    UnsupportedSize {
        /// Number of exponent tuples requested.
        entries: usize,
    },
    /// A parallel worker failed; all partial state was discarded.
    #[error("setup worker failed: {0}")]
    SetupFailure(String),
    /// File I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Parameter (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// A loaded parameter file failed validation.
    #[error("parameter validation failed: {0}")]
    Validation(String),
}

// ============================================================================
// Exponent lists
// ============================================================================

/// Every tuple in `{0,…,max_degree}^nvars`, lexicographic order.
fn dense_exponent_list(nvars: usize, max_degree: u32) -> Vec<Vec<u32>> {
    let mut out = Vec::with_capacity((max_degree as usize + 1).pow(nvars as u32));
    let mut current = vec![0u32; nvars];
    loop {
        out.push(current.clone());
        // Odometer increment, least-significant position last.
        let mut pos = nvars;
        loop {
            if pos == 0 {
                return out;
            }
            pos -= 1;
            if current[pos] < max_degree {
                current[pos] += 1;
                for later in current.iter_mut().skip(pos + 1) {
                    *later = 0;
                }
                break;
            }
        }
    }
}

/// Only single-variable monomials: for each variable, degrees `0..=max`.
fn univariate_exponent_list(nvars: usize, max_degree: u32) -> Vec<Vec<u32>> {
    let mut seen = BTreeMap::new();
    for i in 0..nvars {
        for d in 0..=max_degree {
            let mut e = vec![0u32; nvars];
            e[i] = d;
            seen.insert(e, ());
        }
    }
    seen.into_keys().collect()
}

// ============================================================================
// Tabulation
// ============================================================================

/// Tabulate one chunk of exponent vectors against the trapdoors.
fn tabulate_chunk(
    exponents: &[Vec<u32>],
    trapdoors: &[F],
) -> Result<Vec<(Vec<u32>, G1Affine, G2Affine)>, SetupError> {
    let g1 = G1Affine::generator();
    let g2 = G2Affine::generator();
    let mut out = Vec::with_capacity(exponents.len());
    for exps in exponents {
        let mut value = F::from(1u64);
        for (t, &e) in trapdoors.iter().zip(exps.iter()) {
            if e > 0 {
                value *= t.pow([e as u64]);
            }
        }
        if value.is_zero() {
            return Err(SetupError::SetupFailure(
                "trapdoor power collapsed to zero".into(),
            ));
        }
        out.push((
            (*exps).clone(),
            (g1 * value).into_affine(),
            (g2 * value).into_affine(),
        ));
    }
    Ok(out)
}

/// Sample a trapdoor vector uniformly in `[1, p − 1]`.
fn sample_trapdoors<R: Rng>(nvars: usize, rng: &mut R) -> Vec<F> {
    (0..nvars)
        .map(|_| loop {
            let t = F::rand(rng);
            if !t.is_zero() {
                break t;
            }
        })
        .collect()
}

// ============================================================================
// Key generation
// ============================================================================

/// Single-threaded parameter generation.
///
/// `univariate` restricts the table to single-variable monomials; `zk`
/// doubles the variables (`tᵢ` and `tᵢ²` as separate slots) and marks the
/// result [`PpKind::Linear`] for the zk-sumcheck polynomial family. Dense
/// requests above `2^14` entries are refused here — callers go through
/// [`keygen`], which falls back to the parallel path.
pub fn keygen_sequential<R: Rng>(
    nvars: usize,
    max_degree: u32,
    univariate: bool,
    zk: bool,
    rng: &mut R,
) -> Result<PublicParams, SetupError> {
    let mut trapdoors = sample_trapdoors(nvars, rng);
    let mut table_vars = nvars;
    let mut kind = PpKind::Exponential;
    let mut univariate = univariate;

    if zk {
        // Interleave t_i and t_i² so each gets its own table slot.
        let mut doubled = Vec::with_capacity(nvars * 2);
        for t in &trapdoors {
            doubled.push(*t);
            doubled.push(t.square());
        }
        trapdoors = doubled;
        table_vars = nvars * 2;
        kind = PpKind::Linear;
        univariate = true;
    }

    let exponents = if univariate {
        univariate_exponent_list(table_vars, max_degree)
    } else {
        let entries = (max_degree as usize + 1)
            .checked_pow(table_vars as u32)
            .unwrap_or(usize::MAX);
        if entries > MAX_SEQUENTIAL_ENTRIES {
            return Err(SetupError::UnsupportedSize { entries });
        }
        dense_exponent_list(table_vars, max_degree)
    };

    let rows = tabulate_chunk(&exponents, &trapdoors)?;
    Ok(assemble(kind, table_vars, rows))
}

/// Parallel parameter generation for large dense families.
///
/// Chunked over `cores · 4` with a floor of one entry per chunk; every chunk
/// output is merged into the final tables before returning.
pub fn keygen_parallel<R: Rng>(
    nvars: usize,
    max_degree: u32,
    rng: &mut R,
) -> Result<PublicParams, SetupError> {
    let trapdoors = sample_trapdoors(nvars, rng);
    let exponents = dense_exponent_list(nvars, max_degree);

    let cores = num_cpus::get().max(1);
    let chunk = exponents.len().div_ceil(cores * 4).max(1);

    let chunks: Vec<Vec<(Vec<u32>, G1Affine, G2Affine)>> = exponents
        .par_chunks(chunk)
        .map(|c| tabulate_chunk(c, &trapdoors))
        .collect::<Result<_, _>>()?;

    let rows = chunks.into_iter().flatten().collect();
    Ok(assemble(PpKind::Exponential, nvars, rows))
}

/// Parameter generation dispatcher.
///
/// Sequential for the univariate and zk families and for small dense
/// families; dense families above `2^14` entries route to the parallel path.
pub fn keygen<R: Rng>(
    nvars: usize,
    max_degree: u32,
    univariate: bool,
    zk: bool,
    rng: &mut R,
) -> Result<PublicParams, SetupError> {
    if !univariate && !zk {
        let entries = (max_degree as usize + 1)
            .checked_pow(nvars as u32)
            .unwrap_or(usize::MAX);
        if entries > MAX_SEQUENTIAL_ENTRIES {
            tracing::info!(entries, "dense setup exceeds the sequential budget; going parallel");
            return keygen_parallel(nvars, max_degree, rng);
        }
    }
    keygen_sequential(nvars, max_degree, univariate, zk, rng)
}

fn assemble(
    kind: PpKind,
    table_vars: usize,
    rows: Vec<(Vec<u32>, G1Affine, G2Affine)>,
) -> PublicParams {
    let mut g1_table = BTreeMap::new();
    let mut g2_table = BTreeMap::new();
    for (exps, p1, p2) in rows {
        g1_table.insert(exps.clone(), p1);
        g2_table.insert(exps, p2);
    }
    PublicParams {
        kind,
        nvars: table_vars as u32,
        g1_table,
        g2_table,
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Write parameters to `path` (versioned magic + compressed tables).
pub fn save_params(path: impl AsRef<Path>, pp: &PublicParams) -> Result<(), SetupError> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(SETUP_MAGIC);
    bytes.extend_from_slice(&SETUP_VERSION.to_le_bytes());
    pp.serialize_compressed(&mut bytes)
        .map_err(|e| SetupError::Serialization(e.to_string()))?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}

/// Load parameters from `path` and validate their structure.
///
/// Validation layers: magic and version, deserialization (on-curve checks
/// come with it), nonempty tables, and the all-zero exponent vector mapping
/// to the group generators.
pub fn load_params(path: impl AsRef<Path>) -> Result<PublicParams, SetupError> {
    let bytes = std::fs::read(path.as_ref())?;
    if bytes.len() < 10 || &bytes[..8] != SETUP_MAGIC {
        return Err(SetupError::Validation("bad parameter file magic".into()));
    }
    let version = u16::from_le_bytes([bytes[8], bytes[9]]);
    if version != SETUP_VERSION {
        return Err(SetupError::Validation(format!(
            "unsupported parameter file version {version}"
        )));
    }
    let pp = PublicParams::deserialize_compressed(&bytes[10..])
        .map_err(|e| SetupError::Serialization(e.to_string()))?;

    if pp.g1_table.is_empty() || pp.g2_table.is_empty() {
        return Err(SetupError::Validation("parameter tables are empty".into()));
    }
    let zero_key = vec![0u32; pp.nvars()];
    match (pp.g1_table.get(&zero_key), pp.g2_table.get(&zero_key)) {
        (Some(p1), Some(p2))
            if *p1 == G1Affine::generator() && *p2 == G2Affine::generator() => {}
        _ => {
            return Err(SetupError::Validation(
                "zero exponent vector does not map to the group generators".into(),
            ))
        }
    }
    Ok(pp)
}

/// BLAKE3 digest of the serialized parameters (audit handle).
pub fn params_digest(pp: &PublicParams) -> [u8; 32] {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"zkgraph.setup.v1");
    pp.serialize_compressed(&mut bytes)
        .expect("serialize parameters");
    *blake3::hash(&bytes).as_bytes()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn dense_list_has_full_cardinality() {
        let list = dense_exponent_list(3, 2);
        assert_eq!(list.len(), 27);
        assert_eq!(list[0], vec![0, 0, 0]);
        assert_eq!(list[26], vec![2, 2, 2]);
    }

    #[test]
    fn univariate_list_shares_the_origin() {
        let list = univariate_exponent_list(3, 3);
        // 3 variables × degrees 1..=3, plus the single zero vector.
        assert_eq!(list.len(), 10);
        assert!(list.contains(&vec![0, 0, 0]));
        assert!(list.contains(&vec![0, 3, 0]));
    }

    #[test]
    fn parallel_and_sequential_agree_on_the_same_trapdoors() {
        let pp_seq = keygen_sequential(2, 3, false, false, &mut StdRng::seed_from_u64(7)).unwrap();
        let pp_par = keygen_parallel(2, 3, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(pp_seq.g1_table, pp_par.g1_table);
        assert_eq!(pp_seq.g2_table, pp_par.g2_table);
    }

    #[test]
    fn sequential_refuses_oversized_dense_families() {
        let mut rng = StdRng::seed_from_u64(8);
        let result = keygen_sequential(8, 3, false, false, &mut rng);
        assert!(matches!(result, Err(SetupError::UnsupportedSize { .. })));
    }

    #[test]
    fn zero_vector_maps_to_the_generators() {
        let mut rng = StdRng::seed_from_u64(9);
        let pp = keygen(2, 2, false, false, &mut rng).unwrap();
        let zero = vec![0u32, 0];
        assert_eq!(pp.g1_table[&zero], G1Affine::generator());
        assert_eq!(pp.g2_table[&zero], G2Affine::generator());
    }

    #[test]
    fn zk_tables_carry_doubled_variables() {
        let mut rng = StdRng::seed_from_u64(10);
        let pp = keygen(3, 2, false, true, &mut rng).unwrap();
        assert_eq!(pp.kind, PpKind::Linear);
        assert_eq!(pp.nvars(), 6);
    }

    #[test]
    fn file_round_trip_preserves_tables() {
        let mut rng = StdRng::seed_from_u64(11);
        let pp = keygen(2, 2, false, false, &mut rng).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.bin");
        save_params(&path, &pp).unwrap();
        let loaded = load_params(&path).unwrap();
        assert_eq!(loaded.g1_table, pp.g1_table);
        assert_eq!(loaded.g2_table, pp.g2_table);
        assert_eq!(params_digest(&loaded), params_digest(&pp));
    }

    #[test]
    fn load_rejects_corrupt_files() {
        let mut rng = StdRng::seed_from_u64(12);
        let pp = keygen(2, 1, false, false, &mut rng).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.bin");
        save_params(&path, &pp).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[0] ^= 0xFF;
        let bad = dir.path().join("bad.bin");
        std::fs::write(&bad, &bytes).unwrap();
        assert!(matches!(
            load_params(&bad),
            Err(SetupError::Validation(_))
        ));
    }
}
