//! One-shot trusted-setup generation
//!
//! Writes the two parameter files the mask-commitment path consumes:
//!
//! - `random_r_params.bin` — dense two-variable table (degree 2) for the
//!   auxiliary R polynomial;
//! - `zk_sumcheck_params.bin` — linear doubled-variable table sized for the
//!   requested sumcheck width.
//!
//! ⚠ This is a single-party toy setup: the trapdoors are sampled in this
//! process and merely dropped. Anyone who recorded them could forge
//! openings. Use it for development and CI only; production parameters must
//! come from a multi-party ceremony.
//!
//! Usage: `generate_setup [--vars N] [--out-dir DIR]`
//! where `N` is the maximum sumcheck variable count (`2·ℓ + 1` for the
//! widest layer you intend to prove; default 9).

#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use zkgraph::setup::{keygen, params_digest, save_params};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args: Vec<String> = env::args().collect();
    let vars: usize = parse_flag(&args, "--vars")
        .map(|s| s.parse())
        .transpose()?
        .unwrap_or(9);
    let out_dir: PathBuf = parse_flag(&args, "--out-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    tracing::warn!("single-party toy setup: trapdoors are NOT ceremony-grade");

    let mut rng = StdRng::from_entropy();

    let r_params = keygen(2, 2, false, false, &mut rng)?;
    let r_path = out_dir.join("random_r_params.bin");
    save_params(&r_path, &r_params)?;
    tracing::info!(
        path = %r_path.display(),
        digest = hex::encode(params_digest(&r_params)),
        "R-polynomial parameters written"
    );

    let zk_params = keygen(vars, 2, false, true, &mut rng)?;
    let zk_path = out_dir.join("zk_sumcheck_params.bin");
    save_params(&zk_path, &zk_params)?;
    tracing::info!(
        path = %zk_path.display(),
        digest = hex::encode(params_digest(&zk_params)),
        vars,
        "zk-sumcheck parameters written"
    );

    Ok(())
}
