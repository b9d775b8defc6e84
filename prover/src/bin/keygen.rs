//! Pour circuit key generation.
//!
//! Usage:
//!   cargo run --package dotcoin-prover --bin keygen -- --pk-out ./pour.pk --vk-out ./pour.vk
//!
//! Keys must be regenerated whenever the pour circuit changes.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ark_std::rand::{SeedableRng, rngs::StdRng};

use dotcoin_prover::Groth16ProofService;

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    let mut pk_path = String::from("./pour.pk");
    let mut vk_path = String::from("./pour.vk");
    let mut seed: u64 = 0;
    let mut force = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--pk-out" => {
                i += 1;
                if i < args.len() {
                    pk_path = args[i].clone();
                }
            }
            "--vk-out" => {
                i += 1;
                if i < args.len() {
                    vk_path = args[i].clone();
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    seed = args[i].parse().context("--seed must be an integer")?;
                }
            }
            "--force" | "-f" => {
                force = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if !force && Path::new(&pk_path).exists() && Path::new(&vk_path).exists() {
        println!("Keys already exist at:");
        println!("  Proving key:   {}", pk_path);
        println!("  Verifying key: {}", vk_path);
        println!("\nUse --force to regenerate keys.");
        return Ok(());
    }

    println!("Dotcoin pour circuit setup (seed {seed})...");
    let mut rng = StdRng::seed_from_u64(seed);
    let start = std::time::Instant::now();
    let service = Groth16ProofService::setup(&mut rng).context("Failed to perform circuit setup")?;
    println!("Setup complete in {:?}", start.elapsed());

    let pk_bytes = service
        .proving_key_bytes()
        .context("Failed to serialize proving key")?;
    write_key(&pk_path, &pk_bytes).context("Failed to write proving key")?;
    println!("Proving key:   {} ({} bytes)", pk_path, pk_bytes.len());

    let vk_bytes = service
        .verifying_key_bytes()
        .context("Failed to serialize verifying key")?;
    write_key(&vk_path, &vk_bytes).context("Failed to write verifying key")?;
    println!("Verifying key: {} ({} bytes)", vk_path, vk_bytes.len());

    println!();
    println!("Verification key hash (blake3):");
    println!("  {}", hex::encode(blake3::hash(&vk_bytes).as_bytes()));
    println!();
    println!("To use these keys, set:");
    println!("  export DOTCOIN_PROVING_KEY={}", pk_path);
    println!("  export DOTCOIN_VERIFYING_KEY={}", vk_path);

    Ok(())
}

fn write_key(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

fn print_help() {
    println!("Dotcoin pour key generation");
    println!();
    println!("USAGE:");
    println!("    keygen [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --pk-out <PATH>    Proving key output (default: ./pour.pk)");
    println!("    --vk-out <PATH>    Verifying key output (default: ./pour.vk)");
    println!("    --seed <N>         Setup RNG seed (default: 0)");
    println!("    --force, -f        Overwrite existing keys");
    println!("    --help, -h         Show this help message");
}
