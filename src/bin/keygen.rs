//! Key-pair generation utility.
//!
//! Generates a fresh P-256 key pair and prints it as hex: the 32-byte
//! signing scalar and the SEC1 uncompressed verifying point.
//!
//! # Usage
//! ```text
//! keygen [--demo]
//! ```
//!
//! `--demo` also signs a sample message and verifies it, showing the full
//! round trip.

use std::env;
use std::process;
use wordvm::crypto::PrivateKey;
use wordvm::{error, info};

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut demo = false;
    for arg in &args[1..] {
        match arg.as_str() {
            "--demo" => demo = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                return;
            }
            other => {
                error!("Unexpected argument: {}", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    let key = PrivateKey::generate();
    let public = key.public_key();

    println!("signing key:   {}", hex(&key.to_bytes()));
    println!("verifying key: {}", hex(&public.to_bytes()));

    if demo {
        let message = b"the quick brown fox";
        let signature = key.sign(message);
        println!("signature:     {}", hex(&signature));
        if public.verify(message, &signature) {
            info!("self-check passed");
        } else {
            error!("self-check failed");
            process::exit(1);
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

const USAGE: &str = "\
Key Pair Generator

USAGE:
    {program} [OPTIONS]

OPTIONS:
    --demo        Sign and verify a sample message with the new pair
    -h, --help    Print this help message
";

fn print_usage(program: &str) {
    eprintln!("{}", USAGE.replace("{program}", program));
}
