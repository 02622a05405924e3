//! Build script for the spotctl CLI.
//!
//! Copies the `.env.example` template into the local data directory
//! (`<data_local_dir>/spotctl/.env.example`) so users find it next to the
//! `.env` file the binary reads.

use std::{env, fs, path::PathBuf};

/// Copies `.env.example` from the crate root; a missing template only warns.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=.env.example");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let env_example_path = manifest_dir.join(".env.example");

    let mut out_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    out_dir.push("spotctl");

    if env_example_path.is_file() {
        // Sandboxed builds may not be able to write there; that's not fatal.
        if let Err(e) = fs::create_dir_all(&out_dir)
            .and_then(|_| fs::copy(&env_example_path, out_dir.join(".env.example")))
        {
            println!("cargo:warning=could not install .env.example: {e}");
        }
    } else {
        println!(
            "cargo:warning=.env.example not found at {}",
            env_example_path.display()
        );
    }

    Ok(())
}
