//! Build script
//!
//! - Puts memory.x and device.x on the linker search path for ARM builds
//! - Adds the cortex-m-rt (and defmt) linker scripts to the demo binaries

use std::env;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=device.x");
    println!("cargo:rerun-if-changed=build.rs");

    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("thumbv") {
        return Ok(());
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    File::create(out_dir.join("memory.x"))?.write_all(include_bytes!("memory.x"))?;
    File::create(out_dir.join("device.x"))?.write_all(include_bytes!("device.x"))?;

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg-examples=-Tlink.x");
    if env::var_os("CARGO_FEATURE_DEFMT").is_some() {
        println!("cargo:rustc-link-arg-examples=-Tdefmt.x");
    }
    Ok(())
}
