use std::path::Path;

use anyhow::{Context, Result};
use jitpatch_mockguest::{build_guest, GuestOptions};

pub fn run(out: &Path, rounds: u32, hot_threshold: u32) -> Result<()> {
    let options = GuestOptions {
        rounds,
        hot_threshold,
        ..GuestOptions::default()
    };
    let wasm = build_guest(&options).context("build mock guest")?;
    std::fs::write(out, &wasm).with_context(|| format!("write {}", out.display()))?;
    log::info!(
        "wrote mock guest to {} ({} bytes, {rounds} rounds, hot after {hot_threshold} calls)",
        out.display(),
        wasm.len()
    );
    Ok(())
}
