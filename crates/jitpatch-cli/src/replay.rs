use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jitpatch_runtime::{replay, ExecutionContext, ReplayPlan};
use jitpatch_types::{HarnessConfig, Manifest};

pub fn run(
    diff_path: &Path,
    module_paths: &[PathBuf],
    entry: Option<String>,
    manifest_path: Option<&Path>,
    dump_path: Option<&Path>,
    config: &HarnessConfig,
) -> Result<()> {
    let manifest = manifest_path
        .map(|path| {
            Manifest::load(path).with_context(|| format!("load manifest: {}", path.display()))
        })
        .transpose()?;

    // --entry, then the manifest, then the config
    let entry = entry
        .or_else(|| manifest.as_ref().map(|m| m.entry_point.clone()))
        .unwrap_or_else(|| config.entry_point.clone());

    let mut plan = ReplayPlan::load(diff_path, module_paths, entry)?;
    if let Some(manifest) = manifest {
        plan = plan.with_manifest(manifest);
    }

    let mut ctx = ExecutionContext::from_config(config)?;
    let report = replay(&mut ctx, &plan)?;
    println!("Time in ms: {}", report.ms);
    if let Some(path) = dump_path {
        ctx.dump_memory(path)?;
    }
    ctx.deinitialize()?;
    Ok(())
}
