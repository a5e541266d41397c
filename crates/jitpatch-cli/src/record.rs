use std::path::Path;

use anyhow::{Context, Result};
use jitpatch_runtime::{record, ExecutionContext, Optimizer, RecordPlan, WasmOpt};
use jitpatch_types::artifacts::{
    DIFF_FILE_NAME, MANIFEST_FILE_NAME, MEMORY_AFTER_FILE_NAME, MEMORY_BEFORE_FILE_NAME,
};
use jitpatch_types::{HarnessConfig, Manifest};

use crate::sink::DirectorySink;

pub fn run(source_path: &Path, config: &HarnessConfig, dump_memory: bool) -> Result<()> {
    let source = std::fs::read_to_string(source_path)
        .with_context(|| format!("read script: {}", source_path.display()))?;
    let out_dir = &config.output_dir;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create output directory: {}", out_dir.display()))?;

    let wasm_opt = config.optimizer.as_ref().map(WasmOpt::from_config);
    let optimizer = wasm_opt.as_ref().map(|o| o as &dyn Optimizer);
    let plan = RecordPlan::from_config(config);

    // Dropping the context on an early return attempts ShutDownSM.
    let mut ctx = ExecutionContext::from_config(config)?;
    let mut sink = DirectorySink::new(out_dir);
    let recording = record(&mut ctx, &source, &plan, optimizer, &mut sink)?;

    let diff_path = out_dir.join(DIFF_FILE_NAME);
    recording.diff.save(&diff_path)?;
    if dump_memory {
        recording.before.save(&out_dir.join(MEMORY_BEFORE_FILE_NAME))?;
        recording.after.save(&out_dir.join(MEMORY_AFTER_FILE_NAME))?;
    }

    let mut manifest = Manifest::new(&plan.entry_point, plan.warmup_calls, recording.memory_len());
    manifest.diff_entries = recording.diff.len();
    manifest.rounds = sink.into_rounds();
    manifest.save(&out_dir.join(MANIFEST_FILE_NAME))?;

    ctx.deinitialize()?;
    log::info!(
        "recorded {} rounds and {} diff entries into {}",
        manifest.rounds.len(),
        manifest.diff_entries,
        out_dir.display()
    );
    Ok(())
}
