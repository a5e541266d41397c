//! Reconstitute a recorded post-JIT state in a fresh context.
//!
//! No warm-up and no extraction: the recorded modules are linked in round
//! order, the diff is written into memory, and the entry point is called
//! once to show the patched guest still runs.

use std::path::{Path, PathBuf};

use jitpatch_diff::SparseDiff;
use jitpatch_types::{ExtractedModule, HarnessError, HarnessResult, Manifest, RoundIndex};

use crate::context::{ExecutionContext, LinkedModule};

/// Everything a replay needs.
#[derive(Debug, Clone)]
pub struct ReplayPlan {
    pub diff: SparseDiff,
    /// Linked in this order; position `i` is round `i`.
    pub modules: Vec<ExtractedModule>,
    pub entry_point: String,
    /// When present, module digests and memory size are checked against it.
    pub manifest: Option<Manifest>,
}

impl ReplayPlan {
    pub fn new(diff: SparseDiff, modules: Vec<Vec<u8>>, entry_point: impl Into<String>) -> Self {
        let modules = modules
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| ExtractedModule::new(RoundIndex(i as u32), bytes))
            .collect();
        Self {
            diff,
            modules,
            entry_point: entry_point.into(),
            manifest: None,
        }
    }

    /// Read the diff and module files. Modules are taken in argument order.
    pub fn load(
        diff_path: &Path,
        module_paths: &[PathBuf],
        entry_point: impl Into<String>,
    ) -> HarnessResult<Self> {
        let diff = SparseDiff::load(diff_path)?;
        let modules = module_paths
            .iter()
            .map(std::fs::read)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(diff, modules, entry_point))
    }

    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    fn verify_modules(&self, manifest: &Manifest) -> HarnessResult<()> {
        let expected = manifest.linked_digests();
        if expected.len() != self.modules.len() {
            return Err(HarnessError::Configuration(format!(
                "manifest lists {} linked rounds, {} module files given",
                expected.len(),
                self.modules.len()
            )));
        }
        for (module, want) in self.modules.iter().zip(expected) {
            let got = module.digest();
            if got != want {
                return Err(HarnessError::Configuration(format!(
                    "module for round {} has digest {got}, manifest expects {want}",
                    module.round()
                )));
            }
        }
        if manifest.diff_entries != self.diff.len() {
            return Err(HarnessError::Configuration(format!(
                "diff has {} entries, manifest expects {}",
                self.diff.len(),
                manifest.diff_entries
            )));
        }
        Ok(())
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    /// Guest-measured time of the validation call.
    pub ms: f64,
    pub linked: Vec<LinkedModule>,
    pub diff_entries: usize,
}

/// Replay `plan` into `ctx`, which must be freshly initialized.
pub fn replay(ctx: &mut ExecutionContext, plan: &ReplayPlan) -> HarnessResult<ReplayReport> {
    if let Some(manifest) = &plan.manifest {
        plan.verify_modules(manifest)?;
        if manifest.memory_bytes != ctx.memory_len() {
            return Err(HarnessError::SizeMismatch {
                before: manifest.memory_bytes,
                after: ctx.memory_len(),
            });
        }
    }

    for module in &plan.modules {
        ctx.link_module(module)?;
    }
    ctx.apply_diff(&plan.diff)?;
    log::info!(
        "replayed {} modules and {} diff entries",
        plan.modules.len(),
        plan.diff.len()
    );

    let ms = ctx.with_string(&plan.entry_point, |ctx, entry| {
        ctx.call_function_by_name(entry)
    })?;
    Ok(ReplayReport {
        ms,
        linked: ctx.linked_modules().to_vec(),
        diff_entries: plan.diff.len(),
    })
}
