//! Record session: warm the guest up, patch in its JIT output, diff memory.
//!
//! ```text
//! snapshot ─▶ Execute(source) ─▶ N × call(entry) ─▶ K × (extract ─▶ optimize ─▶ link ─▶ call)
//!                                                                   │
//!                     diff(before, after) ◀─ snapshot ◀─────────────┘
//! ```

use jitpatch_diff::{MemorySnapshot, SparseDiff};
use jitpatch_types::{ExtractedModule, HarnessConfig, HarnessResult, OptimizerFailurePolicy};

use crate::context::ExecutionContext;
use crate::guest::GuestString;
use crate::jit::{optimize_module, RoundOutcome};
use crate::optimizer::Optimizer;

/// Parameters of one record run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPlan {
    pub entry_point: String,
    pub warmup_calls: u32,
    pub patch_rounds: u32,
    pub on_optimizer_failure: OptimizerFailurePolicy,
}

impl RecordPlan {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            entry_point: config.entry_point.clone(),
            warmup_calls: config.warmup_calls,
            patch_rounds: config.patch_rounds,
            on_optimizer_failure: config
                .optimizer
                .as_ref()
                .map(|o| o.on_failure)
                .unwrap_or_default(),
        }
    }
}

impl Default for RecordPlan {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

/// When a timed call happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// The `n`-th warm-up call, from 0.
    Warmup(u32),
    /// The call made right after patch round `r`, whether or not the guest
    /// had a module for it.
    AfterRound(u32),
}

/// Receives artifacts as soon as they exist, so a later failure does not
/// lose them.
pub trait ArtifactSink {
    fn on_timing(&mut self, _phase: CallPhase, _ms: f64) -> HarnessResult<()> {
        Ok(())
    }

    fn on_raw_module(&mut self, _module: &ExtractedModule) -> HarnessResult<()> {
        Ok(())
    }

    fn on_optimized_module(&mut self, _module: &ExtractedModule) -> HarnessResult<()> {
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub timings: Vec<(CallPhase, f64)>,
    pub raw: Vec<ExtractedModule>,
    pub optimized: Vec<ExtractedModule>,
}

impl ArtifactSink for CollectingSink {
    fn on_timing(&mut self, phase: CallPhase, ms: f64) -> HarnessResult<()> {
        self.timings.push((phase, ms));
        Ok(())
    }

    fn on_raw_module(&mut self, module: &ExtractedModule) -> HarnessResult<()> {
        self.raw.push(module.clone());
        Ok(())
    }

    fn on_optimized_module(&mut self, module: &ExtractedModule) -> HarnessResult<()> {
        self.optimized.push(module.clone());
        Ok(())
    }
}

/// Result of a record run.
#[derive(Debug, Clone)]
pub struct Recording {
    pub before: MemorySnapshot,
    pub after: MemorySnapshot,
    pub diff: SparseDiff,
    /// One entry per round in which the guest produced a module.
    pub rounds: Vec<RoundOutcome>,
}

impl Recording {
    pub fn memory_len(&self) -> usize {
        self.after.len()
    }
}

/// Drive one record run against `ctx`.
///
/// Both guest strings are released before returning, on success and on
/// failure alike. Memory must not grow between the two snapshots.
pub fn record(
    ctx: &mut ExecutionContext,
    source: &str,
    plan: &RecordPlan,
    optimizer: Option<&dyn Optimizer>,
    sink: &mut dyn ArtifactSink,
) -> HarnessResult<Recording> {
    let before = ctx.snapshot();
    log::info!(
        "recording: {} warm-up calls of `{}`, {} patch rounds",
        plan.warmup_calls,
        plan.entry_point,
        plan.patch_rounds
    );

    let (after, rounds) = ctx.with_string(source, |ctx, source| {
        ctx.execute(source)?;
        ctx.with_string(&plan.entry_point, |ctx, entry| {
            let rounds = warm_up_and_patch(ctx, entry, plan, optimizer, &mut *sink)?;
            Ok((ctx.snapshot(), rounds))
        })
    })?;

    let diff = SparseDiff::between(before.as_bytes(), after.as_bytes())?;
    log::info!(
        "recorded {} changed bytes across {} linked rounds",
        diff.len(),
        rounds.len()
    );
    Ok(Recording {
        before,
        after,
        diff,
        rounds,
    })
}

fn warm_up_and_patch(
    ctx: &mut ExecutionContext,
    entry: &GuestString,
    plan: &RecordPlan,
    optimizer: Option<&dyn Optimizer>,
    sink: &mut dyn ArtifactSink,
) -> HarnessResult<Vec<RoundOutcome>> {
    for n in 0..plan.warmup_calls {
        let ms = ctx.call_function_by_name(entry)?;
        sink.on_timing(CallPhase::Warmup(n), ms)?;
    }

    let mut rounds = Vec::new();
    for r in 0..plan.patch_rounds {
        if let Some(raw) = ctx.extract_module()? {
            sink.on_raw_module(&raw)?;
            let optimized = optimize_module(&raw, optimizer, plan.on_optimizer_failure)?;
            if let Some(optimized) = &optimized {
                sink.on_optimized_module(optimized)?;
            }
            let outcome = RoundOutcome { raw, optimized };
            ctx.link_module(outcome.linked())?;
            rounds.push(outcome);
        } else {
            log::info!("patch round {r}: guest had no module");
        }
        let ms = ctx.call_function_by_name(entry)?;
        sink.on_timing(CallPhase::AfterRound(r), ms)?;
    }
    Ok(rounds)
}
