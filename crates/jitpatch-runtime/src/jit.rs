//! JIT module extraction and incremental linking.

use jitpatch_types::abi;
use jitpatch_types::{
    ExtractedModule, HarnessError, HarnessResult, OptimizerFailurePolicy, RoundIndex,
};
use wasmi::Module;

use crate::context::{ExecutionContext, LinkedModule};
use crate::optimizer::Optimizer;

/// What one patch round produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub raw: ExtractedModule,
    /// `None` when no optimizer ran, or it failed under
    /// [`OptimizerFailurePolicy::FallBack`].
    pub optimized: Option<ExtractedModule>,
}

impl RoundOutcome {
    /// The bytes that were linked.
    pub fn linked(&self) -> &ExtractedModule {
        self.optimized.as_ref().unwrap_or(&self.raw)
    }
}

/// Run `optimizer` over `raw` under `policy`.
///
/// `Ok(None)` means the raw bytes should be linked: either no optimizer was
/// given, or it failed and the policy allows falling back.
pub fn optimize_module(
    raw: &ExtractedModule,
    optimizer: Option<&dyn Optimizer>,
    policy: OptimizerFailurePolicy,
) -> HarnessResult<Option<ExtractedModule>> {
    let Some(optimizer) = optimizer else {
        return Ok(None);
    };
    match optimizer.optimize(raw) {
        Ok(bytes) => Ok(Some(raw.with_bytes(bytes))),
        Err(e) if policy == OptimizerFailurePolicy::FallBack => {
            log::warn!(
                "{} failed on round {}, linking raw module: {e}",
                optimizer.name(),
                raw.round()
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl ExecutionContext {
    /// Ask the guest for its next JIT module.
    ///
    /// `None` when the guest has nothing to hand out. Otherwise the bytes are
    /// copied out, the guest's buffer is released with `freeModule`, and the
    /// module is tagged with the next round index.
    pub fn extract_module(&mut self) -> HarnessResult<Option<ExtractedModule>> {
        let handle = self
            .exports
            .jit_module
            .call(&mut self.store, ())
            .map_err(|e| HarnessError::trap(abi::EXPORT_JIT_MODULE, e))?;
        if handle == 0 {
            log::debug!("guest has no JIT module ready");
            return Ok(None);
        }

        let data = self
            .exports
            .module_data
            .call(&mut self.store, handle)
            .map_err(|e| HarnessError::trap(abi::EXPORT_MODULE_DATA, e))?;
        let size = self
            .exports
            .module_size
            .call(&mut self.store, handle)
            .map_err(|e| HarnessError::trap(abi::EXPORT_MODULE_SIZE, e))?;

        let start = data as u32 as usize;
        let memory = self.memory.data(&self.store);
        let bytes = usize::try_from(size)
            .ok()
            .and_then(|len| start.checked_add(len))
            .and_then(|end| memory.get(start..end))
            .ok_or_else(|| {
                HarnessError::Protocol(format!(
                    "module descriptor {start:#x}+{size} lies outside {} bytes of memory",
                    memory.len()
                ))
            })?
            .to_vec();

        self.exports
            .free_module
            .call(&mut self.store, handle)
            .map_err(|e| HarnessError::trap(abi::EXPORT_FREE_MODULE, e))?;

        let round = self.next_round;
        self.next_round = round.next();
        log::info!("extracted JIT round {round}: {} bytes", bytes.len());
        Ok(Some(ExtractedModule::new(round, bytes)))
    }

    /// Compile `module` and instantiate it against the shared linker.
    ///
    /// Its round must equal the number of modules linked so far. The label
    /// is all that is checked: bytes from another round carrying the right
    /// label link fine and misbehave later.
    pub fn link_module(&mut self, module: &ExtractedModule) -> HarnessResult<()> {
        let expected = RoundIndex(self.linked.len() as u32);
        if module.round() != expected {
            return Err(HarnessError::RoundOrder {
                expected: expected.0,
                found: module.round().0,
            });
        }

        let round = module.round();
        let compiled = Module::new(&self.engine, module.bytes())
            .map_err(|e| HarnessError::Link(format!("round {round}: {e}")))?;
        self.linker
            .instantiate(&mut self.store, &compiled)
            .map_err(|e| HarnessError::Link(format!("round {round}: {e}")))?
            .start(&mut self.store)
            .map_err(|e| HarnessError::Link(format!("round {round} start: {e}")))?;

        let linked = LinkedModule {
            round,
            len: module.bytes().len(),
            digest: module.digest(),
        };
        log::info!("linked round {round} ({})", linked.digest);
        self.linked.push(linked);
        Ok(())
    }

    /// Extract, optionally optimize, and link one round.
    ///
    /// `Ok(None)` when the guest had no module; nothing is linked then.
    pub fn patch_round(
        &mut self,
        optimizer: Option<&dyn Optimizer>,
        policy: OptimizerFailurePolicy,
    ) -> HarnessResult<Option<RoundOutcome>> {
        let Some(raw) = self.extract_module()? else {
            return Ok(None);
        };
        let optimized = optimize_module(&raw, optimizer, policy)?;
        let outcome = RoundOutcome { raw, optimized };
        self.link_module(outcome.linked())?;
        Ok(Some(outcome))
    }
}
