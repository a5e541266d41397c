//! Execution context bootstrap and teardown.

use std::path::Path;

use jitpatch_types::abi::{self, SCRATCH_REGISTER_COUNT, WASM_PAGE_SIZE};
use jitpatch_types::{GuestIo, HarnessConfig, HarnessError, HarnessResult, RoundIndex};
use wasmi::{
    Engine, Global, Instance, Linker, Memory, Module, Mutability, Store, Table, Val,
};
use wasmi::core::ValType;

use crate::guest::GuestExports;
use crate::wasi::{self, HostState};

/// A module linked into the context after the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedModule {
    pub round: RoundIndex,
    pub len: usize,
    pub digest: String,
}

/// The guest engine plus everything linked against it.
///
/// Exactly one memory and one call table exist; every JIT module links
/// against them through the `env` namespace. Tear the context down with
/// [`ExecutionContext::deinitialize`]; dropping it attempts the same
/// shutdown and only logs failures.
pub struct ExecutionContext {
    pub(crate) engine: Engine,
    pub(crate) store: Store<HostState>,
    pub(crate) linker: Linker<HostState>,
    pub(crate) exports: GuestExports,
    pub(crate) memory: Memory,
    pub(crate) table: Table,
    pub(crate) stack_pointer: Global,
    pub(crate) registers: Vec<Global>,
    pub(crate) linked: Vec<LinkedModule>,
    pub(crate) next_round: RoundIndex,
    shut_down: bool,
}

fn link_error<E: std::fmt::Display>(what: &str) -> impl FnOnce(E) -> HarnessError + '_ {
    move |e| HarnessError::Link(format!("{what}: {e}"))
}

impl ExecutionContext {
    /// Bootstrap a context around the guest module in `guest_wasm`.
    ///
    /// Defines the scratch registers, instantiates the guest, re-exports its
    /// memory, table and stack pointer under `env`, then runs `_initialize`
    /// and `InitializeSM(enable_adaptive_compilation)`.
    pub fn initialize(
        guest_wasm: &[u8],
        io: GuestIo,
        enable_adaptive_compilation: bool,
    ) -> HarnessResult<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, guest_wasm).map_err(link_error("guest module"))?;
        let mut store = Store::new(&engine, HostState::new(io));
        let mut linker = <Linker<HostState>>::new(&engine);

        wasi::add_to_linker(&mut linker)?;

        let mut registers = Vec::with_capacity(SCRATCH_REGISTER_COUNT);
        for i in 0..SCRATCH_REGISTER_COUNT {
            let register = Global::new(&mut store, Val::I32(0), Mutability::Var);
            linker
                .define(abi::IMPORT_NAMESPACE, &abi::scratch_register_name(i), register)
                .map_err(|e| HarnessError::Link(format!("register r{}: {e}", i + 1)))?;
            registers.push(register);
        }

        let guest: Instance = linker
            .instantiate(&mut store, &module)
            .map_err(link_error("guest instantiation"))?
            .start(&mut store)
            .map_err(link_error("guest start"))?;

        let memory = guest
            .get_memory(&store, abi::MEMORY)
            .ok_or_else(|| missing_export(abi::MEMORY))?;
        let table = guest
            .get_table(&store, abi::INDIRECT_FUNCTION_TABLE)
            .ok_or_else(|| missing_export(abi::INDIRECT_FUNCTION_TABLE))?;
        let stack_pointer = guest
            .get_global(&store, abi::STACK_POINTER)
            .ok_or_else(|| missing_export(abi::STACK_POINTER))?;
        let sp_type = stack_pointer.ty(&store).content();
        if sp_type != ValType::I32 {
            return Err(HarnessError::Link(format!(
                "guest `{}` is {sp_type:?}, expected i32",
                abi::STACK_POINTER
            )));
        }

        for (name, item) in [
            (abi::MEMORY, wasmi::Extern::Memory(memory)),
            (abi::INDIRECT_FUNCTION_TABLE, wasmi::Extern::Table(table)),
            (abi::STACK_POINTER, wasmi::Extern::Global(stack_pointer)),
        ] {
            linker
                .define(abi::IMPORT_NAMESPACE, name, item)
                .map_err(|e| HarnessError::Link(format!("env.{name}: {e}")))?;
        }

        let exports = GuestExports::resolve(&guest, &store)?;

        let mut ctx = Self {
            engine,
            store,
            linker,
            exports,
            memory,
            table,
            stack_pointer,
            registers,
            linked: Vec::new(),
            next_round: RoundIndex(0),
            shut_down: false,
        };

        ctx.exports
            .initialize
            .call(&mut ctx.store, ())
            .map_err(|e| HarnessError::trap(abi::EXPORT_INITIALIZE, e))?;
        ctx.exports
            .initialize_sm
            .call(&mut ctx.store, enable_adaptive_compilation as i32)
            .map_err(|e| HarnessError::trap(abi::EXPORT_INITIALIZE_SM, e))?;

        log::info!(
            "guest initialized: {} pages of memory, adaptive compilation {}",
            ctx.memory_pages(),
            if enable_adaptive_compilation { "on" } else { "off" }
        );
        Ok(ctx)
    }

    /// Read the guest module named by `config` and bootstrap a context.
    pub fn from_config(config: &HarnessConfig) -> HarnessResult<Self> {
        let guest_wasm = read_guest(&config.guest_module)?;
        Self::initialize(&guest_wasm, config.io, config.enable_adaptive_compilation)
    }

    /// Call `ShutDownSM` and release the context.
    pub fn deinitialize(mut self) -> HarnessResult<()> {
        self.shut_down()
    }

    fn shut_down(&mut self) -> HarnessResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.exports
            .shut_down_sm
            .call(&mut self.store, ())
            .map_err(|e| HarnessError::trap(abi::EXPORT_SHUT_DOWN_SM, e))?;
        log::debug!("guest shut down");
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn memory_len(&self) -> usize {
        self.memory.data(&self.store).len()
    }

    pub fn memory_pages(&self) -> usize {
        self.memory_len() / WASM_PAGE_SIZE
    }

    /// Current values of `r1` … `r7`.
    pub fn registers(&self) -> Vec<i32> {
        self.registers
            .iter()
            .map(|g| g.get(&self.store).i32().unwrap_or_default())
            .collect()
    }

    /// Checked to be an i32 global when the context is built.
    pub fn stack_pointer(&self) -> i32 {
        self.stack_pointer
            .get(&self.store)
            .i32()
            .unwrap_or_default()
    }

    /// Number of call-table slots.
    pub fn table_len(&self) -> u64 {
        u64::from(self.table.size(&self.store))
    }

    /// Modules linked after the guest, in link order.
    pub fn linked_modules(&self) -> &[LinkedModule] {
        &self.linked
    }

    /// Guest stdout collected while stdout is not inherited.
    pub fn captured_stdout(&self) -> Vec<u8> {
        self.store.data().captured_stdout()
    }

    /// Guest stderr collected while stderr is not inherited.
    pub fn captured_stderr(&self) -> Vec<u8> {
        self.store.data().captured_stderr()
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if !self.shut_down {
            if let Err(e) = self.shut_down() {
                log::warn!("guest shutdown during drop failed: {e}");
            }
        }
    }
}

fn missing_export(name: &str) -> HarnessError {
    HarnessError::Link(format!("guest does not export `{name}`"))
}

fn read_guest(path: &Path) -> HarnessResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        HarnessError::Configuration(format!(
            "cannot read guest module {}: {e}",
            path.display()
        ))
    })
}
