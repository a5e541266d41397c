//! `wasi_snapshot_preview1` for the guest, provided by `wasmi_wasi`.
//!
//! Stdout and stderr are inherited or captured per [`GuestIo`], stdin reads
//! as empty, and no directories are preopened. The random stream is seeded
//! so two contexts fed the same calls end up with the same memory.

use std::sync::{Arc, RwLock};

use cap_rand::rngs::StdRng;
use cap_rand::SeedableRng;
use jitpatch_types::{GuestIo, HarnessError, HarnessResult};
use wasmi::Linker;
use wasmi_wasi::wasi_common::pipe::WritePipe;
use wasmi_wasi::wasi_common::Table;
use wasmi_wasi::WasiCtx;

/// Seed of the `random_get` stream.
const RANDOM_SEED: u64 = 0x6a69_7470_6174_6368;

type Captured = Arc<RwLock<Vec<u8>>>;

/// Store data: the WASI context plus the buffers behind captured stdio.
pub struct HostState {
    wasi: WasiCtx,
    stdout: Captured,
    stderr: Captured,
}

impl HostState {
    pub fn new(io: GuestIo) -> Self {
        let wasi = WasiCtx::new(
            Box::new(StdRng::seed_from_u64(RANDOM_SEED)),
            wasmi_wasi::clocks_ctx(),
            wasmi_wasi::sched_ctx(),
            Table::new(),
        );
        let stdout = Captured::default();
        let stderr = Captured::default();

        if io.inherit_stdout {
            wasi.set_stdout(Box::new(wasmi_wasi::stdio::stdout()));
        } else {
            wasi.set_stdout(Box::new(WritePipe::from_shared(stdout.clone())));
        }
        if io.inherit_stderr {
            wasi.set_stderr(Box::new(wasmi_wasi::stdio::stderr()));
        } else {
            wasi.set_stderr(Box::new(WritePipe::from_shared(stderr.clone())));
        }

        Self {
            wasi,
            stdout,
            stderr,
        }
    }

    pub fn captured_stdout(&self) -> Vec<u8> {
        read_captured(&self.stdout)
    }

    pub fn captured_stderr(&self) -> Vec<u8> {
        read_captured(&self.stderr)
    }
}

fn read_captured(buffer: &Captured) -> Vec<u8> {
    match buffer.read() {
        Ok(bytes) => bytes.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Register every preview1 function on `linker`.
pub fn add_to_linker(linker: &mut Linker<HostState>) -> HarnessResult<()> {
    wasmi_wasi::add_to_linker(linker, |state: &mut HostState| &mut state.wasi)
        .map_err(|e| HarnessError::Link(format!("wasi: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jitpatch_types::abi::WASI_NAMESPACE;
    use std::time::{Duration, Instant};
    use wasm_encoder::{
        CodeSection, EntityType, ExportKind, ExportSection, Function, FunctionSection,
        ImportSection, Instruction, MemorySection, MemoryType, TypeSection, ValType,
    };
    use wasmi::{Engine, Instance, Store};

    /// One page of memory and `fill(len) -> errno`, which calls
    /// `random_get(0, len)`. Also imports `path_open`, which it never calls.
    fn random_module() -> Vec<u8> {
        let mut types = TypeSection::new();
        types
            .ty()
            .function(vec![ValType::I32, ValType::I32], vec![ValType::I32]);
        types.ty().function(vec![ValType::I32], vec![ValType::I32]);
        types.ty().function(
            vec![
                ValType::I32,
                ValType::I32,
                ValType::I32,
                ValType::I32,
                ValType::I32,
                ValType::I64,
                ValType::I64,
                ValType::I32,
                ValType::I32,
            ],
            vec![ValType::I32],
        );

        let mut imports = ImportSection::new();
        imports.import(WASI_NAMESPACE, "random_get", EntityType::Function(0));
        imports.import(WASI_NAMESPACE, "path_open", EntityType::Function(2));

        let mut funcs = FunctionSection::new();
        funcs.function(1);

        let mut memory = MemorySection::new();
        memory.memory(MemoryType {
            minimum: 1,
            maximum: Some(1),
            memory64: false,
            shared: false,
            page_size_log2: None,
        });

        let mut exports = ExportSection::new();
        exports.export("memory", ExportKind::Memory, 0);
        exports.export("fill", ExportKind::Func, 2);

        let mut fill = Function::new(vec![]);
        fill.instruction(&Instruction::I32Const(0));
        fill.instruction(&Instruction::LocalGet(0));
        fill.instruction(&Instruction::Call(0));
        fill.instruction(&Instruction::End);
        let mut code = CodeSection::new();
        code.function(&fill);

        let mut module = wasm_encoder::Module::new();
        module
            .section(&types)
            .section(&imports)
            .section(&funcs)
            .section(&memory)
            .section(&exports)
            .section(&code);
        module.finish()
    }

    fn instantiate(io: GuestIo) -> (Store<HostState>, Instance) {
        let engine = Engine::default();
        let module = wasmi::Module::new(&engine, &random_module()[..]).unwrap();
        let mut store = Store::new(&engine, HostState::new(io));
        let mut linker = <Linker<HostState>>::new(&engine);
        add_to_linker(&mut linker).unwrap();
        let instance = linker
            .instantiate(&mut store, &module)
            .unwrap()
            .start(&mut store)
            .unwrap();
        (store, instance)
    }

    fn fill(store: &mut Store<HostState>, instance: &Instance, len: i32) -> i32 {
        instance
            .get_typed_func::<i32, i32>(&*store, "fill")
            .unwrap()
            .call(&mut *store, len)
            .unwrap()
    }

    fn head(store: &Store<HostState>, instance: &Instance, len: usize) -> Vec<u8> {
        let memory = instance.get_memory(store, "memory").unwrap();
        memory.data(store)[..len].to_vec()
    }

    #[test]
    fn test_random_stream_is_seeded() {
        let (mut a, ia) = instantiate(GuestIo::captured());
        let (mut b, ib) = instantiate(GuestIo::captured());
        assert_eq!(fill(&mut a, &ia, 32), 0);
        assert_eq!(fill(&mut b, &ib, 32), 0);
        let bytes = head(&a, &ia, 32);
        assert_eq!(bytes, head(&b, &ib, 32));
        assert!(bytes.iter().any(|&x| x != 0));
    }

    #[test]
    fn test_random_get_past_memory_fails_fast() {
        let (mut store, instance) = instantiate(GuestIo::captured());
        let started = Instant::now();
        let errno = fill(&mut store, &instance, i32::MAX);
        assert_ne!(errno, 0);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(head(&store, &instance, 16).iter().all(|&x| x == 0));
    }

    #[test]
    fn test_unused_preview1_imports_link() {
        // path_open resolves even though nothing here preopens a directory.
        let (store, _) = instantiate(GuestIo::captured());
        assert!(store.data().captured_stdout().is_empty());
        assert!(store.data().captured_stderr().is_empty());
    }
}
