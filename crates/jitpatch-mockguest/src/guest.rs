//! Guest module assembler.

use std::borrow::Cow;

use jitpatch_types::abi::{self, SCRATCH_REGISTER_COUNT};
use jitpatch_types::RoundIndex;
use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, CustomSection, DataSection, ElementSection, Elements,
    EntityType, ExportKind, ExportSection, Function, FunctionSection, GlobalSection, GlobalType,
    ImportSection, Instruction, MemorySection, MemoryType, Module, RefType, TableSection,
    TableType, TypeSection, ValType,
};

use crate::error::{MockGuestError, MockGuestResult};
use crate::jit::build_round_module;
use crate::layout::*;
use crate::memarg;

/// Knobs of the emitted guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestOptions {
    /// Calls before round 0 becomes available; round `r` needs `threshold + r`.
    pub hot_threshold: u32,
    /// JIT rounds the guest can hand out.
    pub rounds: u32,
    /// Busy-loop length of the interpreted main.
    pub interpreted_iterations: u32,
}

impl Default for GuestOptions {
    fn default() -> Self {
        Self {
            hot_threshold: 100,
            rounds: 2,
            interpreted_iterations: 2_000,
        }
    }
}

/// Emit and validate the guest module.
pub fn build_guest(options: &GuestOptions) -> MockGuestResult<Vec<u8>> {
    if options.hot_threshold == 0 {
        return Err(MockGuestError::Layout(
            "hot_threshold must be at least 1".into(),
        ));
    }
    if options.rounds > MAX_ROUNDS {
        return Err(MockGuestError::Layout(format!(
            "{} rounds requested, the round table holds {MAX_ROUNDS}",
            options.rounds
        )));
    }

    let rounds = (0..options.rounds)
        .map(|r| build_round_module(RoundIndex(r)))
        .collect::<MockGuestResult<Vec<_>>>()?;

    let mut module = Module::new();
    module.section(&emit_types());
    module.section(&emit_imports());
    module.section(&emit_function_decls());
    module.section(&emit_table());
    module.section(&emit_memory());
    module.section(&emit_globals());
    module.section(&emit_exports());
    module.section(&emit_elements());
    module.section(&emit_code(options));
    module.section(&emit_data(&rounds)?);
    module.section(&CustomSection {
        name: Cow::Borrowed("jitpatch-mockguest"),
        data: Cow::Borrowed(env!("CARGO_PKG_VERSION").as_bytes()),
    });

    let wasm_bytes = module.finish();
    wasmparser::validate(&wasm_bytes)
        .map_err(|e| MockGuestError::ValidationFailed(format!("guest: {e}")))?;
    Ok(wasm_bytes)
}

// ── Sections ─────────────────────────────────────────────────────────────────

fn emit_types() -> TypeSection {
    let mut types = TypeSection::new();
    // TYPE_VOID_VOID
    types.ty().function(vec![], vec![]);
    // TYPE_VOID_I32
    types.ty().function(vec![], vec![ValType::I32]);
    // TYPE_I32_VOID
    types.ty().function(vec![ValType::I32], vec![]);
    // TYPE_I32_I32
    types.ty().function(vec![ValType::I32], vec![ValType::I32]);
    // TYPE_I32X3_F64
    types.ty().function(
        vec![ValType::I32, ValType::I32, ValType::I32],
        vec![ValType::F64],
    );
    // TYPE_CLOCK_TIME_GET
    types.ty().function(
        vec![ValType::I32, ValType::I64, ValType::I32],
        vec![ValType::I32],
    );
    // TYPE_FD_WRITE
    types.ty().function(
        vec![ValType::I32, ValType::I32, ValType::I32, ValType::I32],
        vec![ValType::I32],
    );
    types
}

fn emit_imports() -> ImportSection {
    let mut imports = ImportSection::new();
    imports.import(
        abi::WASI_NAMESPACE,
        "clock_time_get",
        EntityType::Function(TYPE_CLOCK_TIME_GET),
    );
    imports.import(
        abi::WASI_NAMESPACE,
        "fd_write",
        EntityType::Function(TYPE_FD_WRITE),
    );
    for i in 0..SCRATCH_REGISTER_COUNT {
        imports.import(
            abi::IMPORT_NAMESPACE,
            &abi::scratch_register_name(i),
            EntityType::Global(mutable_i32()),
        );
    }
    imports
}

fn emit_function_decls() -> FunctionSection {
    let mut funcs = FunctionSection::new();
    funcs.function(TYPE_VOID_VOID); // FN_INITIALIZE
    funcs.function(TYPE_I32_VOID); // FN_INITIALIZE_SM
    funcs.function(TYPE_VOID_VOID); // FN_SHUT_DOWN_SM
    funcs.function(TYPE_I32_VOID); // FN_EXECUTE
    funcs.function(TYPE_I32X3_F64); // FN_CALL_FUNCTION_BY_NAME
    funcs.function(TYPE_I32_I32); // FN_ALLOCATE_BYTES
    funcs.function(TYPE_I32_VOID); // FN_FREE_BYTES
    funcs.function(TYPE_VOID_I32); // FN_JIT_MODULE
    funcs.function(TYPE_I32_I32); // FN_MODULE_DATA
    funcs.function(TYPE_I32_I32); // FN_MODULE_SIZE
    funcs.function(TYPE_I32_VOID); // FN_FREE_MODULE
    funcs.function(TYPE_VOID_I32); // FN_MAIN_INTERPRETED
    funcs
}

fn emit_table() -> TableSection {
    let mut tables = TableSection::new();
    tables.table(TableType {
        element_type: RefType::FUNCREF,
        minimum: TABLE_SIZE,
        maximum: None,
        table64: false,
        shared: false,
    });
    tables
}

fn emit_memory() -> MemorySection {
    let mut memory = MemorySection::new();
    memory.memory(MemoryType {
        minimum: INITIAL_MEMORY_PAGES,
        maximum: Some(MAX_MEMORY_PAGES),
        memory64: false,
        shared: false,
        page_size_log2: None,
    });
    memory
}

fn emit_globals() -> GlobalSection {
    let mut globals = GlobalSection::new();
    // GLOBAL_STACK_POINTER
    globals.global(mutable_i32(), &ConstExpr::i32_const(STACK_TOP));
    globals
}

fn emit_exports() -> ExportSection {
    let mut exports = ExportSection::new();
    exports.export(abi::MEMORY, ExportKind::Memory, 0);
    exports.export(abi::INDIRECT_FUNCTION_TABLE, ExportKind::Table, 0);
    exports.export(abi::STACK_POINTER, ExportKind::Global, GLOBAL_STACK_POINTER);
    exports.export(abi::EXPORT_INITIALIZE, ExportKind::Func, FN_INITIALIZE);
    exports.export(abi::EXPORT_INITIALIZE_SM, ExportKind::Func, FN_INITIALIZE_SM);
    exports.export(abi::EXPORT_SHUT_DOWN_SM, ExportKind::Func, FN_SHUT_DOWN_SM);
    exports.export(abi::EXPORT_EXECUTE, ExportKind::Func, FN_EXECUTE);
    exports.export(
        abi::EXPORT_CALL_FUNCTION_BY_NAME,
        ExportKind::Func,
        FN_CALL_FUNCTION_BY_NAME,
    );
    exports.export(abi::EXPORT_ALLOCATE_BYTES, ExportKind::Func, FN_ALLOCATE_BYTES);
    exports.export(abi::EXPORT_FREE_BYTES, ExportKind::Func, FN_FREE_BYTES);
    exports.export(abi::EXPORT_JIT_MODULE, ExportKind::Func, FN_JIT_MODULE);
    exports.export(abi::EXPORT_MODULE_DATA, ExportKind::Func, FN_MODULE_DATA);
    exports.export(abi::EXPORT_MODULE_SIZE, ExportKind::Func, FN_MODULE_SIZE);
    exports.export(abi::EXPORT_FREE_MODULE, ExportKind::Func, FN_FREE_MODULE);
    exports
}

fn emit_elements() -> ElementSection {
    let mut elements = ElementSection::new();
    elements.active(
        Some(0),
        &ConstExpr::i32_const(MAIN_SLOT),
        Elements::Functions(Cow::Borrowed(&[FN_MAIN_INTERPRETED])),
    );
    elements
}

fn emit_code(options: &GuestOptions) -> CodeSection {
    let mut code = CodeSection::new();
    code.function(&emit_initialize());
    code.function(&emit_initialize_sm());
    code.function(&emit_shut_down_sm());
    code.function(&emit_execute());
    code.function(&emit_call_function_by_name());
    code.function(&emit_allocate_bytes());
    code.function(&emit_free_bytes());
    code.function(&emit_jit_module(options));
    code.function(&emit_module_field(0));
    code.function(&emit_module_field(4));
    code.function(&emit_free_module());
    code.function(&emit_main_interpreted(options.interpreted_iterations));
    code
}

fn emit_data(rounds: &[Vec<u8>]) -> MockGuestResult<DataSection> {
    let mut data = DataSection::new();

    let mut iovec = Vec::with_capacity(8);
    iovec.extend_from_slice(&BANNER_ADDR.to_le_bytes());
    iovec.extend_from_slice(&(BANNER.len() as u32).to_le_bytes());
    data.active(0, &ConstExpr::i32_const(IOVEC_ADDR as i32), iovec);
    data.active(
        0,
        &ConstExpr::i32_const(BANNER_ADDR as i32),
        BANNER.as_bytes().to_vec(),
    );

    let mut table = Vec::with_capacity(rounds.len() * 8);
    let mut blob = Vec::new();
    for bytes in rounds {
        let offset = MODULE_BYTES_ADDR as usize + blob.len();
        table.extend_from_slice(&(offset as u32).to_le_bytes());
        table.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        blob.extend_from_slice(bytes);
    }
    if MODULE_BYTES_ADDR as usize + blob.len() > HEAP_BASE as usize {
        return Err(MockGuestError::Layout(format!(
            "{} bytes of round modules overflow into the heap",
            blob.len()
        )));
    }
    if !rounds.is_empty() {
        data.active(0, &ConstExpr::i32_const(ROUND_TABLE_ADDR as i32), table);
        data.active(0, &ConstExpr::i32_const(MODULE_BYTES_ADDR as i32), blob);
    }
    Ok(data)
}

// ── Function bodies ──────────────────────────────────────────────────────────

fn mutable_i32() -> GlobalType {
    GlobalType {
        val_type: ValType::I32,
        mutable: true,
        shared: false,
    }
}

/// `mem[cell] = value`
fn store_const(f: &mut Function, cell: u32, value: i32) {
    f.instruction(&Instruction::I32Const(cell as i32));
    f.instruction(&Instruction::I32Const(value));
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
}

/// Push `mem[cell]`.
fn load_cell(f: &mut Function, cell: u32) {
    f.instruction(&Instruction::I32Const(cell as i32));
    f.instruction(&Instruction::I32Load(memarg(0, 2)));
}

/// `mem[cell] += 1`
fn increment_cell(f: &mut Function, cell: u32) {
    f.instruction(&Instruction::I32Const(cell as i32));
    load_cell(f, cell);
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
}

/// Trap if the i32 on top of the stack is zero.
fn trap_if_zero(f: &mut Function) {
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);
}

/// Push the monotonic clock in nanoseconds.
fn read_monotonic_clock(f: &mut Function) {
    f.instruction(&Instruction::I32Const(1)); // CLOCKID_MONOTONIC
    f.instruction(&Instruction::I64Const(0));
    f.instruction(&Instruction::I32Const(CLOCK_SCRATCH_ADDR as i32));
    f.instruction(&Instruction::Call(IMPORT_CLOCK_TIME_GET));
    f.instruction(&Instruction::Drop);
    f.instruction(&Instruction::I32Const(CLOCK_SCRATCH_ADDR as i32));
    f.instruction(&Instruction::I64Load(memarg(0, 3)));
}

/// `_initialize()`
fn emit_initialize() -> Function {
    let mut f = Function::new(vec![]);
    store_const(&mut f, STATE_HEAP_TOP, HEAP_BASE as i32);
    store_const(&mut f, STATE_INITIALIZED, 1);
    f.instruction(&Instruction::End);
    f
}

/// `InitializeSM(enable: i32)`: records the flag and prints the banner.
fn emit_initialize_sm() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::I32Const(STATE_ENABLE_JIT as i32));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Store(memarg(0, 2)));

    f.instruction(&Instruction::I32Const(1)); // stdout
    f.instruction(&Instruction::I32Const(IOVEC_ADDR as i32));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Const(NWRITTEN_ADDR as i32));
    f.instruction(&Instruction::Call(IMPORT_FD_WRITE));
    f.instruction(&Instruction::Drop);
    f.instruction(&Instruction::End);
    f
}

fn emit_shut_down_sm() -> Function {
    let mut f = Function::new(vec![]);
    store_const(&mut f, STATE_SHUT_DOWN, 1);
    f.instruction(&Instruction::End);
    f
}

/// `Execute(src: i32)`: "parses" the NUL-terminated source by measuring it.
/// A null pointer or an empty source traps.
fn emit_execute() -> Function {
    // local 1: len
    let mut f = Function::new(vec![(1, ValType::I32)]);
    f.instruction(&Instruction::LocalGet(0));
    trap_if_zero(&mut f);

    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::BrIf(1));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(1));
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::LocalGet(1));
    trap_if_zero(&mut f);
    f.instruction(&Instruction::I32Const(STATE_SCRIPT_LEN as i32));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    f.instruction(&Instruction::End);
    f
}

/// `CallFunctionByName(name: i32, flag_a: i32, flag_b: i32) -> f64`
fn emit_call_function_by_name() -> Function {
    // local 3: t0 (i64), local 4: result (i32)
    let mut f = Function::new(vec![(1, ValType::I64), (1, ValType::I32)]);

    // Nothing executed yet, or an empty name: trap.
    load_cell(&mut f, STATE_SCRIPT_LEN);
    trap_if_zero(&mut f);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    trap_if_zero(&mut f);

    // flags = flag_a | flag_b << 1
    f.instruction(&Instruction::I32Const(STATE_LAST_FLAGS as i32));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Shl);
    f.instruction(&Instruction::I32Or);
    f.instruction(&Instruction::I32Store(memarg(0, 2)));

    read_monotonic_clock(&mut f);
    f.instruction(&Instruction::LocalSet(3));

    f.instruction(&Instruction::I32Const(MAIN_SLOT));
    f.instruction(&Instruction::CallIndirect {
        type_index: TYPE_VOID_I32,
        table_index: 0,
    });
    f.instruction(&Instruction::LocalSet(4));
    f.instruction(&Instruction::I32Const(STATE_LAST_RESULT as i32));
    f.instruction(&Instruction::LocalGet(4));
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    increment_cell(&mut f, STATE_CALL_COUNT);

    // (now - t0) / 1e6
    read_monotonic_clock(&mut f);
    f.instruction(&Instruction::LocalGet(3));
    f.instruction(&Instruction::I64Sub);
    f.instruction(&Instruction::F64ConvertI64U);
    f.instruction(&Instruction::F64Const(1_000_000.0));
    f.instruction(&Instruction::F64Div);
    f.instruction(&Instruction::End);
    f
}

/// `AllocateBytes(n: i32) -> i32`: 8-byte aligned bump allocation; 0 when
/// `n <= 0` or the request does not fit the current memory.
fn emit_allocate_bytes() -> Function {
    // local 1: ptr, local 2: end
    let mut f = Function::new(vec![(2, ValType::I32)]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32LeS);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    load_cell(&mut f, STATE_HEAP_TOP);
    f.instruction(&Instruction::LocalSet(1));

    // end = (ptr + n + 7) & !7
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(7));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Const(-8));
    f.instruction(&Instruction::I32And);
    f.instruction(&Instruction::LocalSet(2));

    // end > memory.size * 64KiB → 0
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::MemorySize(0));
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32Shl);
    f.instruction(&Instruction::I32GtU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::I32Const(STATE_HEAP_TOP as i32));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::End);
    f
}

/// `FreeBytes(ptr: i32)`: the bump allocator never reuses memory; it only
/// counts non-null releases.
fn emit_free_bytes() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);
    increment_cell(&mut f, STATE_FREE_COUNT);
    f.instruction(&Instruction::End);
    f
}

/// `jitModule() -> i32`
fn emit_jit_module(options: &GuestOptions) -> Function {
    // local 0: round
    let mut f = Function::new(vec![(1, ValType::I32)]);

    let return_zero = |f: &mut Function| {
        f.instruction(&Instruction::If(BlockType::Empty));
        f.instruction(&Instruction::I32Const(0));
        f.instruction(&Instruction::Return);
        f.instruction(&Instruction::End);
    };

    // adaptive compilation disabled
    load_cell(&mut f, STATE_ENABLE_JIT);
    f.instruction(&Instruction::I32Eqz);
    return_zero(&mut f);

    // previous module not released yet
    load_cell(&mut f, STATE_LIVE_HANDLE);
    return_zero(&mut f);

    load_cell(&mut f, STATE_ROUNDS_EMITTED);
    f.instruction(&Instruction::LocalSet(0));

    // all rounds handed out
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(options.rounds as i32));
    f.instruction(&Instruction::I32GeU);
    return_zero(&mut f);

    // not hot enough: calls < threshold + round
    load_cell(&mut f, STATE_CALL_COUNT);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(options.hot_threshold as i32));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32LtU);
    return_zero(&mut f);

    // descriptor = round_table[round]
    for field in [0u64, 4] {
        f.instruction(&Instruction::I32Const(DESCRIPTOR_ADDR as i32));
        f.instruction(&Instruction::LocalGet(0));
        f.instruction(&Instruction::I32Const(8));
        f.instruction(&Instruction::I32Mul);
        f.instruction(&Instruction::I32Load(memarg(
            ROUND_TABLE_ADDR as u64 + field,
            2,
        )));
        f.instruction(&Instruction::I32Store(memarg(field, 2)));
    }

    f.instruction(&Instruction::I32Const(STATE_ROUNDS_EMITTED as i32));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::I32Store(memarg(0, 2)));
    store_const(&mut f, STATE_LIVE_HANDLE, DESCRIPTOR_ADDR as i32);

    f.instruction(&Instruction::I32Const(DESCRIPTOR_ADDR as i32));
    f.instruction(&Instruction::End);
    f
}

/// `moduleData(handle)` / `moduleSize(handle)`: descriptor field at `offset`.
fn emit_module_field(offset: u64) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Load(memarg(offset, 2)));
    f.instruction(&Instruction::End);
    f
}

/// `freeModule(handle)`: traps on a handle that is not the live one.
fn emit_free_module() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::LocalGet(0));
    load_cell(&mut f, STATE_LIVE_HANDLE);
    f.instruction(&Instruction::I32Ne);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);

    store_const(&mut f, STATE_LIVE_HANDLE, 0);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64Const(0));
    f.instruction(&Instruction::I64Store(memarg(0, 3)));
    f.instruction(&Instruction::End);
    f
}

/// The "interpreted" `main`: spins for `iterations`, bumps `r1`, returns 1+1.
fn emit_main_interpreted(iterations: u32) -> Function {
    // local 0: i, local 1: acc
    let mut f = Function::new(vec![(2, ValType::I32)]);

    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(iterations as i32));
    f.instruction(&Instruction::I32GeU);
    f.instruction(&Instruction::BrIf(1));
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Xor);
    f.instruction(&Instruction::LocalSet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::LocalSet(0));
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::GlobalGet(GLOBAL_R1));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::GlobalSet(GLOBAL_R1));

    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::End);
    f
}
