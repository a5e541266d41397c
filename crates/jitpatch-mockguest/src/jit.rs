//! JIT round module assembler.
//!
//! Round modules import the guest's shared state from `env` and install
//! their functions into the shared table through active element segments,
//! the same way a real engine's emitted code patches itself in.

use std::borrow::Cow;

use jitpatch_types::abi;
use jitpatch_types::RoundIndex;
use wasm_encoder::{
    CodeSection, ConstExpr, CustomSection, ElementSection, Elements, EntityType, Function,
    FunctionSection, GlobalType, ImportSection, Instruction, MemoryType, Module, RefType,
    TableType, TypeSection, ValType,
};

use crate::error::{MockGuestError, MockGuestResult};
use crate::layout::{HELPER_SLOT, MAIN_SLOT, TABLE_SIZE};

/// `() -> i32`
const TYPE_VOID_I32: u32 = 0;
/// Imported `env.r2`; counts helper calls.
const GLOBAL_R2: u32 = 1;

/// Emit and validate the module for `round`.
pub fn build_round_module(round: RoundIndex) -> MockGuestResult<Vec<u8>> {
    let mut module = Module::new();

    let mut types = TypeSection::new();
    types.ty().function(vec![], vec![ValType::I32]);
    module.section(&types);
    module.section(&emit_imports());

    let mut funcs = FunctionSection::new();
    let mut code = CodeSection::new();
    let mut elements = ElementSection::new();

    if round.0 == 0 {
        // func 0: helper, func 1: main
        funcs.function(TYPE_VOID_I32);
        funcs.function(TYPE_VOID_I32);
        code.function(&emit_helper());
        code.function(&emit_main_direct(0));
        elements.active(
            Some(0),
            &ConstExpr::i32_const(HELPER_SLOT),
            Elements::Functions(Cow::Borrowed(&[0])),
        );
        elements.active(
            Some(0),
            &ConstExpr::i32_const(MAIN_SLOT),
            Elements::Functions(Cow::Borrowed(&[1])),
        );
    } else {
        funcs.function(TYPE_VOID_I32);
        code.function(&emit_main_indirect());
        elements.active(
            Some(0),
            &ConstExpr::i32_const(MAIN_SLOT),
            Elements::Functions(Cow::Borrowed(&[0])),
        );
    }

    module.section(&funcs);
    module.section(&elements);
    module.section(&code);

    let tag = format!("round {}", round.0);
    module.section(&CustomSection {
        name: Cow::Borrowed("jitpatch-round"),
        data: Cow::Borrowed(tag.as_bytes()),
    });

    let wasm_bytes = module.finish();
    wasmparser::validate(&wasm_bytes)
        .map_err(|e| MockGuestError::ValidationFailed(format!("round {}: {e}", round.0)))?;
    Ok(wasm_bytes)
}

fn emit_imports() -> ImportSection {
    let mut imports = ImportSection::new();
    imports.import(
        abi::IMPORT_NAMESPACE,
        abi::MEMORY,
        EntityType::Memory(MemoryType {
            minimum: 1,
            maximum: None,
            memory64: false,
            shared: false,
            page_size_log2: None,
        }),
    );
    imports.import(
        abi::IMPORT_NAMESPACE,
        abi::INDIRECT_FUNCTION_TABLE,
        EntityType::Table(TableType {
            element_type: RefType::FUNCREF,
            minimum: TABLE_SIZE,
            maximum: None,
            table64: false,
            shared: false,
        }),
    );
    // global 0
    imports.import(
        abi::IMPORT_NAMESPACE,
        abi::STACK_POINTER,
        EntityType::Global(mutable_i32()),
    );
    // global 1
    imports.import(
        abi::IMPORT_NAMESPACE,
        &abi::scratch_register_name(1),
        EntityType::Global(mutable_i32()),
    );
    imports
}

fn mutable_i32() -> GlobalType {
    GlobalType {
        val_type: ValType::I32,
        mutable: true,
        shared: false,
    }
}

/// `r2 += 1; 1`
fn emit_helper() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::GlobalGet(GLOBAL_R2));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::GlobalSet(GLOBAL_R2));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::End);
    f
}

/// `helper() + 1` through a direct call.
fn emit_main_direct(helper: u32) -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::Call(helper));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::End);
    f
}

/// `1 + table[HELPER_SLOT]()`; traps while the helper slot is empty.
fn emit_main_indirect() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Const(HELPER_SLOT));
    f.instruction(&Instruction::CallIndirect {
        type_index: TYPE_VOID_I32,
        table_index: 0,
    });
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::End);
    f
}
