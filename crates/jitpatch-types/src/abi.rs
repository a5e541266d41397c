//! Guest ABI: the fixed export surface the harness consumes and the import
//! surface it provides.
//!
//! ```text
//! host  ──defines──▶  env.r1 … env.r7              (before the guest is instantiated)
//! guest ──exports──▶  memory, __indirect_function_table, __stack_pointer
//! host  ──re-defines▶ env.memory, env.__indirect_function_table, env.__stack_pointer
//! JIT modules import everything above from `env`.
//! ```

/// Namespace of every import the harness provides.
pub const IMPORT_NAMESPACE: &str = "env";

/// Namespace of the WASI preview1 imports.
pub const WASI_NAMESPACE: &str = "wasi_snapshot_preview1";

/// Number of mutable i32 scratch registers (`env.r1` … `env.r7`).
pub const SCRATCH_REGISTER_COUNT: usize = 7;

/// Size of one linear memory page.
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

// ── Shared objects ───────────────────────────────────────────────────────────

pub const MEMORY: &str = "memory";
pub const INDIRECT_FUNCTION_TABLE: &str = "__indirect_function_table";
pub const STACK_POINTER: &str = "__stack_pointer";

// ── Guest exports ────────────────────────────────────────────────────────────

/// `_initialize()`: reactor bootstrap, called once right after instantiation.
pub const EXPORT_INITIALIZE: &str = "_initialize";
/// `InitializeSM(enable_adaptive_compilation: i32)`
pub const EXPORT_INITIALIZE_SM: &str = "InitializeSM";
/// `ShutDownSM()`
pub const EXPORT_SHUT_DOWN_SM: &str = "ShutDownSM";
/// `Execute(source_ptr: i32)`
pub const EXPORT_EXECUTE: &str = "Execute";
/// `CallFunctionByName(name_ptr: i32, flag_a: i32, flag_b: i32) -> f64`
pub const EXPORT_CALL_FUNCTION_BY_NAME: &str = "CallFunctionByName";
/// `AllocateBytes(n: i32) -> i32`
pub const EXPORT_ALLOCATE_BYTES: &str = "AllocateBytes";
/// `FreeBytes(ptr: i32)`
pub const EXPORT_FREE_BYTES: &str = "FreeBytes";
/// `jitModule() -> i32`: handle of the newest compiled module, or 0.
pub const EXPORT_JIT_MODULE: &str = "jitModule";
/// `moduleData(handle: i32) -> i32`
pub const EXPORT_MODULE_DATA: &str = "moduleData";
/// `moduleSize(handle: i32) -> i32`
pub const EXPORT_MODULE_SIZE: &str = "moduleSize";
/// `freeModule(handle: i32)`
pub const EXPORT_FREE_MODULE: &str = "freeModule";

/// Name of scratch register `index` (0-based), e.g. `r1` for index 0.
pub fn scratch_register_name(index: usize) -> String {
    format!("r{}", index + 1)
}
