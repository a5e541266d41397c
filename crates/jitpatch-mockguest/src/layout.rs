//! Memory layout, table slots and index spaces of the mock guest.
//!
//! ```text
//! 0x0100  iovec { ptr: BANNER_ADDR, len }      used by InitializeSM's fd_write
//! 0x0108  nwritten (i32)
//! 0x0120  banner text
//! 0x0200  state cells (i32 each, see STATE_* below)
//! 0x0240  clock scratch (u64)
//! 0x0280  module descriptor { data_ptr: i32, size: i32 } = the jitModule handle
//! 0x0300  round table: { offset: i32, len: i32 } per round
//! 0x0400  embedded JIT round module bytes
//! 0x8000  heap (bump allocated by AllocateBytes)
//! ```

// ── Memory ───────────────────────────────────────────────────────────────────

pub const INITIAL_MEMORY_PAGES: u64 = 2;
pub const MAX_MEMORY_PAGES: u64 = 64;

pub const IOVEC_ADDR: u32 = 0x100;
pub const NWRITTEN_ADDR: u32 = 0x108;
pub const BANNER_ADDR: u32 = 0x120;
/// Written to stdout by `InitializeSM`.
pub const BANNER: &str = "mockguest: initialized\n";

/// `InitializeSM` flag.
pub const STATE_ENABLE_JIT: u32 = 0x200;
/// Set by `_initialize`.
pub const STATE_INITIALIZED: u32 = 0x204;
/// Length of the last source passed to `Execute`; 0 means nothing loaded.
pub const STATE_SCRIPT_LEN: u32 = 0x208;
/// Completed `CallFunctionByName` calls.
pub const STATE_CALL_COUNT: u32 = 0x20C;
/// Rounds handed out by `jitModule`.
pub const STATE_ROUNDS_EMITTED: u32 = 0x210;
/// Return value of the most recent main call.
pub const STATE_LAST_RESULT: u32 = 0x214;
/// Next free heap byte.
pub const STATE_HEAP_TOP: u32 = 0x218;
/// Set by `ShutDownSM`.
pub const STATE_SHUT_DOWN: u32 = 0x21C;
/// Handle of the module not yet released by `freeModule`, or 0.
pub const STATE_LIVE_HANDLE: u32 = 0x220;
/// Non-null `FreeBytes` calls.
pub const STATE_FREE_COUNT: u32 = 0x224;
/// `flag_a | flag_b << 1` of the most recent `CallFunctionByName`.
pub const STATE_LAST_FLAGS: u32 = 0x228;

pub const CLOCK_SCRATCH_ADDR: u32 = 0x240;
pub const DESCRIPTOR_ADDR: u32 = 0x280;
pub const ROUND_TABLE_ADDR: u32 = 0x300;
pub const MODULE_BYTES_ADDR: u32 = 0x400;
pub const HEAP_BASE: u32 = 0x8000;

/// Initial `__stack_pointer` (top of the initial memory).
pub const STACK_TOP: i32 = (INITIAL_MEMORY_PAGES as i32) * 65536;

// ── Table ────────────────────────────────────────────────────────────────────

pub const TABLE_SIZE: u64 = 8;
/// Slot called by `CallFunctionByName`.
pub const MAIN_SLOT: i32 = 1;
/// Slot populated by JIT round 0 and called by later rounds.
pub const HELPER_SLOT: i32 = 2;

// ── Limits ───────────────────────────────────────────────────────────────────

/// Most rounds the embedded round table can describe.
pub const MAX_ROUNDS: u32 = (MODULE_BYTES_ADDR - ROUND_TABLE_ADDR) / 8;

// ── Guest type indices ───────────────────────────────────────────────────────

/// `() -> ()`
pub const TYPE_VOID_VOID: u32 = 0;
/// `() -> i32`
pub const TYPE_VOID_I32: u32 = 1;
/// `(i32) -> ()`
pub const TYPE_I32_VOID: u32 = 2;
/// `(i32) -> i32`
pub const TYPE_I32_I32: u32 = 3;
/// `(i32, i32, i32) -> f64`
pub const TYPE_I32X3_F64: u32 = 4;
/// `(i32, i64, i32) -> i32`: `clock_time_get`
pub const TYPE_CLOCK_TIME_GET: u32 = 5;
/// `(i32, i32, i32, i32) -> i32`: `fd_write`
pub const TYPE_FD_WRITE: u32 = 6;

// ── Guest function indices ───────────────────────────────────────────────────
// (order must match the import and function sections in guest.rs)

pub const IMPORT_CLOCK_TIME_GET: u32 = 0;
pub const IMPORT_FD_WRITE: u32 = 1;
pub const IMPORT_FUNC_COUNT: u32 = 2;

pub const FN_INITIALIZE: u32 = IMPORT_FUNC_COUNT;
pub const FN_INITIALIZE_SM: u32 = IMPORT_FUNC_COUNT + 1;
pub const FN_SHUT_DOWN_SM: u32 = IMPORT_FUNC_COUNT + 2;
pub const FN_EXECUTE: u32 = IMPORT_FUNC_COUNT + 3;
pub const FN_CALL_FUNCTION_BY_NAME: u32 = IMPORT_FUNC_COUNT + 4;
pub const FN_ALLOCATE_BYTES: u32 = IMPORT_FUNC_COUNT + 5;
pub const FN_FREE_BYTES: u32 = IMPORT_FUNC_COUNT + 6;
pub const FN_JIT_MODULE: u32 = IMPORT_FUNC_COUNT + 7;
pub const FN_MODULE_DATA: u32 = IMPORT_FUNC_COUNT + 8;
pub const FN_MODULE_SIZE: u32 = IMPORT_FUNC_COUNT + 9;
pub const FN_FREE_MODULE: u32 = IMPORT_FUNC_COUNT + 10;
pub const FN_MAIN_INTERPRETED: u32 = IMPORT_FUNC_COUNT + 11;

// ── Guest global indices ─────────────────────────────────────────────────────

/// `env.r1` … `env.r7` are globals 0..7; `r1` counts interpreted main calls.
pub const GLOBAL_R1: u32 = 0;
/// Defined after the seven imported registers.
pub const GLOBAL_STACK_POINTER: u32 = 7;
