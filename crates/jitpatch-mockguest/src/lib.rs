//! Stand-in guest engine.
//!
//! Emits a small WebAssembly reactor that implements the guest ABI from
//! [`jitpatch_types::abi`] without any real language engine behind it:
//!
//! - `Execute` accepts any non-empty source string.
//! - `CallFunctionByName` calls whatever function sits in table slot
//!   [`layout::MAIN_SLOT`] (initially a deliberately slow "interpreted"
//!   body returning 2) and returns the elapsed monotonic time in ms.
//! - After `hot_threshold + r` calls, `jitModule` hands out the bytes of JIT
//!   round `r`, which are embedded in the guest's data segment.
//!
//! Round 0 installs a helper in [`layout::HELPER_SLOT`] and a compiled main
//! in `MAIN_SLOT`. Every later round installs a main that reaches the helper
//! through the table, so linking round 1 without round 0 leaves the main
//! slot pointing at a function that traps on a null table entry.

pub mod error;
pub mod guest;
pub mod jit;
pub mod layout;

pub use error::{MockGuestError, MockGuestResult};
pub use guest::{build_guest, GuestOptions};
pub use jit::build_round_module;

pub(crate) fn memarg(offset: u64, align: u32) -> wasm_encoder::MemArg {
    wasm_encoder::MemArg {
        offset,
        align,
        memory_index: 0,
    }
}
