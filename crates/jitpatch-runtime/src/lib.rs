//! Shared execution context for a guest engine and the JIT modules it emits.
//!
//! ```text
//!            ┌──────────── Linker ────────────┐
//!  wasi ───▶ │ wasi_snapshot_preview1.*       │
//!  host ───▶ │ env.r1 … env.r7                │ ◀── guest exports
//!            │ env.memory / table / sp        │     (memory, table, sp)
//!            └───────┬───────────────┬────────┘
//!                    ▼               ▼
//!               guest engine    jitmodule0, jitmodule1, …
//! ```
//!
//! Every module linked after the guest attaches to the same linker and so
//! shares the guest's memory, call table and registers. Nothing is ever
//! unlinked; a later round only overwrites table slots.

mod context;
mod guest;
mod jit;
mod optimizer;
pub mod record;
pub mod replay;
mod snapshot;
mod wasi;

pub use context::{ExecutionContext, LinkedModule};
pub use guest::GuestString;
pub use jit::{optimize_module, RoundOutcome};
pub use optimizer::{Identity, Optimizer, WasmOpt};
pub use record::{record, ArtifactSink, CallPhase, CollectingSink, RecordPlan, Recording};
pub use replay::{replay, ReplayPlan, ReplayReport};
