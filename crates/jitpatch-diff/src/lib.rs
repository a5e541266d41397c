//! Memory snapshot/diff engine.
//!
//! ```text
//! before: MemorySnapshot ─┐
//!                         ├─ SparseDiff::between ─▶ SparseDiff ─▶ diff.txt
//! after:  MemorySnapshot ─┘                            │
//!                                                      ▼
//!                             fresh memory ◀── SparseDiff::apply_to
//! ```
//!
//! A diff only records offsets whose byte changed. Both sides of a diff
//! must have the same length; memory growth between snapshots is not
//! representable and is reported as a size mismatch.

mod diff;
mod snapshot;
mod text;

pub use diff::SparseDiff;
pub use snapshot::MemorySnapshot;
