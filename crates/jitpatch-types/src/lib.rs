//! Shared types for the jitpatch harness.
//!
//! This crate defines the error taxonomy, the harness configuration, the
//! guest ABI (export/import names), extracted JIT module values, and the
//! on-disk artifact layout used by every other crate in the workspace.

pub mod abi;
pub mod artifacts;
mod config;
mod error;
mod module;

pub use artifacts::{Manifest, ManifestRound};
pub use config::{GuestIo, HarnessConfig, OptimizerConfig, OptimizerFailurePolicy, MAX_PATCH_ROUNDS};
pub use error::{ErrorKind, HarnessError};
pub use module::{sha256_digest, ExtractedModule, RoundIndex};

/// Result type used throughout the harness.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
