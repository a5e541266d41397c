use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error kind, used for the `error[<kind>]` prefix printed by the CLI.
///
/// Several variants of [`HarnessError`] share a kind: a diff offset that
/// falls outside the target memory is reported as a size mismatch, and a
/// round-order violation is a link failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Configuration,
    Link,
    Allocation,
    SizeMismatch,
    ExternalTool,
    Guest,
    Format,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Link => write!(f, "link"),
            Self::Allocation => write!(f, "allocation"),
            Self::SizeMismatch => write!(f, "size-mismatch"),
            Self::ExternalTool => write!(f, "external-tool"),
            Self::Guest => write!(f, "guest"),
            Self::Format => write!(f, "format"),
            Self::Io => write!(f, "io"),
        }
    }
}

/// Errors raised by the harness. None of them is retried internally.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Missing or invalid configuration; no run is attempted.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Import/export binding mismatch, or a module that fails to compile or
    /// instantiate against the shared linker.
    #[error("link failed: {0}")]
    Link(String),

    /// A JIT module was linked out of extraction order.
    #[error("round order violated: expected round {expected}, got round {found}")]
    RoundOrder { expected: u32, found: u32 },

    /// The guest allocator returned a null address.
    #[error("guest allocator returned null for a {requested}-byte request")]
    Allocation { requested: usize },

    /// Two snapshots of different lengths were diffed.
    #[error("snapshot sizes differ: before is {before} bytes, after is {after} bytes")]
    SizeMismatch { before: usize, after: usize },

    /// A diff offset lies outside the target memory.
    #[error("diff offset {offset} is out of bounds for a memory of {len} bytes")]
    OutOfBounds { offset: usize, len: usize },

    /// The external optimizer failed or produced an unusable module.
    #[error("external tool `{tool}` failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// A guest export trapped.
    #[error("guest trapped in `{export}`: {message}")]
    GuestTrap { export: String, message: String },

    /// The guest answered an export call with something the protocol forbids.
    #[error("guest protocol violation: {0}")]
    Protocol(String),

    /// A persisted diff or manifest could not be parsed.
    #[error("malformed {what} at line {line}: {message}")]
    Malformed {
        what: &'static str,
        line: usize,
        message: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Link(_) | Self::RoundOrder { .. } => ErrorKind::Link,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::SizeMismatch { .. } | Self::OutOfBounds { .. } => ErrorKind::SizeMismatch,
            Self::ExternalTool { .. } => ErrorKind::ExternalTool,
            Self::GuestTrap { .. } | Self::Protocol(_) => ErrorKind::Guest,
            Self::Malformed { .. } | Self::Json(_) => ErrorKind::Format,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for a trap raised while calling `export`.
    pub fn trap(export: &str, err: impl fmt::Display) -> Self {
        Self::GuestTrap {
            export: export.to_string(),
            message: err.to_string(),
        }
    }
}
