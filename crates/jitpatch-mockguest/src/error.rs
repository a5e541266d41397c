//! Mock guest build errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MockGuestError {
    /// The requested options do not fit the fixed memory layout.
    #[error("layout error: {0}")]
    Layout(String),

    /// The emitted module failed validation.
    #[error("WASM validation failed: {0}")]
    ValidationFailed(String),
}

pub type MockGuestResult<T> = Result<T, MockGuestError>;
