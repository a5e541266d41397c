use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Position of a JIT module in extraction order (0, 1, 2, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundIndex(pub u32);

impl RoundIndex {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RoundIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One round of guest-compiled code, copied out of guest memory.
///
/// Later rounds may call through table slots that earlier rounds populate,
/// so modules must be linked in round order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedModule {
    round: RoundIndex,
    bytes: Vec<u8>,
}

impl ExtractedModule {
    pub fn new(round: RoundIndex, bytes: Vec<u8>) -> Self {
        Self { round, bytes }
    }

    pub fn round(&self) -> RoundIndex {
        self.round
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Same round, different code (e.g. the optimizer's output).
    pub fn with_bytes(&self, bytes: Vec<u8>) -> Self {
        Self {
            round: self.round,
            bytes,
        }
    }

    pub fn digest(&self) -> String {
        sha256_digest(&self.bytes)
    }
}

/// `sha256:<hex>` digest of `bytes`.
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}
