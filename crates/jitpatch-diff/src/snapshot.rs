use std::path::Path;

use jitpatch_types::abi::WASM_PAGE_SIZE;
use jitpatch_types::HarnessResult;

/// Owned copy of a linear memory at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySnapshot {
    bytes: Vec<u8>,
}

impl MemorySnapshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whole pages covered by this snapshot.
    pub fn pages(&self) -> usize {
        self.bytes.len() / WASM_PAGE_SIZE
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Write the raw bytes, no header.
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        std::fs::write(path, &self.bytes)?;
        log::info!("wrote {} byte memory dump to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> HarnessResult<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }
}

impl From<Vec<u8>> for MemorySnapshot {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl AsRef<[u8]> for MemorySnapshot {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
