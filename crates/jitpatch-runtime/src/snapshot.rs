use std::path::Path;

use jitpatch_diff::{MemorySnapshot, SparseDiff};
use jitpatch_types::{HarnessError, HarnessResult};

use crate::context::ExecutionContext;

impl ExecutionContext {
    /// Copy the whole linear memory.
    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot::new(self.memory.data(&self.store).to_vec())
    }

    /// Write `diff` into linear memory. Nothing is written if any offset is
    /// out of bounds.
    pub fn apply_diff(&mut self, diff: &SparseDiff) -> HarnessResult<()> {
        diff.apply_to(self.memory.data_mut(&mut self.store))
    }

    /// Dump the whole linear memory to `path` as raw bytes.
    pub fn dump_memory(&self, path: &Path) -> HarnessResult<()> {
        self.snapshot().save(path)
    }

    /// Overwrite linear memory with a snapshot of exactly the same size.
    pub fn restore_snapshot(&mut self, snapshot: &MemorySnapshot) -> HarnessResult<()> {
        let data = self.memory.data_mut(&mut self.store);
        if data.len() != snapshot.len() {
            return Err(HarnessError::SizeMismatch {
                before: snapshot.len(),
                after: data.len(),
            });
        }
        data.copy_from_slice(snapshot.as_bytes());
        Ok(())
    }

    /// [`Self::restore_snapshot`] from a dump written by [`Self::dump_memory`].
    pub fn load_memory(&mut self, path: &Path) -> HarnessResult<()> {
        let snapshot = MemorySnapshot::load(path)?;
        self.restore_snapshot(&snapshot)
    }
}
