use std::collections::BTreeMap;

use jitpatch_types::{HarnessError, HarnessResult};

/// Sparse byte diff: offset → replacement byte, ascending by offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SparseDiff {
    entries: BTreeMap<usize, u8>,
}

impl SparseDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff two equal-length byte sequences in a single ascending pass.
    pub fn between(before: &[u8], after: &[u8]) -> HarnessResult<Self> {
        if before.len() != after.len() {
            return Err(HarnessError::SizeMismatch {
                before: before.len(),
                after: after.len(),
            });
        }
        let entries = before
            .iter()
            .zip(after)
            .enumerate()
            .filter(|(_, (old, new))| old != new)
            .map(|(offset, (_, &new))| (offset, new))
            .collect();
        Ok(Self { entries })
    }

    /// Write every entry into `target`.
    ///
    /// All offsets are checked first, so a failing apply leaves `target`
    /// untouched.
    pub fn apply_to(&self, target: &mut [u8]) -> HarnessResult<()> {
        if let Some(offset) = self.max_offset() {
            if offset >= target.len() {
                return Err(HarnessError::OutOfBounds {
                    offset,
                    len: target.len(),
                });
            }
        }
        for (&offset, &value) in &self.entries {
            target[offset] = value;
        }
        log::debug!(
            "applied {} diff entries to {} bytes",
            self.entries.len(),
            target.len()
        );
        Ok(())
    }

    /// Record `value` at `offset`, returning the previous value if any.
    pub fn insert(&mut self, offset: usize, value: u8) -> Option<u8> {
        self.entries.insert(offset, value)
    }

    pub fn get(&self, offset: usize) -> Option<u8> {
        self.entries.get(&offset).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_offset(&self) -> Option<usize> {
        self.entries.keys().next_back().copied()
    }

    /// Entries in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.entries.iter().map(|(&offset, &value)| (offset, value))
    }
}

impl FromIterator<(usize, u8)> for SparseDiff {
    fn from_iter<I: IntoIterator<Item = (usize, u8)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
