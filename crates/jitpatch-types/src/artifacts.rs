//! On-disk artifacts of a record run.
//!
//! ```text
//! <out>/diff.txt                 sparse memory diff, `<offset> <byte>` per line
//! <out>/jitmodule<N>.wasm        raw bytes extracted in round N
//! <out>/jitmodule_opt_<N>.wasm   optimizer output for round N (optional)
//! <out>/recording.json           manifest (this module)
//! <out>/memory_before.bin        raw memory before warm-up (--dump-memory)
//! <out>/memory_after.bin         raw memory after the last round (--dump-memory)
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{HarnessError, HarnessResult, RoundIndex};

pub const DIFF_FILE_NAME: &str = "diff.txt";
pub const MANIFEST_FILE_NAME: &str = "recording.json";
pub const MEMORY_BEFORE_FILE_NAME: &str = "memory_before.bin";
pub const MEMORY_AFTER_FILE_NAME: &str = "memory_after.bin";

/// Manifest schema identifier.
pub const MANIFEST_SCHEMA: &str = "jitpatch.recording@0.1.0";

pub fn raw_module_file_name(round: RoundIndex) -> String {
    format!("jitmodule{}.wasm", round.0)
}

pub fn optimized_module_file_name(round: RoundIndex) -> String {
    format!("jitmodule_opt_{}.wasm", round.0)
}

/// One patch round as recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRound {
    pub round: RoundIndex,
    pub raw_file: String,
    pub raw_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_sha256: Option<String>,
    /// Digest of the bytes that were actually linked.
    pub linked_sha256: String,
}

impl ManifestRound {
    /// File holding the bytes that were linked in this round.
    pub fn linked_file(&self) -> &str {
        match (&self.optimized_file, &self.optimized_sha256) {
            (Some(file), Some(digest)) if *digest == self.linked_sha256 => file,
            _ => &self.raw_file,
        }
    }
}

/// Description of a record run, written next to the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: String,
    pub entry_point: String,
    pub warmup_calls: u32,
    /// Linear memory size the diff was captured against.
    pub memory_bytes: usize,
    pub diff_file: String,
    pub diff_entries: usize,
    pub rounds: Vec<ManifestRound>,
}

impl Manifest {
    pub fn new(entry_point: &str, warmup_calls: u32, memory_bytes: usize) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA.to_string(),
            entry_point: entry_point.to_string(),
            warmup_calls,
            memory_bytes,
            diff_file: DIFF_FILE_NAME.to_string(),
            diff_entries: 0,
            rounds: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> HarnessResult<Self> {
        let bytes = std::fs::read(path)?;
        let manifest: Self = serde_json::from_slice(&bytes)?;
        if manifest.schema_version != MANIFEST_SCHEMA {
            return Err(HarnessError::Malformed {
                what: "manifest",
                line: 1,
                message: format!(
                    "schema_version mismatch: expected {MANIFEST_SCHEMA} got {:?}",
                    manifest.schema_version
                ),
            });
        }
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Digests of the linked modules, in round order.
    pub fn linked_digests(&self) -> Vec<&str> {
        let mut rounds: Vec<&ManifestRound> = self.rounds.iter().collect();
        rounds.sort_by_key(|r| r.round);
        rounds.iter().map(|r| r.linked_sha256.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(n: u32, optimized: bool) -> ManifestRound {
        ManifestRound {
            round: RoundIndex(n),
            raw_file: raw_module_file_name(RoundIndex(n)),
            raw_sha256: format!("sha256:raw{n}"),
            optimized_file: optimized.then(|| optimized_module_file_name(RoundIndex(n))),
            optimized_sha256: optimized.then(|| format!("sha256:opt{n}")),
            linked_sha256: if optimized {
                format!("sha256:opt{n}")
            } else {
                format!("sha256:raw{n}")
            },
        }
    }

    #[test]
    fn test_file_names_follow_round_index() {
        assert_eq!(raw_module_file_name(RoundIndex(0)), "jitmodule0.wasm");
        assert_eq!(
            optimized_module_file_name(RoundIndex(1)),
            "jitmodule_opt_1.wasm"
        );
    }

    #[test]
    fn test_linked_file_prefers_optimized_when_linked() {
        assert_eq!(round(0, true).linked_file(), "jitmodule_opt_0.wasm");
        assert_eq!(round(0, false).linked_file(), "jitmodule0.wasm");
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        let mut manifest = Manifest::new("main", 101, 131_072);
        manifest.rounds.push(round(1, false));
        manifest.rounds.push(round(0, true));
        manifest.diff_entries = 42;
        manifest.save(&path).unwrap();

        let loaded = Manifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.linked_digests(), vec!["sha256:opt0", "sha256:raw1"]);

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(!json.contains("\"optimized_file\": null"));
    }

    #[test]
    fn test_manifest_schema_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE_NAME);
        let mut manifest = Manifest::new("main", 1, 65_536);
        manifest.schema_version = "something-else".into();
        manifest.save(&path).unwrap();
        let err = Manifest::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
    }
}
