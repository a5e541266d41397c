//! Writes record artifacts to disk as they are produced.

use std::path::{Path, PathBuf};

use jitpatch_runtime::{ArtifactSink, CallPhase};
use jitpatch_types::artifacts::{optimized_module_file_name, raw_module_file_name};
use jitpatch_types::{ExtractedModule, HarnessResult, ManifestRound};

pub struct DirectorySink {
    dir: PathBuf,
    rounds: Vec<ManifestRound>,
}

impl DirectorySink {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            rounds: Vec::new(),
        }
    }

    /// Manifest entries for every round written so far.
    pub fn into_rounds(self) -> Vec<ManifestRound> {
        self.rounds
    }
}

impl ArtifactSink for DirectorySink {
    fn on_timing(&mut self, _phase: CallPhase, ms: f64) -> HarnessResult<()> {
        println!("Time in ms: {ms}");
        Ok(())
    }

    fn on_raw_module(&mut self, module: &ExtractedModule) -> HarnessResult<()> {
        let file = raw_module_file_name(module.round());
        std::fs::write(self.dir.join(&file), module.bytes())?;
        let digest = module.digest();
        log::info!("wrote {file}");
        self.rounds.push(ManifestRound {
            round: module.round(),
            raw_file: file,
            raw_sha256: digest.clone(),
            optimized_file: None,
            optimized_sha256: None,
            linked_sha256: digest,
        });
        Ok(())
    }

    fn on_optimized_module(&mut self, module: &ExtractedModule) -> HarnessResult<()> {
        let file = optimized_module_file_name(module.round());
        std::fs::write(self.dir.join(&file), module.bytes())?;
        log::info!("wrote {file}");
        if let Some(entry) = self.rounds.iter_mut().find(|r| r.round == module.round()) {
            let digest = module.digest();
            entry.optimized_file = Some(file);
            entry.optimized_sha256 = Some(digest.clone());
            entry.linked_sha256 = digest;
        }
        Ok(())
    }
}
