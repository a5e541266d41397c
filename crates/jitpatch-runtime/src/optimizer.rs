//! Post-extraction optimizers.

use std::path::PathBuf;
use std::process::Command;

use jitpatch_types::artifacts::{optimized_module_file_name, raw_module_file_name};
use jitpatch_types::{ExtractedModule, HarnessError, HarnessResult, OptimizerConfig};

/// Rewrites an extracted module before it is linked.
pub trait Optimizer {
    /// Name used in logs and `external-tool` errors.
    fn name(&self) -> &str;

    fn optimize(&self, module: &ExtractedModule) -> HarnessResult<Vec<u8>>;
}

/// Returns the bytes unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Optimizer for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn optimize(&self, module: &ExtractedModule) -> HarnessResult<Vec<u8>> {
        Ok(module.bytes().to_vec())
    }
}

/// Binaryen's `wasm-opt`, run as a child process in a scratch directory.
#[derive(Debug, Clone)]
pub struct WasmOpt {
    program: PathBuf,
    args: Vec<String>,
    name: String,
}

impl WasmOpt {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        let name = program.display().to_string();
        Self {
            program,
            args,
            name,
        }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    fn tool_error(&self, message: String) -> HarnessError {
        HarnessError::ExternalTool {
            tool: self.name.clone(),
            message,
        }
    }
}

impl Default for WasmOpt {
    fn default() -> Self {
        Self::from_config(&OptimizerConfig::default())
    }
}

impl Optimizer for WasmOpt {
    fn name(&self) -> &str {
        &self.name
    }

    fn optimize(&self, module: &ExtractedModule) -> HarnessResult<Vec<u8>> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join(raw_module_file_name(module.round()));
        let output = scratch.path().join(optimized_module_file_name(module.round()));
        std::fs::write(&input, module.bytes())?;

        log::debug!(
            "running {} {} {} -o {}",
            self.name,
            self.args.join(" "),
            input.display(),
            output.display()
        );
        let result = Command::new(&self.program)
            .args(&self.args)
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .output()
            .map_err(|e| self.tool_error(format!("failed to start: {e}")))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(self.tool_error(format!("{}: {}", result.status, stderr.trim())));
        }

        let optimized = std::fs::read(&output)
            .map_err(|e| self.tool_error(format!("no output module: {e}")))?;
        wasmparser::validate(&optimized)
            .map_err(|e| self.tool_error(format!("produced an invalid module: {e}")))?;
        log::info!(
            "optimized round {}: {} -> {} bytes",
            module.round(),
            module.bytes().len(),
            optimized.len()
        );
        Ok(optimized)
    }
}
