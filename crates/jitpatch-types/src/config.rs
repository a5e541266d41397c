use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{HarnessError, HarnessResult};

/// Upper bound on patch rounds per record run.
pub const MAX_PATCH_ROUNDS: u32 = 8;

/// What to do when the external optimizer fails after extraction succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizerFailurePolicy {
    /// Fail the round, and with it the run.
    #[default]
    Abort,
    /// Log a warning and link the un-optimized bytes.
    FallBack,
}

impl std::str::FromStr for OptimizerFailurePolicy {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort" => Ok(Self::Abort),
            "fall-back" | "fallback" => Ok(Self::FallBack),
            other => Err(HarnessError::Configuration(format!(
                "unknown optimizer failure policy {other:?} (expected `abort` or `fall-back`)"
            ))),
        }
    }
}

/// External optimizer invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub on_failure: OptimizerFailurePolicy,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("wasm-opt"),
            args: [
                "-O4",
                "--enable-reference-types",
                "--inlining-optimizing",
                "--always-inline-max-function-size",
                "400",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            on_failure: OptimizerFailurePolicy::Abort,
        }
    }
}

/// Where the guest's stdout/stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuestIo {
    /// Forward guest stdout to the host's stdout; otherwise capture it.
    pub inherit_stdout: bool,
    /// Forward guest stderr to the host's stderr; otherwise capture it.
    pub inherit_stderr: bool,
}

impl Default for GuestIo {
    fn default() -> Self {
        Self {
            inherit_stdout: true,
            inherit_stderr: true,
        }
    }
}

impl GuestIo {
    /// Capture both streams in memory (tests).
    pub fn captured() -> Self {
        Self {
            inherit_stdout: false,
            inherit_stderr: false,
        }
    }
}

/// Harness configuration, loadable from JSON and overridable from the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// Path of the guest engine module.
    pub guest_module: PathBuf,
    /// Passed to `InitializeSM`.
    pub enable_adaptive_compilation: bool,
    /// Name of the guest function driven by the warm-up and validation calls.
    pub entry_point: String,
    /// Calls made before the first patch round.
    pub warmup_calls: u32,
    /// Number of extract-and-link rounds.
    pub patch_rounds: u32,
    pub io: GuestIo,
    /// `None` links raw extracted bytes.
    pub optimizer: Option<OptimizerConfig>,
    /// Directory receiving the diff, module files and manifest.
    pub output_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            guest_module: PathBuf::from("spiderMonkey.wasm"),
            enable_adaptive_compilation: true,
            entry_point: "main".to_string(),
            warmup_calls: 101,
            patch_rounds: 2,
            io: GuestIo::default(),
            optimizer: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl HarnessConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.entry_point.is_empty() {
            return Err(HarnessError::Configuration(
                "entry point name must not be empty".into(),
            ));
        }
        if self.entry_point.contains('\0') {
            return Err(HarnessError::Configuration(
                "entry point name must not contain NUL".into(),
            ));
        }
        if self.patch_rounds > MAX_PATCH_ROUNDS {
            return Err(HarnessError::Configuration(format!(
                "{} patch rounds requested, at most {MAX_PATCH_ROUNDS} are supported",
                self.patch_rounds
            )));
        }
        if let Some(opt) = &self.optimizer {
            if opt.program.as_os_str().is_empty() {
                return Err(HarnessError::Configuration(
                    "optimizer program must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = HarnessConfig::default();
        assert_eq!(config.warmup_calls, 101);
        assert_eq!(config.patch_rounds, 2);
        assert_eq!(config.entry_point, "main");
        assert!(config.enable_adaptive_compilation);
        assert!(config.optimizer.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{ "warmup_calls": 5, "optimizer": {} }"#).unwrap();
        assert_eq!(config.warmup_calls, 5);
        assert_eq!(config.patch_rounds, 2);
        let opt = config.optimizer.unwrap();
        assert_eq!(opt.program, PathBuf::from("wasm-opt"));
        assert_eq!(opt.args[0], "-O4");
        assert_eq!(opt.on_failure, OptimizerFailurePolicy::Abort);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = serde_json::from_str::<HarnessConfig>(r#"{ "warmup": 5 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_too_many_rounds() {
        let config = HarnessConfig {
            patch_rounds: MAX_PATCH_ROUNDS + 1,
            ..HarnessConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_rejects_empty_entry_point() {
        let config = HarnessConfig {
            entry_point: String::new(),
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "fall-back".parse::<OptimizerFailurePolicy>().unwrap(),
            OptimizerFailurePolicy::FallBack
        );
        assert_eq!(
            "abort".parse::<OptimizerFailurePolicy>().unwrap(),
            OptimizerFailurePolicy::Abort
        );
        assert!("retry".parse::<OptimizerFailurePolicy>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(
            &path,
            r#"{ "entry_point": "bench", "io": { "inherit_stdout": false } }"#,
        )
        .unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.entry_point, "bench");
        assert!(!config.io.inherit_stdout);
        assert!(config.io.inherit_stderr);
    }
}
