//! Config file loading and flag overrides.

use std::path::{Path, PathBuf};

use jitpatch_types::{
    HarnessConfig, HarnessError, HarnessResult, OptimizerConfig, OptimizerFailurePolicy,
};

/// `--config FILE`, or the defaults.
pub fn load(path: Option<&Path>) -> HarnessResult<HarnessConfig> {
    let Some(path) = path else {
        return Ok(HarnessConfig::default());
    };
    HarnessConfig::load(path).map_err(|e| match e {
        HarnessError::Configuration(_) => e,
        other => HarnessError::Configuration(format!("{}: {other}", path.display())),
    })
}

/// `record` flags that override the config file.
#[derive(Debug, Default)]
pub struct RecordOverrides {
    pub guest: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub warmup_calls: Option<u32>,
    pub rounds: Option<u32>,
    pub entry: Option<String>,
    pub optimize: bool,
    pub wasm_opt: Option<PathBuf>,
    pub on_optimizer_failure: Option<OptimizerFailurePolicy>,
    pub no_adaptive: bool,
}

impl RecordOverrides {
    pub fn apply(self, mut config: HarnessConfig) -> HarnessResult<HarnessConfig> {
        if let Some(guest) = self.guest {
            config.guest_module = guest;
        }
        if let Some(dir) = self.out_dir {
            config.output_dir = dir;
        }
        if let Some(n) = self.warmup_calls {
            config.warmup_calls = n;
        }
        if let Some(k) = self.rounds {
            config.patch_rounds = k;
        }
        if let Some(entry) = self.entry {
            config.entry_point = entry;
        }
        if self.no_adaptive {
            config.enable_adaptive_compilation = false;
        }

        if self.optimize || self.wasm_opt.is_some() || self.on_optimizer_failure.is_some() {
            let optimizer = config.optimizer.get_or_insert_with(OptimizerConfig::default);
            if let Some(program) = self.wasm_opt {
                optimizer.program = program;
            }
            if let Some(policy) = self.on_optimizer_failure {
                optimizer.on_failure = policy;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_flags_keep_defaults() {
        let config = RecordOverrides::default()
            .apply(HarnessConfig::default())
            .unwrap();
        assert_eq!(config, HarnessConfig::default());
    }

    #[test]
    fn test_wasm_opt_implies_optimize() {
        let config = RecordOverrides {
            wasm_opt: Some(PathBuf::from("/opt/binaryen/bin/wasm-opt")),
            ..RecordOverrides::default()
        }
        .apply(HarnessConfig::default())
        .unwrap();
        let optimizer = config.optimizer.unwrap();
        assert_eq!(optimizer.program, PathBuf::from("/opt/binaryen/bin/wasm-opt"));
        assert_eq!(optimizer.on_failure, OptimizerFailurePolicy::Abort);
    }

    #[test]
    fn test_flags_override_file_values() {
        let file = HarnessConfig {
            warmup_calls: 7,
            entry_point: "bench".into(),
            ..HarnessConfig::default()
        };
        let config = RecordOverrides {
            warmup_calls: Some(3),
            no_adaptive: true,
            ..RecordOverrides::default()
        }
        .apply(file)
        .unwrap();
        assert_eq!(config.warmup_calls, 3);
        assert_eq!(config.entry_point, "bench");
        assert!(!config.enable_adaptive_compilation);
    }

    #[test]
    fn test_too_many_rounds_rejected() {
        let err = RecordOverrides {
            rounds: Some(99),
            ..RecordOverrides::default()
        }
        .apply(HarnessConfig::default())
        .unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }

    #[test]
    fn test_missing_config_file_is_configuration_error() {
        let err = load(Some(Path::new("/nonexistent/jitpatch.json"))).unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }
}
