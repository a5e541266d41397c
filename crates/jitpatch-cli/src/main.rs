use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jitpatch_types::{ErrorKind, HarnessError, OptimizerFailurePolicy};

mod config;
mod mock_guest;
mod record;
mod replay;
mod sink;

#[derive(Parser, Debug)]
#[command(name = "jitpatch")]
#[command(about = "Record and replay JIT hot-patch sessions of a WebAssembly guest engine.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a script, patch in the guest's JIT output and record the memory diff.
    Record {
        /// Script handed to the guest's `Execute`.
        source: PathBuf,
        /// Guest engine module.
        #[arg(long)]
        guest: Option<PathBuf>,
        /// Directory for diff.txt, jitmodule<N>.wasm and recording.json.
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        warmup_calls: Option<u32>,
        #[arg(long)]
        rounds: Option<u32>,
        /// Guest function to call.
        #[arg(long)]
        entry: Option<String>,
        /// Run wasm-opt over every extracted module before linking it.
        #[arg(long, default_value_t = false)]
        optimize: bool,
        /// wasm-opt binary (implies --optimize).
        #[arg(long)]
        wasm_opt: Option<PathBuf>,
        /// `abort` or `fall-back`.
        #[arg(long)]
        on_optimizer_failure: Option<OptimizerFailurePolicy>,
        /// Pass 0 to `InitializeSM`.
        #[arg(long, default_value_t = false)]
        no_adaptive: bool,
        /// Also write memory_before.bin and memory_after.bin (raw memory).
        #[arg(long, default_value_t = false)]
        dump_memory: bool,
        /// JSON harness configuration; flags override it.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Link recorded modules into a fresh guest, apply the diff, call the entry point.
    Replay {
        diff: PathBuf,
        /// Module files in round order.
        modules: Vec<PathBuf>,
        #[arg(long)]
        guest: Option<PathBuf>,
        #[arg(long)]
        entry: Option<String>,
        /// recording.json to verify the modules and memory size against.
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Write the raw memory after the entry call to this file.
        #[arg(long)]
        dump_memory: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write the stand-in guest engine module.
    MockGuest {
        #[arg(long, default_value = "mockguest.wasm")]
        out: PathBuf,
        #[arg(long, default_value_t = 2)]
        rounds: u32,
        #[arg(long, default_value_t = 100)]
        hot_threshold: u32,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error[{}]: {err:#}", error_kind(&err));
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Record {
            source,
            guest,
            out_dir,
            warmup_calls,
            rounds,
            entry,
            optimize,
            wasm_opt,
            on_optimizer_failure,
            no_adaptive,
            dump_memory,
            config,
        } => {
            let config = config::RecordOverrides {
                guest,
                out_dir,
                warmup_calls,
                rounds,
                entry,
                optimize,
                wasm_opt,
                on_optimizer_failure,
                no_adaptive,
            }
            .apply(config::load(config.as_deref())?)?;
            record::run(&source, &config, dump_memory)
        }
        Command::Replay {
            diff,
            modules,
            guest,
            entry,
            manifest,
            dump_memory,
            config,
        } => {
            let mut base = config::load(config.as_deref())?;
            if let Some(guest) = guest {
                base.guest_module = guest;
            }
            base.validate()?;
            replay::run(
                &diff,
                &modules,
                entry,
                manifest.as_deref(),
                dump_memory.as_deref(),
                &base,
            )
        }
        Command::MockGuest {
            out,
            rounds,
            hot_threshold,
        } => mock_guest::run(&out, rounds, hot_threshold),
    }
}

/// Kind printed in the `error[<kind>]` prefix.
fn error_kind(err: &anyhow::Error) -> ErrorKind {
    for cause in err.chain() {
        if let Some(harness) = cause.downcast_ref::<HarnessError>() {
            return harness.kind();
        }
        if cause.is::<std::io::Error>() {
            return ErrorKind::Io;
        }
    }
    ErrorKind::Configuration
}
