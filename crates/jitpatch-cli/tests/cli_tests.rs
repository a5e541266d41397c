//! Integration tests for the `jitpatch` binary.
//!
//! Every test writes the mock guest into a scratch directory and drives the
//! binary against it: record, replay, and the `error[<kind>]` failure path.

use std::path::Path;
use std::process::{Command, Output};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const SCRIPT: &str = "function main() { let s = 0; for (let i = 0; i < 10; i++) s += i; return s; }\n";

fn jitpatch(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_jitpatch"))
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to spawn jitpatch")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Scratch dir holding `guest.wasm` and `script.js`.
fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let out = jitpatch(&["mock-guest", "--out", "guest.wasm"], dir.path());
    assert!(out.status.success(), "mock-guest failed: {}", stderr(&out));
    std::fs::write(dir.path().join("script.js"), SCRIPT).unwrap();
    dir
}

fn record_into(dir: &Path, out_dir: &str) -> Output {
    jitpatch(
        &[
            "record",
            "script.js",
            "--guest",
            "guest.wasm",
            "--out-dir",
            out_dir,
        ],
        dir,
    )
}

fn path_str(p: &Path) -> &str {
    p.to_str().unwrap()
}

// ══════════════════════════════════════════════════════════════════════════════
// mock-guest
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_mock_guest_writes_wasm() {
    let dir = workspace();
    let bytes = std::fs::read(dir.path().join("guest.wasm")).unwrap();
    assert_eq!(&bytes[0..4], b"\0asm");
}

#[test]
fn test_mock_guest_rejects_zero_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let out = jitpatch(&["mock-guest", "--hot-threshold", "0"], dir.path());
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error["));
}

// ══════════════════════════════════════════════════════════════════════════════
// record
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_record_writes_all_artifacts() {
    let dir = workspace();
    let out = record_into(dir.path(), "run");
    assert!(out.status.success(), "record failed: {}", stderr(&out));

    let text = stdout(&out);
    assert_eq!(text.matches("Time in ms: ").count(), 101 + 2);

    let run = dir.path().join("run");
    for file in ["diff.txt", "jitmodule0.wasm", "jitmodule1.wasm", "recording.json"] {
        assert!(run.join(file).exists(), "missing {file}");
    }
    assert!(!run.join("jitmodule_opt_0.wasm").exists());

    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(run.join("recording.json")).unwrap()).unwrap();
    assert_eq!(manifest["entry_point"], "main");
    assert_eq!(manifest["warmup_calls"], 101);
    assert_eq!(manifest["rounds"].as_array().unwrap().len(), 2);
    let diff_lines = std::fs::read_to_string(run.join("diff.txt"))
        .unwrap()
        .lines()
        .count();
    assert_eq!(manifest["diff_entries"], diff_lines);
}

#[test]
fn test_record_dump_memory_writes_both_snapshots() {
    let dir = workspace();
    let out = jitpatch(
        &[
            "record",
            "script.js",
            "--guest",
            "guest.wasm",
            "--out-dir",
            "run",
            "--dump-memory",
        ],
        dir.path(),
    );
    assert!(out.status.success(), "record failed: {}", stderr(&out));

    let run = dir.path().join("run");
    let before = std::fs::read(run.join("memory_before.bin")).unwrap();
    let after = std::fs::read(run.join("memory_after.bin")).unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(before.len() % 65536, 0);

    let differing = before.iter().zip(&after).filter(|(a, b)| a != b).count();
    let diff_lines = std::fs::read_to_string(run.join("diff.txt"))
        .unwrap()
        .lines()
        .count();
    assert_eq!(differing, diff_lines);
}

#[test]
fn test_record_without_flag_writes_no_dump() {
    let dir = workspace();
    assert!(record_into(dir.path(), "run").status.success());
    assert!(!dir.path().join("run/memory_before.bin").exists());
    assert!(!dir.path().join("run/memory_after.bin").exists());
}

#[test]
fn test_record_missing_guest_is_configuration_error() {
    let dir = workspace();
    let out = jitpatch(
        &["record", "script.js", "--guest", "absent.wasm"],
        dir.path(),
    );
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error[configuration]"), "{}", stderr(&out));
}

#[test]
fn test_record_too_many_rounds_is_configuration_error() {
    let dir = workspace();
    let out = jitpatch(
        &["record", "script.js", "--guest", "guest.wasm", "--rounds", "99"],
        dir.path(),
    );
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error[configuration]"), "{}", stderr(&out));
}

#[test]
fn test_record_optimizer_failure_keeps_partial_artifacts() {
    let dir = workspace();
    let out = jitpatch(
        &[
            "record",
            "script.js",
            "--guest",
            "guest.wasm",
            "--out-dir",
            "run",
            "--wasm-opt",
            "/nonexistent/wasm-opt",
        ],
        dir.path(),
    );
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error[external-tool]"), "{}", stderr(&out));
    let run = dir.path().join("run");
    assert!(run.join("jitmodule0.wasm").exists());
    assert!(!run.join("recording.json").exists());
}

#[test]
fn test_record_optimizer_fall_back_completes() {
    let dir = workspace();
    let out = jitpatch(
        &[
            "record",
            "script.js",
            "--guest",
            "guest.wasm",
            "--out-dir",
            "run",
            "--wasm-opt",
            "/nonexistent/wasm-opt",
            "--on-optimizer-failure",
            "fall-back",
        ],
        dir.path(),
    );
    assert!(out.status.success(), "record failed: {}", stderr(&out));
    assert!(dir.path().join("run/recording.json").exists());
}

#[test]
fn test_record_reads_config_file() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("jitpatch.json"),
        r#"{ "guest_module": "guest.wasm", "warmup_calls": 100, "patch_rounds": 1, "output_dir": "cfg" }"#,
    )
    .unwrap();
    let out = jitpatch(&["record", "script.js", "--config", "jitpatch.json"], dir.path());
    assert!(out.status.success(), "record failed: {}", stderr(&out));
    assert_eq!(stdout(&out).matches("Time in ms: ").count(), 100 + 1);
    assert!(dir.path().join("cfg/jitmodule0.wasm").exists());
    assert!(!dir.path().join("cfg/jitmodule1.wasm").exists());
}

#[test]
fn test_unknown_config_field_is_configuration_error() {
    let dir = workspace();
    std::fs::write(dir.path().join("bad.json"), r#"{ "warmup": 3 }"#).unwrap();
    let out = jitpatch(&["record", "script.js", "--config", "bad.json"], dir.path());
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error[configuration]"), "{}", stderr(&out));
}

// ══════════════════════════════════════════════════════════════════════════════
// replay
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_replay_recorded_run() {
    let dir = workspace();
    assert!(record_into(dir.path(), "run").status.success());
    let run = dir.path().join("run");
    let out = jitpatch(
        &[
            "replay",
            path_str(&run.join("diff.txt")),
            path_str(&run.join("jitmodule0.wasm")),
            path_str(&run.join("jitmodule1.wasm")),
            "--guest",
            "guest.wasm",
            "--manifest",
            path_str(&run.join("recording.json")),
        ],
        dir.path(),
    );
    assert!(out.status.success(), "replay failed: {}", stderr(&out));
    assert_eq!(stdout(&out).matches("Time in ms: ").count(), 1);
}

#[test]
fn test_replay_dump_memory_matches_recorded_after() {
    let dir = workspace();
    let out = jitpatch(
        &[
            "record",
            "script.js",
            "--guest",
            "guest.wasm",
            "--out-dir",
            "run",
            "--dump-memory",
        ],
        dir.path(),
    );
    assert!(out.status.success(), "record failed: {}", stderr(&out));
    let run = dir.path().join("run");
    let out = jitpatch(
        &[
            "replay",
            path_str(&run.join("diff.txt")),
            path_str(&run.join("jitmodule0.wasm")),
            path_str(&run.join("jitmodule1.wasm")),
            "--guest",
            "guest.wasm",
            "--dump-memory",
            "replayed.bin",
        ],
        dir.path(),
    );
    assert!(out.status.success(), "replay failed: {}", stderr(&out));

    let replayed = std::fs::read(dir.path().join("replayed.bin")).unwrap();
    let recorded = std::fs::read(run.join("memory_after.bin")).unwrap();
    assert_eq!(replayed.len(), recorded.len());
}

#[test]
fn test_replay_swapped_modules_fail_manifest_check() {
    let dir = workspace();
    assert!(record_into(dir.path(), "run").status.success());
    let run = dir.path().join("run");
    let out = jitpatch(
        &[
            "replay",
            path_str(&run.join("diff.txt")),
            path_str(&run.join("jitmodule1.wasm")),
            path_str(&run.join("jitmodule0.wasm")),
            "--guest",
            "guest.wasm",
            "--manifest",
            path_str(&run.join("recording.json")),
        ],
        dir.path(),
    );
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error[configuration]"), "{}", stderr(&out));
}

#[test]
fn test_replay_out_of_bounds_diff_is_size_mismatch() {
    let dir = workspace();
    std::fs::write(dir.path().join("diff.txt"), "99999999 1\n").unwrap();
    let out = jitpatch(&["replay", "diff.txt", "--guest", "guest.wasm"], dir.path());
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error[size-mismatch]"), "{}", stderr(&out));
}

#[test]
fn test_replay_malformed_diff_is_format_error() {
    let dir = workspace();
    std::fs::write(dir.path().join("diff.txt"), "12 300\n").unwrap();
    let out = jitpatch(&["replay", "diff.txt", "--guest", "guest.wasm"], dir.path());
    assert!(!out.status.success());
    assert!(stderr(&out).contains("error[format]"), "{}", stderr(&out));
}
