// crates/divine-guard-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: Integration tests for the divine-guard binary.
// Purpose: Exercise config, offline compile, and rule store commands end to end.
// Dependencies: divine-guard binary, serde_json, tempfile
// ============================================================================
//! ## Overview
//! Runs the compiled `divine-guard` binary against temporary config and rule
//! files and checks exit status, stdout JSON, and stderr messages.
//!
//! Security posture: rule batches must fail closed before any write and
//! oversized inputs must be refused.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn divine_guard_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_divine-guard"))
}

fn run(args: &[&str]) -> Output {
    Command::new(divine_guard_bin()).args(args).output().expect("run divine-guard")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

fn write_rules(dir: &TempDir, name: &str, rules: &Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, rules.to_string()).expect("write rules");
    path
}

fn sqlite_config(dir: &TempDir) -> PathBuf {
    let db_path = dir.path().join("rules.sqlite");
    let config = format!(
        "[rule_store]\ntype = \"sqlite\"\npath = \"{}\"\n",
        db_path.to_string_lossy()
    );
    let path = dir.path().join("divine-guard.toml");
    fs::write(&path, config).expect("write config");
    path
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Verifies the printed example config passes `config validate`.
#[test]
fn config_example_round_trips_through_validate() {
    let dir = TempDir::new().unwrap();
    let example = run(&["config", "example"]);
    assert!(example.status.success());
    let path = dir.path().join("example.toml");
    fs::write(&path, &example.stdout).unwrap();

    let output = run(&["config", "validate", "--config", &path_arg(&path)]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("config ok"));
}

/// Verifies invalid configs fail validation with the offending field.
#[test]
fn config_validate_rejects_invalid_snapshot_limits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[snapshot]\nttl_seconds = 0\n").unwrap();
    let output = run(&["config", "validate", "--config", &path_arg(&path)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ttl_seconds"));
}

/// Verifies `serve` refuses a non-loopback bind without bearer auth.
#[test]
fn serve_rejects_non_loopback_bind_without_bearer_auth() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("serve.toml");
    fs::write(&path, "[server]\nbind = \"0.0.0.0:8787\"\n").unwrap();
    let output = run(&["serve", "--config", &path_arg(&path)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("non-loopback"), "unexpected stderr: {stderr}");
}

// ============================================================================
// SECTION: Snapshot Compile
// ============================================================================

/// Verifies offline compilation honors context filters and priority.
#[test]
fn snapshot_compile_resolves_context_and_priority() {
    let dir = TempDir::new().unwrap();
    let rules = write_rules(
        &dir,
        "rules.json",
        &json!([
            {"rule_key": "slow-media", "scope": "media", "priority": 20,
             "match": {"network_state": "slow"},
             "action": {"force_image_quality": "low", "disable_video_autoplay": true}},
            {"rule_key": "baseline-media", "scope": "media", "priority": 1,
             "action": {"force_image_quality": "high"}},
            {"rule_key": "beta-ai", "scope": "ai", "priority": 5,
             "match": {"app_version": ["2.0.0-beta"]}, "action": {"disable_ai": true}}
        ]),
    );

    let slow = stdout_json(&run(&[
        "snapshot",
        "compile",
        "--rules",
        &path_arg(&rules),
        "--network-state",
        "slow",
    ]));
    assert_eq!(slow["media"]["force_image_quality"], "low");
    assert_eq!(slow["media"]["disable_video_autoplay"], true);
    assert_eq!(slow["ai"]["disable_ai"], false);
    assert_eq!(slow["context"]["network_state"], "slow");
    assert_eq!(slow["safe_mode_forced"], false);

    let fast = stdout_json(&run(&["snapshot", "compile", "--rules", &path_arg(&rules)]));
    assert_eq!(fast["media"]["force_image_quality"], "high");
    assert_eq!(fast["media"]["disable_video_autoplay"], false);
    assert_ne!(slow["config_hash"], fast["config_hash"]);
}

/// Verifies a global safe-mode rule forces the conservative table.
#[test]
fn snapshot_compile_applies_safe_mode() {
    let dir = TempDir::new().unwrap();
    let rules = write_rules(
        &dir,
        "rules.json",
        &json!([
            {"rule_key": "panic", "scope": "global", "priority": 100,
             "action": {"safe_mode": true}},
            {"rule_key": "hq", "scope": "media", "priority": 50,
             "action": {"force_image_quality": "high"}}
        ]),
    );
    let snapshot = stdout_json(&run(&["snapshot", "compile", "--rules", &path_arg(&rules)]));
    assert_eq!(snapshot["safe_mode_forced"], true);
    assert_eq!(snapshot["global"]["safe_mode"], true);
    assert_eq!(snapshot["media"]["force_image_quality"], "low");
    assert_eq!(snapshot["ai"]["disable_ai"], true);
}

/// Verifies invalid payloads are reported by position.
#[test]
fn snapshot_compile_reports_invalid_rule_position() {
    let dir = TempDir::new().unwrap();
    let rules = write_rules(
        &dir,
        "rules.json",
        &json!([
            {"rule_key": "ok", "scope": "ux", "action": {"skeleton_only": true}},
            {"rule_key": "bad", "scope": "weather", "action": {}}
        ]),
    );
    let output = run(&["snapshot", "compile", "--rules", &path_arg(&rules)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rule #1 (bad)"), "unexpected stderr: {stderr}");
}

/// Verifies oversized rule files are refused before parsing.
#[test]
fn snapshot_compile_rejects_oversized_rule_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huge.json");
    fs::write(&path, vec![b' '; 1024 * 1024 + 1]).unwrap();
    let output = run(&["snapshot", "compile", "--rules", &path_arg(&path)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("too large"), "unexpected stderr: {stderr}");
}

// ============================================================================
// SECTION: Rule Store Commands
// ============================================================================

/// Verifies imported rules persist and list with actor bookkeeping.
#[test]
fn rules_import_then_list_round_trips_through_sqlite() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);
    let rules = write_rules(
        &dir,
        "rules.json",
        &json!([
            {"rule_key": "net-timeout", "scope": "network", "priority": 3,
             "action": {"timeout_ms": 8000}},
            {"rule_key": "calm-ux", "scope": "ux", "action": {"reduce_animations": true}}
        ]),
    );

    let summary = stdout_json(&run(&[
        "rules",
        "import",
        "--input",
        &path_arg(&rules),
        "--config",
        &path_arg(&config),
        "--actor",
        " Ops@Example.com ",
    ]));
    assert_eq!(summary["imported"], 2);
    assert_eq!(summary["rules"][0]["action"], "create");

    let listed = stdout_json(&run(&[
        "rules",
        "list",
        "--scope",
        "network",
        "--config",
        &path_arg(&config),
    ]));
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["rule_key"], "net-timeout");
    assert_eq!(listed[0]["created_by"], "ops@example.com");

    let again = stdout_json(&run(&[
        "rules",
        "import",
        "--input",
        &path_arg(&rules),
        "--config",
        &path_arg(&config),
    ]));
    assert_eq!(again["rules"][0]["action"], "update");
    let all = stdout_json(&run(&["rules", "list", "--config", &path_arg(&config)]));
    assert_eq!(all.as_array().unwrap().len(), 2);
    assert_eq!(all[0]["updated_by"], "cli");
}

/// Verifies a batch with one bad payload writes nothing.
#[test]
fn rules_import_is_all_or_nothing_on_validation() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);
    let rules = write_rules(
        &dir,
        "rules.json",
        &json!([
            {"rule_key": "fine", "scope": "ai", "action": {"disable_ai": true}},
            {"rule_key": "negative", "scope": "ai", "priority": -1, "action": {}}
        ]),
    );
    let output = run(&[
        "rules",
        "import",
        "--input",
        &path_arg(&rules),
        "--config",
        &path_arg(&config),
    ]);
    assert!(!output.status.success());

    let listed = stdout_json(&run(&["rules", "list", "--config", &path_arg(&config)]));
    assert!(listed.as_array().unwrap().is_empty());
}

/// Verifies an oversized match set is refused before the first write.
#[test]
fn rules_import_rejects_oversized_match_without_partial_commit() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);
    let versions: Vec<String> = (0 .. 8000).map(|index| format!("9.9.{index}")).collect();
    let rules = write_rules(
        &dir,
        "rules.json",
        &json!([
            {"rule_key": "first", "scope": "ai", "action": {"disable_ai": true}},
            {"rule_key": "second", "scope": "ai", "match": {"app_version": versions},
             "action": {"disable_ai": true}}
        ]),
    );
    let output = run(&[
        "rules",
        "import",
        "--input",
        &path_arg(&rules),
        "--config",
        &path_arg(&config),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rule #1 (second)"), "unexpected stderr: {stderr}");

    let listed = stdout_json(&run(&["rules", "list", "--config", &path_arg(&config)]));
    assert!(listed.as_array().unwrap().is_empty());
}

/// Verifies import refuses the ephemeral memory store.
#[test]
fn rules_import_requires_a_persistent_store() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("memory.toml");
    fs::write(&config, "[rule_store]\ntype = \"memory\"\n").unwrap();
    let rules = write_rules(&dir, "rules.json", &json!([]));
    let output = run(&[
        "rules",
        "import",
        "--input",
        &path_arg(&rules),
        "--config",
        &path_arg(&config),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("sqlite"));
}

/// Verifies unknown scopes are rejected by `rules list`.
#[test]
fn rules_list_rejects_unknown_scope() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);
    let output =
        run(&["rules", "list", "--scope", "weather", "--config", &path_arg(&config)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid --scope"));
}
