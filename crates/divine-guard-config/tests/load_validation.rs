//! Config load validation tests for divine-guard-config.
// crates/divine-guard-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards (path, size, encoding).
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use divine_guard_config::ConfigError;
use divine_guard_config::DivineGuardConfig;
use divine_guard_config::RuleStoreType;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<DivineGuardConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(
        DivineGuardConfig::load(Some(Path::new(&long_path))),
        "config path exceeds max length",
    )
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        DivineGuardConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'#'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(DivineGuardConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(DivineGuardConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    match DivineGuardConfig::load(Some(&dir.path().join("absent.toml"))) {
        Err(ConfigError::Io(_)) => Ok(()),
        Err(other) => Err(format!("expected io error, got {other}")),
        Ok(_) => Err("expected missing config to fail".to_string()),
    }
}

#[test]
fn load_rejects_malformed_toml() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(b"[server\nbind = 1").map_err(|err| err.to_string())?;
    assert_invalid(DivineGuardConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn load_accepts_valid_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(b"[rule_store]\ntype = \"memory\"\n\n[snapshot]\nttl_seconds = 30\n")
        .map_err(|err| err.to_string())?;
    let config = DivineGuardConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    if config.rule_store.store_type != RuleStoreType::Memory || config.snapshot.ttl_seconds != 30 {
        return Err("loaded config did not match file contents".to_string());
    }
    Ok(())
}
