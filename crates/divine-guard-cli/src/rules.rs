// crates/divine-guard-cli/src/rules.rs
// ============================================================================
// Module: Rule File Handling
// Description: Parsing, batch validation, offline compilation, and import.
// Purpose: Run operator-supplied rule files through the control plane.
// Dependencies: divine-guard-config, divine-guard-core, serde_json
// ============================================================================

//! ## Overview
//! A rule file is a JSON array of upsert payloads. Every payload is
//! validated before the first write, so a bad entry anywhere in the file
//! leaves the store untouched. Payloads are applied in file order; later
//! entries therefore carry higher revisions and win priority ties.

// ============================================================================
// SECTION: Imports
// ============================================================================

use divine_guard_config::DivineGuardConfig;
use divine_guard_core::ControlPlane;
use divine_guard_core::ControlPlaneError;
use divine_guard_core::ControlSnapshot;
use divine_guard_core::InMemoryRuleStore;
use divine_guard_core::RequestContext;
use divine_guard_core::RuleError;
use divine_guard_core::RuleUpsert;
use divine_guard_core::SharedRuleStore;
use divine_guard_core::Timestamp;
use divine_guard_core::UpsertOutcome;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Actor recorded for rules applied during offline compilation.
pub const OFFLINE_ACTOR: &str = "offline";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while handling a rule file.
#[derive(Debug, Error)]
pub enum RuleFileError {
    /// File is not a JSON array of upsert payloads.
    #[error("rule file is not a JSON array of rules: {0}")]
    Parse(#[from] serde_json::Error),
    /// One payload failed validation.
    #[error("rule #{index} ({rule_key}): {source}")]
    Invalid {
        /// Zero-based position in the file.
        index: usize,
        /// Rule key as written in the file.
        rule_key: String,
        /// Validation failure.
        source: RuleError,
    },
    /// Control plane failure while applying or compiling.
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Parses a rule file into upsert payloads.
///
/// # Errors
///
/// Returns [`RuleFileError::Parse`] when the bytes are not a JSON array of
/// objects shaped like upsert payloads.
pub fn parse_rule_file(bytes: &[u8]) -> Result<Vec<RuleUpsert>, RuleFileError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Validates every payload, reporting the first failure by position.
///
/// # Errors
///
/// Returns [`RuleFileError::Invalid`] for the first payload that fails.
pub fn validate_batch(rules: &[RuleUpsert]) -> Result<(), RuleFileError> {
    for (index, payload) in rules.iter().enumerate() {
        payload.validate().map_err(|source| RuleFileError::Invalid {
            index,
            rule_key: payload.rule_key.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Compiles a snapshot from a rule file without touching any persistent store.
///
/// Safe-mode values, polling hint, and the rule bound come from `config`.
///
/// # Errors
///
/// Returns [`RuleFileError`] when a payload is invalid or compilation fails.
pub fn compile_offline(
    config: &DivineGuardConfig,
    rules: &[RuleUpsert],
    context: &RequestContext,
    compiled_at: Timestamp,
) -> Result<ControlSnapshot, RuleFileError> {
    validate_batch(rules)?;
    let plane = ControlPlane::new(
        SharedRuleStore::from_store(InMemoryRuleStore::new()),
        config.snapshot_compiler(),
        config.control_plane_config(),
    );
    for payload in rules {
        plane.upsert(payload, Some(OFFLINE_ACTOR.to_string()), compiled_at)?;
    }
    Ok(plane.snapshot(context, compiled_at)?)
}

/// Upserts every payload into `plane` after validating the whole batch.
///
/// # Errors
///
/// Returns [`RuleFileError::Invalid`] before any write when a payload is
/// invalid, or [`RuleFileError::ControlPlane`] when the store fails mid-import.
pub fn import_rules(
    plane: &ControlPlane,
    rules: &[RuleUpsert],
    actor: Option<&str>,
    at: Timestamp,
) -> Result<Vec<UpsertOutcome>, RuleFileError> {
    validate_batch(rules)?;
    let mut outcomes = Vec::with_capacity(rules.len());
    for payload in rules {
        outcomes.push(plane.upsert(payload, actor.map(str::to_string), at)?);
    }
    Ok(outcomes)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
