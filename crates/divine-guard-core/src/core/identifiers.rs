// crates/divine-guard-core/src/core/identifiers.rs
// ============================================================================
// Module: Divine Guard Identifiers
// Description: Canonical rule identifiers.
// Purpose: Provide a strongly typed, serializable rule key with a stable wire form.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Rule keys are the unique identifier and idempotency key for rule upserts.
//! They serialize as plain strings on the wire. Construction through
//! [`RuleKey::parse`] trims surrounding whitespace and enforces the length
//! limits; [`RuleKey::new`] is reserved for already-validated values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::rule::RuleError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum length of a rule key in bytes.
pub const MAX_RULE_KEY_BYTES: usize = 128;

// ============================================================================
// SECTION: Rule Key
// ============================================================================

/// Unique rule identifier (e.g. `dg_media_disable_video`).
///
/// # Invariants
/// - Non-empty after trimming, at most [`MAX_RULE_KEY_BYTES`] bytes.
/// - No leading or trailing whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(String);

impl RuleKey {
    /// Creates a rule key from an already-validated value.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Parses and validates a raw rule key.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::MissingRuleKey`] when the key is blank and
    /// [`RuleError::RuleKeyTooLong`] when it exceeds the length limit.
    pub fn parse(raw: &str) -> Result<Self, RuleError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(RuleError::MissingRuleKey);
        }
        if trimmed.len() > MAX_RULE_KEY_BYTES {
            return Err(RuleError::RuleKeyTooLong {
                max_bytes: MAX_RULE_KEY_BYTES,
                actual_bytes: trimmed.len(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RuleKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
