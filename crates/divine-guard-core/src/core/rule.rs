// crates/divine-guard-core/src/core/rule.rs
// ============================================================================
// Module: Divine Guard Rules
// Description: Administrator-authored override rules and their validation.
// Purpose: Turn loosely typed upsert payloads into validated rule specs.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A rule targets exactly one [`Scope`], optionally narrows itself to request
//! contexts through a [`RuleMatch`], and writes a scope-typed
//! [`RuleAction`]. Upsert payloads ([`RuleUpsert`]) are validated all at once
//! into a [`RuleSpec`]; a payload that fails validation never reaches a store.
//! Stored [`Rule`] records add the store-assigned `revision` and bookkeeping
//! timestamps.
//!
//! Security posture: upsert payloads are untrusted admin input; unknown
//! scopes, match dimensions and action fields are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use serde_json::Value;
use thiserror::Error;

use crate::core::action::RuleAction;
use crate::core::action::coerce_bool;
use crate::core::context::Dimension;
use crate::core::context::RequestContext;
use crate::core::identifiers::RuleKey;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted values per match dimension.
pub const MAX_MATCH_VALUES: usize = 32;
/// Maximum accepted bytes for a single match value.
pub const MAX_MATCH_VALUE_BYTES: usize = 128;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation errors for rule payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// `rule_key` is missing or blank.
    #[error("rule_key is required")]
    MissingRuleKey,
    /// `rule_key` exceeds the length limit.
    #[error("rule_key exceeds {max_bytes} bytes (got {actual_bytes})")]
    RuleKeyTooLong {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual bytes supplied.
        actual_bytes: usize,
    },
    /// `scope` is not one of the five fixed scopes.
    #[error("unknown scope: {0:?} (expected global, media, network, ux or ai)")]
    UnknownScope(String),
    /// `match` is malformed.
    #[error("invalid match: {0}")]
    InvalidMatch(String),
    /// `priority` is negative or not an integer.
    #[error("invalid priority: {0}")]
    InvalidPriority(String),
    /// `action` is malformed or names a field outside its scope.
    #[error("invalid {scope} action: {message}")]
    InvalidAction {
        /// Scope the action was parsed for.
        scope: Scope,
        /// Parser error detail.
        message: String,
    },
}

// ============================================================================
// SECTION: Scope
// ============================================================================

/// Output group a rule's action writes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Global switches (safe mode).
    Global,
    /// Media loading controls.
    Media,
    /// Network retry and timeout controls.
    Network,
    /// UX degradation controls.
    Ux,
    /// AI feature controls.
    Ai,
}

impl Scope {
    /// All scopes in snapshot order.
    pub const ALL: [Self; 5] = [Self::Global, Self::Media, Self::Network, Self::Ux, Self::Ai];

    /// Returns the wire name of the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Media => "media",
            Self::Network => "network",
            Self::Ux => "ux",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = RuleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lowered = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == lowered)
            .ok_or_else(|| RuleError::UnknownScope(raw.to_string()))
    }
}

// ============================================================================
// SECTION: Match Filters
// ============================================================================

/// Context filters narrowing which requests a rule applies to.
///
/// # Invariants
/// - An empty set for a dimension means the dimension is not filtered.
/// - Set members are trimmed and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleMatch {
    /// Accepted app versions.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub app_version: BTreeSet<String>,
    /// Accepted feature keys.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub feature_key: BTreeSet<String>,
    /// Accepted network states.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub network_state: BTreeSet<String>,
}

impl RuleMatch {
    /// Parses a raw `match` value.
    ///
    /// Absent, `null` and `{}` are unconditional. Each dimension accepts a
    /// string or an array of strings; blank entries are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidMatch`] for a non-object value, an unknown
    /// dimension key, or a non-string entry.
    pub fn from_json(raw: Option<&Value>) -> Result<Self, RuleError> {
        let object = match raw {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(object)) => object,
            Some(_) => return Err(RuleError::InvalidMatch("match must be an object".to_string())),
        };
        let mut filter = Self::default();
        for (key, value) in object {
            let dimension = Dimension::from_name(key)
                .ok_or_else(|| RuleError::InvalidMatch(format!("unknown dimension: {key}")))?;
            let values = match_values(dimension, value)?;
            *filter.values_mut(dimension) = values;
        }
        Ok(filter)
    }

    /// Returns true when no dimension is filtered.
    #[must_use]
    pub fn is_unconditional(&self) -> bool {
        Dimension::ALL.into_iter().all(|dimension| self.values(dimension).is_empty())
    }

    /// Returns the accepted values for a dimension.
    #[must_use]
    pub const fn values(&self, dimension: Dimension) -> &BTreeSet<String> {
        match dimension {
            Dimension::AppVersion => &self.app_version,
            Dimension::FeatureKey => &self.feature_key,
            Dimension::NetworkState => &self.network_state,
        }
    }

    /// Returns true when the request context satisfies every filtered dimension.
    ///
    /// A filtered dimension missing from the context is a mismatch.
    #[must_use]
    pub fn accepts(&self, context: &RequestContext) -> bool {
        Dimension::ALL.into_iter().all(|dimension| {
            let allowed = self.values(dimension);
            allowed.is_empty()
                || context.value(dimension).is_some_and(|value| allowed.contains(value))
        })
    }

    const fn values_mut(&mut self, dimension: Dimension) -> &mut BTreeSet<String> {
        match dimension {
            Dimension::AppVersion => &mut self.app_version,
            Dimension::FeatureKey => &mut self.feature_key,
            Dimension::NetworkState => &mut self.network_state,
        }
    }
}

/// Parses the accepted values for one dimension.
///
/// Sets are bounded by [`MAX_MATCH_VALUES`] and [`MAX_MATCH_VALUE_BYTES`] so
/// every valid rule encodes well under the store's per-record limit.
fn match_values(dimension: Dimension, value: &Value) -> Result<BTreeSet<String>, RuleError> {
    let mut set = BTreeSet::new();
    let mut push = |entry: &Value| match entry {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.len() > MAX_MATCH_VALUE_BYTES {
                return Err(RuleError::InvalidMatch(format!(
                    "{dimension} value exceeds {MAX_MATCH_VALUE_BYTES} bytes"
                )));
            }
            if trimmed.chars().any(char::is_control) {
                return Err(RuleError::InvalidMatch(format!(
                    "{dimension} value contains control characters"
                )));
            }
            if !trimmed.is_empty() {
                set.insert(trimmed.to_string());
            }
            Ok(())
        }
        _ => Err(RuleError::InvalidMatch(format!("{dimension} values must be strings"))),
    };
    match value {
        Value::Null => {}
        Value::Array(entries) => {
            if entries.len() > MAX_MATCH_VALUES {
                return Err(RuleError::InvalidMatch(format!(
                    "{dimension} accepts at most {MAX_MATCH_VALUES} values (got {})",
                    entries.len()
                )));
            }
            for entry in entries {
                push(entry)?;
            }
        }
        other => push(other)?,
    }
    Ok(set)
}

// ============================================================================
// SECTION: Upsert Payload
// ============================================================================

/// Raw rule upsert payload as submitted by admins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleUpsert {
    /// Rule identifier and idempotency key.
    #[serde(default)]
    pub rule_key: String,
    /// Target scope name.
    #[serde(default)]
    pub scope: String,
    /// Enabled flag; booleans and `"true"`/`"false"` strings are honored,
    /// anything else (including null) leaves the rule enabled.
    #[serde(default = "default_enabled", deserialize_with = "deserialize_enabled")]
    pub enabled: bool,
    /// Priority; integer or numeric string, defaults to 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Value>,
    /// Optional match filters.
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_filter: Option<Value>,
    /// Scope-specific action fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
}

const fn default_enabled() -> bool {
    true
}

/// Reads `enabled` leniently, falling back to enabled for unrecognized input.
fn deserialize_enabled<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(coerce_bool(&raw).unwrap_or_else(default_enabled))
}

impl RuleUpsert {
    /// Validates the payload into a rule spec.
    ///
    /// # Errors
    ///
    /// Returns the first [`RuleError`] encountered; nothing is partially applied.
    pub fn validate(&self) -> Result<RuleSpec, RuleError> {
        let rule_key = RuleKey::parse(&self.rule_key)?;
        let scope = Scope::from_str(&self.scope)?;
        let priority = parse_priority(self.priority.as_ref())?;
        let match_filter = RuleMatch::from_json(self.match_filter.as_ref())?;
        let action = RuleAction::from_json(scope, self.action.as_ref())?;
        Ok(RuleSpec {
            rule_key,
            enabled: self.enabled,
            priority,
            match_filter,
            action,
        })
    }
}

/// Parses a priority value, rejecting negatives and non-integers.
fn parse_priority(raw: Option<&Value>) -> Result<u32, RuleError> {
    let parsed = match raw {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::Number(number)) => number
            .as_i64()
            .ok_or_else(|| RuleError::InvalidPriority(format!("{number} is not an integer")))?,
        Some(Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| RuleError::InvalidPriority(format!("{text:?} is not an integer")))?,
        Some(other) => {
            return Err(RuleError::InvalidPriority(format!("{other} is not an integer")));
        }
    };
    if parsed < 0 {
        return Err(RuleError::InvalidPriority(format!("{parsed} is negative")));
    }
    u32::try_from(parsed)
        .map_err(|_| RuleError::InvalidPriority(format!("{parsed} exceeds {}", u32::MAX)))
}

// ============================================================================
// SECTION: Validated Rules
// ============================================================================

/// Validated rule content, independent of store bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    /// Rule identifier.
    pub rule_key: RuleKey,
    /// Disabled rules are never eligible.
    pub enabled: bool,
    /// Higher priority wins per field.
    pub priority: u32,
    /// Context filters.
    pub match_filter: RuleMatch,
    /// Scope-typed action.
    pub action: RuleAction,
}

impl RuleSpec {
    /// Returns the scope the rule writes into.
    #[must_use]
    pub const fn scope(&self) -> Scope {
        self.action.scope()
    }
}

/// Stored rule record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RuleRecord")]
pub struct Rule {
    /// Validated content.
    pub spec: RuleSpec,
    /// Store-assigned revision, strictly increasing across upserts.
    pub revision: u64,
    /// First upsert instant.
    pub created_at: Timestamp,
    /// Latest upsert instant.
    pub updated_at: Timestamp,
    /// Actor of the first upsert.
    pub created_by: Option<String>,
    /// Actor of the latest upsert.
    pub updated_by: Option<String>,
}

impl Rule {
    /// Builds the record produced by upserting `spec` over `before`.
    ///
    /// Creation bookkeeping is carried over from `before` when present.
    #[must_use]
    pub fn from_upsert(
        before: Option<&Self>,
        spec: RuleSpec,
        revision: u64,
        actor: Option<String>,
        at: Timestamp,
    ) -> Self {
        let (created_at, created_by) = match before {
            Some(previous) => (previous.created_at, previous.created_by.clone()),
            None => (at, actor.clone()),
        };
        Self {
            spec,
            revision,
            created_at,
            updated_at: at,
            created_by,
            updated_by: actor,
        }
    }

    /// Returns the rule key.
    #[must_use]
    pub const fn rule_key(&self) -> &RuleKey {
        &self.spec.rule_key
    }

    /// Returns the rule scope.
    #[must_use]
    pub const fn scope(&self) -> Scope {
        self.spec.scope()
    }
}

/// Borrowed wire view of a stored rule.
#[derive(Serialize)]
struct RuleView<'a> {
    rule_key: &'a RuleKey,
    scope: Scope,
    enabled: bool,
    priority: u32,
    #[serde(rename = "match")]
    match_filter: Option<&'a RuleMatch>,
    action: &'a RuleAction,
    revision: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
    created_by: Option<&'a str>,
    updated_by: Option<&'a str>,
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let match_filter = &self.spec.match_filter;
        RuleView {
            rule_key: &self.spec.rule_key,
            scope: self.scope(),
            enabled: self.spec.enabled,
            priority: self.spec.priority,
            match_filter: (!match_filter.is_unconditional()).then_some(match_filter),
            action: &self.spec.action,
            revision: self.revision,
            created_at: self.created_at,
            updated_at: self.updated_at,
            created_by: self.created_by.as_deref(),
            updated_by: self.updated_by.as_deref(),
        }
        .serialize(serializer)
    }
}

/// Owned wire form of a stored rule, revalidated on read.
#[derive(Deserialize)]
struct RuleRecord {
    #[serde(flatten)]
    payload: RuleUpsert,
    revision: u64,
    created_at: Timestamp,
    updated_at: Timestamp,
    #[serde(default)]
    created_by: Option<String>,
    #[serde(default)]
    updated_by: Option<String>,
}

impl TryFrom<RuleRecord> for Rule {
    type Error = RuleError;

    fn try_from(record: RuleRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            spec: record.payload.validate()?,
            revision: record.revision,
            created_at: record.created_at,
            updated_at: record.updated_at,
            created_by: record.created_by,
            updated_by: record.updated_by,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions."
    )]

    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> RuleUpsert {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let err = payload(json!({"rule_key": "r", "scope": "video"})).validate().unwrap_err();
        assert_eq!(err, RuleError::UnknownScope("video".to_string()));
    }

    #[test]
    fn scope_parsing_is_case_insensitive() {
        let spec = payload(json!({"rule_key": "r", "scope": " Media "})).validate().unwrap();
        assert_eq!(spec.scope(), Scope::Media);
    }

    #[test]
    fn negative_priority_is_rejected() {
        let err = payload(json!({"rule_key": "r", "scope": "ai", "priority": -1}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidPriority(_)));
    }

    #[test]
    fn non_object_match_is_rejected() {
        let err = payload(json!({"rule_key": "r", "scope": "ai", "match": ["slow"]}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidMatch(_)));
    }

    #[test]
    fn unknown_match_dimension_is_rejected() {
        let err = payload(json!({"rule_key": "r", "scope": "ai", "match": {"country": "IN"}}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidMatch(_)));
    }

    #[test]
    fn match_accepts_single_strings_and_drops_blanks() {
        let spec = payload(json!({
            "rule_key": "r",
            "scope": "network",
            "match": {"network_state": "slow", "app_version": ["2.3.0", " "]}
        }))
        .validate()
        .unwrap();
        assert!(spec.match_filter.network_state.contains("slow"));
        assert_eq!(spec.match_filter.app_version.len(), 1);
    }

    #[test]
    fn empty_match_is_unconditional_and_enabled_defaults_true() {
        let spec =
            payload(json!({"rule_key": "r", "scope": "ux", "match": {}})).validate().unwrap();
        assert!(spec.match_filter.is_unconditional());
        assert!(spec.enabled);
        assert_eq!(spec.priority, 0);
    }

    #[test]
    fn enabled_flag_is_read_leniently() {
        let parse = |enabled: Value| -> bool {
            let raw = json!({"rule_key": "r", "scope": "ux", "enabled": enabled});
            serde_json::from_value::<RuleUpsert>(raw).unwrap().validate().unwrap().enabled
        };
        assert!(!parse(json!(false)));
        assert!(!parse(json!("false")));
        assert!(!parse(json!("FALSE")));
        assert!(parse(json!("true")));
        assert!(parse(json!(null)));
        assert!(parse(json!("yes please")));
        assert!(parse(json!(0)));
    }

    #[test]
    fn oversized_match_sets_are_rejected() {
        let many: Vec<String> = (0 ..= MAX_MATCH_VALUES).map(|n| format!("1.0.{n}")).collect();
        let err = payload(json!({"rule_key": "r", "scope": "ai", "match": {"app_version": many}}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidMatch(_)));

        let long = "9".repeat(MAX_MATCH_VALUE_BYTES + 1);
        let err = payload(json!({"rule_key": "r", "scope": "ai", "match": {"feature_key": long}}))
            .validate()
            .unwrap_err();
        assert!(matches!(err, RuleError::InvalidMatch(_)));

        let err = payload(
            json!({"rule_key": "r", "scope": "ai", "match": {"network_state": "slow\u{0}"}}),
        )
        .validate()
        .unwrap_err();
        assert!(matches!(err, RuleError::InvalidMatch(_)));

        let full: Vec<String> =
            (0 .. MAX_MATCH_VALUES).map(|n| format!("{}{n}", "x".repeat(100))).collect();
        assert!(
            payload(json!({"rule_key": "r", "scope": "ai", "match": {"app_version": full}}))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn stored_rule_round_trips_through_wire_form() {
        let spec = payload(json!({
            "rule_key": "dg_media_low",
            "scope": "media",
            "priority": "250",
            "match": {"network_state": ["slow"]},
            "action": {"force_image_quality": "low"}
        }))
        .validate()
        .unwrap();
        let at = Timestamp::from_unix_millis(1_700_000_000_000).unwrap();
        let rule = Rule::from_upsert(None, spec, 7, Some("ops".to_string()), at);
        let encoded = serde_json::to_value(&rule).unwrap();
        assert_eq!(encoded["scope"], json!("media"));
        assert_eq!(encoded["priority"], json!(250));
        let decoded: Rule = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, rule);
    }
}
