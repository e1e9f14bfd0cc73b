// crates/divine-guard-core/src/core/action.rs
// ============================================================================
// Module: Divine Guard Rule Actions
// Description: Typed per-scope partial configuration written by rules.
// Purpose: Prevent cross-scope writes and normalize loosely typed admin input.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A rule's action is a tagged union keyed by scope. Each variant carries a
//! partial struct whose fields are all optional: `None` means the rule does
//! not touch that field. Parsing is strict about *which* fields exist (a
//! `media` rule naming `disable_ai` is rejected) and permissive about their
//! *values*, matching what the admin dashboard submits:
//! - booleans accept `true`/`false` or the strings `"true"`/`"false"`;
//!   anything else leaves the field unset.
//! - numeric overrides accept numbers or numeric strings with integer-prefix
//!   parsing; non-positive or unparseable values normalize to "no override",
//!   positive values are clamped to per-field ceilings.
//! - image quality accepts `auto|low|medium|high` case-insensitively and
//!   falls back to `auto` for any other present value.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

use crate::core::rule::RuleError;
use crate::core::rule::Scope;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Ceiling for `media.max_concurrent_media_loads`.
pub const MAX_CONCURRENT_MEDIA_LOADS: u32 = 50;
/// Ceiling for `network.retry_count`.
pub const MAX_RETRY_COUNT: u32 = 10;
/// Ceiling for `network.timeout_ms`.
pub const MAX_TIMEOUT_MS: u32 = 120_000;
/// Ceiling for `ux.ux_watchdog_threshold_ms`.
pub const MAX_UX_WATCHDOG_THRESHOLD_MS: u32 = 120_000;

// ============================================================================
// SECTION: Image Quality
// ============================================================================

/// Forced image quality tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageQuality {
    /// Client picks quality adaptively.
    #[default]
    Auto,
    /// Lowest quality tier.
    Low,
    /// Medium quality tier.
    Medium,
    /// Highest quality tier.
    High,
}

impl ImageQuality {
    /// Parses a quality label case-insensitively, falling back to `auto`.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Auto,
        }
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

// ============================================================================
// SECTION: Scope Actions
// ============================================================================

/// Fields a `global` rule may set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalAction {
    /// Emergency safe-mode switch.
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub safe_mode: Option<bool>,
}

/// Fields a `media` rule may set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MediaAction {
    /// Forced image quality tier.
    #[serde(
        default,
        deserialize_with = "lenient_quality",
        skip_serializing_if = "Option::is_none"
    )]
    pub force_image_quality: Option<ImageQuality>,
    /// Disable video autoplay.
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub disable_video_autoplay: Option<bool>,
    /// Disable video entirely (thumbnail fallback).
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub disable_video: Option<bool>,
    /// Disable media preloading.
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub disable_preloading: Option<bool>,
    /// Maximum concurrent media loads.
    #[serde(
        default,
        deserialize_with = "lenient_media_loads",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_concurrent_media_loads: Option<u32>,
}

/// Fields a `network` rule may set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkAction {
    /// Disable request retries.
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub disable_retries: Option<bool>,
    /// Retry count override.
    #[serde(
        default,
        deserialize_with = "lenient_retry_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_count: Option<u32>,
    /// Request timeout override in milliseconds.
    #[serde(
        default,
        deserialize_with = "lenient_timeout_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout_ms: Option<u32>,
}

/// Fields a `ux` rule may set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UxAction {
    /// Render skeletons only.
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub skeleton_only: Option<bool>,
    /// Reduce UI animations.
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub reduce_animations: Option<bool>,
    /// UX watchdog threshold override in milliseconds.
    #[serde(
        default,
        deserialize_with = "lenient_watchdog_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub ux_watchdog_threshold_ms: Option<u32>,
}

/// Fields an `ai` rule may set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiAction {
    /// Disable AI calls.
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub disable_ai: Option<bool>,
}

// ============================================================================
// SECTION: Rule Action Union
// ============================================================================

/// Scope-tagged rule action.
///
/// Serializes as the bare field object; the scope travels alongside it on
/// the owning rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RuleAction {
    /// Global scope action.
    Global(GlobalAction),
    /// Media scope action.
    Media(MediaAction),
    /// Network scope action.
    Network(NetworkAction),
    /// UX scope action.
    Ux(UxAction),
    /// AI scope action.
    Ai(AiAction),
}

impl RuleAction {
    /// Parses an action object for the given scope.
    ///
    /// `None` and JSON `null` are treated as an empty action.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidAction`] when the action is not an object
    /// or names a field the scope does not own.
    pub fn from_json(scope: Scope, action: Option<&Value>) -> Result<Self, RuleError> {
        let object = match action {
            None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
            Some(value @ Value::Object(_)) => value.clone(),
            Some(_) => {
                return Err(RuleError::InvalidAction {
                    scope,
                    message: "action must be an object".to_string(),
                });
            }
        };
        let invalid = |err: serde_json::Error| RuleError::InvalidAction {
            scope,
            message: err.to_string(),
        };
        let action = match scope {
            Scope::Global => Self::Global(serde_json::from_value(object).map_err(invalid)?),
            Scope::Media => Self::Media(serde_json::from_value(object).map_err(invalid)?),
            Scope::Network => Self::Network(serde_json::from_value(object).map_err(invalid)?),
            Scope::Ux => Self::Ux(serde_json::from_value(object).map_err(invalid)?),
            Scope::Ai => Self::Ai(serde_json::from_value(object).map_err(invalid)?),
        };
        Ok(action)
    }

    /// Returns the scope this action writes into.
    #[must_use]
    pub const fn scope(&self) -> Scope {
        match self {
            Self::Global(_) => Scope::Global,
            Self::Media(_) => Scope::Media,
            Self::Network(_) => Scope::Network,
            Self::Ux(_) => Scope::Ux,
            Self::Ai(_) => Scope::Ai,
        }
    }

    /// Returns the names of the fields this action sets.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut push = |name: &'static str, set: bool| {
            if set {
                fields.push(name);
            }
        };
        match self {
            Self::Global(action) => push("safe_mode", action.safe_mode.is_some()),
            Self::Media(action) => {
                push("force_image_quality", action.force_image_quality.is_some());
                push("disable_video_autoplay", action.disable_video_autoplay.is_some());
                push("disable_video", action.disable_video.is_some());
                push("disable_preloading", action.disable_preloading.is_some());
                push("max_concurrent_media_loads", action.max_concurrent_media_loads.is_some());
            }
            Self::Network(action) => {
                push("disable_retries", action.disable_retries.is_some());
                push("retry_count", action.retry_count.is_some());
                push("timeout_ms", action.timeout_ms.is_some());
            }
            Self::Ux(action) => {
                push("skeleton_only", action.skeleton_only.is_some());
                push("reduce_animations", action.reduce_animations.is_some());
                push("ux_watchdog_threshold_ms", action.ux_watchdog_threshold_ms.is_some());
            }
            Self::Ai(action) => push("disable_ai", action.disable_ai.is_some()),
        }
        fields
    }
}

// ============================================================================
// SECTION: Lenient Coercion
// ============================================================================

/// Coerces a JSON value into a boolean when it is unambiguous.
#[must_use]
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text.eq_ignore_ascii_case("true") => Some(true),
        Value::String(text) if text.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Coerces a JSON number or numeric string into an integer.
///
/// Uses integer-prefix semantics: leading whitespace and an optional sign
/// are accepted, parsing stops at the first non-digit (`"12ms"` is 12,
/// `"3.9"` is 3, `"abc"` is `None`). Overflow saturates.
#[must_use]
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => {
            number.as_i64().or_else(|| parse_int_prefix(&number.to_string()))
        }
        Value::String(text) => parse_int_prefix(text),
        _ => None,
    }
}

/// Normalizes a numeric override to a positive value clamped to `ceiling`.
///
/// Non-positive or unparseable input yields `None` ("no override").
#[must_use]
pub fn positive_override(value: &Value, ceiling: u32) -> Option<u32> {
    let parsed = coerce_int(value)?;
    if parsed <= 0 {
        return None;
    }
    Some(u32::try_from(parsed).map_or(ceiling, |value| value.min(ceiling)))
}

/// Parses the leading integer of a string.
fn parse_int_prefix(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1 ..]),
        Some(b'+') => (false, &trimmed[1 ..]),
        _ => (false, trimmed),
    };
    let mut seen_digit = false;
    let mut total: i64 = 0;
    for byte in digits.bytes() {
        if !byte.is_ascii_digit() {
            break;
        }
        seen_digit = true;
        total = total.saturating_mul(10).saturating_add(i64::from(byte - b'0'));
    }
    if !seen_digit {
        return None;
    }
    Some(if negative { -total } else { total })
}

/// Deserializes a lenient boolean field.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_bool(&value))
}

/// Deserializes a lenient image quality field.
fn lenient_quality<'de, D>(deserializer: D) -> Result<Option<ImageQuality>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(text) => Some(ImageQuality::parse_lenient(&text)),
        _ => Some(ImageQuality::Auto),
    })
}

/// Deserializes `max_concurrent_media_loads`.
fn lenient_media_loads<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(positive_override(&value, MAX_CONCURRENT_MEDIA_LOADS))
}

/// Deserializes `retry_count`.
fn lenient_retry_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(positive_override(&value, MAX_RETRY_COUNT))
}

/// Deserializes `timeout_ms`.
fn lenient_timeout_ms<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(positive_override(&value, MAX_TIMEOUT_MS))
}

/// Deserializes `ux_watchdog_threshold_ms`.
fn lenient_watchdog_ms<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(positive_override(&value, MAX_UX_WATCHDOG_THRESHOLD_MS))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
