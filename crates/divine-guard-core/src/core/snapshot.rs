// crates/divine-guard-core/src/core/snapshot.rs
// ============================================================================
// Module: Divine Guard Snapshot Model
// Description: Compiled scope objects and the snapshot contract.
// Purpose: Define the fully resolved configuration delivered to client apps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Each scope compiles into a struct with fixed fields. `Default` for every
//! scope struct is the "no rule set this field" value, so an empty rule set
//! compiles to `CompiledScopes::default()`. Nullable numeric fields serialize
//! as explicit `null` to keep the wire shape fixed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::action::ImageQuality;
use crate::core::context::RequestContext;
use crate::core::hashing::HashDigest;
use crate::core::identifiers::RuleKey;
use crate::core::rule::Scope;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Scope Configs
// ============================================================================

/// Compiled `global` scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Emergency safe-mode switch.
    pub safe_mode: bool,
}

/// Compiled `media` scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Forced image quality tier.
    pub force_image_quality: ImageQuality,
    /// Video autoplay disabled.
    pub disable_video_autoplay: bool,
    /// Video disabled entirely.
    pub disable_video: bool,
    /// Preloading disabled.
    pub disable_preloading: bool,
    /// Concurrent media load cap; `None` is unlimited.
    pub max_concurrent_media_loads: Option<u32>,
}

/// Compiled `network` scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Retries disabled.
    pub disable_retries: bool,
    /// Retry count override; `None` keeps the caller default.
    pub retry_count: Option<u32>,
    /// Timeout override in milliseconds; `None` keeps the caller default.
    pub timeout_ms: Option<u32>,
}

/// Compiled `ux` scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UxConfig {
    /// Skeleton-only rendering.
    pub skeleton_only: bool,
    /// Reduced animations.
    pub reduce_animations: bool,
    /// Watchdog threshold override; `None` keeps the caller default.
    pub ux_watchdog_threshold_ms: Option<u32>,
}

/// Compiled `ai` scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiConfig {
    /// AI calls disabled.
    pub disable_ai: bool,
}

/// The five compiled scope objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledScopes {
    /// Global scope.
    pub global: GlobalConfig,
    /// Media scope.
    pub media: MediaConfig,
    /// Network scope.
    pub network: NetworkConfig,
    /// UX scope.
    pub ux: UxConfig,
    /// AI scope.
    pub ai: AiConfig,
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Trace entry for a rule that contributed at least one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRule {
    /// Contributing rule.
    pub rule_key: RuleKey,
    /// Scope the rule wrote into.
    pub scope: Scope,
    /// Rule priority at compilation time.
    pub priority: u32,
    /// Rule revision at compilation time.
    pub revision: u64,
    /// Fields the rule won.
    pub fields: Vec<String>,
}

/// Fully resolved per-request configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    /// Snapshot schema version.
    pub version: u32,
    /// Normalized request context the snapshot was compiled for.
    pub context: RequestContext,
    /// Compiled scope objects.
    #[serde(flatten)]
    pub scopes: CompiledScopes,
    /// Rules that contributed, by scope then precedence.
    pub applied: Vec<AppliedRule>,
    /// True when the safe-mode gate overwrote the output.
    pub safe_mode_forced: bool,
    /// Canonical hash of the five scope objects.
    pub config_hash: HashDigest,
    /// Compilation instant.
    pub compiled_at: Timestamp,
    /// Client polling hint.
    pub ttl_seconds: u32,
}
