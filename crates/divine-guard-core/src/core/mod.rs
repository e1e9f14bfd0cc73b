// crates/divine-guard-core/src/core/mod.rs
// ============================================================================
// Module: Divine Guard Core Types
// Description: Canonical rule, context, and snapshot structures.
// Purpose: Provide stable, serializable types for rules and compiled snapshots.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Core types define administrator rules, typed per-scope actions, request
//! contexts, and the compiled snapshot contract consumed by client apps.
//! These types are the canonical source of truth for every API surface
//! (HTTP, CLI, storage).

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod action;
pub mod audit;
pub mod context;
pub mod hashing;
pub mod identifiers;
pub mod rule;
pub mod snapshot;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use action::AiAction;
pub use action::GlobalAction;
pub use action::ImageQuality;
pub use action::MAX_CONCURRENT_MEDIA_LOADS;
pub use action::MAX_RETRY_COUNT;
pub use action::MAX_TIMEOUT_MS;
pub use action::MAX_UX_WATCHDOG_THRESHOLD_MS;
pub use action::MediaAction;
pub use action::NetworkAction;
pub use action::RuleAction;
pub use action::UxAction;
pub use audit::AuditAction;
pub use audit::RuleAuditRecord;
pub use context::Dimension;
pub use context::RequestContext;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::RuleKey;
pub use rule::MAX_MATCH_VALUES;
pub use rule::MAX_MATCH_VALUE_BYTES;
pub use rule::Rule;
pub use rule::RuleError;
pub use rule::RuleMatch;
pub use rule::RuleSpec;
pub use rule::RuleUpsert;
pub use rule::Scope;
pub use snapshot::AiConfig;
pub use snapshot::AppliedRule;
pub use snapshot::CompiledScopes;
pub use snapshot::ControlSnapshot;
pub use snapshot::GlobalConfig;
pub use snapshot::MediaConfig;
pub use snapshot::NetworkConfig;
pub use snapshot::UxConfig;
pub use time::Timestamp;
