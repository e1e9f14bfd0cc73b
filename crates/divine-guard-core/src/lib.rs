// crates/divine-guard-core/src/lib.rs
// ============================================================================
// Module: Divine Guard Core Library
// Description: Public API surface for the Divine Guard control-plane core.
// Purpose: Expose the rule model, store interface, and snapshot compiler.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Divine Guard core compiles administrator-authored override rules into a
//! per-request runtime configuration snapshot. Compilation is a pure,
//! synchronous function of the rule set and the request context: rules are
//! matched against the context, conflicts are resolved by priority, winning
//! fields are merged into five fixed scopes, and the global safe-mode gate is
//! applied last.
//!
//! Storage is reached only through [`RuleStore`]; the compiler never mutates
//! the store and never reads the wall clock.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::RuleQuery;
pub use interfaces::RuleStore;
pub use interfaces::StoreError;
pub use interfaces::UpsertOutcome;
pub use interfaces::UpsertRequest;
pub use runtime::ControlPlane;
pub use runtime::ControlPlaneConfig;
pub use runtime::ControlPlaneError;
pub use runtime::DEFAULT_MAX_RULES;
pub use runtime::DEFAULT_TTL_SECONDS;
pub use runtime::InMemoryRuleStore;
pub use runtime::SafeModePolicy;
pub use runtime::SNAPSHOT_VERSION;
pub use runtime::SharedRuleStore;
pub use runtime::SnapshotCompiler;
pub use runtime::SnapshotError;
