// crates/divine-guard-core/src/runtime/mod.rs
// ============================================================================
// Module: Divine Guard Runtime
// Description: Rule compilation pipeline, control plane, and in-memory store.
// Purpose: Compile rule sets into per-request snapshots.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Pipeline stages, leaves first: [`matcher`] (Context Resolver),
//! [`precedence`] (Precedence Resolver), [`compiler`] (Scope Compiler),
//! [`safe_mode`] (Safe-Mode Gate) and [`assembler`] (Snapshot Assembler).
//! [`control_plane`] wires them to a [`crate::RuleStore`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod assembler;
pub mod compiler;
pub mod control_plane;
pub mod matcher;
pub mod precedence;
pub mod safe_mode;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use assembler::DEFAULT_TTL_SECONDS;
pub use assembler::SNAPSHOT_VERSION;
pub use assembler::SnapshotCompiler;
pub use assembler::SnapshotError;
pub use control_plane::ControlPlane;
pub use control_plane::ControlPlaneConfig;
pub use control_plane::ControlPlaneError;
pub use control_plane::DEFAULT_MAX_RULES;
pub use safe_mode::SafeModePolicy;
pub use store::InMemoryRuleStore;
pub use store::SharedRuleStore;
