// crates/divine-guard-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Rule Store
// Description: Durable RuleStore backend using SQLite WAL.
// Purpose: Provide production persistence for Divine Guard rules and audit trail.
// Dependencies: divine-guard-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`RuleStore`] implementation that
//! persists hash-verified rule records and an append-only audit table.
//! Security posture: storage inputs are untrusted and revalidated on read.
//!
//! [`RuleStore`]: divine_guard_core::RuleStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RULE_BYTES;
pub use store::SqliteRuleStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
