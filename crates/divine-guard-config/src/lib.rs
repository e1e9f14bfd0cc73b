// crates/divine-guard-config/src/lib.rs
// ============================================================================
// Module: Divine Guard Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for divine-guard.toml semantics.
// Dependencies: divine-guard-core, divine-guard-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `divine-guard-config` defines the configuration model shared by the
//! server and CLI. Validation is strict and fail-closed: unknown fields,
//! oversized files, and unsafe bind/auth combinations are rejected before
//! any listener or store is opened.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
