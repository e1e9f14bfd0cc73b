// crates/divine-guard-server/src/lib.rs
// ============================================================================
// Module: Divine Guard Server Library
// Description: HTTP routes for control snapshots and admin rule management.
// Purpose: Expose the control plane over JSON with fail-closed admin auth.
// Dependencies: divine-guard-core, divine-guard-config, axum, tokio
// ============================================================================

//! ## Overview
//! The server exposes one public route that compiles a control snapshot per
//! request and three admin routes for upserting, listing, and auditing rules.
//! Every response uses the `{ success, data | error }` envelope. Store calls
//! run on the blocking pool; request handling never holds a store lock across
//! an await point.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::ControlAuditSink;
pub use audit::ControlRequestEvent;
pub use audit::FileAuditSink;
pub use audit::NoopAuditSink;
pub use audit::SecurityAuditEvent;
pub use audit::StderrAuditSink;
pub use auth::AdminAuth;
pub use auth::AdminIdentity;
pub use auth::AuthError;
pub use server::ADMIN_AUDIT_PATH;
pub use server::ADMIN_LIST_PATH;
pub use server::ADMIN_UPSERT_PATH;
pub use server::DivineGuardServer;
pub use server::SNAPSHOT_PATH;
pub use server::ServerError;
pub use server::ServerState;
pub use server::build_control_plane;
pub use server::router;
