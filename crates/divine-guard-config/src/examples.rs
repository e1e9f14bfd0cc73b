// crates/divine-guard-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and `config example`.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `divine-guard.toml`. The output is deterministic and
//! must parse and validate with [`crate::DivineGuardConfig::from_toml`].

/// Returns a canonical example `divine-guard.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "127.0.0.1:8787"
max_body_bytes = 65536

[server.auth]
mode = "bearer_token"
bearer_tokens = ["change-me-admin-token"]

[server.audit]
enabled = true
path = "divine-guard-audit.jsonl"

[rule_store]
type = "sqlite"
path = "divine-guard.sqlite"
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "full"

[snapshot]
ttl_seconds = 45
max_rules = 500

# Values forced on every client while a global rule sets safe_mode.
# Omitted numeric overrides compile to null.
[safe_mode]
force_image_quality = "low"
disable_video_autoplay = true
disable_video = true
disable_preloading = true
max_concurrent_media_loads = 1
disable_retries = true
skeleton_only = true
reduce_animations = true
disable_ai = true
"#,
    )
}
