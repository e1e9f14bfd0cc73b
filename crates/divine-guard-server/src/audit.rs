// crates/divine-guard-server/src/audit.rs
// ============================================================================
// Module: Control Audit Logging
// Description: Structured audit events for control-plane request handling.
// Purpose: Emit JSON-lines request and security events without hard dependencies.
// Dependencies: divine-guard-core, serde
// ============================================================================

//! ## Overview
//! Every handled request produces one `control_request` event. Startup posture
//! warnings produce `security` events. Sinks write one JSON object per line so
//! deployments can route them into any log pipeline.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use divine_guard_core::RequestContext;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Request succeeded.
    Ok,
    /// Request was rejected or failed.
    Error,
}

/// Control-plane request audit event.
#[derive(Debug, Clone, Serialize)]
pub struct ControlRequestEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Route label.
    pub route: &'static str,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// HTTP status code returned.
    pub status: u16,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Normalized request context for snapshot requests.
    pub context: Option<RequestContext>,
    /// Rule key touched by upserts and audit queries.
    pub rule_key: Option<String>,
    /// Recorded actor for upserts.
    pub actor: Option<String>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Request body size in bytes.
    pub request_bytes: usize,
}

/// Inputs required to construct a request audit event.
#[derive(Debug, Clone)]
pub struct ControlRequestEventParams {
    /// Route label.
    pub route: &'static str,
    /// HTTP status code returned.
    pub status: u16,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Normalized request context.
    pub context: Option<RequestContext>,
    /// Rule key when applicable.
    pub rule_key: Option<String>,
    /// Recorded actor when applicable.
    pub actor: Option<String>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Request body size in bytes.
    pub request_bytes: usize,
}

/// Security posture audit event.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Security event kind.
    pub kind: String,
    /// Optional message.
    pub message: Option<String>,
    /// Admin auth mode label.
    pub auth_mode: &'static str,
    /// Rule store type label.
    pub rule_store: &'static str,
}

impl ControlRequestEvent {
    /// Creates a new request event with a consistent timestamp.
    #[must_use]
    pub fn new(params: ControlRequestEventParams) -> Self {
        let outcome =
            if params.status < 400 { RequestOutcome::Ok } else { RequestOutcome::Error };
        Self {
            event: "control_request",
            timestamp_ms: now_millis(),
            route: params.route,
            outcome,
            status: params.status,
            peer_ip: params.peer_ip,
            context: params.context,
            rule_key: params.rule_key,
            actor: params.actor,
            error_kind: params.error_kind,
            request_bytes: params.request_bytes,
        }
    }
}

impl SecurityAuditEvent {
    /// Creates a new security event with a consistent timestamp.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        message: Option<String>,
        auth_mode: &'static str,
        rule_store: &'static str,
    ) -> Self {
        Self {
            event: "security",
            timestamp_ms: now_millis(),
            kind: kind.into(),
            message,
            auth_mode,
            rule_store,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for control-plane events.
pub trait ControlAuditSink: Send + Sync {
    /// Record a request event.
    fn record(&self, event: &ControlRequestEvent);

    /// Record a security posture event.
    fn record_security(&self, _event: &SecurityAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl ControlAuditSink for StderrAuditSink {
    fn record(&self, event: &ControlRequestEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }

    fn record_security(&self, event: &SecurityAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Writes one serialized line.
    fn write_line(&self, payload: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl ControlAuditSink for FileAuditSink {
    fn record(&self, event: &ControlRequestEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.write_line(&payload);
        }
    }

    fn record_security(&self, event: &SecurityAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            self.write_line(&payload);
        }
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl ControlAuditSink for NoopAuditSink {
    fn record(&self, _event: &ControlRequestEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Milliseconds since the unix epoch, zero if the clock is before it.
fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
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
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn file_sink_appends_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileAuditSink::new(&path).unwrap();
        sink.record(&ControlRequestEvent::new(ControlRequestEventParams {
            route: "control_snapshot",
            status: 200,
            peer_ip: None,
            context: Some(RequestContext::new(None, None, Some("slow"))),
            rule_key: None,
            actor: None,
            error_kind: None,
            request_bytes: 0,
        }));
        sink.record_security(&SecurityAuditEvent::new(
            "local_only_admin",
            None,
            "local_only",
            "memory",
        ));
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> =
            text.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "control_request");
        assert_eq!(lines[0]["outcome"], "ok");
        assert_eq!(lines[0]["context"]["network_state"], "slow");
        assert_eq!(lines[1]["event"], "security");
    }

    #[test]
    fn error_statuses_are_marked_as_errors() {
        let event = ControlRequestEvent::new(ControlRequestEventParams {
            route: "rules_upsert",
            status: 400,
            peer_ip: Some("127.0.0.1".to_string()),
            context: None,
            rule_key: Some("k".to_string()),
            actor: None,
            error_kind: Some("invalid_request"),
            request_bytes: 12,
        });
        assert_eq!(event.outcome, RequestOutcome::Error);
    }
}
