// crates/divine-guard-server/src/server.rs
// ============================================================================
// Module: Divine Guard HTTP Server
// Description: Axum routes for control snapshots and admin rule management.
// Purpose: Expose the control plane as JSON with a uniform response envelope.
// Dependencies: divine-guard-core, divine-guard-config, axum, tokio
// ============================================================================

//! ## Overview
//! Routes:
//! - `GET  /api/divine-guard/control-snapshot` (public)
//! - `PUT|POST /api/admin/divine-guard/rules/upsert` (admin)
//! - `GET  /api/admin/divine-guard/rules` (admin)
//! - `GET  /api/admin/divine-guard/rules/audit` (admin)
//!
//! Every response body is `{ "success": true, "data": .. }` or
//! `{ "success": false, "error": ".." }`. Each request emits exactly one
//! `control_request` audit event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use axum::extract::rejection::QueryRejection;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::put;
use divine_guard_config::DivineGuardConfig;
use divine_guard_config::RuleStoreType;
use divine_guard_config::ServerAuthMode;
use divine_guard_core::ControlPlane;
use divine_guard_core::ControlPlaneError;
use divine_guard_core::ControlSnapshot;
use divine_guard_core::InMemoryRuleStore;
use divine_guard_core::RequestContext;
use divine_guard_core::Rule;
use divine_guard_core::RuleAuditRecord;
use divine_guard_core::RuleKey;
use divine_guard_core::RuleQuery;
use divine_guard_core::RuleUpsert;
use divine_guard_core::Scope;
use divine_guard_core::SharedRuleStore;
use divine_guard_core::StoreError;
use divine_guard_core::Timestamp;
use divine_guard_store_sqlite::SqliteRuleStore;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::audit::ControlAuditSink;
use crate::audit::ControlRequestEvent;
use crate::audit::ControlRequestEventParams;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::SecurityAuditEvent;
use crate::audit::StderrAuditSink;
use crate::auth::AdminAuth;
use crate::auth::AdminIdentity;
use crate::auth::AuthError;
use crate::auth::normalize_actor;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Public snapshot route.
pub const SNAPSHOT_PATH: &str = "/api/divine-guard/control-snapshot";
/// Admin upsert route.
pub const ADMIN_UPSERT_PATH: &str = "/api/admin/divine-guard/rules/upsert";
/// Admin listing route.
pub const ADMIN_LIST_PATH: &str = "/api/admin/divine-guard/rules";
/// Admin audit route.
pub const ADMIN_AUDIT_PATH: &str = "/api/admin/divine-guard/rules/audit";
/// Header carrying the acting administrator.
const ACTOR_HEADER: &str = "x-divine-guard-actor";
/// Audit records returned when `limit` is omitted.
const DEFAULT_AUDIT_LIMIT: usize = 200;
/// Upper bound on audit records per request.
const MAX_AUDIT_LIMIT: usize = 1_000;

// ============================================================================
// SECTION: Server
// ============================================================================

/// Divine Guard HTTP server instance.
pub struct DivineGuardServer {
    /// Listener address.
    addr: SocketAddr,
    /// Shared handler state.
    state: Arc<ServerState>,
}

impl DivineGuardServer {
    /// Builds a server from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when configuration is invalid or the store or
    /// audit log cannot be opened.
    pub fn from_config(config: &DivineGuardConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let addr = config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let plane = build_control_plane(config)?;
        plane
            .readiness()
            .map_err(|err| ServerError::Init(format!("rule store not ready: {err}")))?;
        let audit = build_audit_sink(config)?;
        emit_security_posture(config, audit.as_ref());
        let state = Arc::new(ServerState::new(
            plane,
            AdminAuth::from_config(&config.server.auth),
            audit,
            config.server.max_body_bytes,
        ));
        Ok(Self {
            addr,
            state,
        })
    }

    /// Returns the configured listener address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves requests until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|err| ServerError::Transport(format!("http bind failed: {err}")))?;
        let app = router(self.state);
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|err| ServerError::Transport(format!("http server failed: {err}")))
    }
}

/// Builds the control plane from configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the `SQLite` store cannot be opened.
pub fn build_control_plane(config: &DivineGuardConfig) -> Result<ControlPlane, ServerError> {
    let store = match config.rule_store.store_type {
        RuleStoreType::Memory => SharedRuleStore::from_store(InMemoryRuleStore::new()),
        RuleStoreType::Sqlite => {
            let sqlite_config = config.rule_store.sqlite_config().ok_or_else(|| {
                ServerError::Config("sqlite rule_store requires path".to_string())
            })?;
            let store = SqliteRuleStore::new(sqlite_config)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            SharedRuleStore::from_store(store)
        }
    };
    Ok(ControlPlane::new(store, config.snapshot_compiler(), config.control_plane_config()))
}

/// Selects the audit sink described by `[server.audit]`.
fn build_audit_sink(
    config: &DivineGuardConfig,
) -> Result<Arc<dyn ControlAuditSink>, ServerError> {
    let audit = &config.server.audit;
    if !audit.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &audit.path {
        Some(path) => {
            let sink = FileAuditSink::new(Path::new(path.trim()))
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

/// Records startup posture warnings.
fn emit_security_posture(config: &DivineGuardConfig, audit: &dyn ControlAuditSink) {
    let auth_mode = config.server.auth.mode;
    let store_label = match config.rule_store.store_type {
        RuleStoreType::Memory => "memory",
        RuleStoreType::Sqlite => "sqlite",
    };
    if auth_mode == ServerAuthMode::LocalOnly {
        let _ = writeln!(
            io::stderr(),
            "divine-guard: WARNING: admin routes running in local-only mode without explicit \
             auth; configure server.auth to enable bearer_token"
        );
        audit.record_security(&SecurityAuditEvent::new(
            "local_only_admin",
            Some("admin routes accept any loopback caller".to_string()),
            auth_mode.as_str(),
            store_label,
        ));
    }
    if config.rule_store.store_type == RuleStoreType::Memory {
        audit.record_security(&SecurityAuditEvent::new(
            "ephemeral_rule_store",
            Some("rules are lost on restart".to_string()),
            auth_mode.as_str(),
            store_label,
        ));
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Shared handler state.
pub struct ServerState {
    /// Store-backed control plane.
    plane: ControlPlane,
    /// Admin auth policy.
    auth: AdminAuth,
    /// Request audit sink.
    audit: Arc<dyn ControlAuditSink>,
    /// Maximum accepted request body.
    max_body_bytes: usize,
}

impl ServerState {
    /// Creates handler state.
    #[must_use]
    pub fn new(
        plane: ControlPlane,
        auth: AdminAuth,
        audit: Arc<dyn ControlAuditSink>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            plane,
            auth,
            audit,
            max_body_bytes,
        }
    }
}

/// Builds the route table.
///
/// The returned router needs `ConnectInfo<SocketAddr>`; serve it with
/// `into_make_service_with_connect_info`.
pub fn router(state: Arc<ServerState>) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route(SNAPSHOT_PATH, get(handle_snapshot))
        .route(ADMIN_UPSERT_PATH, put(handle_upsert).post(handle_upsert))
        .route(ADMIN_LIST_PATH, get(handle_list))
        .route(ADMIN_AUDIT_PATH, get(handle_audit))
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

// ============================================================================
// SECTION: Query Types
// ============================================================================

/// Snapshot route query string.
#[derive(Debug, Default, Deserialize)]
struct SnapshotQuery {
    /// Client application version.
    app_version: Option<String>,
    /// Feature key of the calling surface.
    feature_key: Option<String>,
    /// Client-reported network state.
    network_state: Option<String>,
}

/// Listing route query string.
#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    /// Optional scope filter.
    scope: Option<String>,
}

/// Audit route query string.
#[derive(Debug, Default, Deserialize)]
struct AuditQuery {
    /// Optional rule key filter.
    rule_key: Option<String>,
    /// Maximum records to return.
    limit: Option<String>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Compiles a snapshot for the request context.
async fn handle_snapshot(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Result<Query<SnapshotQuery>, QueryRejection>,
) -> Response {
    let mut record = RequestRecord::new("control_snapshot", Some(peer.ip()));
    let result: Result<ControlSnapshot, ApiError> = async {
        let Query(query) = query.map_err(|err| ApiError::bad_request(err.body_text()))?;
        let context = RequestContext::new(
            query.app_version.as_deref(),
            query.feature_key.as_deref(),
            query.network_state.as_deref(),
        );
        record.context = Some(context.clone());
        let plane = state.plane.clone();
        run_blocking(move || plane.snapshot(&context, now())).await
    }
    .await;
    respond(&state, record, result)
}

/// Creates or replaces a rule.
async fn handle_upsert(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let mut record = RequestRecord::new("rules_upsert", Some(peer.ip()));
    let result: Result<Rule, ApiError> = async {
        let identity = authorize(&state, peer.ip(), &headers)?;
        let bytes = body.map_err(|err| ApiError::from_body_rejection(&err))?;
        record.request_bytes = bytes.len();
        if bytes.len() > state.max_body_bytes {
            return Err(ApiError::too_large());
        }
        let payload: RuleUpsert = serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::bad_request(format!("invalid request body: {err}")))?;
        record.rule_key = Some(payload.rule_key.trim().to_string());
        let asserted =
            normalize_actor(header_str(&headers, ACTOR_HEADER)).map_err(ApiError::bad_request)?;
        let actor = identity.actor(asserted);
        record.actor = Some(actor.clone());
        let plane = state.plane.clone();
        let outcome = run_blocking(move || plane.upsert(&payload, Some(actor), now())).await?;
        Ok(outcome.rule)
    }
    .await;
    respond(&state, record, result)
}

/// Lists rules, optionally filtered by scope.
async fn handle_list(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let record = RequestRecord::new("rules_list", Some(peer.ip()));
    let result: Result<Vec<Rule>, ApiError> = async {
        authorize(&state, peer.ip(), &headers)?;
        let Query(query) = query.map_err(|err| ApiError::bad_request(err.body_text()))?;
        let scope = query
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(Scope::from_str)
            .transpose()
            .map_err(|err| ApiError::bad_request(err.to_string()))?;
        let rule_query = RuleQuery {
            scope,
            enabled_only: false,
        };
        let plane = state.plane.clone();
        run_blocking(move || plane.list(&rule_query)).await
    }
    .await;
    respond(&state, record, result)
}

/// Returns audit records, newest first.
async fn handle_audit(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> Response {
    let mut record = RequestRecord::new("rules_audit", Some(peer.ip()));
    let result: Result<Vec<RuleAuditRecord>, ApiError> = async {
        authorize(&state, peer.ip(), &headers)?;
        let Query(query) = query.map_err(|err| ApiError::bad_request(err.body_text()))?;
        let rule_key = match query.rule_key.as_deref().filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => {
                Some(RuleKey::parse(raw).map_err(|err| ApiError::bad_request(err.to_string()))?)
            }
            None => None,
        };
        record.rule_key = rule_key.as_ref().map(ToString::to_string);
        let limit = parse_audit_limit(query.limit.as_deref())?;
        let plane = state.plane.clone();
        run_blocking(move || plane.audit(rule_key.as_ref(), limit)).await
    }
    .await;
    respond(&state, record, result)
}

/// Unknown routes.
async fn handle_not_found(State(state): State<Arc<ServerState>>) -> Response {
    let record = RequestRecord::new("unknown", None);
    respond::<()>(&state, record, Err(ApiError::not_found()))
}

// ============================================================================
// SECTION: Response Envelope
// ============================================================================

/// Uniform response body.
#[derive(Debug, Serialize)]
struct Envelope<T> {
    /// Whether the request succeeded.
    success: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    /// Message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Request failure with its HTTP mapping.
#[derive(Debug)]
struct ApiError {
    /// HTTP status.
    status: StatusCode,
    /// Audit label.
    kind: &'static str,
    /// Client-facing message.
    message: String,
}

impl ApiError {
    /// Malformed or invalid input.
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request",
            message: message.into(),
        }
    }

    /// Body over the configured limit.
    fn too_large() -> Self {
        Self {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            kind: "payload_too_large",
            message: "request body too large".to_string(),
        }
    }

    /// Unknown route.
    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: "route not found".to_string(),
        }
    }

    /// Server-side failure.
    fn internal(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind,
            message: message.into(),
        }
    }

    /// Maps a body extraction failure.
    fn from_body_rejection(rejection: &BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::too_large()
        } else {
            Self::bad_request(rejection.body_text())
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "unauthenticated",
            message: err.to_string(),
        }
    }
}

impl From<ControlPlaneError> for ApiError {
    fn from(err: ControlPlaneError) -> Self {
        match err {
            ControlPlaneError::Rule(err) => Self {
                status: StatusCode::BAD_REQUEST,
                kind: "invalid_rule",
                message: err.to_string(),
            },
            ControlPlaneError::Store(StoreError::Invalid(message)) => Self {
                status: StatusCode::BAD_REQUEST,
                kind: "invalid_rule",
                message,
            },
            ControlPlaneError::Store(err) => Self::internal("store", err.to_string()),
            err @ ControlPlaneError::RuleLimitReached {
                ..
            } => Self {
                status: StatusCode::BAD_REQUEST,
                kind: "rule_limit",
                message: err.to_string(),
            },
            err @ ControlPlaneError::TooManyRules {
                ..
            } => Self::internal("rule_limit", err.to_string()),
            ControlPlaneError::Snapshot(err) => Self::internal("snapshot", err.to_string()),
        }
    }
}

/// Audit fields collected while a request is handled.
struct RequestRecord {
    /// Route label.
    route: &'static str,
    /// Peer IP address when available.
    peer_ip: Option<IpAddr>,
    /// Normalized snapshot context.
    context: Option<RequestContext>,
    /// Rule key touched.
    rule_key: Option<String>,
    /// Recorded actor.
    actor: Option<String>,
    /// Request body size.
    request_bytes: usize,
}

impl RequestRecord {
    /// Starts a record for `route`.
    const fn new(route: &'static str, peer_ip: Option<IpAddr>) -> Self {
        Self {
            route,
            peer_ip,
            context: None,
            rule_key: None,
            actor: None,
            request_bytes: 0,
        }
    }
}

/// Emits the audit event and renders the envelope.
fn respond<T: Serialize>(
    state: &ServerState,
    record: RequestRecord,
    result: Result<T, ApiError>,
) -> Response {
    let (status, error_kind, body) = match result {
        Ok(data) => match serde_json::to_value(&data) {
            Ok(value) => (
                StatusCode::OK,
                None,
                Envelope {
                    success: true,
                    data: Some(value),
                    error: None,
                },
            ),
            Err(_) => failure_body(ApiError::internal("serialization", "serialization failed")),
        },
        Err(err) => failure_body(err),
    };
    state.audit.record(&ControlRequestEvent::new(ControlRequestEventParams {
        route: record.route,
        status: status.as_u16(),
        peer_ip: record.peer_ip.map(|ip| ip.to_string()),
        context: record.context,
        rule_key: record.rule_key,
        actor: record.actor,
        error_kind,
        request_bytes: record.request_bytes,
    }));
    (status, Json(body)).into_response()
}

/// Splits an error into status, audit label, and envelope.
fn failure_body(
    err: ApiError,
) -> (StatusCode, Option<&'static str>, Envelope<serde_json::Value>) {
    (
        err.status,
        Some(err.kind),
        Envelope {
            success: false,
            data: None,
            error: Some(err.message),
        },
    )
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Authenticates an admin request.
fn authorize(
    state: &ServerState,
    peer_ip: IpAddr,
    headers: &HeaderMap,
) -> Result<AdminIdentity, ApiError> {
    Ok(state.auth.authorize(Some(peer_ip), header_str(headers, AUTHORIZATION.as_str()))?)
}

/// Returns a header value when present and valid UTF-8.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Parses the audit `limit` parameter.
fn parse_audit_limit(raw: Option<&str>) -> Result<usize, ApiError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(DEFAULT_AUDIT_LIMIT);
    };
    match raw.parse::<usize>() {
        Ok(0) | Err(_) => Err(ApiError::bad_request("limit must be a positive integer")),
        Ok(limit) => Ok(limit.min(MAX_AUDIT_LIMIT)),
    }
}

/// Runs a control plane call on the blocking pool.
async fn run_blocking<T, F>(call: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ControlPlaneError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|_| ApiError::internal("internal", "blocking task failed"))?
        .map_err(ApiError::from)
}

/// Current wall-clock time.
fn now() -> Timestamp {
    Timestamp::new(OffsetDateTime::now_utc())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
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
    fn audit_limit_defaults_and_clamps() {
        assert_eq!(parse_audit_limit(None).unwrap(), DEFAULT_AUDIT_LIMIT);
        assert_eq!(parse_audit_limit(Some(" ")).unwrap(), DEFAULT_AUDIT_LIMIT);
        assert_eq!(parse_audit_limit(Some("5")).unwrap(), 5);
        assert_eq!(parse_audit_limit(Some("50000")).unwrap(), MAX_AUDIT_LIMIT);
        assert!(parse_audit_limit(Some("0")).is_err());
        assert!(parse_audit_limit(Some("-1")).is_err());
        assert!(parse_audit_limit(Some("ten")).is_err());
    }

    #[test]
    fn store_invalid_maps_to_bad_request() {
        let err = ApiError::from(ControlPlaneError::Store(StoreError::Invalid("big".to_string())));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = ApiError::from(ControlPlaneError::Store(StoreError::Io("disk".to_string())));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn from_config_checks_store_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DivineGuardConfig::default();
        config.rule_store.store_type = RuleStoreType::Sqlite;
        config.rule_store.path = Some(dir.path().join("rules.sqlite"));
        let server = DivineGuardServer::from_config(&config).unwrap();
        assert!(server.state.plane.readiness().is_ok());
        assert!(dir.path().join("rules.sqlite").exists());

        config.rule_store.path = Some(dir.path().to_path_buf());
        assert!(matches!(DivineGuardServer::from_config(&config), Err(ServerError::Init(_))));
    }

    #[test]
    fn rule_limit_on_upsert_maps_to_bad_request() {
        let err = ApiError::from(ControlPlaneError::RuleLimitReached {
            max: 2,
        });
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.kind, "rule_limit");
    }
}
