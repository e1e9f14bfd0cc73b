// crates/divine-guard-config/src/config.rs
// ============================================================================
// Module: Divine Guard Configuration
// Description: Configuration loading and validation for Divine Guard.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: divine-guard-core, divine-guard-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. Every section is optional
//! and defaults to a loopback-only server over an in-memory rule store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use divine_guard_core::ControlPlaneConfig;
use divine_guard_core::DEFAULT_MAX_RULES;
use divine_guard_core::DEFAULT_TTL_SECONDS;
use divine_guard_core::SafeModePolicy;
use divine_guard_core::SnapshotCompiler;
use divine_guard_store_sqlite::SqliteStoreConfig;
use divine_guard_store_sqlite::SqliteStoreMode;
use divine_guard_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "divine-guard.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "DIVINE_GUARD_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of server auth tokens.
pub const MAX_AUTH_TOKENS: usize = 64;
/// Maximum length of a server auth token.
pub const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Default listener address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
/// Default maximum request body size.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;
/// Default `SQLite` busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Upper bound for `snapshot.ttl_seconds`.
pub const MAX_TTL_SECONDS: u32 = 3_600;
/// Upper bound for `snapshot.max_rules`.
pub const MAX_RULES_LIMIT: usize = 10_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Divine Guard configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DivineGuardConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Rule store backend.
    #[serde(default)]
    pub rule_store: RuleStoreConfig,
    /// Snapshot compilation limits.
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    /// Conservative values forced while safe mode is active.
    #[serde(default)]
    pub safe_mode: SafeModePolicy,
}

impl DivineGuardConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// Resolution order: explicit `path`, then `DIVINE_GUARD_CONFIG`, then
    /// `divine-guard.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.rule_store.validate()?;
        self.snapshot.validate()?;
        self.safe_mode.validate().map_err(ConfigError::Invalid)
    }

    /// Builds the snapshot compiler described by `[snapshot]` and `[safe_mode]`.
    #[must_use]
    pub fn snapshot_compiler(&self) -> SnapshotCompiler {
        SnapshotCompiler::new(self.safe_mode.clone(), self.snapshot.ttl_seconds)
    }

    /// Returns control plane limits described by `[snapshot]`.
    #[must_use]
    pub const fn control_plane_config(&self) -> ControlPlaneConfig {
        ControlPlaneConfig {
            max_rules: self.snapshot.max_rules,
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listener address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Admin route authentication.
    #[serde(default)]
    pub auth: ServerAuthConfig,
    /// Request audit logging.
    #[serde(default)]
    pub audit: ServerAuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            auth: ServerAuthConfig::default(),
            audit: ServerAuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `bind` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address: {}", self.bind)))
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.bind_addr()?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid("max_body_bytes must be greater than zero".to_string()));
        }
        self.auth.validate()?;
        if !addr.ip().is_loopback() && self.auth.mode == ServerAuthMode::LocalOnly {
            return Err(ConfigError::Invalid(
                "non-loopback bind requires bearer_token auth".to_string(),
            ));
        }
        self.audit.validate()
    }
}

/// Admin route authentication modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerAuthMode {
    /// Loopback peers only.
    #[default]
    LocalOnly,
    /// `Authorization: Bearer` against the configured token set.
    BearerToken,
}

impl ServerAuthMode {
    /// Returns the config label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalOnly => "local_only",
            Self::BearerToken => "bearer_token",
        }
    }
}

/// Admin route authentication configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuthConfig {
    /// Auth mode for admin routes.
    #[serde(default)]
    pub mode: ServerAuthMode,
    /// Accepted bearer tokens (required for `bearer_token` mode).
    #[serde(default)]
    pub bearer_tokens: Vec<String>,
}

impl ServerAuthConfig {
    /// Validates auth configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bearer_tokens.len() > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid("too many auth tokens".to_string()));
        }
        for token in &self.bearer_tokens {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid("auth token must be non-empty".to_string()));
            }
            if token.len() > MAX_AUTH_TOKEN_LENGTH {
                return Err(ConfigError::Invalid("auth token too long".to_string()));
            }
            if token.trim() != token {
                return Err(ConfigError::Invalid(
                    "auth token must not contain whitespace".to_string(),
                ));
            }
        }
        match self.mode {
            ServerAuthMode::LocalOnly => Ok(()),
            ServerAuthMode::BearerToken => {
                if self.bearer_tokens.is_empty() {
                    return Err(ConfigError::Invalid(
                        "bearer_token auth requires bearer_tokens".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Request audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerAuditConfig {
    /// Whether request audit events are emitted.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Optional JSON-lines file; stderr when absent.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for ServerAuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl ServerAuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("server.audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Rule Store
// ============================================================================

/// Rule store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStoreType {
    /// Process-local store; contents are lost on restart.
    #[default]
    Memory,
    /// Durable `SQLite` store.
    Sqlite,
}

/// Rule store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleStoreConfig {
    /// Backend type.
    #[serde(rename = "type", default)]
    pub store_type: RuleStoreType,
    /// Database path (required for `sqlite`).
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for RuleStoreConfig {
    fn default() -> Self {
        Self {
            store_type: RuleStoreType::Memory,
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl RuleStoreConfig {
    /// Returns the `SQLite` store config when the backend is `sqlite`.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        match (self.store_type, &self.path) {
            (RuleStoreType::Sqlite, Some(path)) => Some(SqliteStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates rule store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            RuleStoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory rule_store must not set path".to_string(),
                    ));
                }
                Ok(())
            }
            RuleStoreType::Sqlite => {
                let Some(path) = &self.path else {
                    return Err(ConfigError::Invalid(
                        "sqlite rule_store requires path".to_string(),
                    ));
                };
                validate_store_path(path)
            }
        }
    }
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Snapshot compilation settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Client polling hint in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u32,
    /// Maximum enabled rules loaded per compilation.
    #[serde(default = "default_max_rules")]
    pub max_rules: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            max_rules: DEFAULT_MAX_RULES,
        }
    }
}

impl SnapshotConfig {
    /// Validates snapshot limits.
    fn validate(self) -> Result<(), ConfigError> {
        if self.ttl_seconds == 0 || self.ttl_seconds > MAX_TTL_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "snapshot.ttl_seconds must be between 1 and {MAX_TTL_SECONDS}"
            )));
        }
        if self.max_rules == 0 || self.max_rules > MAX_RULES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "snapshot.max_rules must be between 1 and {MAX_RULES_LIMIT}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default request body cap.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Audit logging defaults to on.
const fn default_audit_enabled() -> bool {
    true
}

/// Default `SQLite` busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default snapshot polling hint.
const fn default_ttl_seconds() -> u32 {
    DEFAULT_TTL_SECONDS
}

/// Default rule bound.
const fn default_max_rules() -> usize {
    DEFAULT_MAX_RULES
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates the `SQLite` store path.
fn validate_store_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid("rule_store path must be non-empty".to_string()));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("rule_store path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("rule_store path component too long".to_string()));
        }
    }
    Ok(())
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
    fn empty_document_yields_defaults() {
        let config = DivineGuardConfig::from_toml("").unwrap();
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.server.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
        assert_eq!(config.server.auth.mode, ServerAuthMode::LocalOnly);
        assert_eq!(config.rule_store.store_type, RuleStoreType::Memory);
        assert_eq!(config.snapshot.ttl_seconds, DEFAULT_TTL_SECONDS);
        assert_eq!(config.safe_mode, SafeModePolicy::default());
    }

    #[test]
    fn validate_path_string_rejects_whitespace_only() {
        let err = validate_path_string("server.audit.path", "   ").unwrap_err();
        assert!(err.to_string().contains("server.audit.path must be non-empty"));
    }

    #[test]
    fn validate_path_string_rejects_component_too_long() {
        let value = format!("logs/{}", "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1));
        let err = validate_path_string("server.audit.path", &value).unwrap_err();
        assert!(err.to_string().contains("path component too long"));
    }

    #[test]
    fn sqlite_config_carries_tuning() {
        let config = DivineGuardConfig::from_toml(
            "[rule_store]\ntype = \"sqlite\"\npath = \"rules.sqlite\"\nbusy_timeout_ms = \
             250\nsync_mode = \"normal\"\n",
        )
        .unwrap();
        let sqlite = config.rule_store.sqlite_config().unwrap();
        assert_eq!(sqlite.path, PathBuf::from("rules.sqlite"));
        assert_eq!(sqlite.busy_timeout_ms, 250);
        assert_eq!(sqlite.sync_mode, SqliteSyncMode::Normal);
    }
}
