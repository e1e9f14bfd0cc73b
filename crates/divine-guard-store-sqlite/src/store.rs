// crates/divine-guard-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Rule Store
// Description: Durable RuleStore backed by SQLite WAL.
// Purpose: Persist rules and their audit trail with hash-verified records.
// Dependencies: divine-guard-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`RuleStore`] using `SQLite`. Each rule is
//! stored as canonical JSON with a content hash; loads verify the hash and
//! revalidate the record, failing closed on corruption. An upsert writes the
//! rule row and its audit row inside one `IMMEDIATE` transaction, so writers
//! are serialized and readers see either the old or the new rule set.
//! Security posture: database contents are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use divine_guard_core::AuditAction;
use divine_guard_core::Rule;
use divine_guard_core::RuleAuditRecord;
use divine_guard_core::RuleKey;
use divine_guard_core::RuleQuery;
use divine_guard_core::RuleStore;
use divine_guard_core::StoreError;
use divine_guard_core::Timestamp;
use divine_guard_core::UpsertOutcome;
use divine_guard_core::UpsertRequest;
use divine_guard_core::hashing::DEFAULT_HASH_ALGORITHM;
use divine_guard_core::hashing::HashAlgorithm;
use divine_guard_core::hashing::HashDigest;
use divine_guard_core::hashing::canonical_json_bytes;
use divine_guard_core::hashing::hash_bytes;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum stored rule record size.
pub const MAX_RULE_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` rule store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config with default tuning for `path`.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw rule payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Store payload exceeded size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "rule_json exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps a rusqlite error into a store error.
fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed rule store with WAL support.
///
/// # Invariants
/// - Rule loads verify stored hashes before deserialization.
/// - `SQLite` connection access is serialized through a mutex.
#[derive(Clone)]
pub struct SqliteRuleStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRuleStore {
    /// Opens an `SQLite`-backed rule store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Applies an upsert and its audit record in one transaction.
    fn upsert_rule(&self, request: UpsertRequest) -> Result<UpsertOutcome, SqliteStoreError> {
        let key = request.spec.rule_key.clone();
        let mut guard = self.lock()?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        let before = fetch_rule(&tx, &key)?;
        let last_revision: i64 = tx
            .query_row("SELECT COALESCE(MAX(revision), 0) FROM rules", params![], |row| {
                row.get(0)
            })
            .map_err(|err| db_error(&err))?;
        let revision = u64::try_from(last_revision)
            .ok()
            .and_then(|value| value.checked_add(1))
            .ok_or_else(|| SqliteStoreError::Corrupt("invalid revision counter".to_string()))?;
        let rule =
            Rule::from_upsert(before.as_ref(), request.spec, revision, request.actor, request.at);
        let record = encode_rule(&rule)?;
        let action = if before.is_some() { AuditAction::Update } else { AuditAction::Create };
        tx.execute(
            "INSERT INTO rules (rule_key, scope, enabled, priority, revision, rule_json, \
             rule_hash, hash_algorithm, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT(rule_key) DO UPDATE SET scope = excluded.scope, enabled = \
             excluded.enabled, priority = excluded.priority, revision = excluded.revision, \
             rule_json = excluded.rule_json, rule_hash = excluded.rule_hash, hash_algorithm = \
             excluded.hash_algorithm, updated_at = excluded.updated_at",
            params![
                key.as_str(),
                rule.scope().as_str(),
                rule.spec.enabled,
                i64::from(rule.spec.priority),
                to_i64(revision)?,
                record.bytes,
                record.hash,
                DEFAULT_HASH_ALGORITHM.label(),
                rule.updated_at.as_unix_millis(),
            ],
        )
        .map_err(|err| db_error(&err))?;
        let before_json = match &before {
            Some(previous) => Some(encode_rule(previous)?.bytes),
            None => None,
        };
        tx.execute(
            "INSERT INTO rule_audit (rule_key, actor, action, before_json, after_json, \
             recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key.as_str(),
                rule.updated_by.as_deref(),
                action.as_str(),
                before_json,
                record.bytes,
                rule.updated_at.as_unix_millis(),
            ],
        )
        .map_err(|err| db_error(&err))?;
        tx.commit().map_err(|err| db_error(&err))?;
        drop(guard);
        Ok(UpsertOutcome {
            rule,
            action,
        })
    }

    /// Loads one rule.
    fn get_rule(&self, key: &RuleKey) -> Result<Option<Rule>, SqliteStoreError> {
        let guard = self.lock()?;
        let rule = fetch_rule(&guard, key)?;
        drop(guard);
        Ok(rule)
    }

    /// Lists rules in admin listing order.
    fn list_rules(&self, query: &RuleQuery) -> Result<Vec<Rule>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT rule_key, rule_json, rule_hash, hash_algorithm FROM rules WHERE (?1 IS \
                 NULL OR scope = ?1) AND (?2 = 0 OR enabled = 1) ORDER BY priority DESC, \
                 revision DESC",
            )
            .map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(
                params![query.scope.map(|scope| scope.as_str()), query.enabled_only],
                map_rule_row,
            )
            .map_err(|err| db_error(&err))?;
        let mut rules = Vec::new();
        for row in rows {
            let row = row.map_err(|err| db_error(&err))?;
            rules.push(decode_rule_row(row)?);
        }
        Ok(rules)
    }

    /// Loads audit records newest first.
    fn load_audit(
        &self,
        key: Option<&RuleKey>,
        limit: usize,
    ) -> Result<Vec<RuleAuditRecord>, SqliteStoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(
                "SELECT audit_id, rule_key, actor, action, before_json, after_json, recorded_at \
                 FROM rule_audit WHERE (?1 IS NULL OR rule_key = ?1) ORDER BY audit_id DESC \
                 LIMIT ?2",
            )
            .map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params![key.map(RuleKey::as_str), limit], |row| {
                Ok(AuditRow {
                    audit_id: row.get(0)?,
                    rule_key: row.get(1)?,
                    actor: row.get(2)?,
                    action: row.get(3)?,
                    before_json: row.get(4)?,
                    after_json: row.get(5)?,
                    recorded_at: row.get(6)?,
                })
            })
            .map_err(|err| db_error(&err))?;
        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(|err| db_error(&err))?;
            records.push(decode_audit_row(row)?);
        }
        Ok(records)
    }

    /// Verifies the store can execute a simple SQL statement.
    fn check_connection(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        guard.query_row("SELECT 1", params![], |_| Ok(())).map_err(|err| db_error(&err))
    }
}

impl RuleStore for SqliteRuleStore {
    fn upsert(&self, request: UpsertRequest) -> Result<UpsertOutcome, StoreError> {
        self.upsert_rule(request).map_err(StoreError::from)
    }

    fn get(&self, rule_key: &RuleKey) -> Result<Option<Rule>, StoreError> {
        self.get_rule(rule_key).map_err(StoreError::from)
    }

    fn list(&self, query: &RuleQuery) -> Result<Vec<Rule>, StoreError> {
        self.list_rules(query).map_err(StoreError::from)
    }

    fn audit_log(
        &self,
        rule_key: Option<&RuleKey>,
        limit: usize,
    ) -> Result<Vec<RuleAuditRecord>, StoreError> {
        self.load_audit(rule_key, limit).map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.check_connection().map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Record Encoding
// ============================================================================

/// Canonical rule bytes and their digest.
struct EncodedRule {
    /// Canonical JSON bytes.
    bytes: Vec<u8>,
    /// Lowercase hex digest.
    hash: String,
}

/// Raw rule row.
struct RuleRow {
    /// Row key.
    rule_key: String,
    /// Stored canonical JSON.
    bytes: Vec<u8>,
    /// Stored digest.
    hash: String,
    /// Stored digest algorithm label.
    algorithm: String,
}

/// Raw audit row.
struct AuditRow {
    /// Audit identifier.
    audit_id: i64,
    /// Rule key.
    rule_key: String,
    /// Actor.
    actor: Option<String>,
    /// Action label.
    action: String,
    /// Previous rule JSON.
    before_json: Option<Vec<u8>>,
    /// New rule JSON.
    after_json: Vec<u8>,
    /// Recorded instant (unix ms).
    recorded_at: i64,
}

/// Encodes a rule as canonical JSON with its digest.
fn encode_rule(rule: &Rule) -> Result<EncodedRule, SqliteStoreError> {
    let bytes =
        canonical_json_bytes(rule).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_RULE_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RULE_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let hash = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes).value;
    Ok(EncodedRule {
        bytes,
        hash,
    })
}

/// Reads a rule row.
fn map_rule_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RuleRow> {
    Ok(RuleRow {
        rule_key: row.get(0)?,
        bytes: row.get(1)?,
        hash: row.get(2)?,
        algorithm: row.get(3)?,
    })
}

/// Loads one rule by key on an open connection or transaction.
fn fetch_rule(connection: &Connection, key: &RuleKey) -> Result<Option<Rule>, SqliteStoreError> {
    let row = connection
        .query_row(
            "SELECT rule_key, rule_json, rule_hash, hash_algorithm FROM rules WHERE rule_key = ?1",
            params![key.as_str()],
            map_rule_row,
        )
        .optional()
        .map_err(|err| db_error(&err))?;
    row.map(decode_rule_row).transpose()
}

/// Verifies and decodes a rule row.
fn decode_rule_row(row: RuleRow) -> Result<Rule, SqliteStoreError> {
    if row.bytes.len() > MAX_RULE_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RULE_BYTES,
            actual_bytes: row.bytes.len(),
        });
    }
    let algorithm = HashAlgorithm::from_label(&row.algorithm)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let digest = HashDigest {
        algorithm,
        value: row.hash,
    };
    if !digest.verifies(&row.bytes) {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for rule {}", row.rule_key)));
    }
    let rule: Rule = serde_json::from_slice(&row.bytes)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if rule.rule_key().as_str() != row.rule_key {
        return Err(SqliteStoreError::Invalid(
            "rule_key mismatch between key and payload".to_string(),
        ));
    }
    Ok(rule)
}

/// Decodes an audit row.
fn decode_audit_row(row: AuditRow) -> Result<RuleAuditRecord, SqliteStoreError> {
    let action = match row.action.as_str() {
        "create" => AuditAction::Create,
        "update" => AuditAction::Update,
        other => {
            return Err(SqliteStoreError::Invalid(format!("unknown audit action: {other}")));
        }
    };
    let decode = |bytes: &[u8]| -> Result<Rule, SqliteStoreError> {
        serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
    };
    let before = row.before_json.as_deref().map(decode).transpose()?;
    let after = decode(&row.after_json)?;
    let recorded_at = Timestamp::from_unix_millis(row.recorded_at)
        .ok_or_else(|| SqliteStoreError::Invalid("recorded_at out of range".to_string()))?;
    let audit_id = u64::try_from(row.audit_id)
        .map_err(|_| SqliteStoreError::Corrupt("negative audit_id".to_string()))?;
    Ok(RuleAuditRecord {
        audit_id,
        rule_key: RuleKey::new(row.rule_key),
        actor: row.actor,
        action,
        before,
        after,
        recorded_at,
    })
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS rules (
                    rule_key TEXT PRIMARY KEY,
                    scope TEXT NOT NULL,
                    enabled INTEGER NOT NULL,
                    priority INTEGER NOT NULL,
                    revision INTEGER NOT NULL UNIQUE,
                    rule_json BLOB NOT NULL,
                    rule_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_rules_listing
                    ON rules (priority DESC, revision DESC);
                CREATE TABLE IF NOT EXISTS rule_audit (
                    audit_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    rule_key TEXT NOT NULL,
                    actor TEXT,
                    action TEXT NOT NULL,
                    before_json BLOB,
                    after_json BLOB NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_rule_audit_key
                    ON rule_audit (rule_key, audit_id);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

/// Converts a revision into an `SQLite` integer.
fn to_i64(value: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid("revision overflow".to_string()))
}

