// crates/divine-guard-core/src/runtime/store.rs
// ============================================================================
// Module: Divine Guard In-Memory Store
// Description: In-memory rule store and shared store wrapper.
// Purpose: Provide a deterministic store for tests, demos and offline compilation.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryRuleStore`] keeps rules and the audit trail behind one mutex so
//! an upsert and its audit record are applied together. State is lost on
//! process exit; durable deployments use the SQLite store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::AuditAction;
use crate::core::Rule;
use crate::core::RuleAuditRecord;
use crate::core::RuleKey;
use crate::interfaces::RuleQuery;
use crate::interfaces::RuleStore;
use crate::interfaces::StoreError;
use crate::interfaces::UpsertOutcome;
use crate::interfaces::UpsertRequest;
use crate::interfaces::sort_for_listing;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutable state guarded by the store mutex.
#[derive(Debug, Default)]
struct MemoryState {
    /// Rules keyed by rule key.
    rules: BTreeMap<RuleKey, Rule>,
    /// Audit records in insertion order.
    audit: Vec<RuleAuditRecord>,
    /// Last assigned revision.
    last_revision: u64,
}

/// In-memory rule store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRuleStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRuleStore {
    /// Creates an empty in-memory rule store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Maps a poisoned mutex to a store error.
fn poisoned<T>(_: T) -> StoreError {
    StoreError::Store("rule store mutex poisoned".to_string())
}

impl RuleStore for InMemoryRuleStore {
    fn upsert(&self, request: UpsertRequest) -> Result<UpsertOutcome, StoreError> {
        let mut guard = self.state.lock().map_err(poisoned)?;
        let revision = guard
            .last_revision
            .checked_add(1)
            .ok_or_else(|| StoreError::Store("revision counter exhausted".to_string()))?;
        let key = request.spec.rule_key.clone();
        let before = guard.rules.get(&key).cloned();
        let rule =
            Rule::from_upsert(before.as_ref(), request.spec, revision, request.actor, request.at);
        let action = if before.is_some() { AuditAction::Update } else { AuditAction::Create };
        let audit_id = u64::try_from(guard.audit.len())
            .map_err(|_| StoreError::Store("audit counter exhausted".to_string()))?
            + 1;
        guard.audit.push(RuleAuditRecord {
            audit_id,
            rule_key: key.clone(),
            actor: rule.updated_by.clone(),
            action,
            before,
            after: rule.clone(),
            recorded_at: rule.updated_at,
        });
        guard.rules.insert(key, rule.clone());
        guard.last_revision = revision;
        drop(guard);
        Ok(UpsertOutcome {
            rule,
            action,
        })
    }

    fn get(&self, rule_key: &RuleKey) -> Result<Option<Rule>, StoreError> {
        let guard = self.state.lock().map_err(poisoned)?;
        Ok(guard.rules.get(rule_key).cloned())
    }

    fn list(&self, query: &RuleQuery) -> Result<Vec<Rule>, StoreError> {
        let guard = self.state.lock().map_err(poisoned)?;
        let mut rules: Vec<Rule> =
            guard.rules.values().filter(|rule| query.accepts(rule)).cloned().collect();
        drop(guard);
        sort_for_listing(&mut rules);
        Ok(rules)
    }

    fn audit_log(
        &self,
        rule_key: Option<&RuleKey>,
        limit: usize,
    ) -> Result<Vec<RuleAuditRecord>, StoreError> {
        let guard = self.state.lock().map_err(poisoned)?;
        Ok(guard
            .audit
            .iter()
            .rev()
            .filter(|record| rule_key.is_none_or(|key| &record.rule_key == key))
            .take(limit)
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared rule store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedRuleStore {
    /// Inner store implementation.
    inner: Arc<dyn RuleStore + Send + Sync>,
}

impl SharedRuleStore {
    /// Wraps a rule store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl RuleStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn RuleStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl RuleStore for SharedRuleStore {
    fn upsert(&self, request: UpsertRequest) -> Result<UpsertOutcome, StoreError> {
        self.inner.upsert(request)
    }

    fn get(&self, rule_key: &RuleKey) -> Result<Option<Rule>, StoreError> {
        self.inner.get(rule_key)
    }

    fn list(&self, query: &RuleQuery) -> Result<Vec<Rule>, StoreError> {
        self.inner.list(query)
    }

    fn audit_log(
        &self,
        rule_key: Option<&RuleKey>,
        limit: usize,
    ) -> Result<Vec<RuleAuditRecord>, StoreError> {
        self.inner.audit_log(rule_key, limit)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}
