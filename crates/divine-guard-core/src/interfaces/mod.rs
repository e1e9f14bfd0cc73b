// crates/divine-guard-core/src/interfaces/mod.rs
// ============================================================================
// Module: Divine Guard Interfaces
// Description: Backend-agnostic rule store contract.
// Purpose: Define the repository surface the control plane reads and writes.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The rule set is externally owned state. The control plane reaches it only
//! through [`RuleStore`], loads it once per snapshot request, and hands an
//! immutable slice to the compiler. Implementations must serialize writers
//! and apply each upsert (rule write plus audit record) atomically so a
//! reader sees either the pre- or post-upsert rule set.
//!
//! Security posture: stored records are revalidated on read; implementations
//! fail closed on corrupt or incompatible data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Reverse;

use thiserror::Error;

use crate::core::AuditAction;
use crate::core::Rule;
use crate::core::RuleAuditRecord;
use crate::core::RuleKey;
use crate::core::RuleSpec;
use crate::core::Scope;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Validated upsert handed to a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertRequest {
    /// Validated rule content.
    pub spec: RuleSpec,
    /// Actor performing the upsert.
    pub actor: Option<String>,
    /// Upsert instant.
    pub at: Timestamp,
}

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Stored rule after the upsert.
    pub rule: Rule,
    /// Whether the rule was created or replaced.
    pub action: AuditAction,
}

/// Filter for rule listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleQuery {
    /// Restrict to one scope.
    pub scope: Option<Scope>,
    /// Restrict to enabled rules.
    pub enabled_only: bool,
}

impl RuleQuery {
    /// Query for every stored rule.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            scope: None,
            enabled_only: false,
        }
    }

    /// Query for one scope.
    #[must_use]
    pub const fn scope(scope: Scope) -> Self {
        Self {
            scope: Some(scope),
            enabled_only: false,
        }
    }

    /// Returns true when the rule passes this filter.
    #[must_use]
    pub fn accepts(&self, rule: &Rule) -> bool {
        self.scope.is_none_or(|scope| rule.scope() == scope)
            && (!self.enabled_only || rule.spec.enabled)
    }
}

/// Sorts rules into admin listing order: priority desc, then revision desc.
pub fn sort_for_listing(rules: &mut [Rule]) {
    rules.sort_by_key(|rule| (Reverse(rule.spec.priority), Reverse(rule.revision)));
}

// ============================================================================
// SECTION: Rule Store
// ============================================================================

/// Rule store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("rule store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("rule store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("rule store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("rule store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("rule store error: {0}")]
    Store(String),
}

/// Repository for administrator rules.
pub trait RuleStore {
    /// Creates or atomically replaces the rule named by `request.spec.rule_key`,
    /// assigning a fresh revision and appending an audit record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails; nothing is applied.
    fn upsert(&self, request: UpsertRequest) -> Result<UpsertOutcome, StoreError>;

    /// Loads one rule by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get(&self, rule_key: &RuleKey) -> Result<Option<Rule>, StoreError>;

    /// Lists rules matching the query in listing order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list(&self, query: &RuleQuery) -> Result<Vec<Rule>, StoreError>;

    /// Returns audit records, newest first, optionally for one rule.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn audit_log(
        &self,
        rule_key: Option<&RuleKey>,
        limit: usize,
    ) -> Result<Vec<RuleAuditRecord>, StoreError>;

    /// Reports store readiness for startup checks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
