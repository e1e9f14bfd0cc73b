// crates/divine-guard-core/src/runtime/control_plane.rs
// ============================================================================
// Module: Divine Guard Control Plane
// Description: Store-backed entry points shared by every transport.
// Purpose: Validate upserts, load rules once per request, and compile snapshots.
// Dependencies: thiserror, crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! HTTP handlers and CLI commands call into [`ControlPlane`] so validation
//! and compilation behave identically on every surface. A snapshot request
//! reads the enabled rule set exactly once, then compiles over that
//! immutable copy; any store failure fails the whole request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::ControlSnapshot;
use crate::core::RequestContext;
use crate::core::Rule;
use crate::core::RuleAuditRecord;
use crate::core::RuleError;
use crate::core::RuleKey;
use crate::core::RuleUpsert;
use crate::core::Timestamp;
use crate::interfaces::RuleQuery;
use crate::interfaces::RuleStore;
use crate::interfaces::StoreError;
use crate::interfaces::UpsertOutcome;
use crate::interfaces::UpsertRequest;
use crate::runtime::assembler::SnapshotCompiler;
use crate::runtime::assembler::SnapshotError;
use crate::runtime::store::SharedRuleStore;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default upper bound on rules loaded per compilation.
pub const DEFAULT_MAX_RULES: usize = 500;

/// Control plane limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPlaneConfig {
    /// Maximum enabled rules loaded per compilation.
    pub max_rules: usize,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            max_rules: DEFAULT_MAX_RULES,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Control plane errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Upsert payload failed validation.
    #[error(transparent)]
    Rule(#[from] RuleError),
    /// Rule store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Enabled rule count exceeds the configured bound.
    #[error("rule store holds {count} enabled rules (max {max})")]
    TooManyRules {
        /// Enabled rules loaded.
        count: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Upsert would leave more enabled rules than the configured bound.
    #[error("upsert would exceed the enabled rule limit (max {max})")]
    RuleLimitReached {
        /// Configured maximum.
        max: usize,
    },
    /// Snapshot assembly failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

// ============================================================================
// SECTION: Control Plane
// ============================================================================

/// Store-backed control plane.
#[derive(Clone)]
pub struct ControlPlane {
    /// Rule store.
    store: SharedRuleStore,
    /// Snapshot pipeline.
    compiler: SnapshotCompiler,
    /// Limits.
    config: ControlPlaneConfig,
}

impl ControlPlane {
    /// Creates a control plane over `store`.
    #[must_use]
    pub const fn new(
        store: SharedRuleStore,
        compiler: SnapshotCompiler,
        config: ControlPlaneConfig,
    ) -> Self {
        Self {
            store,
            compiler,
            config,
        }
    }

    /// Checks that the rule store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Store`] when the store is unavailable.
    pub fn readiness(&self) -> Result<(), ControlPlaneError> {
        Ok(self.store.readiness()?)
    }

    /// Compiles a snapshot for `context` from current store contents.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError`] when the store fails, the rule bound is
    /// exceeded, or hashing fails. No partial snapshot is produced.
    pub fn snapshot(
        &self,
        context: &RequestContext,
        compiled_at: Timestamp,
    ) -> Result<ControlSnapshot, ControlPlaneError> {
        let query = RuleQuery {
            scope: None,
            enabled_only: true,
        };
        let rules = self.store.list(&query)?;
        if rules.len() > self.config.max_rules {
            return Err(ControlPlaneError::TooManyRules {
                count: rules.len(),
                max: self.config.max_rules,
            });
        }
        Ok(self.compiler.compile(&rules, context, compiled_at)?)
    }

    /// Validates and applies an upsert payload.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Rule`] for invalid payloads and
    /// [`ControlPlaneError::RuleLimitReached`] when an enabled rule would push
    /// the enabled count past `max_rules`; the store is not touched in either
    /// case. Returns [`ControlPlaneError::Store`] when the write fails.
    pub fn upsert(
        &self,
        payload: &RuleUpsert,
        actor: Option<String>,
        at: Timestamp,
    ) -> Result<UpsertOutcome, ControlPlaneError> {
        let spec = payload.validate()?;
        if spec.enabled {
            self.ensure_room_for(&spec.rule_key)?;
        }
        Ok(self.store.upsert(UpsertRequest {
            spec,
            actor,
            at,
        })?)
    }

    /// Rejects an enabled upsert that would exceed `max_rules`.
    fn ensure_room_for(&self, rule_key: &RuleKey) -> Result<(), ControlPlaneError> {
        let query = RuleQuery {
            scope: None,
            enabled_only: true,
        };
        let others =
            self.store.list(&query)?.iter().filter(|rule| rule.rule_key() != rule_key).count();
        if others >= self.config.max_rules {
            return Err(ControlPlaneError::RuleLimitReached {
                max: self.config.max_rules,
            });
        }
        Ok(())
    }

    /// Lists rules in admin listing order.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Store`] when loading fails.
    pub fn list(&self, query: &RuleQuery) -> Result<Vec<Rule>, ControlPlaneError> {
        Ok(self.store.list(query)?)
    }

    /// Returns audit records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ControlPlaneError::Store`] when loading fails.
    pub fn audit(
        &self,
        rule_key: Option<&RuleKey>,
        limit: usize,
    ) -> Result<Vec<RuleAuditRecord>, ControlPlaneError> {
        Ok(self.store.audit_log(rule_key, limit)?)
    }
}
