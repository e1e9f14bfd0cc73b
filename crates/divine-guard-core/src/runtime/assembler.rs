// crates/divine-guard-core/src/runtime/assembler.rs
// ============================================================================
// Module: Divine Guard Snapshot Assembler
// Description: Five-stage pipeline from rules and context to a snapshot.
// Purpose: Package compiled scopes with the applied trace and content hash.
// Dependencies: thiserror, crate::core, crate::runtime
// ============================================================================

//! ## Overview
//! [`SnapshotCompiler::compile`] runs Context Resolver, Precedence Resolver,
//! Scope Compiler and Safe-Mode Gate, then assembles the snapshot. It is a
//! pure function of its inputs: the same rules, context and instant always
//! produce the same snapshot, and `config_hash` depends only on the scope
//! objects.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::AppliedRule;
use crate::core::CompiledScopes;
use crate::core::ControlSnapshot;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::HashAlgorithm;
use crate::core::HashDigest;
use crate::core::HashError;
use crate::core::RequestContext;
use crate::core::Rule;
use crate::core::Scope;
use crate::core::Timestamp;
use crate::core::hashing::hash_canonical_json;
use crate::runtime::compiler;
use crate::runtime::matcher;
use crate::runtime::precedence;
use crate::runtime::safe_mode;
use crate::runtime::safe_mode::SafeModePolicy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;
/// Default client polling hint in seconds.
pub const DEFAULT_TTL_SECONDS: u32 = 45;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Snapshot assembly errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Scope objects could not be hashed.
    #[error(transparent)]
    Hash(#[from] HashError),
}

// ============================================================================
// SECTION: Compiler
// ============================================================================

/// Composes the compilation pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCompiler {
    /// Safe-mode conservative table.
    pub policy: SafeModePolicy,
    /// Client polling hint.
    pub ttl_seconds: u32,
    /// Hash algorithm for `config_hash`.
    pub hash_algorithm: HashAlgorithm,
}

impl Default for SnapshotCompiler {
    fn default() -> Self {
        Self {
            policy: SafeModePolicy::default(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            hash_algorithm: DEFAULT_HASH_ALGORITHM,
        }
    }
}

impl SnapshotCompiler {
    /// Creates a compiler with an explicit policy and polling hint.
    #[must_use]
    pub const fn new(policy: SafeModePolicy, ttl_seconds: u32) -> Self {
        Self {
            policy,
            ttl_seconds,
            hash_algorithm: DEFAULT_HASH_ALGORITHM,
        }
    }

    /// Compiles a snapshot for `context` from `rules`.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Hash`] when the scope objects cannot be hashed.
    pub fn compile(
        &self,
        rules: &[Rule],
        context: &RequestContext,
        compiled_at: Timestamp,
    ) -> Result<ControlSnapshot, SnapshotError> {
        let context = context.clone().normalized();
        let eligible = matcher::eligible(rules, &context);
        let resolved = precedence::resolve(&eligible);
        let compiled = compiler::compile(&resolved);
        let (scopes, safe_mode_forced) = safe_mode::apply(compiled, &self.policy);
        let applied = applied_trace(resolved.applied, safe_mode_forced);
        let config_hash = self.config_hash(&scopes)?;
        Ok(ControlSnapshot {
            version: SNAPSHOT_VERSION,
            context,
            scopes,
            applied,
            safe_mode_forced,
            config_hash,
            compiled_at,
            ttl_seconds: self.ttl_seconds,
        })
    }

    /// Hashes the five scope objects over canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Hash`] when canonicalization fails.
    pub fn config_hash(&self, scopes: &CompiledScopes) -> Result<HashDigest, SnapshotError> {
        Ok(hash_canonical_json(self.hash_algorithm, scopes)?)
    }
}

/// Orders the trace by scope, keeping precedence order within a scope.
///
/// When safe mode forced the output only global contributions remain.
fn applied_trace(mut applied: Vec<AppliedRule>, safe_mode_forced: bool) -> Vec<AppliedRule> {
    if safe_mode_forced {
        applied.retain(|entry| entry.scope == Scope::Global);
    }
    applied.sort_by_key(|entry| entry.scope);
    applied
}
