// crates/divine-guard-core/src/core/audit.rs
// ============================================================================
// Module: Divine Guard Rule Audit
// Description: Audit trail records for rule upserts.
// Purpose: Record who changed which rule and what it looked like before.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every successful upsert appends one [`RuleAuditRecord`] in the same
//! critical section (or transaction) as the rule write itself.

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RuleKey;
use crate::core::rule::Rule;
use crate::core::time::Timestamp;

/// Kind of change an upsert made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Rule key did not exist before.
    Create,
    /// Existing rule was replaced.
    Update,
}

impl AuditAction {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// One entry in the rule audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAuditRecord {
    /// Store-assigned, strictly increasing audit identifier.
    pub audit_id: u64,
    /// Rule the change applied to.
    pub rule_key: RuleKey,
    /// Actor that performed the upsert, when known.
    pub actor: Option<String>,
    /// Create or update.
    pub action: AuditAction,
    /// Rule state before the upsert.
    pub before: Option<Rule>,
    /// Rule state after the upsert.
    pub after: Rule,
    /// When the change was recorded.
    pub recorded_at: Timestamp,
}
