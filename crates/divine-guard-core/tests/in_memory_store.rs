// crates/divine-guard-core/tests/in_memory_store.rs
// ============================================================================
// Module: In-Memory Rule Store Tests
// Description: Upsert bookkeeping, listing order, audit trail, control plane.
// ============================================================================

//! In-memory store and control plane tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use common::at;
use common::payload;
use common::store_with;
use common::upsert;
use divine_guard_core::AuditAction;
use divine_guard_core::ControlPlane;
use divine_guard_core::ControlPlaneConfig;
use divine_guard_core::ControlPlaneError;
use divine_guard_core::InMemoryRuleStore;
use divine_guard_core::RequestContext;
use divine_guard_core::RuleError;
use divine_guard_core::RuleKey;
use divine_guard_core::RuleQuery;
use divine_guard_core::RuleStore;
use divine_guard_core::Scope;
use divine_guard_core::SharedRuleStore;
use divine_guard_core::SnapshotCompiler;
use serde_json::json;

#[test]
fn upsert_replaces_content_and_keeps_creation_bookkeeping() {
    let store = InMemoryRuleStore::new();
    let first = upsert(&store, json!({"rule_key": "k", "scope": "media", "priority": 1}), 0);
    let second = upsert(
        &store,
        json!({"rule_key": "k", "scope": "ux", "priority": 9, "action": {"skeleton_only": true}}),
        500,
    );
    assert!(second.revision > first.revision);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.updated_at, at(500));
    assert_eq!(second.scope(), Scope::Ux);
    let stored = store.get(&RuleKey::new("k")).unwrap().unwrap();
    assert_eq!(stored, second);
    assert_eq!(store.list(&RuleQuery::all()).unwrap().len(), 1);
}

#[test]
fn listing_orders_by_priority_then_revision_and_filters_scope() {
    let store = store_with(&[
        json!({"rule_key": "a", "scope": "media", "priority": 100}),
        json!({"rule_key": "b", "scope": "media", "priority": 500}),
        json!({"rule_key": "c", "scope": "media", "priority": 100}),
        json!({"rule_key": "d", "scope": "ai", "priority": 900}),
    ]);
    let keys: Vec<String> = store
        .list(&RuleQuery::scope(Scope::Media))
        .unwrap()
        .iter()
        .map(|rule| rule.rule_key().to_string())
        .collect();
    assert_eq!(keys, vec!["b", "c", "a"]);
}

#[test]
fn audit_log_records_create_then_update_newest_first() {
    let store = InMemoryRuleStore::new();
    upsert(&store, json!({"rule_key": "k", "scope": "ai"}), 0);
    upsert(&store, json!({"rule_key": "k", "scope": "ai", "enabled": false}), 1);
    upsert(&store, json!({"rule_key": "other", "scope": "ai"}), 2);
    let records = store.audit_log(Some(&RuleKey::new("k")), 10).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].action, AuditAction::Update);
    assert!(records[0].before.as_ref().unwrap().spec.enabled);
    assert!(!records[0].after.spec.enabled);
    assert_eq!(records[1].action, AuditAction::Create);
    assert!(records[1].before.is_none());
    assert_eq!(store.audit_log(None, 1).unwrap()[0].rule_key.as_str(), "other");
}

#[test]
fn control_plane_rejects_invalid_payload_without_writing() {
    let plane = ControlPlane::new(
        SharedRuleStore::from_store(InMemoryRuleStore::new()),
        SnapshotCompiler::default(),
        ControlPlaneConfig::default(),
    );
    let bad = payload(json!({"rule_key": "k", "scope": "media", "action": {"disable_ai": true}}));
    let err = plane.upsert(&bad, None, at(0)).unwrap_err();
    assert!(matches!(err, ControlPlaneError::Rule(RuleError::InvalidAction { .. })));
    assert!(plane.list(&RuleQuery::all()).unwrap().is_empty());
    assert!(plane.audit(None, 10).unwrap().is_empty());
}

#[test]
fn control_plane_enforces_rule_bound() {
    let store = store_with(&[
        json!({"rule_key": "a", "scope": "ai"}),
        json!({"rule_key": "b", "scope": "ai"}),
        json!({"rule_key": "c", "scope": "ai", "enabled": false}),
    ]);
    let plane = ControlPlane::new(
        SharedRuleStore::from_store(store),
        SnapshotCompiler::default(),
        ControlPlaneConfig {
            max_rules: 1,
        },
    );
    let err = plane.snapshot(&RequestContext::default(), at(0)).unwrap_err();
    assert!(matches!(err, ControlPlaneError::TooManyRules { count: 2, max: 1 }));
}

#[test]
fn upsert_past_rule_bound_is_rejected_and_snapshots_keep_working() {
    let plane = ControlPlane::new(
        SharedRuleStore::from_store(InMemoryRuleStore::new()),
        SnapshotCompiler::default(),
        ControlPlaneConfig {
            max_rules: 2,
        },
    );
    for key in ["ai_a", "ai_b"] {
        let rule = payload(json!({"rule_key": key, "scope": "ai", "action": {"disable_ai": true}}));
        plane.upsert(&rule, None, at(0)).unwrap();
    }
    let third = payload(json!({"rule_key": "ai_c", "scope": "ai", "action": {"disable_ai": true}}));
    let err = plane.upsert(&third, None, at(1)).unwrap_err();
    assert!(matches!(err, ControlPlaneError::RuleLimitReached { max: 2 }));
    assert_eq!(plane.list(&RuleQuery::all()).unwrap().len(), 2);
    assert!(plane.snapshot(&RequestContext::default(), at(2)).is_ok());

    let replace =
        payload(json!({"rule_key": "ai_b", "scope": "ai", "action": {"disable_ai": false}}));
    assert!(plane.upsert(&replace, None, at(3)).is_ok());
    let disabled = payload(json!({"rule_key": "ai_c", "scope": "ai", "enabled": false}));
    assert!(plane.upsert(&disabled, None, at(4)).is_ok());
    assert!(plane.readiness().is_ok());
}
