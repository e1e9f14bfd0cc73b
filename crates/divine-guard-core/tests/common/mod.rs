// crates/divine-guard-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Helpers
// Description: Shared fixtures for compiler and store tests.
// ============================================================================

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only helpers shared across integration test binaries."
)]

use divine_guard_core::ControlSnapshot;
use divine_guard_core::InMemoryRuleStore;
use divine_guard_core::RequestContext;
use divine_guard_core::Rule;
use divine_guard_core::RuleQuery;
use divine_guard_core::RuleStore;
use divine_guard_core::RuleUpsert;
use divine_guard_core::SnapshotCompiler;
use divine_guard_core::Timestamp;
use divine_guard_core::UpsertRequest;
use serde_json::Value;

/// Fixed compilation instant.
pub fn at(offset_ms: i64) -> Timestamp {
    Timestamp::from_unix_millis(1_760_000_000_000 + offset_ms).expect("timestamp in range")
}

/// Parses a JSON upsert payload.
pub fn payload(value: Value) -> RuleUpsert {
    serde_json::from_value(value).expect("upsert payload")
}

/// Upserts payloads in order into a fresh in-memory store.
pub fn store_with(payloads: &[Value]) -> InMemoryRuleStore {
    let store = InMemoryRuleStore::new();
    for (index, value) in payloads.iter().enumerate() {
        upsert(&store, value.clone(), i64::try_from(index).unwrap());
    }
    store
}

/// Upserts one payload.
pub fn upsert(store: &InMemoryRuleStore, value: Value, offset_ms: i64) -> Rule {
    let spec = payload(value).validate().expect("valid payload");
    store
        .upsert(UpsertRequest {
            spec,
            actor: Some("tester".to_string()),
            at: at(offset_ms),
        })
        .expect("upsert")
        .rule
}

/// Compiles a snapshot over every stored rule.
pub fn snapshot(store: &InMemoryRuleStore, context: &RequestContext) -> ControlSnapshot {
    let rules = store.list(&RuleQuery::all()).expect("list");
    SnapshotCompiler::default().compile(&rules, context, at(60_000)).expect("compile")
}

/// Context with only `network_state`.
pub fn network(state: &str) -> RequestContext {
    RequestContext::new(None, None, Some(state))
}
