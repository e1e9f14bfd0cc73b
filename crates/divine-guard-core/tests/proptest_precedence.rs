//! Precedence resolver property-based tests.
//!
//! ## Purpose
//! Randomized rule sets check that the winning value for a field always comes
//! from the highest-priority rule that sets it, with ties going to the most
//! recent upsert, and that compilation is insensitive to input ordering.
// crates/divine-guard-core/tests/proptest_precedence.rs
// ============================================================================
// Module: Precedence Property-Based Tests
// Description: Randomized checks of priority and tie-break resolution.
// Purpose: Ensure snapshots are deterministic for any rule set.
// ============================================================================

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
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use common::snapshot;
use common::store_with;
use divine_guard_core::MAX_CONCURRENT_MEDIA_LOADS;
use divine_guard_core::RequestContext;
use divine_guard_core::RuleQuery;
use divine_guard_core::RuleStore;
use divine_guard_core::SnapshotCompiler;
use proptest::prelude::*;
use serde_json::json;

/// Expected winner: highest priority among positive values, latest upsert on ties.
fn expected_loads(rules: &[(u32, i64)]) -> Option<u32> {
    let mut best: Option<(u32, usize, i64)> = None;
    for (index, (priority, value)) in rules.iter().enumerate() {
        if *value <= 0 {
            continue;
        }
        let candidate = (*priority, index, *value);
        if best.is_none_or(|(p, i, _)| (candidate.0, candidate.1) > (p, i)) {
            best = Some(candidate);
        }
    }
    best.map(|(_, _, value)| u32::try_from(value).unwrap().min(MAX_CONCURRENT_MEDIA_LOADS))
}

proptest! {
    #[test]
    fn winner_is_highest_priority_then_latest(
        rules in prop::collection::vec((0u32..4, -3i64..80), 0..12)
    ) {
        let payloads: Vec<_> = rules
            .iter()
            .enumerate()
            .map(|(index, (priority, value))| json!({
                "rule_key": format!("rule-{index}"),
                "scope": "media",
                "priority": priority,
                "action": {"max_concurrent_media_loads": value}
            }))
            .collect();
        let store = store_with(&payloads);
        let compiled = snapshot(&store, &RequestContext::default());
        prop_assert_eq!(compiled.scopes.media.max_concurrent_media_loads, expected_loads(&rules));
        prop_assert!(compiled.applied.len() <= 1);
    }

    #[test]
    fn compilation_ignores_input_order(
        rules in prop::collection::vec((0u32..4, any::<bool>(), prop::option::of(0u8..3)), 0..10)
    ) {
        let states = ["slow", "offline", "fast"];
        let payloads: Vec<_> = rules
            .iter()
            .enumerate()
            .map(|(index, (priority, flag, state))| json!({
                "rule_key": format!("rule-{index}"),
                "scope": "ux",
                "priority": priority,
                "match": state.map(|s| json!({"network_state": [states[usize::from(s)]]})),
                "action": {"skeleton_only": flag, "reduce_animations": !flag}
            }))
            .collect();
        let store = store_with(&payloads);
        let mut stored = store.list(&RuleQuery::all()).unwrap();
        let context = RequestContext::new(None, None, Some("slow"));
        let compiler = SnapshotCompiler::default();
        let at = common::at(0);
        let forward = compiler.compile(&stored, &context, at).unwrap();
        stored.reverse();
        let backward = compiler.compile(&stored, &context, at).unwrap();
        prop_assert_eq!(forward, backward);
    }
}
