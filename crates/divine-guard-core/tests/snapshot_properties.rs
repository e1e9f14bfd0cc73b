// crates/divine-guard-core/tests/snapshot_properties.rs
// ============================================================================
// Module: Snapshot Property Tests
// Description: Matching, precedence, safe-mode and normalization behavior.
// Purpose: Pin the observable snapshot contract consumed by client apps.
// ============================================================================

//! Snapshot compilation tests over the in-memory store.

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

use common::network;
use common::snapshot;
use common::store_with;
use common::upsert;
use divine_guard_core::ImageQuality;
use divine_guard_core::RequestContext;
use divine_guard_core::Scope;
use serde_json::json;

#[test]
fn idempotent_upsert_yields_identical_snapshot() {
    let rule = json!({
        "rule_key": "dg_media_low",
        "scope": "media",
        "priority": 250,
        "action": {"force_image_quality": "low", "disable_video_autoplay": true}
    });
    let store = store_with(&[rule.clone()]);
    let first = snapshot(&store, &network("slow"));
    upsert(&store, rule, 10);
    let second = snapshot(&store, &network("slow"));
    assert_eq!(first.scopes, second.scopes);
    assert_eq!(first.config_hash, second.config_hash);
}

#[test]
fn unconditional_rule_applies_to_empty_context() {
    let store = store_with(&[json!({
        "rule_key": "dg_ai_off",
        "scope": "ai",
        "action": {"disable_ai": true}
    })]);
    for context in [RequestContext::default(), network("slow"), network("offline")] {
        assert!(snapshot(&store, &context).scopes.ai.disable_ai);
    }
}

#[test]
fn match_dimension_absent_from_context_makes_rule_ineligible() {
    let store = store_with(&[json!({
        "rule_key": "dg_ux_skeleton",
        "scope": "ux",
        "match": {"app_version": ["2.3.0"]},
        "action": {"skeleton_only": true}
    })]);
    assert!(!snapshot(&store, &RequestContext::default()).scopes.ux.skeleton_only);
    assert!(!snapshot(&store, &network("slow")).scopes.ux.skeleton_only);
    let matching = RequestContext::new(Some("2.3.0"), None, None);
    assert!(snapshot(&store, &matching).scopes.ux.skeleton_only);
    let other = RequestContext::new(Some("2.4.0"), None, None);
    assert!(!snapshot(&store, &other).scopes.ux.skeleton_only);
}

#[test]
fn higher_priority_wins_regardless_of_upsert_order() {
    let high = json!({
        "rule_key": "high", "scope": "network", "priority": 500,
        "action": {"retry_count": 1}
    });
    let low = json!({
        "rule_key": "low", "scope": "network", "priority": 100,
        "action": {"retry_count": 5}
    });
    for order in [[high.clone(), low.clone()], [low.clone(), high.clone()]] {
        let store = store_with(&order);
        assert_eq!(snapshot(&store, &RequestContext::default()).scopes.network.retry_count, Some(1));
    }
}

#[test]
fn equal_priority_tie_goes_to_most_recent_upsert() {
    let first = json!({
        "rule_key": "a", "scope": "media", "priority": 300,
        "action": {"force_image_quality": "high"}
    });
    let second = json!({
        "rule_key": "b", "scope": "media", "priority": 300,
        "action": {"force_image_quality": "low"}
    });
    let store = store_with(&[first.clone(), second]);
    assert_eq!(
        snapshot(&store, &RequestContext::default()).scopes.media.force_image_quality,
        ImageQuality::Low
    );
    upsert(&store, first, 100);
    assert_eq!(
        snapshot(&store, &RequestContext::default()).scopes.media.force_image_quality,
        ImageQuality::High
    );
}

#[test]
fn fields_merge_across_rules_in_same_scope() {
    let store = store_with(&[
        json!({"rule_key": "a", "scope": "media", "priority": 500, "action": {"disable_video": true}}),
        json!({"rule_key": "b", "scope": "media", "priority": 100,
               "action": {"disable_video": false, "disable_preloading": true}}),
    ]);
    let compiled = snapshot(&store, &RequestContext::default());
    assert!(compiled.scopes.media.disable_video);
    assert!(compiled.scopes.media.disable_preloading);
    assert_eq!(compiled.applied.len(), 2);
    assert_eq!(compiled.applied[0].rule_key.as_str(), "a");
    assert_eq!(compiled.applied[0].fields, vec!["disable_video".to_string()]);
    assert_eq!(compiled.applied[1].fields, vec!["disable_preloading".to_string()]);
}

#[test]
fn safe_mode_defeats_any_priority() {
    let store = store_with(&[
        json!({"rule_key": "dg_safe", "scope": "global", "priority": 1000,
               "action": {"safe_mode": true}}),
        json!({"rule_key": "dg_video_on", "scope": "media", "priority": 9999,
               "action": {"disable_video": false, "force_image_quality": "high"}}),
    ]);
    let compiled = snapshot(&store, &RequestContext::default());
    assert!(compiled.safe_mode_forced);
    assert!(compiled.scopes.global.safe_mode);
    assert!(compiled.scopes.media.disable_video);
    assert_eq!(compiled.scopes.media.force_image_quality, ImageQuality::Low);
    assert!(compiled.scopes.ai.disable_ai);
    assert!(compiled.applied.iter().all(|entry| entry.scope == Scope::Global));
}

#[test]
fn higher_priority_global_false_cannot_cancel_safe_mode() {
    let store = store_with(&[
        json!({"rule_key": "dg_safe_mode", "scope": "global", "priority": 1000,
               "action": {"safe_mode": true}}),
        json!({"rule_key": "other_global", "scope": "global", "priority": 5000,
               "action": {"safe_mode": false}}),
    ]);
    let compiled = snapshot(&store, &RequestContext::default());
    assert!(compiled.safe_mode_forced);
    assert!(compiled.scopes.global.safe_mode);
    assert_eq!(compiled.applied.len(), 1);
    assert_eq!(compiled.applied[0].rule_key.as_str(), "dg_safe_mode");
    assert_eq!(compiled.applied[0].fields, vec!["safe_mode".to_string()]);
}

#[test]
fn turning_safe_mode_off_restores_normal_resolution() {
    let store = store_with(&[
        json!({"rule_key": "dg_safe", "scope": "global", "action": {"safe_mode": true}}),
        json!({"rule_key": "dg_quality", "scope": "media", "action": {"force_image_quality": "high"}}),
    ]);
    assert!(snapshot(&store, &RequestContext::default()).safe_mode_forced);
    upsert(
        &store,
        json!({"rule_key": "dg_safe", "scope": "global", "action": {"safe_mode": false}}),
        50,
    );
    let compiled = snapshot(&store, &RequestContext::default());
    assert!(!compiled.safe_mode_forced);
    assert!(!compiled.scopes.global.safe_mode);
    assert_eq!(compiled.scopes.media.force_image_quality, ImageQuality::High);
}

#[test]
fn non_positive_or_garbage_numbers_compile_to_null() {
    for raw in [json!("0"), json!("-5"), json!("abc"), json!(0), json!(-3)] {
        let store = store_with(&[json!({
            "rule_key": "dg_loads", "scope": "media",
            "action": {"max_concurrent_media_loads": raw}
        })]);
        let compiled = snapshot(&store, &RequestContext::default());
        assert_eq!(compiled.scopes.media.max_concurrent_media_loads, None);
        assert!(compiled.applied.is_empty());
    }
}

#[test]
fn cleared_override_lets_lower_priority_value_through() {
    let store = store_with(&[
        json!({"rule_key": "hi", "scope": "network", "priority": 500, "action": {"timeout_ms": ""}}),
        json!({"rule_key": "lo", "scope": "network", "priority": 100, "action": {"timeout_ms": 8000}}),
    ]);
    assert_eq!(
        snapshot(&store, &RequestContext::default()).scopes.network.timeout_ms,
        Some(8000)
    );
}

#[test]
fn numeric_overrides_are_clamped() {
    let store = store_with(&[json!({
        "rule_key": "n", "scope": "network",
        "action": {"retry_count": "99", "timeout_ms": 999_999}
    })]);
    let compiled = snapshot(&store, &RequestContext::default());
    assert_eq!(compiled.scopes.network.retry_count, Some(10));
    assert_eq!(compiled.scopes.network.timeout_ms, Some(120_000));
}

#[test]
fn slow_network_scenario_prefers_matching_high_priority_rule() {
    let store = store_with(&[
        json!({"rule_key": "r1", "scope": "media", "enabled": true, "priority": 100,
               "match": null, "action": {"force_image_quality": "medium"}}),
        json!({"rule_key": "r2", "scope": "media", "enabled": true, "priority": 500,
               "match": {"network_state": ["slow"]}, "action": {"force_image_quality": "low"}}),
    ]);
    assert_eq!(snapshot(&store, &network("slow")).scopes.media.force_image_quality, ImageQuality::Low);
    assert_eq!(
        snapshot(&store, &RequestContext::default()).scopes.media.force_image_quality,
        ImageQuality::Medium
    );
}

#[test]
fn disabled_rules_never_apply() {
    let store = store_with(&[json!({
        "rule_key": "off", "scope": "ai", "enabled": false, "action": {"disable_ai": true}
    })]);
    assert!(!snapshot(&store, &RequestContext::default()).scopes.ai.disable_ai);
}

#[test]
fn empty_store_compiles_to_defaults_with_stable_wire_shape() {
    let store = store_with(&[]);
    let compiled = snapshot(&store, &RequestContext::new(Some(" "), None, None));
    assert_eq!(compiled.context, RequestContext::default());
    let wire = serde_json::to_value(&compiled).unwrap();
    assert_eq!(wire["version"], json!(1));
    assert_eq!(wire["media"]["force_image_quality"], json!("auto"));
    assert_eq!(wire["media"]["max_concurrent_media_loads"], json!(null));
    assert_eq!(wire["network"]["retry_count"], json!(null));
    assert_eq!(wire["global"]["safe_mode"], json!(false));
    assert_eq!(wire["applied"], json!([]));
    assert_eq!(wire["ttl_seconds"], json!(45));
    assert_eq!(wire["config_hash"]["algorithm"], json!("sha256"));
}

#[test]
fn applied_trace_is_ordered_by_scope() {
    let store = store_with(&[
        json!({"rule_key": "ai", "scope": "ai", "priority": 900, "action": {"disable_ai": true}}),
        json!({"rule_key": "ux", "scope": "ux", "priority": 800, "action": {"reduce_animations": true}}),
        json!({"rule_key": "media", "scope": "media", "priority": 1, "action": {"disable_video": true}}),
    ]);
    let scopes: Vec<Scope> =
        snapshot(&store, &RequestContext::default()).applied.iter().map(|e| e.scope).collect();
    assert_eq!(scopes, vec![Scope::Media, Scope::Ux, Scope::Ai]);
}
