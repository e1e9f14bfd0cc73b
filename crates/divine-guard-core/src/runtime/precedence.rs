// crates/divine-guard-core/src/runtime/precedence.rs
// ============================================================================
// Module: Divine Guard Precedence Resolver
// Description: Per-field conflict resolution across eligible rules.
// Purpose: Pick one winning value per scope field with a deterministic order.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Eligible rules are ordered by priority (descending), then by revision
//! (descending), so on equal priority the most recently upserted rule wins.
//! Walking that order, the first rule that sets a field claims it; later
//! rules can still claim fields nobody set yet. Fields merge across rules,
//! values never do.
//!
//! `global.safe_mode` is the exception: once any eligible rule switches it
//! on, `false` values are ignored and the highest-precedence `true` rule
//! claims the field, whatever its priority relative to the others.
//!
//! Invariants:
//! - Revisions are unique per store, so the order is total.
//! - A field normalized to "no override" was never set and cannot be claimed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Reverse;

use crate::core::AppliedRule;
use crate::core::ImageQuality;
use crate::core::Rule;
use crate::core::RuleAction;
use crate::core::RuleKey;

// ============================================================================
// SECTION: Resolved Values
// ============================================================================

/// A winning field value and the rule it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution<T> {
    /// Winning value.
    pub value: T,
    /// Contributing rule.
    pub rule_key: RuleKey,
    /// Contributing rule priority.
    pub priority: u32,
    /// Contributing rule revision.
    pub revision: u64,
}

/// Resolved `global` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedGlobal {
    /// Winning `safe_mode`.
    pub safe_mode: Option<Contribution<bool>>,
}

/// Resolved `media` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMedia {
    /// Winning `force_image_quality`.
    pub force_image_quality: Option<Contribution<ImageQuality>>,
    /// Winning `disable_video_autoplay`.
    pub disable_video_autoplay: Option<Contribution<bool>>,
    /// Winning `disable_video`.
    pub disable_video: Option<Contribution<bool>>,
    /// Winning `disable_preloading`.
    pub disable_preloading: Option<Contribution<bool>>,
    /// Winning `max_concurrent_media_loads`.
    pub max_concurrent_media_loads: Option<Contribution<u32>>,
}

/// Resolved `network` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedNetwork {
    /// Winning `disable_retries`.
    pub disable_retries: Option<Contribution<bool>>,
    /// Winning `retry_count`.
    pub retry_count: Option<Contribution<u32>>,
    /// Winning `timeout_ms`.
    pub timeout_ms: Option<Contribution<u32>>,
}

/// Resolved `ux` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedUx {
    /// Winning `skeleton_only`.
    pub skeleton_only: Option<Contribution<bool>>,
    /// Winning `reduce_animations`.
    pub reduce_animations: Option<Contribution<bool>>,
    /// Winning `ux_watchdog_threshold_ms`.
    pub ux_watchdog_threshold_ms: Option<Contribution<u32>>,
}

/// Resolved `ai` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAi {
    /// Winning `disable_ai`.
    pub disable_ai: Option<Contribution<bool>>,
}

/// Winning values for every scope plus the contribution trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedScopes {
    /// Global scope.
    pub global: ResolvedGlobal,
    /// Media scope.
    pub media: ResolvedMedia,
    /// Network scope.
    pub network: ResolvedNetwork,
    /// UX scope.
    pub ux: ResolvedUx,
    /// AI scope.
    pub ai: ResolvedAi,
    /// Rules that won at least one field, in precedence order.
    pub applied: Vec<AppliedRule>,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Orders rules by precedence: priority desc, then revision desc.
pub fn order_by_precedence(rules: &mut [&Rule]) {
    rules.sort_by_key(|rule| (Reverse(rule.spec.priority), Reverse(rule.revision)));
}

/// Resolves winning field values across eligible rules.
#[must_use]
pub fn resolve(eligible: &[&Rule]) -> ResolvedScopes {
    let mut ordered = eligible.to_vec();
    order_by_precedence(&mut ordered);
    let safe_mode_requested = ordered.iter().any(|rule| requests_safe_mode(rule));
    let mut resolved = ResolvedScopes::default();
    for rule in ordered {
        let mut won: Vec<String> = Vec::new();
        let mut claimer = Claimer {
            rule,
            won: &mut won,
        };
        match &rule.spec.action {
            RuleAction::Global(action) => {
                let safe_mode = if safe_mode_requested {
                    action.safe_mode.filter(|on| *on)
                } else {
                    action.safe_mode
                };
                claimer.claim(&mut resolved.global.safe_mode, safe_mode, "safe_mode");
            }
            RuleAction::Media(action) => {
                let media = &mut resolved.media;
                claimer.claim(
                    &mut media.force_image_quality,
                    action.force_image_quality,
                    "force_image_quality",
                );
                claimer.claim(
                    &mut media.disable_video_autoplay,
                    action.disable_video_autoplay,
                    "disable_video_autoplay",
                );
                claimer.claim(&mut media.disable_video, action.disable_video, "disable_video");
                claimer.claim(
                    &mut media.disable_preloading,
                    action.disable_preloading,
                    "disable_preloading",
                );
                claimer.claim(
                    &mut media.max_concurrent_media_loads,
                    action.max_concurrent_media_loads,
                    "max_concurrent_media_loads",
                );
            }
            RuleAction::Network(action) => {
                let network = &mut resolved.network;
                claimer.claim(
                    &mut network.disable_retries,
                    action.disable_retries,
                    "disable_retries",
                );
                claimer.claim(&mut network.retry_count, action.retry_count, "retry_count");
                claimer.claim(&mut network.timeout_ms, action.timeout_ms, "timeout_ms");
            }
            RuleAction::Ux(action) => {
                let ux = &mut resolved.ux;
                claimer.claim(&mut ux.skeleton_only, action.skeleton_only, "skeleton_only");
                claimer.claim(
                    &mut ux.reduce_animations,
                    action.reduce_animations,
                    "reduce_animations",
                );
                claimer.claim(
                    &mut ux.ux_watchdog_threshold_ms,
                    action.ux_watchdog_threshold_ms,
                    "ux_watchdog_threshold_ms",
                );
            }
            RuleAction::Ai(action) => {
                claimer.claim(&mut resolved.ai.disable_ai, action.disable_ai, "disable_ai");
            }
        }
        if !won.is_empty() {
            resolved.applied.push(AppliedRule {
                rule_key: rule.spec.rule_key.clone(),
                scope: rule.scope(),
                priority: rule.spec.priority,
                revision: rule.revision,
                fields: won,
            });
        }
    }
    resolved
}

/// Returns true when the rule is a global rule switching safe mode on.
fn requests_safe_mode(rule: &Rule) -> bool {
    matches!(&rule.spec.action, RuleAction::Global(action) if action.safe_mode == Some(true))
}

/// Claims unset fields on behalf of one rule.
struct Claimer<'a, 'w> {
    /// Rule whose values are being claimed.
    rule: &'a Rule,
    /// Fields this rule has won so far.
    won: &'w mut Vec<String>,
}

impl Claimer<'_, '_> {
    /// Claims `slot` with `value` when the slot is unset and the rule sets it.
    fn claim<T>(&mut self, slot: &mut Option<Contribution<T>>, value: Option<T>, field: &str) {
        let Some(value) = value else {
            return;
        };
        if slot.is_some() {
            return;
        }
        *slot = Some(Contribution {
            value,
            rule_key: self.rule.spec.rule_key.clone(),
            priority: self.rule.spec.priority,
            revision: self.rule.revision,
        });
        self.won.push(field.to_string());
    }
}
