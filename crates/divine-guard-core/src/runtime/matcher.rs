// crates/divine-guard-core/src/runtime/matcher.rs
// ============================================================================
// Module: Divine Guard Context Resolver
// Description: Rule eligibility against a request context.
// Purpose: Select the enabled rules whose match filters the context satisfies.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Match filters are requirements, not hints: a rule filtered on a dimension
//! the caller did not supply is ineligible. Rules with no filter are eligible
//! for every context, including the empty one.

use crate::core::RequestContext;
use crate::core::Rule;
use crate::core::RuleMatch;

/// Returns true when `context` satisfies every dimension `filter` names.
#[must_use]
pub fn matches(filter: &RuleMatch, context: &RequestContext) -> bool {
    filter.accepts(context)
}

/// Returns the enabled rules eligible for `context`, preserving input order.
#[must_use]
pub fn eligible<'a>(rules: &'a [Rule], context: &RequestContext) -> Vec<&'a Rule> {
    rules
        .iter()
        .filter(|rule| rule.spec.enabled && matches(&rule.spec.match_filter, context))
        .collect()
}
