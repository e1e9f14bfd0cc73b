// crates/divine-guard-core/src/core/time.rs
// ============================================================================
// Module: Divine Guard Time Model
// Description: Canonical timestamp representation for rules and snapshots.
// Purpose: Keep compilation deterministic by taking time as an explicit input.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! The core never reads wall-clock time directly. Hosts (server, CLI) supply
//! timestamps for upserts and for `compiled_at`, which keeps the compiler a
//! pure function of its inputs. Timestamps serialize as RFC 3339 strings and
//! are persisted as unix milliseconds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// UTC instant used for rule bookkeeping and snapshot compilation.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads wall-clock time.
/// - Millisecond precision when round-tripped through storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Wraps an existing instant, normalized to UTC.
    #[must_use]
    pub fn new(instant: OffsetDateTime) -> Self {
        Self(instant.to_offset(time::UtcOffset::UTC))
    }

    /// Builds a timestamp from unix epoch milliseconds.
    ///
    /// Returns `None` when the value is outside the supported range.
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        let nanos = i128::from(millis).checked_mul(1_000_000)?;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok().map(Self)
    }

    /// Returns the timestamp as unix epoch milliseconds.
    #[must_use]
    pub fn as_unix_millis(&self) -> i64 {
        let millis = self.0.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.format(&Rfc3339) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}ms", self.as_unix_millis()),
        }
    }
}
