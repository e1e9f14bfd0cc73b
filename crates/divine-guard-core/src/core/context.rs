// crates/divine-guard-core/src/core/context.rs
// ============================================================================
// Module: Divine Guard Request Context
// Description: Context dimensions supplied by callers requesting a snapshot.
// Purpose: Normalize optional context values before rule matching.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A request context carries zero or more dimension values. Values are
//! trimmed and empty strings are treated as absent, so `?app_version=` and a
//! missing parameter compile identically. The empty context is the "global"
//! compilation path and resolves only unconditional rules.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Dimensions
// ============================================================================

/// Context dimension a rule may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Client application version (e.g. `2.3.0`).
    AppVersion,
    /// Feature key of the calling surface.
    FeatureKey,
    /// Client-reported network state (e.g. `slow`, `offline`).
    NetworkState,
}

impl Dimension {
    /// All dimensions in canonical order.
    pub const ALL: [Self; 3] = [Self::AppVersion, Self::FeatureKey, Self::NetworkState];

    /// Returns the wire name of the dimension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppVersion => "app_version",
            Self::FeatureKey => "feature_key",
            Self::NetworkState => "network_state",
        }
    }

    /// Parses a wire name into a dimension.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dimension| dimension.as_str() == name)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Request Context
// ============================================================================

/// Dimension values supplied by a snapshot caller.
///
/// # Invariants
/// - Present values are trimmed and non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Client application version.
    pub app_version: Option<String>,
    /// Feature key of the calling surface.
    pub feature_key: Option<String>,
    /// Client-reported network state.
    pub network_state: Option<String>,
}

impl RequestContext {
    /// Builds a normalized context from raw, possibly blank values.
    #[must_use]
    pub fn new(
        app_version: Option<&str>,
        feature_key: Option<&str>,
        network_state: Option<&str>,
    ) -> Self {
        Self {
            app_version: normalize(app_version),
            feature_key: normalize(feature_key),
            network_state: normalize(network_state),
        }
    }

    /// Re-applies normalization to an already-constructed context.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self::new(
            self.app_version.as_deref(),
            self.feature_key.as_deref(),
            self.network_state.as_deref(),
        )
    }

    /// Returns the value supplied for a dimension, if any.
    #[must_use]
    pub fn value(&self, dimension: Dimension) -> Option<&str> {
        match dimension {
            Dimension::AppVersion => self.app_version.as_deref(),
            Dimension::FeatureKey => self.feature_key.as_deref(),
            Dimension::NetworkState => self.network_state.as_deref(),
        }
    }
}

/// Trims a raw value, mapping blank input to `None`.
fn normalize(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
