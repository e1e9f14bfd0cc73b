// crates/divine-guard-core/src/runtime/safe_mode.rs
// ============================================================================
// Module: Divine Guard Safe-Mode Gate
// Description: Conservative configuration forced when global safe mode is on.
// Purpose: Guarantee no rule can defeat the emergency switch.
// Dependencies: serde, crate::core
// ============================================================================

//! ## Overview
//! The gate runs after normal compilation. When the compiled
//! `global.safe_mode` is true, every field is overwritten with the policy
//! value. The gate holds no state between calls: turning safe mode off
//! restores priority-based resolution on the very next compilation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::AiConfig;
use crate::core::CompiledScopes;
use crate::core::GlobalConfig;
use crate::core::ImageQuality;
use crate::core::MAX_CONCURRENT_MEDIA_LOADS;
use crate::core::MAX_RETRY_COUNT;
use crate::core::MAX_TIMEOUT_MS;
use crate::core::MAX_UX_WATCHDOG_THRESHOLD_MS;
use crate::core::MediaConfig;
use crate::core::NetworkConfig;
use crate::core::UxConfig;

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Conservative values forced while safe mode is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafeModePolicy {
    /// Forced image quality.
    pub force_image_quality: ImageQuality,
    /// Forced `disable_video_autoplay`.
    pub disable_video_autoplay: bool,
    /// Forced `disable_video`.
    pub disable_video: bool,
    /// Forced `disable_preloading`.
    pub disable_preloading: bool,
    /// Forced media load cap.
    pub max_concurrent_media_loads: Option<u32>,
    /// Forced `disable_retries`.
    pub disable_retries: bool,
    /// Forced retry count.
    pub retry_count: Option<u32>,
    /// Forced timeout override.
    pub timeout_ms: Option<u32>,
    /// Forced `skeleton_only`.
    pub skeleton_only: bool,
    /// Forced `reduce_animations`.
    pub reduce_animations: bool,
    /// Forced watchdog threshold.
    pub ux_watchdog_threshold_ms: Option<u32>,
    /// Forced `disable_ai`.
    pub disable_ai: bool,
}

impl Default for SafeModePolicy {
    fn default() -> Self {
        Self {
            force_image_quality: ImageQuality::Low,
            disable_video_autoplay: true,
            disable_video: true,
            disable_preloading: true,
            max_concurrent_media_loads: Some(1),
            disable_retries: true,
            retry_count: None,
            timeout_ms: None,
            skeleton_only: true,
            reduce_animations: true,
            ux_watchdog_threshold_ms: None,
            disable_ai: true,
        }
    }
}

impl SafeModePolicy {
    /// Validates numeric overrides against the same bounds rules obey.
    ///
    /// # Errors
    ///
    /// Returns a description of the first out-of-range field.
    pub fn validate(&self) -> Result<(), String> {
        check_bound(
            "max_concurrent_media_loads",
            self.max_concurrent_media_loads,
            MAX_CONCURRENT_MEDIA_LOADS,
        )?;
        check_bound("retry_count", self.retry_count, MAX_RETRY_COUNT)?;
        check_bound("timeout_ms", self.timeout_ms, MAX_TIMEOUT_MS)?;
        check_bound(
            "ux_watchdog_threshold_ms",
            self.ux_watchdog_threshold_ms,
            MAX_UX_WATCHDOG_THRESHOLD_MS,
        )
    }

    /// Returns the forced scope objects.
    #[must_use]
    pub const fn forced_scopes(&self) -> CompiledScopes {
        CompiledScopes {
            global: GlobalConfig {
                safe_mode: true,
            },
            media: MediaConfig {
                force_image_quality: self.force_image_quality,
                disable_video_autoplay: self.disable_video_autoplay,
                disable_video: self.disable_video,
                disable_preloading: self.disable_preloading,
                max_concurrent_media_loads: self.max_concurrent_media_loads,
            },
            network: NetworkConfig {
                disable_retries: self.disable_retries,
                retry_count: self.retry_count,
                timeout_ms: self.timeout_ms,
            },
            ux: UxConfig {
                skeleton_only: self.skeleton_only,
                reduce_animations: self.reduce_animations,
                ux_watchdog_threshold_ms: self.ux_watchdog_threshold_ms,
            },
            ai: AiConfig {
                disable_ai: self.disable_ai,
            },
        }
    }
}

/// Rejects zero and values above `max`.
fn check_bound(field: &str, value: Option<u32>, max: u32) -> Result<(), String> {
    match value {
        Some(value) if value == 0 || value > max => {
            Err(format!("safe_mode.{field} must be between 1 and {max}"))
        }
        _ => Ok(()),
    }
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Applies the gate, returning the output scopes and whether they were forced.
#[must_use]
pub fn apply(compiled: CompiledScopes, policy: &SafeModePolicy) -> (CompiledScopes, bool) {
    if compiled.global.safe_mode {
        (policy.forced_scopes(), true)
    } else {
        (compiled, false)
    }
}
