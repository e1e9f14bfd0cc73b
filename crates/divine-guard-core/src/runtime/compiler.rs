// crates/divine-guard-core/src/runtime/compiler.rs
// ============================================================================
// Module: Divine Guard Scope Compiler
// Description: Merge resolved field winners into fixed scope objects.
// Purpose: Apply per-field defaults for everything no rule set.
// Dependencies: crate::core, crate::runtime::precedence
// ============================================================================

//! ## Overview
//! Defaults are the `Default` values of the scope config structs: booleans
//! off, image quality `auto`, numeric overrides `null`.

use crate::core::AiConfig;
use crate::core::CompiledScopes;
use crate::core::GlobalConfig;
use crate::core::MediaConfig;
use crate::core::NetworkConfig;
use crate::core::UxConfig;
use crate::runtime::precedence::Contribution;
use crate::runtime::precedence::ResolvedScopes;

/// Returns the winning value, or the field default when unset.
fn value_or_default<T: Clone + Default>(slot: Option<&Contribution<T>>) -> T {
    slot.map(|contribution| contribution.value.clone()).unwrap_or_default()
}

/// Returns the winning value for a nullable field.
fn value_or_null<T: Clone>(slot: Option<&Contribution<T>>) -> Option<T> {
    slot.map(|contribution| contribution.value.clone())
}

/// Compiles resolved winners into the five scope objects.
#[must_use]
pub fn compile(resolved: &ResolvedScopes) -> CompiledScopes {
    let media = &resolved.media;
    let network = &resolved.network;
    let ux = &resolved.ux;
    CompiledScopes {
        global: GlobalConfig {
            safe_mode: value_or_default(resolved.global.safe_mode.as_ref()),
        },
        media: MediaConfig {
            force_image_quality: value_or_default(media.force_image_quality.as_ref()),
            disable_video_autoplay: value_or_default(media.disable_video_autoplay.as_ref()),
            disable_video: value_or_default(media.disable_video.as_ref()),
            disable_preloading: value_or_default(media.disable_preloading.as_ref()),
            max_concurrent_media_loads: value_or_null(media.max_concurrent_media_loads.as_ref()),
        },
        network: NetworkConfig {
            disable_retries: value_or_default(network.disable_retries.as_ref()),
            retry_count: value_or_null(network.retry_count.as_ref()),
            timeout_ms: value_or_null(network.timeout_ms.as_ref()),
        },
        ux: UxConfig {
            skeleton_only: value_or_default(ux.skeleton_only.as_ref()),
            reduce_animations: value_or_default(ux.reduce_animations.as_ref()),
            ux_watchdog_threshold_ms: value_or_null(ux.ux_watchdog_threshold_ms.as_ref()),
        },
        ai: AiConfig {
            disable_ai: value_or_default(resolved.ai.disable_ai.as_ref()),
        },
    }
}
