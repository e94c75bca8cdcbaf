//! Replica threshold at which a PA's scale target counts as initialized

use crate::config::AutoscalerConfig;
use crate::crd::PodAutoscaler;

/// Initial scale for a revision.
///
/// The PA's annotation wins when present, unless it asks for zero and the
/// cluster does not allow that. Negative values fall back to the config.
pub fn initial_scale(config: &AutoscalerConfig, pa: &PodAutoscaler) -> i32 {
    match pa.initial_scale() {
        Some(scale) if scale > 0 => scale,
        Some(0) if config.allow_zero_initial_scale => 0,
        _ => config.initial_scale,
    }
}

/// Current replicas needed before ScaleTargetInitialized may flip to True.
///
/// Before initialization this is the larger of the lower bound and the
/// initial scale; afterwards it is the lower bound, but at least one.
pub fn active_threshold(config: &AutoscalerConfig, pa: &PodAutoscaler) -> i32 {
    let (min, _) = pa.scale_bounds(config);
    if pa.is_scale_target_initialized() {
        min.max(1)
    } else {
        min.max(initial_scale(config, pa))
    }
}
