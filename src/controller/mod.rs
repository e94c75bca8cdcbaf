//! Controller implementation for PodAutoscalers
//!
//! The reconciler follows the Kubernetes controller pattern: observe the
//! dependents, diff against the desired state, act, and report on the PA.

mod activation;
mod pod_autoscaler;
mod sks;

pub use activation::{active_threshold, initial_scale};
pub use pod_autoscaler::{
    error_policy, reconcile, reconcile_kind, Context, ContextBuilder, HpaLister,
    PodAutoscalerClient, ScaledObjectClient, DEFAULT_RECONCILE_TIMEOUT, DEFAULT_RESYNC_PERIOD,
};
pub use sks::{ServiceExposure, SksClient, SksReconciler};
