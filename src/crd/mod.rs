//! Custom Resource Definitions read and written by the controller
//!
//! The PodAutoscaler is the resource this controller reconciles. The KEDA
//! ScaledObject and the ServerlessService are dependents it creates and owns.

mod pod_autoscaler;
mod scaled_object;
mod serverless_service;
mod types;

pub use pod_autoscaler::{
    parse_duration, Metric, PodAutoscaler, PodAutoscalerSpec, PodAutoscalerStatus, ProtocolType,
    Reachability, CLASS_ANNOTATION, CONDITION_ACTIVE, CONDITION_READY,
    CONDITION_SCALE_TARGET_INITIALIZED, CONDITION_SKS_READY, INITIAL_SCALE_ANNOTATION, KEDA_CLASS,
    MAX_SCALE_ANNOTATION, METRIC_ANNOTATION, MIN_SCALE_ANNOTATION, PROMETHEUS_ADDRESS_ANNOTATION,
    QUERY_ANNOTATION, TARGET_ANNOTATION, WINDOW_ANNOTATION,
};
pub use scaled_object::{
    AdvancedConfig, HorizontalPodAutoscalerConfig, KedaCondition, ScaleTargetRef, ScaleTrigger,
    ScaledObject, ScaledObjectSpec, ScaledObjectStatus, METRIC_TYPE_AVERAGE_VALUE,
    METRIC_TYPE_UTILIZATION,
};
pub use serverless_service::{
    ServerlessService, ServerlessServiceSpec, ServerlessServiceStatus, SksOperationMode,
};
pub use types::{get_condition, set_condition, Condition, ConditionStatus};
