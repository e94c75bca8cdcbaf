//! KEDA ScaledObject Custom Resource Definition
//!
//! Only the fields this controller writes or reads are modelled. KEDA creates
//! and manages an HPA for every ScaledObject; `advanced.horizontalPodAutoscalerConfig.name`
//! pins that HPA's name so it can be looked up by the owning PA's name.

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscalerBehavior;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Resource metric type for utilization targets
pub const METRIC_TYPE_UTILIZATION: &str = "Utilization";
/// Resource metric type for absolute average-value targets
pub const METRIC_TYPE_AVERAGE_VALUE: &str = "AverageValue";

/// ScaledObject spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keda.sh",
    version = "v1alpha1",
    kind = "ScaledObject",
    plural = "scaledobjects",
    shortname = "so",
    status = "ScaledObjectStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectSpec {
    /// Reference to the Deployment/StatefulSet to scale
    pub scale_target_ref: ScaleTargetRef,

    /// Seconds between trigger polls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<i32>,

    /// Seconds to wait after the last active trigger before scaling to zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_period: Option<i32>,

    /// Minimum replica count. Absent disables the HPA floor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replica_count: Option<i32>,

    /// Maximum replica count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replica_count: Option<i32>,

    /// HPA tuning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced: Option<AdvancedConfig>,

    /// Autoscaling triggers (cpu, memory, prometheus, etc.)
    #[serde(default)]
    pub triggers: Vec<ScaleTrigger>,
}

/// Scale target reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTargetRef {
    /// API version (KEDA defaults to apps/v1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Kind (KEDA defaults to Deployment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Name
    pub name: String,
}

/// Advanced ScaledObject configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedConfig {
    /// Settings for the HPA KEDA manages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_pod_autoscaler_config: Option<HorizontalPodAutoscalerConfig>,

    /// Restore the original replica count when the ScaledObject is deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_to_original_replica_count: Option<bool>,
}

/// Settings applied to the generated HPA
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalPodAutoscalerConfig {
    /// Name of the generated HPA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Scale-up/scale-down behavior
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<HorizontalPodAutoscalerBehavior>,
}

/// A single KEDA trigger (one scaling signal)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaleTrigger {
    /// Trigger type: "cpu", "memory", or "prometheus"
    #[serde(rename = "type")]
    pub type_: String,

    /// Optional trigger name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Metric type for resource triggers (e.g. "Utilization")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<String>,

    /// Trigger-specific key-value metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// ScaledObject status as reported by KEDA
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScaledObjectStatus {
    /// Name of the HPA KEDA created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hpa_name: Option<String>,

    /// Replica count of the target before KEDA took over
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_replica_count: Option<i32>,

    /// KEDA conditions (Ready, Active, Fallback, Paused)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<KedaCondition>,
}

/// KEDA condition. KEDA omits transition times, so this is looser than
/// [`super::Condition`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct KedaCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,
    /// "True", "False" or "Unknown"
    pub status: String,
    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
