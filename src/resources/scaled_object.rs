//! PodAutoscaler → KEDA ScaledObject translation

use std::collections::BTreeMap;

use k8s_openapi::api::autoscaling::v2::{HPAScalingRules, HorizontalPodAutoscalerBehavior};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use super::quantity::{binary_si, decimal_si};
use crate::config::AutoscalerConfig;
use crate::crd::{
    AdvancedConfig, HorizontalPodAutoscalerConfig, Metric, PodAutoscaler, ScaleTargetRef,
    ScaleTrigger, ScaledObject, ScaledObjectSpec, METRIC_TYPE_AVERAGE_VALUE,
    METRIC_TYPE_UTILIZATION, PROMETHEUS_ADDRESS_ANNOTATION, QUERY_ANNOTATION,
};

/// Suffix Knative appends to a revision name for its Deployment
pub const DEPLOYMENT_SUFFIX: &str = "-deployment";

/// Build the desired ScaledObject for a PA.
///
/// Pure: the same PA and config always produce the same object. The
/// ScaledObject and the HPA KEDA derives from it both carry the PA's name.
pub fn make_scaled_object(pa: &PodAutoscaler, config: &AutoscalerConfig) -> ScaledObject {
    let name = pa.name_any();
    let (min, max) = pa.scale_bounds(config);
    let max = if max == 0 { i32::MAX } else { max };

    let behavior = pa.window().map(|window| {
        let seconds = i32::try_from(window.as_secs()).unwrap_or(i32::MAX);
        HorizontalPodAutoscalerBehavior {
            scale_up: Some(stabilization(seconds)),
            scale_down: Some(stabilization(seconds)),
        }
    });

    ScaledObject {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: pa.namespace(),
            labels: pa.metadata.labels.clone(),
            annotations: pa.metadata.annotations.clone(),
            owner_references: pa.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: ScaledObjectSpec {
            scale_target_ref: ScaleTargetRef {
                name: format!("{name}{DEPLOYMENT_SUFFIX}"),
                ..Default::default()
            },
            min_replica_count: (min > 0).then_some(min),
            max_replica_count: Some(max),
            advanced: Some(AdvancedConfig {
                horizontal_pod_autoscaler_config: Some(HorizontalPodAutoscalerConfig {
                    name: Some(name),
                    behavior,
                }),
                ..Default::default()
            }),
            triggers: triggers(pa, config),
            ..Default::default()
        },
        status: None,
    }
}

fn stabilization(seconds: i32) -> HPAScalingRules {
    HPAScalingRules {
        stabilization_window_seconds: Some(seconds),
        ..Default::default()
    }
}

fn triggers(pa: &PodAutoscaler, config: &AutoscalerConfig) -> Vec<ScaleTrigger> {
    let Some(target) = pa.target() else {
        return Vec::new();
    };

    let trigger = match pa.metric() {
        Metric::Cpu => ScaleTrigger {
            type_: "cpu".to_string(),
            metric_type: Some(METRIC_TYPE_UTILIZATION.to_string()),
            metadata: metadata([("value", (target.ceil() as i64).to_string())]),
            ..Default::default()
        },
        Metric::Memory => {
            let bytes = (target.trunc() as i64).saturating_mul(1024 * 1024);
            ScaleTrigger {
                type_: "memory".to_string(),
                metric_type: Some(METRIC_TYPE_AVERAGE_VALUE.to_string()),
                metadata: metadata([("value", binary_si(bytes))]),
                ..Default::default()
            }
        }
        metric @ Metric::Custom(_) => {
            let query = pa
                .annotation(QUERY_ANNOTATION)
                .map(str::to_string)
                .unwrap_or_else(|| config.query_for(&metric));
            let address = pa
                .annotation(PROMETHEUS_ADDRESS_ANNOTATION)
                .unwrap_or(&config.prometheus_address)
                .to_string();
            ScaleTrigger {
                type_: "prometheus".to_string(),
                metadata: metadata([
                    ("serverAddress", address),
                    ("query", query),
                    ("threshold", decimal_si(target.trunc() as i64)),
                ]),
                ..Default::default()
            }
        }
    };

    vec![trigger]
}

fn metadata<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
