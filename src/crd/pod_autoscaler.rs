//! PodAutoscaler Custom Resource Definition
//!
//! The PodAutoscaler ("PA") is Knative Serving's per-revision scaling intent.
//! Scaling parameters (metric, target, bounds, window) travel as annotations;
//! this module parses them into typed values and owns the status condition
//! bookkeeping the reconciler drives.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{get_condition, set_condition, Condition, ConditionStatus};
use crate::config::AutoscalerConfig;

/// Annotation selecting the autoscaler implementation for a PA
pub const CLASS_ANNOTATION: &str = "autoscaling.knative.dev/class";
/// Annotation naming the metric to scale on
pub const METRIC_ANNOTATION: &str = "autoscaling.knative.dev/metric";
/// Annotation carrying the numeric scaling target
pub const TARGET_ANNOTATION: &str = "autoscaling.knative.dev/target";
/// Annotation carrying the stabilization window
pub const WINDOW_ANNOTATION: &str = "autoscaling.knative.dev/window";
/// Annotation carrying the lower replica bound
pub const MIN_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/min-scale";
/// Annotation carrying the upper replica bound
pub const MAX_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/max-scale";
/// Annotation carrying the initial scale hint
pub const INITIAL_SCALE_ANNOTATION: &str = "autoscaling.knative.dev/initial-scale";
/// Annotation overriding the PromQL query for custom metrics
pub const QUERY_ANNOTATION: &str = "autoscaling.knative.dev/query";
/// Annotation overriding the Prometheus server address for custom metrics
pub const PROMETHEUS_ADDRESS_ANNOTATION: &str = "autoscaling.knative.dev/prometheus-address";

/// Autoscaler class handled by this controller unless overridden on the CLI
pub const KEDA_CLASS: &str = "keda.autoscaling.knative.dev";

/// Happy condition, derived from the dependent conditions below
pub const CONDITION_READY: &str = "Ready";
/// The scaler is serving traffic
pub const CONDITION_ACTIVE: &str = "Active";
/// The ServerlessService fronting the scale target is ready
pub const CONDITION_SKS_READY: &str = "SKSReady";
/// The scale target reached its initial scale at least once
pub const CONDITION_SCALE_TARGET_INITIALIZED: &str = "ScaleTargetInitialized";

const DEPENDENT_CONDITIONS: [&str; 3] = [
    CONDITION_ACTIVE,
    CONDITION_SCALE_TARGET_INITIALIZED,
    CONDITION_SKS_READY,
];

/// Specification for a PodAutoscaler
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "autoscaling.internal.knative.dev",
    version = "v1alpha1",
    kind = "PodAutoscaler",
    plural = "podautoscalers",
    shortname = "kpa",
    status = "PodAutoscalerStatus",
    derive = "PartialEq",
    namespaced,
    printcolumn = r#"{"name":"DesiredScale","type":"integer","jsonPath":".status.desiredScale"}"#,
    printcolumn = r#"{"name":"ActualScale","type":"integer","jsonPath":".status.actualScale"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodAutoscalerSpec {
    /// Hard concurrency limit of the revision (0 = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_concurrency: Option<i64>,

    /// Reference to the Deployment being scaled
    pub scale_target_ref: ObjectReference,

    /// Whether the revision is reachable through a route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachability: Option<Reachability>,

    /// Protocol the revision speaks
    #[serde(default)]
    pub protocol_type: ProtocolType,
}

/// Reachability of the revision behind a PA
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum Reachability {
    /// Routed to by at least one route
    Reachable,
    /// Not routed to; the lower bound is dropped
    Unreachable,
}

/// Network protocol of the scale target
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// HTTP/1.1
    #[default]
    Http1,
    /// HTTP/2 over cleartext
    H2c,
}

/// Metric a PA scales on
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Metric {
    /// CPU utilization percentage
    Cpu,
    /// Average memory usage in MiB
    Memory,
    /// Any other metric, served from Prometheus
    Custom(String),
}

impl Metric {
    /// Parse a metric annotation value
    pub fn from_name(name: &str) -> Self {
        match name {
            "cpu" => Self::Cpu,
            "memory" => Self::Memory,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Name of the metric as written in the annotation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status for a PodAutoscaler
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodAutoscalerStatus {
    /// Generation last processed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions representing the PA state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Public service of the revision
    #[serde(default)]
    pub service_name: String,

    /// Private service used to scrape metrics
    #[serde(default)]
    pub metrics_service_name: String,

    /// Replica count the HPA wants
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_scale: Option<i32>,

    /// Replica count the HPA observes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_scale: Option<i32>,
}

impl PodAutoscalerStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        get_condition(&self.conditions, type_)
    }

    fn is_condition_true(&self, type_: &str) -> bool {
        self.condition(type_).is_some_and(Condition::is_true)
    }

    /// Returns true once all dependent conditions are True
    pub fn is_ready(&self) -> bool {
        self.is_condition_true(CONDITION_READY)
    }

    /// Returns true if the Active condition is True
    pub fn is_active(&self) -> bool {
        self.is_condition_true(CONDITION_ACTIVE)
    }

    /// Returns true if the SKSReady condition is True
    pub fn is_sks_ready(&self) -> bool {
        self.is_condition_true(CONDITION_SKS_READY)
    }

    /// Returns true if the scale target has been initialized
    pub fn is_scale_target_initialized(&self) -> bool {
        self.is_condition_true(CONDITION_SCALE_TARGET_INITIALIZED)
    }

    /// Add every missing condition as Unknown. Existing conditions are kept.
    pub fn initialize_conditions(&mut self) {
        for type_ in DEPENDENT_CONDITIONS {
            if self.condition(type_).is_none() {
                self.conditions
                    .push(Condition::new(type_, ConditionStatus::Unknown, "", ""));
            }
        }
        self.recompute_ready();
    }

    /// Mark the PA active
    pub fn mark_active(&mut self) {
        self.mark(CONDITION_ACTIVE, ConditionStatus::True, "", "");
    }

    /// Mark the PA inactive with a reason
    pub fn mark_inactive(&mut self, reason: &str, message: impl Into<String>) {
        self.mark(CONDITION_ACTIVE, ConditionStatus::False, reason, message);
    }

    /// Surface that a child resource exists but belongs to someone else
    pub fn mark_resource_not_owned(&mut self, kind: &str, name: &str) {
        self.mark_inactive(
            "NotOwned",
            format!("There is an existing {kind} \"{name}\" that we do not own."),
        );
    }

    /// Surface that a child resource could not be created
    pub fn mark_resource_failed_creation(&mut self, kind: &str, name: &str) {
        self.mark_inactive("FailedCreate", format!("Failed to create {kind} \"{name}\"."));
    }

    /// Mark the ServerlessService ready
    pub fn mark_sks_ready(&mut self) {
        self.mark(CONDITION_SKS_READY, ConditionStatus::True, "", "");
    }

    /// Mark the ServerlessService as not ready yet
    pub fn mark_sks_not_ready(&mut self, message: impl Into<String>) {
        self.mark(CONDITION_SKS_READY, ConditionStatus::Unknown, "NotReady", message);
    }

    /// Mark the scale target initialized. There is no inverse operation.
    pub fn mark_scale_target_initialized(&mut self) {
        self.mark(
            CONDITION_SCALE_TARGET_INITIALIZED,
            ConditionStatus::True,
            "",
            "",
        );
    }

    fn mark(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: impl Into<String>,
    ) {
        set_condition(
            &mut self.conditions,
            Condition::new(type_, status, reason, message),
        );
        self.recompute_ready();
    }

    /// Derive Ready from the dependent conditions
    fn recompute_ready(&mut self) {
        let mut unknown: Option<(String, String)> = None;
        let mut failed: Option<(String, String)> = None;

        for type_ in DEPENDENT_CONDITIONS {
            match self.condition(type_) {
                Some(c) if c.status == ConditionStatus::False => {
                    failed = Some((c.reason.clone(), c.message.clone()));
                    break;
                }
                Some(c) if c.status == ConditionStatus::True => {}
                Some(c) => {
                    unknown.get_or_insert_with(|| (c.reason.clone(), c.message.clone()));
                }
                None => {
                    unknown.get_or_insert_with(Default::default);
                }
            }
        }

        let ready = match (failed, unknown) {
            (Some((reason, message)), _) => {
                Condition::new(CONDITION_READY, ConditionStatus::False, reason, message)
            }
            (None, Some((reason, message))) => {
                Condition::new(CONDITION_READY, ConditionStatus::Unknown, reason, message)
            }
            (None, None) => Condition::new(CONDITION_READY, ConditionStatus::True, "", ""),
        };
        set_condition(&mut self.conditions, ready);
    }
}

impl PodAutoscaler {
    fn annotations_map(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    /// Look up an annotation value
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations_map()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    fn annotation_i32(&self, key: &str) -> Option<i32> {
        self.annotation(key).and_then(|v| v.trim().parse().ok())
    }

    /// Autoscaler class requested by this PA
    pub fn class(&self) -> Option<&str> {
        self.annotation(CLASS_ANNOTATION)
    }

    /// Metric to scale on; CPU when unset
    pub fn metric(&self) -> Metric {
        self.annotation(METRIC_ANNOTATION)
            .map(Metric::from_name)
            .unwrap_or(Metric::Cpu)
    }

    /// Numeric scaling target, if set, parseable and positive
    pub fn target(&self) -> Option<f64> {
        self.annotation(TARGET_ANNOTATION)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|t| t.is_finite() && *t > 0.0)
    }

    /// Stabilization window, if set and parseable
    pub fn window(&self) -> Option<Duration> {
        self.annotation(WINDOW_ANNOTATION).and_then(parse_duration)
    }

    /// Initial scale hint, if set and parseable
    pub fn initial_scale(&self) -> Option<i32> {
        self.annotation_i32(INITIAL_SCALE_ANNOTATION)
    }

    /// Compute the `(min, max)` replica bounds.
    ///
    /// Unreachable revisions have no lower bound. A `max` of 0 means unbounded.
    pub fn scale_bounds(&self, config: &AutoscalerConfig) -> (i32, i32) {
        let min = if self.spec.reachability == Some(Reachability::Unreachable) {
            0
        } else {
            self.annotation_i32(MIN_SCALE_ANNOTATION)
                .unwrap_or(config.min_scale)
        };
        let max = self
            .annotation_i32(MAX_SCALE_ANNOTATION)
            .unwrap_or(config.max_scale);
        (min, max)
    }

    /// Returns true if the status marks the scale target initialized
    pub fn is_scale_target_initialized(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(PodAutoscalerStatus::is_scale_target_initialized)
    }
}

/// Parse a duration written as a sequence of `<number><unit>` pairs,
/// e.g. `60s`, `1m30s`, `1.5h`, `250ms`. A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut rest = s;
    let mut seconds = 0f64;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let value: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        seconds += value * scale;
        rest = &rest[unit_end..];
    }

    Duration::try_from_secs_f64(seconds).ok()
}
