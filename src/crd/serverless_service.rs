//! ServerlessService Custom Resource Definition
//!
//! The ServerlessService ("SKS") fronts a revision with a public and a private
//! Kubernetes Service. This controller creates one per PA in `Serve` mode and
//! reads back the service names and readiness.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::pod_autoscaler::ProtocolType;
use super::types::{get_condition, Condition};

/// ServerlessService spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "networking.internal.knative.dev",
    version = "v1alpha1",
    kind = "ServerlessService",
    plural = "serverlessservices",
    shortname = "sks",
    status = "ServerlessServiceStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessServiceSpec {
    /// Operation mode of the public service
    pub mode: SksOperationMode,

    /// The scale target the services select
    pub object_ref: ObjectReference,

    /// Protocol of the scale target
    #[serde(default)]
    pub protocol_type: ProtocolType,

    /// Number of activators to route through (0 = no explicit count)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_activators: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

/// How the public service routes traffic
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SksOperationMode {
    /// Traffic goes straight to the revision pods
    #[default]
    Serve,
    /// Traffic goes through the activator
    Proxy,
}

impl std::fmt::Display for SksOperationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serve => write!(f, "Serve"),
            Self::Proxy => write!(f, "Proxy"),
        }
    }
}

/// ServerlessService status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessServiceStatus {
    /// Generation last processed by the networking controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Public service name
    #[serde(default)]
    pub service_name: String,

    /// Private service name
    #[serde(default)]
    pub private_service_name: String,
}

impl ServerlessService {
    /// Public service name, empty until the networking controller reports it
    pub fn service_name(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.service_name.as_str())
            .unwrap_or_default()
    }

    /// Private service name, empty until the networking controller reports it
    pub fn private_service_name(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.private_service_name.as_str())
            .unwrap_or_default()
    }

    /// Ready when the latest generation has been observed and Ready is True
    pub fn is_ready(&self) -> bool {
        let Some(status) = self.status.as_ref() else {
            return false;
        };
        status.observed_generation == self.metadata.generation
            && get_condition(&status.conditions, "Ready").is_some_and(Condition::is_true)
    }
}
