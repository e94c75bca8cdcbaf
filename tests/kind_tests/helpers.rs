//! Shared helpers for kind integration tests

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ObjectMeta, Patch, PatchParams};
use kube::{Client, CustomResourceExt, Resource};
use serde::de::DeserializeOwned;

use serving_keda::crd::{
    PodAutoscaler, PodAutoscalerSpec, ScaledObject, ServerlessService, CLASS_ANNOTATION,
    KEDA_CLASS,
};

/// Namespace every integration test works in
pub const TEST_NAMESPACE: &str = "default";

/// Connect to the current kube context and make sure our CRDs exist
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let client = Client::try_default()
        .await
        .map_err(|e| format!("failed to create client: {e}"))?;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("serving-keda-tests").force();

    for crd in [
        PodAutoscaler::crd(),
        ServerlessService::crd(),
        ScaledObject::crd(),
    ] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| format!("failed to install CRD {name}: {e}"))?;
    }

    // Give the API server a moment to serve the new types
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok(client)
}

/// A KEDA-class PodAutoscaler with the given extra annotations
pub fn sample_pa(name: &str, annotations: &[(&str, &str)]) -> PodAutoscaler {
    let mut all: BTreeMap<String, String> = annotations
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    all.insert(CLASS_ANNOTATION.to_string(), KEDA_CLASS.to_string());

    PodAutoscaler {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            annotations: Some(all),
            ..Default::default()
        },
        spec: PodAutoscalerSpec {
            scale_target_ref: ObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: Some("Deployment".to_string()),
                name: Some(format!("{name}-deployment")),
                ..Default::default()
            },
            ..Default::default()
        },
        status: None,
    }
}

/// Delete a namespaced resource, ignoring errors, and wait for it to go
pub async fn cleanup<K>(client: &Client, name: &str)
where
    K: Resource<Scope = kube::core::NamespaceResourceScope, DynamicType = ()>
        + Clone
        + std::fmt::Debug
        + DeserializeOwned,
{
    let api: Api<K> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let _ = api.delete(name, &DeleteParams::default()).await;
    for _ in 0..20 {
        if matches!(api.get_opt(name).await, Ok(None)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
