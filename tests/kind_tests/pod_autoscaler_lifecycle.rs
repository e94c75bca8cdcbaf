//! Integration tests for the PodAutoscaler reconcile loop
//!
//! These tests run `reconcile` against a real API server. KEDA and the
//! Knative networking controller are not installed, so the tests stand in
//! for them: they create the HPA KEDA would create, and the SKS never
//! becomes ready.

use std::sync::Arc;

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
};
use kube::api::{Api, ObjectMeta, PostParams};
use kube::runtime::controller::Action;
use kube::Client;

use serving_keda::config::ConfigStore;
use serving_keda::controller::{reconcile, Context};
use serving_keda::crd::{
    ConditionStatus, PodAutoscaler, ScaleTargetRef, ScaledObject, ScaledObjectSpec, ServerlessService,
    CONDITION_ACTIVE, CONDITION_SKS_READY, TARGET_ANNOTATION,
};

use super::helpers::{cleanup, ensure_test_cluster, sample_pa, TEST_NAMESPACE};

// =============================================================================
// Test Fixtures
// =============================================================================

fn test_context(client: &Client) -> Arc<Context> {
    Arc::new(
        Context::builder(client.clone())
            .config_store(Arc::new(ConfigStore::default()))
            .build(),
    )
}

/// The HPA KEDA would create for a ScaledObject named `name`
fn keda_hpa(name: &str) -> HorizontalPodAutoscaler {
    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: format!("{name}-deployment"),
            },
            min_replicas: Some(1),
            max_replicas: 10,
            ..Default::default()
        }),
        status: None,
    }
}

async fn cleanup_all(client: &Client, name: &str) {
    cleanup::<HorizontalPodAutoscaler>(client, name).await;
    cleanup::<ServerlessService>(client, name).await;
    cleanup::<ScaledObject>(client, name).await;
    cleanup::<PodAutoscaler>(client, name).await;
}

// =============================================================================
// Lifecycle Stories
// =============================================================================

/// Story: a new KEDA-class PodAutoscaler gets its ScaledObject and SKS, and
/// reports Active once KEDA's HPA exists, while waiting on the SKS.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_pod_autoscaler_is_reconciled_end_to_end() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let name = "lifecycle-e2e";
    cleanup_all(&client, name).await;

    let pas: Api<PodAutoscaler> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let pa = pas
        .create(
            &PostParams::default(),
            &sample_pa(name, &[(TARGET_ANNOTATION, "75")]),
        )
        .await
        .expect("failed to create PodAutoscaler");

    let hpas: Api<HorizontalPodAutoscaler> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    hpas.create(&PostParams::default(), &keda_hpa(name))
        .await
        .expect("failed to create HPA");

    let action = reconcile(Arc::new(pa), test_context(&client))
        .await
        .expect("reconcile should succeed");
    assert_eq!(action, Action::requeue(std::time::Duration::from_secs(300)));

    let scaled_objects: Api<ScaledObject> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let so = scaled_objects
        .get(name)
        .await
        .expect("ScaledObject should exist");
    assert_eq!(so.spec.scale_target_ref.name, format!("{name}-deployment"));
    assert_eq!(so.spec.triggers[0].metadata["value"], "75");

    let sks_api: Api<ServerlessService> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    assert!(sks_api.get_opt(name).await.expect("get SKS").is_some());

    let status = pas
        .get(name)
        .await
        .expect("get PodAutoscaler")
        .status
        .expect("status should be written");
    assert!(status.is_active());
    assert_eq!(
        status.condition(CONDITION_SKS_READY).map(|c| c.status.clone()),
        Some(ConditionStatus::Unknown)
    );

    cleanup_all(&client, name).await;
}

/// Story: a ScaledObject with the PA's name already exists and belongs to
/// someone else. The controller refuses to touch it and says so on the PA.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_foreign_scaled_object_is_reported_not_adopted() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let name = "lifecycle-foreign";
    cleanup_all(&client, name).await;

    let scaled_objects: Api<ScaledObject> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let mut foreign = ScaledObject::new(
        name,
        ScaledObjectSpec {
            scale_target_ref: ScaleTargetRef {
                name: "someone-else".to_string(),
                ..Default::default()
            },
            max_replica_count: Some(1),
            ..Default::default()
        },
    );
    foreign.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    scaled_objects
        .create(&PostParams::default(), &foreign)
        .await
        .expect("failed to create foreign ScaledObject");

    let pas: Api<PodAutoscaler> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let pa = pas
        .create(&PostParams::default(), &sample_pa(name, &[]))
        .await
        .expect("failed to create PodAutoscaler");

    let err = reconcile(Arc::new(pa), test_context(&client))
        .await
        .expect_err("reconcile should refuse the foreign ScaledObject");
    assert!(err.is_not_owned());

    let untouched = scaled_objects.get(name).await.expect("get ScaledObject");
    assert_eq!(untouched.spec.scale_target_ref.name, "someone-else");

    let status = pas
        .get(name)
        .await
        .expect("get PodAutoscaler")
        .status
        .expect("status should be written");
    let active = status.condition(CONDITION_ACTIVE).expect("Active condition");
    assert_eq!(active.status, ConditionStatus::False);
    assert_eq!(active.reason, "NotOwned");

    cleanup_all(&client, name).await;
}

/// Story: KEDA has not produced the HPA yet. Reconcile fails with a
/// retryable error after creating the ScaledObject.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_missing_hpa_is_retried() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let name = "lifecycle-no-hpa";
    cleanup_all(&client, name).await;

    let pas: Api<PodAutoscaler> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let pa = pas
        .create(&PostParams::default(), &sample_pa(name, &[]))
        .await
        .expect("failed to create PodAutoscaler");

    let err = reconcile(Arc::new(pa), test_context(&client))
        .await
        .expect_err("reconcile should wait for the HPA");
    assert!(err.is_waiting());

    let scaled_objects: Api<ScaledObject> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    assert!(scaled_objects
        .get_opt(name)
        .await
        .expect("get ScaledObject")
        .is_some());

    cleanup_all(&client, name).await;
}
