//! Integration tests for CRD operations
//!
//! These tests tell the story of the controller's resource types surviving a
//! round trip through a real API server: structural schemas accept what we
//! write, and the status subresource takes our merge patches.

use std::sync::Arc;

use kube::api::{Api, PostParams};
use kube::ResourceExt;

use serving_keda::config::AutoscalerConfig;
use serving_keda::controller::PodAutoscalerClient;
use serving_keda::crd::{
    PodAutoscaler, PodAutoscalerStatus, ScaledObject, CONDITION_ACTIVE, METRIC_ANNOTATION,
    TARGET_ANNOTATION, WINDOW_ANNOTATION,
};
use serving_keda::kube_utils::KubeResourceClient;
use serving_keda::resources::make_scaled_object;

use super::helpers::{cleanup, ensure_test_cluster, sample_pa, TEST_NAMESPACE};

/// Story: a PodAutoscaler written by Knative keeps its scaling annotations
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_pod_autoscaler_round_trips_annotations() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let api: Api<PodAutoscaler> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-pa-roundtrip";
    cleanup::<PodAutoscaler>(&client, name).await;

    let pa = sample_pa(name, &[(METRIC_ANNOTATION, "memory"), (TARGET_ANNOTATION, "256")]);
    api.create(&PostParams::default(), &pa)
        .await
        .expect("failed to create PodAutoscaler");

    let fetched = api.get(name).await.expect("failed to get PodAutoscaler");
    assert_eq!(fetched.target(), Some(256.0));
    assert_eq!(fetched.metric().as_str(), "memory");
    assert!(fetched.uid().is_some());

    cleanup::<PodAutoscaler>(&client, name).await;
}

/// Story: status conditions written through the status subresource are
/// visible on the next read
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_status_patch_is_persisted() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let api: Api<PodAutoscaler> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-pa-status";
    cleanup::<PodAutoscaler>(&client, name).await;

    api.create(&PostParams::default(), &sample_pa(name, &[]))
        .await
        .expect("failed to create PodAutoscaler");

    let mut status = PodAutoscalerStatus::default();
    status.initialize_conditions();
    status.mark_active();
    status.desired_scale = Some(2);

    let writer: Arc<dyn PodAutoscalerClient> =
        Arc::new(KubeResourceClient::<PodAutoscaler>::new(client.clone()));
    writer
        .patch_status(TEST_NAMESPACE, name, &status)
        .await
        .expect("failed to patch status");

    let fetched = api.get(name).await.expect("failed to get PodAutoscaler");
    let fetched_status = fetched.status.expect("status should be set");
    assert!(fetched_status.is_active());
    assert_eq!(fetched_status.desired_scale, Some(2));
    assert!(fetched_status.condition(CONDITION_ACTIVE).is_some());

    cleanup::<PodAutoscaler>(&client, name).await;
}

/// Story: a translated ScaledObject is accepted by the API server as-is
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_translated_scaled_object_is_accepted() {
    let client = ensure_test_cluster().await.expect("failed to setup cluster");
    let pas: Api<PodAutoscaler> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let scaled_objects: Api<ScaledObject> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "crd-so-accepted";
    cleanup::<ScaledObject>(&client, name).await;
    cleanup::<PodAutoscaler>(&client, name).await;

    let pa = pas
        .create(
            &PostParams::default(),
            &sample_pa(name, &[(TARGET_ANNOTATION, "70"), (WINDOW_ANNOTATION, "2m")]),
        )
        .await
        .expect("failed to create PodAutoscaler");

    let desired = make_scaled_object(&pa, &AutoscalerConfig::default());
    let created = scaled_objects
        .create(&PostParams::default(), &desired)
        .await
        .expect("failed to create ScaledObject");

    assert_eq!(created.spec, desired.spec);
    assert_eq!(created.owner_references().len(), 1);

    cleanup::<ScaledObject>(&client, name).await;
    cleanup::<PodAutoscaler>(&client, name).await;
}
