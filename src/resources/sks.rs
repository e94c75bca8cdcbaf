//! PodAutoscaler → ServerlessService translation

use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::crd::{PodAutoscaler, ServerlessService, ServerlessServiceSpec, SksOperationMode};

/// Annotation `kubectl apply` writes; it describes the PA, not the SKS
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Build the desired ServerlessService for a PA
pub fn make_sks(pa: &PodAutoscaler, mode: SksOperationMode, num_activators: i32) -> ServerlessService {
    let annotations = pa.metadata.annotations.as_ref().map(|a| {
        a.iter()
            .filter(|(k, _)| k.as_str() != LAST_APPLIED_ANNOTATION)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    });

    ServerlessService {
        metadata: ObjectMeta {
            name: Some(pa.name_any()),
            namespace: pa.namespace(),
            labels: pa.metadata.labels.clone(),
            annotations,
            owner_references: pa.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: ServerlessServiceSpec {
            mode,
            object_ref: pa.spec.scale_target_ref.clone(),
            protocol_type: pa.spec.protocol_type.clone(),
            num_activators,
        },
        status: None,
    }
}
