//! ServerlessService reconciliation
//!
//! Every PA gets a ServerlessService that exposes its scale target. This is
//! the same ownership-checked upsert the ScaledObject goes through: create
//! when absent, refuse when someone else owns it, update when it drifted.

use std::sync::Arc;

use async_trait::async_trait;
use kube::{Client, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::crd::{PodAutoscaler, PodAutoscalerStatus, ServerlessService, SksOperationMode};
use crate::kube_utils::{classify_existing, Existing, KubeResourceClient};
use crate::resources::make_sks;
use crate::{Error, Result};

const KIND: &str = "ServerlessService";

/// API access for ServerlessServices
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SksClient: Send + Sync {
    /// Get a ServerlessService; `None` when absent
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServerlessService>>;

    /// Create a ServerlessService
    async fn create(&self, sks: &ServerlessService) -> Result<ServerlessService>;

    /// Replace a ServerlessService
    async fn update(&self, sks: &ServerlessService) -> Result<ServerlessService>;
}

#[async_trait]
impl SksClient for KubeResourceClient<ServerlessService> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServerlessService>> {
        KubeResourceClient::get(self, namespace, name).await
    }

    async fn create(&self, sks: &ServerlessService) -> Result<ServerlessService> {
        KubeResourceClient::create(self, sks).await
    }

    async fn update(&self, sks: &ServerlessService) -> Result<ServerlessService> {
        self.replace(sks).await
    }
}

/// Makes a PA's scale target reachable
///
/// Implementations may record ownership problems on the PA's status before
/// returning an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceExposure: Send + Sync {
    /// Bring the exposure resource for `pa` in line and return its current state
    async fn reconcile(
        &self,
        pa: &mut PodAutoscaler,
        mode: SksOperationMode,
        num_activators: i32,
    ) -> Result<ServerlessService>;
}

/// [`ServiceExposure`] backed by ServerlessService resources
pub struct SksReconciler {
    client: Arc<dyn SksClient>,
}

impl SksReconciler {
    /// Create a reconciler talking to the API server
    pub fn new(client: Client) -> Self {
        Self::with_client(Arc::new(KubeResourceClient::<ServerlessService>::new(client)))
    }

    /// Create a reconciler over any [`SksClient`]
    pub fn with_client(client: Arc<dyn SksClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ServiceExposure for SksReconciler {
    async fn reconcile(
        &self,
        pa: &mut PodAutoscaler,
        mode: SksOperationMode,
        num_activators: i32,
    ) -> Result<ServerlessService> {
        let desired = make_sks(pa, mode, num_activators);
        let name = desired.name_any();
        let namespace = pa.namespace().unwrap_or_default();
        let owner_uid = pa.uid().unwrap_or_default();

        let existing = self
            .client
            .get(&namespace, &name)
            .await
            .map_err(|e| Error::resource("getting", KIND, &name, e))?;

        match classify_existing(existing, &owner_uid) {
            Existing::Absent => {
                info!(sks = %name, %mode, "Creating ServerlessService");
                self.client
                    .create(&desired)
                    .await
                    .map_err(|e| Error::resource("creating", KIND, &name, e))
            }
            Existing::NotOwned(_) => {
                pa.status
                    .get_or_insert_with(PodAutoscalerStatus::default)
                    .mark_resource_not_owned(KIND, &name);
                Err(Error::not_owned(KIND, name, pa.name_any()))
            }
            Existing::Owned(current) if current.spec != desired.spec => {
                info!(sks = %name, %mode, "Updating ServerlessService");
                let mut updated = current;
                updated.spec = desired.spec;
                self.client
                    .update(&updated)
                    .await
                    .map_err(|e| Error::resource("updating", KIND, &name, e))
            }
            Existing::Owned(current) => {
                debug!(sks = %name, "ServerlessService up to date");
                Ok(current)
            }
        }
    }
}
