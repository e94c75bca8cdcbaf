//! PodAutoscaler controller implementation
//!
//! Keeps a KEDA ScaledObject in line with each PodAutoscaler of our class,
//! reads back the HPA KEDA maintains for it, and folds the HPA's replica
//! counts into the PA's status. Scaling decisions stay with the HPA; this
//! controller only observes them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use super::activation::active_threshold;
use super::sks::{ServiceExposure, SksReconciler};
use crate::config::ConfigStore;
use crate::crd::{
    PodAutoscaler, PodAutoscalerStatus, ScaledObject, SksOperationMode, KEDA_CLASS,
};
use crate::kube_utils::{classify_existing, Existing, KubeResourceClient};
use crate::resources::make_scaled_object;
use crate::{Error, Result};

const SCALED_OBJECT_KIND: &str = "ScaledObject";
const HPA_KIND: &str = "HorizontalPodAutoscaler";

/// Default deadline for a single reconcile
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default period between resyncs of a healthy PA
pub const DEFAULT_RESYNC_PERIOD: Duration = Duration::from_secs(300);

/// API access for KEDA ScaledObjects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScaledObjectClient: Send + Sync {
    /// Get a ScaledObject; `None` when absent
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ScaledObject>>;

    /// Create a ScaledObject
    async fn create(&self, scaled_object: &ScaledObject) -> Result<ScaledObject>;

    /// Replace a ScaledObject. The object's resourceVersion guards the write.
    async fn update(&self, scaled_object: &ScaledObject) -> Result<ScaledObject>;
}

/// Read-only access to the HPAs KEDA manages
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HpaLister: Send + Sync {
    /// Get an HPA; `None` when absent
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>>;
}

/// Status writes for PodAutoscalers
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodAutoscalerClient: Send + Sync {
    /// Merge-patch the status subresource of a PodAutoscaler
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PodAutoscalerStatus,
    ) -> Result<()>;
}

#[async_trait]
impl ScaledObjectClient for KubeResourceClient<ScaledObject> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ScaledObject>> {
        KubeResourceClient::get(self, namespace, name).await
    }

    async fn create(&self, scaled_object: &ScaledObject) -> Result<ScaledObject> {
        KubeResourceClient::create(self, scaled_object).await
    }

    async fn update(&self, scaled_object: &ScaledObject) -> Result<ScaledObject> {
        self.replace(scaled_object).await
    }
}

#[async_trait]
impl HpaLister for KubeResourceClient<HorizontalPodAutoscaler> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<HorizontalPodAutoscaler>> {
        KubeResourceClient::get(self, namespace, name).await
    }
}

#[async_trait]
impl PodAutoscalerClient for KubeResourceClient<PodAutoscaler> {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PodAutoscalerStatus,
    ) -> Result<()> {
        KubeResourceClient::patch_status(self, namespace, name, status).await?;
        Ok(())
    }
}

/// Controller context shared by every reconcile
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config_store(store)
///     .class("keda.autoscaling.knative.dev")
///     .build();
/// ```
pub struct Context {
    /// ScaledObject reads and writes
    pub scaled_objects: Arc<dyn ScaledObjectClient>,
    /// HPA reads
    pub hpas: Arc<dyn HpaLister>,
    /// PodAutoscaler status writes
    pub pod_autoscalers: Arc<dyn PodAutoscalerClient>,
    /// ServerlessService reconciliation
    pub exposure: Arc<dyn ServiceExposure>,
    /// Autoscaler config, snapshotted once per reconcile
    pub config: Arc<ConfigStore>,
    /// Autoscaler class this controller handles
    pub class: String,
    /// Deadline for one reconcile
    pub reconcile_timeout: Duration,
    /// Requeue delay after a successful reconcile
    pub resync_period: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(
        scaled_objects: Arc<dyn ScaledObjectClient>,
        hpas: Arc<dyn HpaLister>,
        pod_autoscalers: Arc<dyn PodAutoscalerClient>,
        exposure: Arc<dyn ServiceExposure>,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            scaled_objects,
            hpas,
            pod_autoscalers,
            exposure,
            config,
            class: KEDA_CLASS.to_string(),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            resync_period: DEFAULT_RESYNC_PERIOD,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    scaled_objects: Option<Arc<dyn ScaledObjectClient>>,
    hpas: Option<Arc<dyn HpaLister>>,
    pod_autoscalers: Option<Arc<dyn PodAutoscalerClient>>,
    exposure: Option<Arc<dyn ServiceExposure>>,
    config: Option<Arc<ConfigStore>>,
    class: String,
    reconcile_timeout: Duration,
    resync_period: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            scaled_objects: None,
            hpas: None,
            pod_autoscalers: None,
            exposure: None,
            config: None,
            class: KEDA_CLASS.to_string(),
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            resync_period: DEFAULT_RESYNC_PERIOD,
        }
    }

    /// Set the shared config store
    pub fn config_store(mut self, config: Arc<ConfigStore>) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the autoscaler class to handle
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    /// Set the per-reconcile deadline
    pub fn reconcile_timeout(mut self, timeout: Duration) -> Self {
        self.reconcile_timeout = timeout;
        self
    }

    /// Set the resync period
    pub fn resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }

    /// Override the ScaledObject client
    pub fn scaled_object_client(mut self, client: Arc<dyn ScaledObjectClient>) -> Self {
        self.scaled_objects = Some(client);
        self
    }

    /// Override the HPA lister
    pub fn hpa_lister(mut self, lister: Arc<dyn HpaLister>) -> Self {
        self.hpas = Some(lister);
        self
    }

    /// Override the PodAutoscaler status client
    pub fn pod_autoscaler_client(mut self, client: Arc<dyn PodAutoscalerClient>) -> Self {
        self.pod_autoscalers = Some(client);
        self
    }

    /// Override the service-exposure reconciler
    pub fn service_exposure(mut self, exposure: Arc<dyn ServiceExposure>) -> Self {
        self.exposure = Some(exposure);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let client = self.client;
        Context {
            scaled_objects: self.scaled_objects.unwrap_or_else(|| {
                Arc::new(KubeResourceClient::<ScaledObject>::new(client.clone()))
            }),
            hpas: self.hpas.unwrap_or_else(|| {
                Arc::new(KubeResourceClient::<HorizontalPodAutoscaler>::new(
                    client.clone(),
                ))
            }),
            pod_autoscalers: self.pod_autoscalers.unwrap_or_else(|| {
                Arc::new(KubeResourceClient::<PodAutoscaler>::new(client.clone()))
            }),
            exposure: self
                .exposure
                .unwrap_or_else(|| Arc::new(SksReconciler::new(client.clone()))),
            config: self.config.unwrap_or_default(),
            class: self.class,
            reconcile_timeout: self.reconcile_timeout,
            resync_period: self.resync_period,
        }
    }
}

/// Reconcile a PodAutoscaler
///
/// Skips PAs of other classes. Otherwise runs [`reconcile_kind`] on a copy
/// under the configured deadline and writes the resulting status back when
/// it changed, including when reconciliation failed, so failure conditions
/// are visible while the error is retried.
#[instrument(
    skip(pa, ctx),
    fields(pa = %pa.name_any(), namespace = %pa.namespace().unwrap_or_default())
)]
pub async fn reconcile(pa: Arc<PodAutoscaler>, ctx: Arc<Context>) -> Result<Action> {
    if pa.class() != Some(ctx.class.as_str()) {
        debug!(class = ?pa.class(), "skipping PodAutoscaler of another class");
        return Ok(Action::await_change());
    }

    let name = pa.name_any();
    let namespace = pa
        .namespace()
        .ok_or_else(|| Error::validation("PodAutoscaler must be namespaced"))?;
    debug!("reconciling PodAutoscaler");

    let mut working = (*pa).clone();
    working
        .status
        .get_or_insert_with(PodAutoscalerStatus::default)
        .initialize_conditions();

    let result = match tokio::time::timeout(ctx.reconcile_timeout, reconcile_kind(&mut working, &ctx))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(ctx.reconcile_timeout)),
    };

    let status = working
        .status
        .get_or_insert_with(PodAutoscalerStatus::default);
    if result.is_ok() {
        status.observed_generation = pa.metadata.generation;
    }

    let patched = if pa.status.as_ref() != Some(&*status) {
        debug!("patching PodAutoscaler status");
        ctx.pod_autoscalers
            .patch_status(&namespace, &name, status)
            .await
    } else {
        Ok(())
    };

    result?;
    if let Err(e) = patched {
        warn!(error = %e, "failed to patch PodAutoscaler status");
        return Err(e);
    }
    Ok(Action::requeue(ctx.resync_period))
}

/// Drive one PA towards its desired state, mutating only its status.
///
/// Ownership problems and creation failures are recorded on the status and
/// returned as errors. A missing or still-initializing HPA is an error that
/// leaves the status untouched.
pub async fn reconcile_kind(pa: &mut PodAutoscaler, ctx: &Context) -> Result<()> {
    let config = ctx.config.current();
    let pa_name = pa.name_any();
    let namespace = pa.namespace().unwrap_or_default();
    let owner_uid = pa.uid().unwrap_or_default();

    let desired = make_scaled_object(pa, &config);
    let so_name = desired.name_any();

    let existing = ctx
        .scaled_objects
        .get(&namespace, &so_name)
        .await
        .map_err(|e| Error::resource("getting", SCALED_OBJECT_KIND, &so_name, e))?;

    let scaled_object = match classify_existing(existing, &owner_uid) {
        Existing::Absent => {
            info!(scaled_object = %so_name, "Creating ScaledObject");
            match ctx.scaled_objects.create(&desired).await {
                Ok(created) => created,
                Err(e) => {
                    status_mut(pa).mark_resource_failed_creation(SCALED_OBJECT_KIND, &so_name);
                    return Err(Error::resource("creating", SCALED_OBJECT_KIND, &so_name, e));
                }
            }
        }
        Existing::NotOwned(_) => {
            status_mut(pa).mark_resource_not_owned(SCALED_OBJECT_KIND, &so_name);
            return Err(Error::not_owned(SCALED_OBJECT_KIND, so_name, pa_name));
        }
        Existing::Owned(current) if current.spec != desired.spec => {
            info!(scaled_object = %so_name, "Updating ScaledObject");
            let mut updated = current;
            updated.metadata.labels = desired.metadata.labels;
            updated.metadata.annotations = desired.metadata.annotations;
            updated.spec = desired.spec;
            ctx.scaled_objects
                .update(&updated)
                .await
                .map_err(|e| Error::resource("updating", SCALED_OBJECT_KIND, &so_name, e))?
        }
        Existing::Owned(current) => current,
    };

    let hpa = ctx
        .hpas
        .get(&namespace, &pa_name)
        .await
        .map_err(|e| Error::resource("getting", HPA_KIND, &pa_name, e))?
        .ok_or_else(|| Error::not_found(HPA_KIND, &pa_name))?;
    let (desired_replicas, current_replicas) = hpa
        .status
        .as_ref()
        .map(|s| (s.desired_replicas, s.current_replicas.unwrap_or(0)))
        .unwrap_or((0, 0));

    // An absent minReplicaCount disables the floor.
    if let Some(min) = scaled_object.spec.min_replica_count {
        if desired_replicas < min {
            return Err(Error::ScaleTargetInitializing {
                name: pa_name,
                desired: desired_replicas,
                min,
            });
        }
    }

    let sks = ctx
        .exposure
        .reconcile(pa, SksOperationMode::Serve, 0)
        .await?;

    let threshold = active_threshold(&config, pa);
    let status = status_mut(pa);
    status.metrics_service_name = sks.private_service_name().to_string();
    status.service_name = sks.service_name().to_string();

    if !sks.is_ready() {
        status.mark_sks_not_ready("SKS Services are not ready yet");
    } else {
        status.mark_sks_ready();
        if !status.is_scale_target_initialized() && current_replicas >= threshold {
            info!(current_replicas, threshold, "scale target initialized");
            status.mark_scale_target_initialized();
        }
    }

    status.mark_active();
    status.desired_scale = Some(desired_replicas);
    status.actual_scale = Some(current_replicas);
    Ok(())
}

fn status_mut(pa: &mut PodAutoscaler) -> &mut PodAutoscalerStatus {
    pa.status.get_or_insert_with(PodAutoscalerStatus::default)
}

/// Error policy for the controller
///
/// Waiting on KEDA retries quickly, ownership conflicts need a human and
/// retry slowly, everything else sits in between.
pub fn error_policy(pa: Arc<PodAutoscaler>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        pa = %pa.name_any(),
        namespace = %pa.namespace().unwrap_or_default(),
        "reconciliation failed"
    );

    let delay = if error.is_waiting() {
        5
    } else if error.is_not_owned() {
        60
    } else {
        15
    };
    Action::requeue(Duration::from_secs(delay))
}
