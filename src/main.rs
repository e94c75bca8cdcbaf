//! serving-keda - KEDA-backed PodAutoscaler controller for Knative Serving

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use serving_keda::config::{
    reload_trigger, run_config_watcher, ConfigStore, DEFAULT_CONFIG_MAP_NAME,
    DEFAULT_SYSTEM_NAMESPACE,
};
use serving_keda::controller::{error_policy, reconcile, Context};
use serving_keda::crd::{PodAutoscaler, ScaledObject, ServerlessService, KEDA_CLASS};

/// serving-keda - reconciles Knative PodAutoscalers into KEDA ScaledObjects
#[derive(Parser, Debug)]
#[command(name = "serving-keda", version, about, long_about = None)]
struct Cli {
    /// Print the PodAutoscaler, ServerlessService and ScaledObject CRDs and exit
    #[arg(long)]
    crd: bool,

    /// Autoscaler class handled by this controller
    #[arg(long, env = "AUTOSCALER_CLASS", default_value = KEDA_CLASS)]
    class: String,

    /// Namespace holding the autoscaler ConfigMap
    #[arg(long, env = "SYSTEM_NAMESPACE", default_value = DEFAULT_SYSTEM_NAMESPACE)]
    config_namespace: String,

    /// Name of the autoscaler ConfigMap
    #[arg(long, default_value = DEFAULT_CONFIG_MAP_NAME)]
    config_map: String,

    /// Deadline for a single reconcile, in seconds
    #[arg(long, default_value = "30")]
    reconcile_timeout_secs: u64,

    /// Requeue period for healthy PodAutoscalers, in seconds
    #[arg(long, default_value = "300")]
    resync_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.crd {
        for crd in [
            PodAutoscaler::crd(),
            ServerlessService::crd(),
            ScaledObject::crd(),
        ] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    run_controller(cli).await
}

/// Run the PodAutoscaler controller until a shutdown signal arrives
async fn run_controller(cli: Cli) -> anyhow::Result<()> {
    tracing::info!(class = %cli.class, "serving-keda controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let store = Arc::new(load_config(&client, &cli.config_namespace, &cli.config_map).await?);
    tokio::spawn(run_config_watcher(
        client.clone(),
        cli.config_namespace.clone(),
        cli.config_map.clone(),
        store.clone(),
    ));

    let ctx = Arc::new(
        Context::builder(client.clone())
            .config_store(store.clone())
            .class(cli.class)
            .reconcile_timeout(Duration::from_secs(cli.reconcile_timeout_secs))
            .resync_period(Duration::from_secs(cli.resync_secs))
            .build(),
    );

    let pod_autoscalers: Api<PodAutoscaler> = Api::all(client.clone());
    let scaled_objects: Api<ScaledObject> = Api::all(client.clone());
    let serverless_services: Api<ServerlessService> = Api::all(client.clone());
    let hpas: Api<HorizontalPodAutoscaler> = Api::all(client.clone());

    tracing::info!("Starting PodAutoscaler controller...");

    // HPAs are created by KEDA, not by us, so they carry no owner reference
    // back to the PA; they share its name instead.
    Controller::new(pod_autoscalers, WatcherConfig::default())
        .owns(scaled_objects, WatcherConfig::default())
        .owns(serverless_services, WatcherConfig::default())
        .watches(hpas, WatcherConfig::default(), |hpa| {
            hpa.namespace()
                .map(|ns| ObjectRef::<PodAutoscaler>::new(&hpa.name_any()).within(&ns))
        })
        .reconcile_all_on(reload_trigger(&store))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((pa, action)) => {
                    tracing::debug!(pa = %pa.name, ?action, "PodAutoscaler reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "PodAutoscaler reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("serving-keda controller shutting down");
    Ok(())
}

/// Read the autoscaler ConfigMap once before reconciling anything.
///
/// A missing ConfigMap means defaults; an invalid one stops startup.
async fn load_config(client: &Client, namespace: &str, name: &str) -> anyhow::Result<ConfigStore> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let store = ConfigStore::default();

    match api
        .get_opt(name)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read ConfigMap {}/{}: {}", namespace, name, e))?
    {
        Some(cm) => {
            store
                .apply_config_map(&cm)
                .map_err(|e| anyhow::anyhow!("Invalid ConfigMap {}/{}: {}", namespace, name, e))?;
            tracing::info!(config = ?store.current(), "Loaded autoscaler config");
        }
        None => {
            tracing::warn!(%namespace, %name, "Autoscaler ConfigMap not found, using defaults");
        }
    }

    Ok(store)
}
