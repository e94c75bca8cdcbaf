//! Autoscaler configuration
//!
//! Cluster-wide defaults come from the `config-autoscaler` ConfigMap in the
//! system namespace. The parsed, validated config lives in a [`ConfigStore`]
//! that every reconcile snapshots once; changes to the ConfigMap are pushed
//! into the store by [`run_config_watcher`] and trigger a full resync.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::crd::Metric;
use crate::{Error, Result};

/// Default name of the autoscaler ConfigMap
pub const DEFAULT_CONFIG_MAP_NAME: &str = "config-autoscaler";
/// Default namespace holding the autoscaler ConfigMap
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "knative-serving";

/// Default Prometheus endpoint for custom-metric triggers
pub const DEFAULT_PROMETHEUS_ADDRESS: &str = "http://prometheus-operated.default.svc:9090";
/// Default PromQL template for custom-metric triggers
pub const DEFAULT_PROMETHEUS_QUERY_TEMPLATE: &str = "sum(rate({metric}{}[1m]))";

const METRIC_PLACEHOLDER: &str = "{metric}";

/// Cluster-wide autoscaler defaults
#[derive(Clone, Debug, PartialEq)]
pub struct AutoscalerConfig {
    /// Replicas a new revision must reach before it counts as initialized
    pub initial_scale: i32,
    /// Whether a PA may ask for an initial scale of zero
    pub allow_zero_initial_scale: bool,
    /// Default lower bound
    pub min_scale: i32,
    /// Default upper bound (0 = unbounded)
    pub max_scale: i32,
    /// Hard ceiling for `max_scale` (0 = no ceiling)
    pub max_scale_limit: i32,
    /// Prometheus server used by custom-metric triggers
    pub prometheus_address: String,
    /// PromQL template; `{metric}` is replaced by the metric name
    pub prometheus_query_template: String,
}

impl Default for AutoscalerConfig {
    fn default() -> Self {
        Self {
            initial_scale: 1,
            allow_zero_initial_scale: false,
            min_scale: 0,
            max_scale: 0,
            max_scale_limit: 0,
            prometheus_address: DEFAULT_PROMETHEUS_ADDRESS.to_string(),
            prometheus_query_template: DEFAULT_PROMETHEUS_QUERY_TEMPLATE.to_string(),
        }
    }
}

impl AutoscalerConfig {
    /// Parse and validate ConfigMap data. Missing keys keep their defaults,
    /// unknown keys are ignored.
    pub fn from_config_map(data: &BTreeMap<String, String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = data.get("initial-scale") {
            config.initial_scale = parse_i32("initial-scale", v)?;
        }
        if let Some(v) = data.get("allow-zero-initial-scale") {
            config.allow_zero_initial_scale = parse_bool("allow-zero-initial-scale", v)?;
        }
        if let Some(v) = data.get("min-scale") {
            config.min_scale = parse_i32("min-scale", v)?;
        }
        if let Some(v) = data.get("max-scale") {
            config.max_scale = parse_i32("max-scale", v)?;
        }
        if let Some(v) = data.get("max-scale-limit") {
            config.max_scale_limit = parse_i32("max-scale-limit", v)?;
        }
        if let Some(v) = data.get("prometheus-address") {
            config.prometheus_address = v.trim().to_string();
        }
        if let Some(v) = data.get("prometheus-query-template") {
            config.prometheus_query_template = v.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("initial-scale", self.initial_scale),
            ("min-scale", self.min_scale),
            ("max-scale", self.max_scale),
            ("max-scale-limit", self.max_scale_limit),
        ] {
            if value < 0 {
                return Err(Error::config(format!("{key} must be >= 0, got {value}")));
            }
        }

        if self.initial_scale == 0 && !self.allow_zero_initial_scale {
            return Err(Error::config(
                "initial-scale = 0 requires allow-zero-initial-scale = true",
            ));
        }

        if self.max_scale > 0 && self.max_scale < self.min_scale {
            return Err(Error::config(format!(
                "max-scale ({}) must be >= min-scale ({})",
                self.max_scale, self.min_scale
            )));
        }

        if self.max_scale_limit > 0 && (self.max_scale < 1 || self.max_scale > self.max_scale_limit)
        {
            return Err(Error::config(format!(
                "max-scale ({}) must be in 1..={} when max-scale-limit is set",
                self.max_scale, self.max_scale_limit
            )));
        }

        if self.prometheus_address.is_empty() {
            return Err(Error::config("prometheus-address must not be empty"));
        }

        if !self.prometheus_query_template.contains(METRIC_PLACEHOLDER) {
            return Err(Error::config(format!(
                "prometheus-query-template must contain {METRIC_PLACEHOLDER}"
            )));
        }

        Ok(())
    }

    /// Default PromQL query for a metric
    pub fn query_for(&self, metric: &Metric) -> String {
        self.prometheus_query_template
            .replace(METRIC_PLACEHOLDER, metric.as_str())
    }
}

fn parse_i32(key: &str, value: &str) -> Result<i32> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("invalid {key} {value:?}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(Error::config(format!("invalid {key} {other:?}: not a boolean"))),
    }
}

/// Shared holder of the current [`AutoscalerConfig`]
///
/// Readers take an `Arc` snapshot; writers replace it wholesale. Subscribers
/// are notified on every replacement.
#[derive(Debug)]
pub struct ConfigStore {
    tx: watch::Sender<Arc<AutoscalerConfig>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(AutoscalerConfig::default())
    }
}

impl ConfigStore {
    /// Create a store holding `config`
    pub fn new(config: AutoscalerConfig) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self { tx }
    }

    /// Snapshot of the current config
    pub fn current(&self) -> Arc<AutoscalerConfig> {
        self.tx.borrow().clone()
    }

    /// Replace the current config and notify subscribers
    pub fn update(&self, config: AutoscalerConfig) {
        self.tx.send_replace(Arc::new(config));
    }

    /// Receiver notified on every [`ConfigStore::update`]
    pub fn subscribe(&self) -> watch::Receiver<Arc<AutoscalerConfig>> {
        self.tx.subscribe()
    }

    /// Parse a ConfigMap and swap it in. An invalid ConfigMap leaves the
    /// previous config in place.
    pub fn apply_config_map(&self, cm: &ConfigMap) -> Result<()> {
        let empty = BTreeMap::new();
        let data = cm.data.as_ref().unwrap_or(&empty);
        let config = AutoscalerConfig::from_config_map(data)?;
        if *self.current() != config {
            self.update(config);
        }
        Ok(())
    }
}

/// Stream yielding once per config change, for `Controller::reconcile_all_on`.
///
/// Changes that arrive while a reload is still pending coalesce into it.
/// Must be called from within a tokio runtime.
pub fn reload_trigger(store: &ConfigStore) -> ReceiverStream<()> {
    let mut changes = store.subscribe();
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(()) {
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}

/// Keep `store` in sync with the named ConfigMap until the watch ends.
///
/// Deleting the ConfigMap keeps the last good config.
pub async fn run_config_watcher(
    client: Client,
    namespace: String,
    name: String,
    store: Arc<ConfigStore>,
) {
    let api: Api<ConfigMap> = Api::namespaced(client, &namespace);
    let watcher_config = watcher::Config::default().fields(&format!("metadata.name={name}"));
    let mut stream = std::pin::pin!(watcher::watcher(api, watcher_config));

    info!(namespace = %namespace, config_map = %name, "Watching autoscaler config");

    while let Some(event) = stream.next().await {
        match event {
            Ok(Event::Apply(cm)) | Ok(Event::InitApply(cm)) => match store.apply_config_map(&cm) {
                Ok(()) => info!(config = ?store.current(), "Autoscaler config loaded"),
                Err(e) => warn!(error = %e, "Ignoring invalid autoscaler config"),
            },
            Ok(Event::Delete(_)) => {
                warn!(config_map = %name, "Autoscaler config deleted, keeping last config");
            }
            Ok(Event::Init) | Ok(Event::InitDone) => {
                debug!(config_map = %name, "Autoscaler config watch (re)started");
            }
            Err(e) => warn!(error = %e, "Autoscaler config watch error"),
        }
    }
}
