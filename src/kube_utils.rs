//! Shared Kubernetes helpers
//!
//! [`KubeResourceClient`] is the single `kube::Api` wrapper behind every
//! client trait in [`crate::controller`]. [`classify_existing`] is the
//! ownership check that decides whether a dependent may be updated.

use std::fmt::Debug;
use std::marker::PhantomData;

use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// Outcome of looking up a dependent resource
#[derive(Clone, Debug, PartialEq)]
pub enum Existing<K> {
    /// Nothing exists under the name
    Absent,
    /// Something exists but another controller (or nobody) owns it
    NotOwned(K),
    /// Exists and is controlled by the owner
    Owned(K),
}

/// Returns true if `obj` has a controller owner reference with `owner_uid`
pub fn is_controlled_by<K: Resource>(obj: &K, owner_uid: &str) -> bool {
    obj.meta()
        .owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.controller == Some(true) && r.uid == owner_uid)
}

/// Sort a lookup result into absent / not owned / owned
pub fn classify_existing<K: Resource>(existing: Option<K>, owner_uid: &str) -> Existing<K> {
    match existing {
        None => Existing::Absent,
        Some(obj) if is_controlled_by(&obj, owner_uid) => Existing::Owned(obj),
        Some(obj) => Existing::NotOwned(obj),
    }
}

/// Thin typed wrapper over `kube::Api` for namespaced resources
pub struct KubeResourceClient<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for KubeResourceClient<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> KubeResourceClient<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    /// Create a new client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn target(obj: &K) -> Result<(String, String)> {
        let namespace = obj.namespace().ok_or_else(|| {
            Error::validation(format!("{} has no namespace", K::kind(&())))
        })?;
        let name = obj.meta().name.clone().ok_or_else(|| {
            Error::validation(format!("{} has no name", K::kind(&())))
        })?;
        Ok((namespace, name))
    }

    /// Get by name; `None` when it does not exist
    pub async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    /// Create the object in its own namespace
    pub async fn create(&self, obj: &K) -> Result<K> {
        let (namespace, _) = Self::target(obj)?;
        Ok(self
            .api(&namespace)
            .create(&PostParams::default(), obj)
            .await?)
    }

    /// Replace the object. The object's resourceVersion guards the write.
    pub async fn replace(&self, obj: &K) -> Result<K> {
        let (namespace, name) = Self::target(obj)?;
        Ok(self
            .api(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await?)
    }

    /// Merge-patch the status subresource
    pub async fn patch_status<S: Serialize + Sync>(
        &self,
        namespace: &str,
        name: &str,
        status: &S,
    ) -> Result<K> {
        let patch = serde_json::json!({ "status": status });
        Ok(self
            .api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }
}
