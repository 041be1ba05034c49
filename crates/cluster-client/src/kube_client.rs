//! kube-rs backed ClusterClient

use crate::client::ClusterClient;
use crate::error::ClusterError;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::debug;

/// ClusterClient talking to a real API server through kube-rs.
#[derive(Clone)]
pub struct KubeClusterClient {
    name: String,
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Wraps an existing kube client.
    pub fn new(name: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    /// Builds a client from the ambient configuration (in-cluster or `KUBECONFIG`).
    pub async fn try_default(name: impl Into<String>) -> Result<Self, ClusterError> {
        let name = name.into();
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterError::from_kube(&name, e))?;
        Ok(Self::new(name, client))
    }

    /// Builds a client from raw kubeconfig bytes.
    pub async fn from_kubeconfig(
        name: impl Into<String>,
        kubeconfig: &[u8],
    ) -> Result<Self, ClusterError> {
        let name = name.into();
        let raw = std::str::from_utf8(kubeconfig)
            .map_err(|e| ClusterError::Kubeconfig(format!("kubeconfig for {} is not UTF-8: {}", name, e)))?;
        let kubeconfig = Kubeconfig::from_yaml(raw)
            .map_err(|e| ClusterError::Kubeconfig(format!("failed to parse kubeconfig for {}: {}", name, e)))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ClusterError::Kubeconfig(format!("failed to load kubeconfig for {}: {}", name, e)))?;
        let client = Client::try_from(config).map_err(|e| ClusterError::from_kube(&name, e))?;
        Ok(Self::new(name, client))
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    fn kube_err(&self, error: kube::Error) -> ClusterError {
        ClusterError::from_kube(&self.name, error)
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, ClusterError> {
        let object = self
            .api(resource, namespace)
            .get_opt(name)
            .await
            .map_err(|e| self.kube_err(e))?;
        object.map(serde_json::to_value).transpose().map_err(Into::into)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>, ClusterError> {
        let selector = labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        let objects = self
            .api(resource, namespace)
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| self.kube_err(e))?;
        objects
            .items
            .into_iter()
            .map(|o| serde_json::to_value(o).map_err(Into::into))
            .collect()
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ClusterError> {
        let object: DynamicObject = serde_json::from_value(object.clone())?;
        debug!("Creating {} {:?} on cluster {}", resource.kind, object.metadata.name, self.name);
        let created = self
            .api(resource, namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| self.kube_err(e))?;
        Ok(serde_json::to_value(created)?)
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value, ClusterError> {
        let object: DynamicObject = serde_json::from_value(object.clone())?;
        debug!("Replacing {} {} on cluster {}", resource.kind, name, self.name);
        let replaced = self
            .api(resource, namespace)
            .replace(name, &PostParams::default(), &object)
            .await
            .map_err(|e| self.kube_err(e))?;
        Ok(serde_json::to_value(replaced)?)
    }

    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<Value, ClusterError> {
        let patched = self
            .api(resource, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| self.kube_err(e))?;
        Ok(serde_json::to_value(patched)?)
    }

    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        status: &Value,
    ) -> Result<Value, ClusterError> {
        let patch = json!({ "status": status });
        let patched = self
            .api(resource, namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| self.kube_err(e))?;
        Ok(serde_json::to_value(patched)?)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError> {
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match self.kube_err(e) {
                ClusterError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }
}
