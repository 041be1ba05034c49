//! ClusterClient trait
//!
//! Object-level access to one Kubernetes API endpoint. The controller talks
//! to up to three clusters per reconciliation (platform, control plane,
//! workload); all of them are reached through this trait so that tests can
//! swap in the in-memory mock.

use crate::error::ClusterError;
use kube::discovery::ApiResource;
use serde_json::Value;
use std::collections::BTreeMap;

/// Trait for cluster API operations
///
/// Objects travel as JSON values; the typed helpers in [`crate::typed`]
/// convert from and to concrete resource types. All async methods must be
/// `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// Name of the cluster, used in logs and error messages
    fn cluster_name(&self) -> &str;

    /// Fetch an object; `Ok(None)` when it does not exist.
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, ClusterError>;

    /// List objects whose labels include all of `labels`; all namespaces when
    /// `namespace` is `None`.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Value>, ClusterError>;

    /// Create an object; fails with `Conflict` when it already exists.
    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        object: &Value,
    ) -> Result<Value, ClusterError>;

    /// Replace an existing object.
    async fn replace(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        object: &Value,
    ) -> Result<Value, ClusterError>;

    /// Apply a JSON merge patch to an object.
    async fn patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &Value,
    ) -> Result<Value, ClusterError>;

    /// Merge-patch the status subresource of an object.
    async fn patch_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        status: &Value,
    ) -> Result<Value, ClusterError>;

    /// Delete an object; `Ok(false)` when it did not exist.
    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError>;
}

impl std::fmt::Debug for dyn ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClusterClient({})", self.cluster_name())
    }
}
