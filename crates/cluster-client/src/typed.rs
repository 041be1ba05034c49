//! Typed helpers on top of [`ClusterClient`]
//!
//! These convert between concrete resource types (k8s-openapi structs and
//! our CRDs) and the JSON values the trait transports.

use crate::client::ClusterClient;
use crate::error::ClusterError;
use kube::Resource;
use kube::discovery::ApiResource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// ApiResource of a statically typed resource.
pub fn api_resource<K>() -> ApiResource
where
    K: Resource<DynamicType = ()>,
{
    ApiResource::erase::<K>(&())
}

/// Fetch a typed object; `Ok(None)` when it does not exist.
pub async fn get<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    name: &str,
) -> Result<Option<K>, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = api_resource::<K>();
    match client.get(&resource, namespace, name).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// List typed objects carrying all of `labels`.
pub async fn list<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    labels: &BTreeMap<String, String>,
) -> Result<Vec<K>, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = api_resource::<K>();
    client
        .list(&resource, namespace, labels)
        .await?
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(Into::into))
        .collect()
}

/// Create a typed object in the namespace named by its metadata.
pub async fn create<K>(client: &dyn ClusterClient, object: &K) -> Result<K, ClusterError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let resource = api_resource::<K>();
    let value = serde_json::to_value(object)?;
    let created = client
        .create(&resource, object.meta().namespace.as_deref(), &value)
        .await?;
    Ok(serde_json::from_value(created)?)
}

/// Replace a typed object identified by its metadata.
pub async fn replace<K>(client: &dyn ClusterClient, object: &K) -> Result<K, ClusterError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let resource = api_resource::<K>();
    let name = object
        .meta()
        .name
        .clone()
        .ok_or_else(|| ClusterError::InvalidObject(format!("{} without name", resource.kind)))?;
    let value = serde_json::to_value(object)?;
    let replaced = client
        .replace(&resource, object.meta().namespace.as_deref(), &name, &value)
        .await?;
    Ok(serde_json::from_value(replaced)?)
}

/// Apply a JSON merge patch to a typed object.
pub async fn patch<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    name: &str,
    patch: &serde_json::Value,
) -> Result<K, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = api_resource::<K>();
    let patched = client.patch(&resource, namespace, name, patch).await?;
    Ok(serde_json::from_value(patched)?)
}

/// Merge-patch the status subresource of a typed object.
pub async fn patch_status<K, S>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    name: &str,
    status: &S,
) -> Result<K, ClusterError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
    S: Serialize,
{
    let resource = api_resource::<K>();
    let status = serde_json::to_value(status)?;
    let patched = client.patch_status(&resource, namespace, name, &status).await?;
    Ok(serde_json::from_value(patched)?)
}

/// Delete a typed object; `Ok(false)` when it did not exist.
pub async fn delete<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    name: &str,
) -> Result<bool, ClusterError>
where
    K: Resource<DynamicType = ()>,
{
    let resource = api_resource::<K>();
    client.delete(&resource, namespace, name).await
}
