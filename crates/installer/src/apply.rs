//! Generic create-or-update
//!
//! Every installer expresses the desired state of an object as a mutate
//! function applied to either a fresh object or the live one. Writing is
//! skipped when the mutation leaves the live object unchanged, so applying
//! an identical desired state twice produces no second write.

use crate::error::InstallError;
use cluster_client::{ClusterClient, typed};
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// What `create_or_update` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Creates `object` if absent, otherwise brings the live object in line.
///
/// `object` only needs name and (for namespaced kinds) namespace set;
/// `mutate` fills in everything else and must not change either.
pub async fn create_or_update<K, F>(
    client: &dyn ClusterClient,
    object: K,
    mutate: F,
) -> Result<OperationResult, InstallError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    F: FnOnce(&mut K) -> Result<(), InstallError>,
{
    let kind = K::kind(&()).to_string();
    let namespace = object.meta().namespace.clone();
    let name = object
        .meta()
        .name
        .clone()
        .ok_or_else(|| InstallError::InvalidValues(format!("{} without name", kind)))?;

    match typed::get::<K>(client, namespace.as_deref(), &name).await? {
        None => {
            let mut desired = object;
            mutate(&mut desired)?;
            ensure_identity(&desired, &kind, namespace.as_deref(), &name)?;
            typed::create(client, &desired).await?;
            debug!(
                "Created {} {} on cluster {}",
                kind,
                qualified(namespace.as_deref(), &name),
                client.cluster_name()
            );
            Ok(OperationResult::Created)
        }
        Some(mut live) => {
            let before = serde_json::to_value(&live)?;
            mutate(&mut live)?;
            ensure_identity(&live, &kind, namespace.as_deref(), &name)?;
            if serde_json::to_value(&live)? == before {
                return Ok(OperationResult::Unchanged);
            }
            typed::replace(client, &live).await?;
            debug!(
                "Updated {} {} on cluster {}",
                kind,
                qualified(namespace.as_deref(), &name),
                client.cluster_name()
            );
            Ok(OperationResult::Updated)
        }
    }
}

/// Deletes an object; a missing object counts as success.
pub async fn delete_if_exists<K>(
    client: &dyn ClusterClient,
    namespace: Option<&str>,
    name: &str,
) -> Result<(), InstallError>
where
    K: Resource<DynamicType = ()>,
{
    match typed::delete::<K>(client, namespace, name).await {
        Ok(true) => {
            debug!(
                "Deleted {} {} on cluster {}",
                K::kind(&()),
                qualified(namespace, name),
                client.cluster_name()
            );
            Ok(())
        }
        Ok(false) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn ensure_identity<K>(object: &K, kind: &str, namespace: Option<&str>, name: &str) -> Result<(), InstallError>
where
    K: Resource,
{
    let meta = object.meta();
    if meta.name.as_deref() != Some(name) || meta.namespace.as_deref() != namespace {
        return Err(InstallError::IdentityChanged {
            kind: kind.to_string(),
            name: qualified(namespace, name),
        });
    }
    Ok(())
}

pub(crate) fn qualified(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_client::{MockClusterClient, Verb};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn empty(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ls-x".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn set_data(value: &'static str) -> impl FnOnce(&mut ConfigMap) -> Result<(), InstallError> {
        move |cm| {
            cm.data = Some(BTreeMap::from([("key".to_string(), value.to_string())]));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_then_unchanged() {
        let mock = MockClusterClient::new("workload");

        let first = create_or_update(&mock, empty("cm"), set_data("a")).await.unwrap();
        let second = create_or_update(&mock, empty("cm"), set_data("a")).await.unwrap();

        assert_eq!(first, OperationResult::Created);
        assert_eq!(second, OperationResult::Unchanged);
        assert_eq!(mock.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_update_on_change() {
        let mock = MockClusterClient::new("workload");
        create_or_update(&mock, empty("cm"), set_data("a")).await.unwrap();

        let result = create_or_update(&mock, empty("cm"), set_data("b")).await.unwrap();
        assert_eq!(result, OperationResult::Updated);
        assert!(mock.writes()[1].is(Verb::Replace, "ConfigMap"));

        let stored: ConfigMap = mock.object(Some("ls-x"), "cm").unwrap();
        assert_eq!(stored.data.unwrap()["key"], "b");
    }

    #[tokio::test]
    async fn test_mutation_must_keep_identity() {
        let mock = MockClusterClient::new("workload");
        let result = create_or_update(&mock, empty("cm"), |cm: &mut ConfigMap| {
            cm.metadata.name = Some("other".to_string());
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(InstallError::IdentityChanged { .. })));
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_delete_if_exists_tolerates_missing() {
        let mock = MockClusterClient::new("workload");
        delete_if_exists::<ConfigMap>(&mock, Some("ls-x"), "cm").await.unwrap();

        create_or_update(&mock, empty("cm"), set_data("a")).await.unwrap();
        delete_if_exists::<ConfigMap>(&mock, Some("ls-x"), "cm").await.unwrap();
        assert!(!mock.contains::<ConfigMap>(Some("ls-x"), "cm"));
    }
}
