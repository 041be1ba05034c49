//! Request/grant flow against the platform API
//!
//! 1. Create a `ClusterRequest` named after the instance and wait until it
//!    is granted.
//! 2. Create an `AccessRequest` for the granted cluster with full
//!    permissions and wait until it is granted.
//! 3. Read the kubeconfig from the secret the access request points at.
//!
//! Requests are created once and then only read, so repeated calls pick up
//! where the previous one stopped. A denial at either stage ends the call.
//! Both requests are deleted again when the instance is released.

use super::secret::read_kubeconfig;
use super::{ClientFactory, ClusterAccess, CredentialResolver};
use crate::error::CredentialError;
use cluster_client::{ClusterClient, typed};
use crds::{
    AccessRequest, AccessRequestSpec, ClusterRequest, ClusterRequestSpec, LandscaperInstance,
    PermissionRule, PlatformRequest, RequestPhase,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Delay between two looks at a pending request
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Purpose stated on cluster requests
pub const CLUSTER_PURPOSE: &str = "mcp";

/// Resolves access by asking the platform for a cluster and credentials
#[derive(Clone)]
pub struct AccessRequestResolver {
    platform: Arc<dyn ClusterClient>,
    factory: Arc<dyn ClientFactory>,
    poll_interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for AccessRequestResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessRequestResolver")
            .field("platform", &self.platform)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AccessRequestResolver {
    /// `timeout` bounds the wait for each of the two requests.
    pub fn new(platform: Arc<dyn ClusterClient>, factory: Arc<dyn ClientFactory>, timeout: Duration) -> Self {
        Self {
            platform,
            factory,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout,
        }
    }

    #[cfg(test)]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Creates `request` unless an object of that name exists already.
    async fn ensure_request<K>(&self, request: K) -> Result<(), CredentialError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let namespace = request.meta().namespace.clone();
        let name = request.name_any();
        if typed::get::<K>(self.platform.as_ref(), namespace.as_deref(), &name)
            .await?
            .is_some()
        {
            return Ok(());
        }

        match typed::create(self.platform.as_ref(), &request).await {
            Ok(_) => {
                info!(
                    "Created {} {}/{}",
                    K::kind(&()),
                    namespace.as_deref().unwrap_or_default(),
                    name
                );
                Ok(())
            }
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Polls a request until it is granted, denied or the timeout passes.
    async fn await_grant<K>(&self, namespace: &str, name: &str) -> Result<K, CredentialError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + PlatformRequest,
    {
        let kind = K::kind(&()).to_string();
        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(request) = typed::get::<K>(self.platform.as_ref(), Some(namespace), name).await? {
                match request.request_phase() {
                    RequestPhase::Granted => return Ok(request),
                    RequestPhase::Denied => {
                        return Err(CredentialError::Denied {
                            kind,
                            name: format!("{}/{}", namespace, name),
                            message: request.request_message().unwrap_or("no reason given").to_string(),
                        });
                    }
                    RequestPhase::Pending => {}
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CredentialError::Timeout {
                    kind,
                    name: format!("{}/{}", namespace, name),
                    timeout: self.timeout,
                });
            }
            debug!("{} {}/{} is pending, checking again in {:?}", kind, namespace, name, self.poll_interval);
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

fn metadata(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

#[async_trait::async_trait]
impl CredentialResolver for AccessRequestResolver {
    async fn resolve(&self, instance: &LandscaperInstance) -> Result<ClusterAccess, CredentialError> {
        let namespace = instance.namespace().unwrap_or_default();
        let name = instance.name_any();
        let qualified = format!("{}/{}", namespace, name);

        self.ensure_request(ClusterRequest {
            metadata: metadata(&namespace, &name),
            spec: ClusterRequestSpec {
                purpose: CLUSTER_PURPOSE.to_string(),
            },
            status: None,
        })
        .await?;
        let cluster_request: ClusterRequest = self.await_grant(&namespace, &name).await?;
        let cluster = cluster_request
            .status
            .and_then(|s| s.cluster)
            .ok_or_else(|| CredentialError::IncompleteGrant {
                kind: "ClusterRequest".to_string(),
                name: qualified.clone(),
                missing: "cluster".to_string(),
            })?;
        debug!("ClusterRequest {} granted cluster {}", qualified, cluster.name);

        self.ensure_request(AccessRequest {
            metadata: metadata(&namespace, &name),
            spec: AccessRequestSpec {
                cluster_ref: cluster,
                permissions: vec![PermissionRule::cluster_admin()],
            },
            status: None,
        })
        .await?;
        let access_request: AccessRequest = self.await_grant(&namespace, &name).await?;
        let secret_ref = access_request
            .status
            .and_then(|s| s.secret_ref)
            .ok_or_else(|| CredentialError::IncompleteGrant {
                kind: "AccessRequest".to_string(),
                name: qualified.clone(),
                missing: "secret".to_string(),
            })?;

        let kubeconfig = read_kubeconfig(
            self.platform.as_ref(),
            secret_ref.namespace_or(&namespace),
            &secret_ref.name,
        )
        .await?;
        let client = self
            .factory
            .from_kubeconfig(&format!("mcp/{}", qualified), &kubeconfig)
            .await?;
        Ok(ClusterAccess { kubeconfig, client })
    }

    async fn release(&self, instance: &LandscaperInstance) -> Result<(), CredentialError> {
        let namespace = instance.namespace().unwrap_or_default();
        let name = instance.name_any();

        // access before cluster: the grant refers to the cluster
        if typed::delete::<AccessRequest>(self.platform.as_ref(), Some(&namespace), &name).await? {
            info!("Deleted AccessRequest {}/{}", namespace, name);
        }
        if typed::delete::<ClusterRequest>(self.platform.as_ref(), Some(&namespace), &name).await? {
            info!("Deleted ClusterRequest {}/{}", namespace, name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{StaticClientFactory, access_secret, grant_access_requests, grant_cluster_requests, instance};
    use cluster_client::{MockClusterClient, Verb};
    use serde_json::json;

    fn resolver(platform: &MockClusterClient, factory: &StaticClientFactory) -> AccessRequestResolver {
        AccessRequestResolver::new(
            Arc::new(platform.clone()),
            Arc::new(factory.clone()),
            Duration::from_millis(60),
        )
        .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_granted_requests_yield_access() {
        let platform = MockClusterClient::new("platform");
        grant_cluster_requests(&platform);
        grant_access_requests(&platform);
        platform.insert(&access_secret("clusters", "tenant-a-access", b"granted-kubeconfig"));
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));

        let access = resolver(&platform, &factory)
            .resolve(&instance("project-x", "tenant-a"))
            .await
            .unwrap();

        assert_eq!(access.kubeconfig, b"granted-kubeconfig");
        let access_request: AccessRequest = platform.object(Some("project-x"), "tenant-a").unwrap();
        assert_eq!(access_request.spec.cluster_ref.name, "mcp-tenant-a");
        assert_eq!(access_request.spec.cluster_ref.namespace.as_deref(), Some("clusters"));
        assert_eq!(access_request.spec.permissions, vec![PermissionRule::cluster_admin()]);
    }

    #[tokio::test]
    async fn test_existing_requests_are_not_recreated() {
        let platform = MockClusterClient::new("platform");
        grant_cluster_requests(&platform);
        grant_access_requests(&platform);
        platform.insert(&access_secret("clusters", "tenant-a-access", b"granted-kubeconfig"));
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));
        let resolver = resolver(&platform, &factory);

        resolver.resolve(&instance("project-x", "tenant-a")).await.unwrap();
        platform.clear_writes();
        resolver.resolve(&instance("project-x", "tenant-a")).await.unwrap();

        assert!(platform.writes().is_empty());
        assert_eq!(factory.kubeconfigs().len(), 2);
    }

    #[tokio::test]
    async fn test_denied_cluster_request_is_terminal() {
        let platform = MockClusterClient::new("platform");
        platform.on_create("ClusterRequest", |request| {
            request["status"] = json!({ "phase": "Denied", "message": "quota exceeded" });
        });
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));

        let err = resolver(&platform, &factory)
            .resolve(&instance("project-x", "tenant-a"))
            .await
            .unwrap_err();

        match err {
            CredentialError::Denied { kind, message, .. } => {
                assert_eq!(kind, "ClusterRequest");
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(platform.count::<AccessRequest>(), 0);
        assert!(factory.kubeconfigs().is_empty());
    }

    #[tokio::test]
    async fn test_denied_access_request_is_terminal() {
        let platform = MockClusterClient::new("platform");
        grant_cluster_requests(&platform);
        platform.on_create("AccessRequest", |request| {
            request["status"] = json!({ "phase": "Denied" });
        });
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));

        let err = resolver(&platform, &factory)
            .resolve(&instance("project-x", "tenant-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Denied { ref kind, .. } if kind == "AccessRequest"));
    }

    #[tokio::test]
    async fn test_pending_request_times_out() {
        let platform = MockClusterClient::new("platform");
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));

        let err = resolver(&platform, &factory)
            .resolve(&instance("project-x", "tenant-a"))
            .await
            .unwrap_err();

        assert!(matches!(err, CredentialError::Timeout { ref kind, .. } if kind == "ClusterRequest"));
        assert_eq!(platform.count::<ClusterRequest>(), 1);
        let creates = platform
            .writes()
            .into_iter()
            .filter(|w| w.is(Verb::Create, "ClusterRequest"))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn test_grant_without_secret_reference_is_rejected() {
        let platform = MockClusterClient::new("platform");
        grant_cluster_requests(&platform);
        platform.on_create("AccessRequest", |request| {
            request["status"] = json!({ "phase": "Granted" });
        });
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));

        let err = resolver(&platform, &factory)
            .resolve(&instance("project-x", "tenant-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::IncompleteGrant { ref missing, .. } if missing == "secret"));
    }

    #[tokio::test]
    async fn test_release_deletes_both_requests() {
        let platform = MockClusterClient::new("platform");
        grant_cluster_requests(&platform);
        grant_access_requests(&platform);
        platform.insert(&access_secret("clusters", "tenant-a-access", b"granted-kubeconfig"));
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));
        let resolver = resolver(&platform, &factory);
        let lsi = instance("project-x", "tenant-a");

        resolver.resolve(&lsi).await.unwrap();
        resolver.release(&lsi).await.unwrap();

        assert_eq!(platform.count::<ClusterRequest>(), 0);
        assert_eq!(platform.count::<AccessRequest>(), 0);
        assert!(platform.contains::<k8s_openapi::api::core::v1::Secret>(Some("clusters"), "tenant-a-access"));
    }

    #[tokio::test]
    async fn test_release_without_requests_is_a_noop() {
        let platform = MockClusterClient::new("platform");
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));

        resolver(&platform, &factory)
            .release(&instance("project-x", "tenant-a"))
            .await
            .unwrap();
        assert!(platform.writes().is_empty());
    }

    #[tokio::test]
    async fn test_release_failure_is_reported() {
        let platform = MockClusterClient::new("platform");
        platform.fail_on(Verb::Delete, "AccessRequest");
        let factory = StaticClientFactory::new(MockClusterClient::new("mcp"));

        let err = resolver(&platform, &factory)
            .release(&instance("project-x", "tenant-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Cluster(_)));
    }
}
