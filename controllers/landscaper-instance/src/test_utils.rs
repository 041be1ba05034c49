//! Test helpers shared by the controller tests

use crate::credentials::{AccessRequestResolver, ClientFactory, CredentialResolver, SecretCredentialResolver};
use crate::error::CredentialError;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cluster_client::{ClusterClient, MockClusterClient};
use crds::{
    KUBECONFIG_KEY, LandscaperInstance, LandscaperInstanceSpec, LandscaperProviderConfig,
    LandscaperProviderConfigSpec, VersionEntry,
};
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Kubeconfig of a control plane as stored in its access secret
pub const MCP_KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
clusters:
- name: mcp
  cluster:
    server: https://mcp.example:443
contexts:
- name: mcp
  context:
    cluster: mcp
    user: admin
current-context: mcp
users:
- name: admin
  user:
    token: admin-token
"#;

/// Version advertised by [`provider_config`]
pub const VERSION: &str = "v0.127.0";

/// Components deployed into every workload namespace
pub const DEPLOYMENTS: [&str; 4] = [
    "manifest-deployer",
    "helm-deployer",
    "landscaper-controller",
    "landscaper-webhooks",
];

/// Hands out one mock cluster for every kubeconfig and remembers the kubeconfigs.
#[derive(Debug, Clone)]
pub struct StaticClientFactory {
    client: MockClusterClient,
    kubeconfigs: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl StaticClientFactory {
    pub fn new(client: MockClusterClient) -> Self {
        Self {
            client,
            kubeconfigs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn kubeconfigs(&self) -> Vec<Vec<u8>> {
        self.kubeconfigs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ClientFactory for StaticClientFactory {
    async fn from_kubeconfig(&self, _name: &str, kubeconfig: &[u8]) -> Result<Arc<dyn ClusterClient>, CredentialError> {
        self.kubeconfigs.lock().unwrap().push(kubeconfig.to_vec());
        Ok(Arc::new(self.client.clone()))
    }
}

pub fn access_secret(namespace: &str, name: &str, kubeconfig: &[u8]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            KUBECONFIG_KEY.to_string(),
            ByteString(kubeconfig.to_vec()),
        )])),
        ..Default::default()
    }
}

pub fn instance(namespace: &str, name: &str) -> LandscaperInstance {
    LandscaperInstance {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            generation: Some(1),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: LandscaperInstanceSpec {
            version: VERSION.to_string(),
            provider_config_ref: None,
        },
        status: None,
    }
}

/// The controller-wide default provider config, offering [`VERSION`]
pub fn provider_config() -> LandscaperProviderConfig {
    LandscaperProviderConfig {
        metadata: ObjectMeta {
            name: Some(crate::config::DEFAULT_PROVIDER_CONFIG.to_string()),
            ..Default::default()
        },
        spec: LandscaperProviderConfigSpec {
            repository: "registry.example/landscaper".to_string(),
            versions: vec![VersionEntry {
                version: VERSION.to_string(),
                image_paths: None,
            }],
            image_paths: Default::default(),
            image_overrides: Default::default(),
            image_pull_secrets: Vec::new(),
            deployment: Default::default(),
            verbosity: None,
        },
    }
}

/// Makes the mock token controller fill in every service account token secret.
pub fn issue_tokens(mcp: &MockClusterClient) {
    mcp.on_create("Secret", |secret| {
        if secret["type"] == "kubernetes.io/service-account-token" {
            secret["data"] = json!({
                "token": STANDARD.encode("sa-token"),
                "ca.crt": STANDARD.encode("mcp-ca"),
            });
        }
    });
}

/// Makes the mock platform grant every ClusterRequest with cluster `clusters/mcp-tenant-a`.
pub fn grant_cluster_requests(platform: &MockClusterClient) {
    platform.on_create("ClusterRequest", |request| {
        request["status"] = json!({
            "phase": "Granted",
            "cluster": { "name": "mcp-tenant-a", "namespace": "clusters" },
        });
    });
}

/// Makes the mock platform grant every AccessRequest with secret `clusters/tenant-a-access`.
pub fn grant_access_requests(platform: &MockClusterClient) {
    platform.on_create("AccessRequest", |request| {
        request["status"] = json!({
            "phase": "Granted",
            "secretRef": { "name": "tenant-a-access", "namespace": "clusters" },
        });
    });
}

/// Makes every component Deployment of a namespace report itself available.
pub fn mark_deployments_ready(workload: &MockClusterClient, namespace: &str) {
    for name in DEPLOYMENTS {
        workload.update_object::<Deployment, _>(Some(namespace), name, |d| {
            let replicas = d["spec"]["replicas"].as_i64().unwrap_or(1);
            d["status"] = json!({
                "observedGeneration": d["metadata"]["generation"],
                "replicas": replicas,
                "updatedReplicas": replicas,
                "availableReplicas": replicas,
            });
        });
    }
}

/// Platform, control plane and workload cluster of one test, wired into a reconciler
pub struct TestEnv {
    pub platform: MockClusterClient,
    pub mcp: MockClusterClient,
    pub workload: MockClusterClient,
    pub reconciler: Reconciler,
}

impl TestEnv {
    /// An environment where `project-x/tenant-a` has its access secret and the
    /// default provider config exists.
    pub fn new() -> Self {
        let env = Self::with_resolver(|platform, factory| {
            Arc::new(SecretCredentialResolver::new(Arc::new(platform.clone()), Arc::new(factory)))
        });
        env.platform.insert(&access_secret(
            "project-x",
            "tenant-a.kubeconfig",
            MCP_KUBECONFIG.as_bytes(),
        ));
        env
    }

    /// An environment where the platform grants cluster and access requests
    /// right away.
    pub fn with_access_requests() -> Self {
        let env = Self::with_resolver(|platform, factory| {
            Arc::new(
                AccessRequestResolver::new(Arc::new(platform.clone()), Arc::new(factory), Duration::from_millis(60))
                    .with_poll_interval(Duration::from_millis(10)),
            )
        });
        grant_cluster_requests(&env.platform);
        grant_access_requests(&env.platform);
        env.platform
            .insert(&access_secret("clusters", "tenant-a-access", MCP_KUBECONFIG.as_bytes()));
        env
    }

    /// An environment with the default provider config, resolving credentials
    /// through whatever `credentials` builds.
    pub fn with_resolver<F>(credentials: F) -> Self
    where
        F: FnOnce(&MockClusterClient, StaticClientFactory) -> Arc<dyn CredentialResolver>,
    {
        let platform = MockClusterClient::new("platform");
        let mcp = MockClusterClient::new("mcp");
        let workload = MockClusterClient::new("workload");
        issue_tokens(&mcp);
        platform.insert(&provider_config());

        let credentials = credentials(&platform, StaticClientFactory::new(mcp.clone()));
        let reconciler = Reconciler::new(
            Arc::new(platform.clone()),
            Arc::new(workload.clone()),
            credentials,
            ReconcilerSettings {
                readiness_recheck: Duration::from_secs(7),
                ..Default::default()
            },
        );
        Self {
            platform,
            mcp,
            workload,
            reconciler,
        }
    }

    pub fn instance(&self) -> Option<LandscaperInstance> {
        self.platform.object(Some("project-x"), "tenant-a")
    }
}
