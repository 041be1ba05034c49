//! RBAC on the control plane
//!
//! Creates a service account with cluster-wide permissions for Landscaper
//! and exports a kubeconfig authenticating as that service account.

use super::{Clusters, Component, Exports};
use crate::apply::{create_or_update, delete_if_exists};
use crate::config::RbacConfig;
use crate::error::InstallError;
use crate::labels::{labels, merge_into};
use crate::readiness::CheckResult;
use crate::values::ValuesHelper;
use crate::workload::ensure_namespace;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cluster_client::{ClusterClient, typed};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::config::Kubeconfig;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Component name
pub const COMPONENT: &str = "rbac";

/// Annotation binding a token secret to its service account
pub const SERVICE_ACCOUNT_NAME_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Secret type the token controller fills in
pub const SERVICE_ACCOUNT_TOKEN_TYPE: &str = "kubernetes.io/service-account-token";

const TOKEN_KEY: &str = "token";
const CA_KEY: &str = "ca.crt";

/// Installs the Landscaper service account and its permissions on the MCP
#[derive(Debug)]
pub struct RbacInstaller {
    config: RbacConfig,
    mcp: Arc<dyn ClusterClient>,
    mcp_kubeconfig: Vec<u8>,
}

impl RbacInstaller {
    pub fn new(config: RbacConfig, clusters: &Clusters) -> Self {
        Self {
            config,
            mcp: Arc::clone(&clusters.mcp),
            mcp_kubeconfig: clusters.mcp_kubeconfig.clone(),
        }
    }

    /// Service account name: `landscaper-<instanceId>`
    pub fn service_account_name(&self) -> String {
        format!("landscaper-{}", self.config.identity.instance_id)
    }

    /// ClusterRole and ClusterRoleBinding name: `landscaper:<instanceId>`
    pub fn cluster_role_name(&self) -> String {
        format!("landscaper:{}", self.config.identity.instance_id)
    }

    /// Name of the service account token secret
    pub fn token_secret_name(&self) -> String {
        format!("{}-token", self.service_account_name())
    }

    async fn issued_token(&self, namespace: &str) -> Result<Option<(Vec<u8>, Option<Vec<u8>>)>, InstallError> {
        let secret = typed::get::<Secret>(self.mcp.as_ref(), Some(namespace), &self.token_secret_name()).await?;
        let Some(data) = secret.and_then(|s| s.data) else {
            return Ok(None);
        };
        match data.get(TOKEN_KEY) {
            Some(token) if !token.0.is_empty() => {
                Ok(Some((token.0.clone(), data.get(CA_KEY).map(|ca| ca.0.clone()))))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl Component for RbacInstaller {
    fn name(&self) -> &str {
        COMPONENT
    }

    async fn install(&self, _imports: &Exports) -> Result<Exports, InstallError> {
        let values = ValuesHelper::new(self.config.clone())?;
        let config = values.values();
        let namespace = config.namespace();
        let labels = labels(&config.identity.instance_id, &config.identity.version, COMPONENT);
        let mcp = self.mcp.as_ref();
        let service_account = self.service_account_name();
        let role = self.cluster_role_name();

        ensure_namespace(mcp, namespace, &labels).await?;

        let sa = ServiceAccount {
            metadata: meta(Some(namespace), &service_account),
            ..Default::default()
        };
        create_or_update(mcp, sa, |sa| {
            merge_into(&mut sa.metadata.labels, &labels);
            Ok(())
        })
        .await?;

        let cluster_role = ClusterRole {
            metadata: meta(None, &role),
            ..Default::default()
        };
        create_or_update(mcp, cluster_role, |cr| {
            merge_into(&mut cr.metadata.labels, &labels);
            cr.rules = Some(vec![
                PolicyRule {
                    api_groups: Some(vec!["*".to_string()]),
                    resources: Some(vec!["*".to_string()]),
                    verbs: vec!["*".to_string()],
                    ..Default::default()
                },
                PolicyRule {
                    non_resource_urls: Some(vec!["*".to_string()]),
                    verbs: vec!["*".to_string()],
                    ..Default::default()
                },
            ]);
            Ok(())
        })
        .await?;

        let binding = ClusterRoleBinding {
            metadata: meta(None, &role),
            ..Default::default()
        };
        create_or_update(mcp, binding, |crb| {
            merge_into(&mut crb.metadata.labels, &labels);
            crb.role_ref = RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: role.clone(),
            };
            crb.subjects = Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: service_account.clone(),
                namespace: Some(namespace.to_string()),
                api_group: None,
            }]);
            Ok(())
        })
        .await?;

        let token_secret = Secret {
            metadata: meta(Some(namespace), &self.token_secret_name()),
            ..Default::default()
        };
        create_or_update(mcp, token_secret, |secret| {
            merge_into(&mut secret.metadata.labels, &labels);
            merge_into(
                &mut secret.metadata.annotations,
                &BTreeMap::from([(SERVICE_ACCOUNT_NAME_ANNOTATION.to_string(), service_account.clone())]),
            );
            secret.type_ = Some(SERVICE_ACCOUNT_TOKEN_TYPE.to_string());
            Ok(())
        })
        .await?;

        let Some((token, ca)) = self.issued_token(namespace).await? else {
            return Err(InstallError::Pending(format!(
                "token for service account {}/{} not issued yet",
                namespace, service_account
            )));
        };

        let server = api_server(&self.mcp_kubeconfig)?;
        let kubeconfig = service_account_kubeconfig(&server, &token, ca.as_deref())?;
        info!(
            "Installed RBAC for service account {}/{} on cluster {}",
            namespace,
            service_account,
            mcp.cluster_name()
        );
        Ok(Exports {
            kubeconfig: Some(kubeconfig),
        })
    }

    async fn uninstall(&self) -> Result<(), InstallError> {
        let namespace = self.config.namespace();
        let mcp = self.mcp.as_ref();
        delete_if_exists::<Secret>(mcp, Some(namespace), &self.token_secret_name()).await?;
        delete_if_exists::<ClusterRoleBinding>(mcp, None, &self.cluster_role_name()).await?;
        delete_if_exists::<ClusterRole>(mcp, None, &self.cluster_role_name()).await?;
        delete_if_exists::<ServiceAccount>(mcp, Some(namespace), &self.service_account_name()).await?;
        info!("Uninstalled RBAC of instance {}", self.config.identity.instance_id);
        Ok(())
    }

    async fn check_readiness(&self) -> CheckResult {
        let namespace = self.config.namespace();
        match self.issued_token(namespace).await {
            Ok(Some(_)) => CheckResult::ready(),
            Ok(None) => CheckResult::not_ready(format!(
                "service account token {}/{} not issued",
                namespace,
                self.token_secret_name()
            )),
            Err(e) => CheckResult::not_ready(format!(
                "service account token {}/{}: {}",
                namespace,
                self.token_secret_name(),
                e
            )),
        }
    }
}

fn meta(namespace: Option<&str>, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

/// API server URL of the current context of a kubeconfig.
pub fn api_server(kubeconfig: &[u8]) -> Result<String, InstallError> {
    let raw = std::str::from_utf8(kubeconfig)
        .map_err(|e| InstallError::Kubeconfig(format!("not UTF-8: {}", e)))?;
    let parsed = Kubeconfig::from_yaml(raw).map_err(|e| InstallError::Kubeconfig(e.to_string()))?;

    let cluster_name = parsed.current_context.as_ref().and_then(|current| {
        parsed
            .contexts
            .iter()
            .find(|c| &c.name == current)
            .and_then(|c| c.context.as_ref())
            .map(|c| c.cluster.clone())
    });
    let cluster = match cluster_name {
        Some(name) => parsed.clusters.iter().find(|c| c.name == name),
        None => parsed.clusters.first(),
    };
    cluster
        .and_then(|c| c.cluster.as_ref())
        .and_then(|c| c.server.clone())
        .ok_or_else(|| InstallError::Kubeconfig("no API server in current context".to_string()))
}

/// Kubeconfig authenticating with a service account token.
pub fn service_account_kubeconfig(
    server: &str,
    token: &[u8],
    ca: Option<&[u8]>,
) -> Result<Vec<u8>, InstallError> {
    let token = std::str::from_utf8(token)
        .map_err(|e| InstallError::Kubeconfig(format!("token is not UTF-8: {}", e)))?;
    let mut cluster = json!({ "server": server });
    if let Some(ca) = ca {
        cluster["certificate-authority-data"] = json!(STANDARD.encode(ca));
    }
    let kubeconfig = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": "mcp", "cluster": cluster }],
        "users": [{ "name": "landscaper", "user": { "token": token } }],
        "contexts": [{ "name": "mcp", "context": { "cluster": "mcp", "user": "landscaper" } }],
        "current-context": "mcp",
    });
    Ok(serde_yaml::to_string(&kubeconfig)?.into_bytes())
}
