//! Test helpers shared by the component tests

use crate::components::Clusters;
use crate::components::rbac::SERVICE_ACCOUNT_TOKEN_TYPE;
use crate::config::{
    DeployerConfig, InstanceConfiguration, InstanceIdentity, LandscaperConfig, RbacConfig, WorkloadTarget,
};
use crate::values::{DeploymentConfig, ImageConfig};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cluster_client::{ClusterClient, MockClusterClient};
use k8s_openapi::api::apps::v1::Deployment;
use serde_json::json;
use std::sync::Arc;

/// Kubeconfig of the control plane as handed out by the credential broker
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

pub fn clusters(platform: &MockClusterClient, mcp: &MockClusterClient, workload: &MockClusterClient) -> Clusters {
    Clusters {
        platform: Arc::new(platform.clone()) as Arc<dyn ClusterClient>,
        mcp: Arc::new(mcp.clone()) as Arc<dyn ClusterClient>,
        mcp_kubeconfig: MCP_KUBECONFIG.as_bytes().to_vec(),
        workload: Arc::new(workload.clone()) as Arc<dyn ClusterClient>,
    }
}

pub fn identity() -> InstanceIdentity {
    InstanceIdentity {
        instance_id: "abc123".to_string(),
        version: "v1".to_string(),
    }
}

fn target() -> WorkloadTarget {
    WorkloadTarget {
        namespace: "ls-abc123".to_string(),
        platform_namespace: "landscaper-provider-system".to_string(),
        image_pull_secrets: Vec::new(),
    }
}

fn deployment(path: &str) -> DeploymentConfig {
    DeploymentConfig {
        image: ImageConfig::composed("registry.example/ls", path, "v1"),
        ..Default::default()
    }
}

pub fn deployer_config() -> DeployerConfig {
    DeployerConfig {
        identity: identity(),
        target: target(),
        deployment: deployment("manifest"),
    }
}

pub fn landscaper_config() -> LandscaperConfig {
    LandscaperConfig {
        identity: identity(),
        target: target(),
        controller: deployment("controller"),
        webhooks: deployment("webhooks"),
        ..Default::default()
    }
}

pub fn instance_configuration() -> InstanceConfiguration {
    InstanceConfiguration {
        rbac: RbacConfig {
            identity: identity(),
            namespace: None,
        },
        manifest_deployer: deployer_config(),
        helm_deployer: DeployerConfig {
            deployment: deployment("helm"),
            ..deployer_config()
        },
        landscaper: landscaper_config(),
    }
}

/// Makes the mock token controller fill in every service account token secret.
pub fn issue_tokens(mcp: &MockClusterClient) {
    mcp.on_create("Secret", |secret| {
        if secret["type"] == SERVICE_ACCOUNT_TOKEN_TYPE {
            secret["data"] = json!({
                "token": STANDARD.encode("sa-token"),
                "ca.crt": STANDARD.encode("mcp-ca"),
            });
        }
    });
}

/// Makes a Deployment report all desired replicas as available.
pub fn mark_deployment_ready(workload: &MockClusterClient, namespace: &str, name: &str) {
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
