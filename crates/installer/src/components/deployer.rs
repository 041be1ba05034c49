//! Manifest and helm deployers
//!
//! Both deployers run as one Deployment in the workload namespace, watch the
//! control plane through the kubeconfig exported by RBAC and differ only in
//! name and the deploy item type they handle.

use super::{Clusters, Component, Exports};
use crate::apply::delete_if_exists;
use crate::config::DeployerConfig;
use crate::error::InstallError;
use crate::labels::{instance_labels, labels, selector_labels};
use crate::readiness::{CheckResult, check_deployment_readiness};
use crate::values::ValuesHelper;
use crate::workload::{
    CONFIG_KEY, CONFIG_MOUNT_PATH, KUBECONFIG_KEY, WorkloadDeployment, apply_config_secret,
    apply_deployment, apply_hpa, config_secret_name, delete_pull_secrets, ensure_namespace,
    sync_pull_secrets,
};
use cluster_client::ClusterClient;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Secret;
use std::sync::Arc;
use tracing::info;

/// Which deployer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployerKind {
    Manifest,
    Helm,
}

impl DeployerKind {
    /// Component name, also the name of its Deployment
    pub fn component_name(self) -> &'static str {
        match self {
            DeployerKind::Manifest => "manifest-deployer",
            DeployerKind::Helm => "helm-deployer",
        }
    }

    /// Deploy item type handled by the deployer
    pub fn deploy_item_type(self) -> &'static str {
        match self {
            DeployerKind::Manifest => "landscaper.gardener.cloud/kubernetes-manifest",
            DeployerKind::Helm => "landscaper.gardener.cloud/helm",
        }
    }
}

/// Installs one deployer into the workload namespace
#[derive(Debug)]
pub struct DeployerInstaller {
    kind: DeployerKind,
    config: DeployerConfig,
    platform: Arc<dyn ClusterClient>,
    workload: Arc<dyn ClusterClient>,
}

impl DeployerInstaller {
    pub fn new(kind: DeployerKind, config: DeployerConfig, clusters: &Clusters) -> Self {
        Self {
            kind,
            config,
            platform: Arc::clone(&clusters.platform),
            workload: Arc::clone(&clusters.workload),
        }
    }

    pub fn manifest(config: DeployerConfig, clusters: &Clusters) -> Self {
        Self::new(DeployerKind::Manifest, config, clusters)
    }

    pub fn helm(config: DeployerConfig, clusters: &Clusters) -> Self {
        Self::new(DeployerKind::Helm, config, clusters)
    }

    fn args(&self) -> Vec<String> {
        vec![
            format!("--config={}/{}", CONFIG_MOUNT_PATH, CONFIG_KEY),
            format!("--landscaper-kubeconfig={}/{}", CONFIG_MOUNT_PATH, KUBECONFIG_KEY),
            format!("--deploy-item-type={}", self.kind.deploy_item_type()),
        ]
    }
}

#[async_trait::async_trait]
impl Component for DeployerInstaller {
    fn name(&self) -> &str {
        self.kind.component_name()
    }

    async fn install(&self, imports: &Exports) -> Result<Exports, InstallError> {
        let name = self.kind.component_name();
        let kubeconfig = imports.kubeconfig.as_deref().ok_or_else(|| {
            InstallError::MissingImport(format!("control plane kubeconfig for {}", name))
        })?;

        let values = ValuesHelper::new(self.config.clone())?;
        let config = values.values();
        let identity = &config.identity;
        let namespace = config.target.namespace.as_str();
        let labels = labels(&identity.instance_id, &identity.version, name);
        let selector = selector_labels(&identity.instance_id, name);
        let workload = self.workload.as_ref();

        ensure_namespace(
            workload,
            namespace,
            &instance_labels(&identity.instance_id, &identity.version),
        )
        .await?;

        let pull_secrets = sync_pull_secrets(
            self.platform.as_ref(),
            workload,
            &config.target.platform_namespace,
            namespace,
            name,
            &config.target.image_pull_secrets,
            &labels,
        )
        .await?;

        let secret_name = config_secret_name(name);
        let pod_annotations = apply_config_secret(
            workload,
            namespace,
            &secret_name,
            &labels,
            (values.yaml(), values.hash()),
            Some(kubeconfig),
        )
        .await?;

        let deployment = &config.deployment;
        apply_deployment(
            workload,
            &WorkloadDeployment {
                name,
                namespace,
                labels: &labels,
                selector: &selector,
                image: deployment.image.reference()?,
                args: self.args(),
                resources: &deployment.resources,
                initial_replicas: deployment.autoscaling.min(),
                config_secret: &secret_name,
                pod_annotations: &pod_annotations,
                image_pull_secrets: &pull_secrets,
                ports: Vec::new(),
            },
        )
        .await?;
        apply_hpa(workload, namespace, name, &labels, &deployment.autoscaling).await?;

        info!(
            "Installed {} in namespace {} on cluster {}",
            name,
            namespace,
            workload.cluster_name()
        );
        Ok(Exports::default())
    }

    async fn uninstall(&self) -> Result<(), InstallError> {
        let name = self.kind.component_name();
        let namespace = self.config.target.namespace.as_str();
        let workload = self.workload.as_ref();

        delete_if_exists::<HorizontalPodAutoscaler>(workload, Some(namespace), name).await?;
        delete_if_exists::<Deployment>(workload, Some(namespace), name).await?;
        delete_if_exists::<Secret>(workload, Some(namespace), &config_secret_name(name)).await?;
        delete_pull_secrets(workload, namespace, &self.config.identity.instance_id, name).await?;

        info!("Uninstalled {} from namespace {}", name, namespace);
        Ok(())
    }

    async fn check_readiness(&self) -> CheckResult {
        check_deployment_readiness(
            self.workload.as_ref(),
            &self.config.target.namespace,
            self.kind.component_name(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{CONFIG_HASH_ANNOTATION, KUBECONFIG_HASH_ANNOTATION};
    use crate::test_utils::{clusters, deployer_config, mark_deployment_ready};
    use crate::values::Verbosity;
    use cluster_client::{MockClusterClient, Verb};

    fn imports() -> Exports {
        Exports {
            kubeconfig: Some(b"apiVersion: v1\nkind: Config\n".to_vec()),
        }
    }

    fn pod_annotation(workload: &MockClusterClient, name: &str, key: &str) -> String {
        let deployment: Deployment = workload.object(Some("ls-abc123"), name).unwrap();
        deployment.spec.unwrap().template.metadata.unwrap().annotations.unwrap()[key].clone()
    }

    #[tokio::test]
    async fn test_install_requires_kubeconfig_import() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let helm = DeployerInstaller::helm(deployer_config(), &clusters);

        let err = helm.install(&Exports::default()).await.unwrap_err();
        assert!(matches!(err, InstallError::MissingImport(_)));
        assert!(workload.writes().is_empty());
    }

    #[tokio::test]
    async fn test_install_twice_writes_once() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let helm = DeployerInstaller::helm(deployer_config(), &clusters);

        helm.install(&imports()).await.unwrap();
        let first_writes = workload.writes().len();
        assert!(first_writes > 0);

        helm.install(&imports()).await.unwrap();
        assert_eq!(workload.writes().len(), first_writes);
    }

    #[tokio::test]
    async fn test_install_creates_objects() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let manifest = DeployerInstaller::manifest(deployer_config(), &clusters);

        manifest.install(&imports()).await.unwrap();

        assert!(workload.contains::<Secret>(Some("ls-abc123"), "manifest-deployer-config"));
        assert!(workload.contains::<HorizontalPodAutoscaler>(Some("ls-abc123"), "manifest-deployer"));
        let deployment: Deployment = workload.object(Some("ls-abc123"), "manifest-deployer").unwrap();
        let containers = deployment.spec.unwrap().template.spec.unwrap().containers;
        let container = &containers[0];
        assert_eq!(container.image.as_deref(), Some("registry.example/ls/manifest:v1"));
        assert!(pod_annotation(&workload, "manifest-deployer", KUBECONFIG_HASH_ANNOTATION).len() == 64);
    }

    #[tokio::test]
    async fn test_verbosity_change_rolls_pods() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);

        let mut config = deployer_config();
        DeployerInstaller::helm(config.clone(), &clusters).install(&imports()).await.unwrap();
        let before = pod_annotation(&workload, "helm-deployer", CONFIG_HASH_ANNOTATION);

        // explicit default: nothing changes
        config.deployment.verbosity = Some(Verbosity::Info);
        workload.clear_writes();
        DeployerInstaller::helm(config.clone(), &clusters).install(&imports()).await.unwrap();
        assert!(workload.writes().is_empty());

        config.deployment.verbosity = Some(Verbosity::Debug);
        DeployerInstaller::helm(config, &clusters).install(&imports()).await.unwrap();
        let after = pod_annotation(&workload, "helm-deployer", CONFIG_HASH_ANNOTATION);
        assert_ne!(before, after);
        assert!(workload.writes().iter().any(|w| w.is(Verb::Replace, "Deployment")));
    }

    #[tokio::test]
    async fn test_readiness_follows_deployment() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let helm = DeployerInstaller::helm(deployer_config(), &clusters);

        assert!(!helm.check_readiness().await.is_ready());
        helm.install(&imports()).await.unwrap();
        assert!(!helm.check_readiness().await.is_ready());

        mark_deployment_ready(&workload, "ls-abc123", "helm-deployer");
        assert!(helm.check_readiness().await.is_ready());
    }

    #[tokio::test]
    async fn test_uninstall_reverses_install() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let helm = DeployerInstaller::helm(deployer_config(), &clusters);
        helm.install(&imports()).await.unwrap();
        workload.clear_writes();

        helm.uninstall().await.unwrap();
        let kinds: Vec<String> = workload.writes().into_iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec!["HorizontalPodAutoscaler", "Deployment", "Secret"]);
    }

    #[tokio::test]
    async fn test_uninstall_failure_propagates() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let helm = DeployerInstaller::helm(deployer_config(), &clusters);
        helm.install(&imports()).await.unwrap();

        workload.fail_on(Verb::Delete, "Deployment");
        assert!(helm.uninstall().await.is_err());
        assert!(workload.contains::<Deployment>(Some("ls-abc123"), "helm-deployer"));
    }
}
