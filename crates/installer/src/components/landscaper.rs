//! Landscaper controller and webhooks server

use super::{Clusters, Component, Exports};
use crate::apply::delete_if_exists;
use crate::config::LandscaperConfig;
use crate::error::InstallError;
use crate::labels::{instance_labels, labels, selector_labels};
use crate::readiness::{CheckResult, check_deployment_readiness};
use crate::values::ValuesHelper;
use crate::workload::{
    CONFIG_KEY, CONFIG_MOUNT_PATH, KUBECONFIG_KEY, WorkloadDeployment, apply_config_secret,
    apply_deployment, apply_hpa, apply_service, config_secret_name, delete_pull_secrets,
    ensure_namespace, sync_pull_secrets,
};
use cluster_client::ClusterClient;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{Secret, Service};
use std::sync::Arc;
use tracing::info;

/// Component name, also the prefix of the shared config and pull secrets
pub const COMPONENT: &str = "landscaper";

/// Name of the controller Deployment
pub const CONTROLLER: &str = "landscaper-controller";

/// Name of the webhooks server Deployment and Service
pub const WEBHOOKS: &str = "landscaper-webhooks";

/// Installs the Landscaper controller, its webhooks server and the Service
/// in front of the webhooks
#[derive(Debug)]
pub struct LandscaperInstaller {
    config: LandscaperConfig,
    platform: Arc<dyn ClusterClient>,
    workload: Arc<dyn ClusterClient>,
}

impl LandscaperInstaller {
    pub fn new(config: LandscaperConfig, clusters: &Clusters) -> Self {
        Self {
            config,
            platform: Arc::clone(&clusters.platform),
            workload: Arc::clone(&clusters.workload),
        }
    }
}

fn config_arg() -> String {
    format!("--config={}/{}", CONFIG_MOUNT_PATH, CONFIG_KEY)
}

fn kubeconfig_arg() -> String {
    format!("--landscaper-kubeconfig={}/{}", CONFIG_MOUNT_PATH, KUBECONFIG_KEY)
}

#[async_trait::async_trait]
impl Component for LandscaperInstaller {
    fn name(&self) -> &str {
        COMPONENT
    }

    async fn install(&self, imports: &Exports) -> Result<Exports, InstallError> {
        let kubeconfig = imports.kubeconfig.as_deref().ok_or_else(|| {
            InstallError::MissingImport(format!("control plane kubeconfig for {}", COMPONENT))
        })?;

        let values = ValuesHelper::new(self.config.clone())?;
        let config = values.values();
        let identity = &config.identity;
        let namespace = config.target.namespace.as_str();
        let workload = self.workload.as_ref();
        let component_labels = labels(&identity.instance_id, &identity.version, COMPONENT);

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
            COMPONENT,
            &config.target.image_pull_secrets,
            &component_labels,
        )
        .await?;

        let secret_name = config_secret_name(COMPONENT);
        let pod_annotations = apply_config_secret(
            workload,
            namespace,
            &secret_name,
            &component_labels,
            (values.yaml(), values.hash()),
            Some(kubeconfig),
        )
        .await?;

        let port = config.webhooks_port();
        let parts = [
            (CONTROLLER, &config.controller, vec![config_arg(), kubeconfig_arg()], Vec::new()),
            (
                WEBHOOKS,
                &config.webhooks,
                vec![kubeconfig_arg(), format!("--port={}", port)],
                vec![("https".to_string(), port)],
            ),
        ];
        for (name, deployment, args, ports) in parts {
            let part_labels = labels(&identity.instance_id, &identity.version, name);
            let selector = selector_labels(&identity.instance_id, name);
            apply_deployment(
                workload,
                &WorkloadDeployment {
                    name,
                    namespace,
                    labels: &part_labels,
                    selector: &selector,
                    image: deployment.image.reference()?,
                    args,
                    resources: &deployment.resources,
                    initial_replicas: deployment.autoscaling.min(),
                    config_secret: &secret_name,
                    pod_annotations: &pod_annotations,
                    image_pull_secrets: &pull_secrets,
                    ports,
                },
            )
            .await?;
            apply_hpa(workload, namespace, name, &part_labels, &deployment.autoscaling).await?;
        }

        apply_service(
            workload,
            namespace,
            WEBHOOKS,
            &labels(&identity.instance_id, &identity.version, WEBHOOKS),
            &selector_labels(&identity.instance_id, WEBHOOKS),
            port,
        )
        .await?;

        info!(
            "Installed Landscaper {} in namespace {} on cluster {}",
            identity.version,
            namespace,
            workload.cluster_name()
        );
        Ok(Exports::default())
    }

    async fn uninstall(&self) -> Result<(), InstallError> {
        let namespace = self.config.target.namespace.as_str();
        let workload = self.workload.as_ref();

        delete_if_exists::<Service>(workload, Some(namespace), WEBHOOKS).await?;
        for name in [WEBHOOKS, CONTROLLER] {
            delete_if_exists::<HorizontalPodAutoscaler>(workload, Some(namespace), name).await?;
            delete_if_exists::<Deployment>(workload, Some(namespace), name).await?;
        }
        delete_if_exists::<Secret>(workload, Some(namespace), &config_secret_name(COMPONENT)).await?;
        delete_pull_secrets(workload, namespace, &self.config.identity.instance_id, COMPONENT).await?;

        info!("Uninstalled Landscaper from namespace {}", namespace);
        Ok(())
    }

    async fn check_readiness(&self) -> CheckResult {
        let namespace = self.config.target.namespace.as_str();
        let workload = self.workload.as_ref();
        CheckResult::aggregate([
            check_deployment_readiness(workload, namespace, CONTROLLER).await,
            check_deployment_readiness(workload, namespace, WEBHOOKS).await,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{clusters, landscaper_config, mark_deployment_ready};
    use cluster_client::MockClusterClient;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn imports() -> Exports {
        Exports {
            kubeconfig: Some(b"apiVersion: v1\nkind: Config\n".to_vec()),
        }
    }

    #[tokio::test]
    async fn test_install_creates_controller_webhooks_and_service() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let landscaper = LandscaperInstaller::new(landscaper_config(), &clusters);

        landscaper.install(&imports()).await.unwrap();

        assert!(workload.contains::<Deployment>(Some("ls-abc123"), CONTROLLER));
        assert!(workload.contains::<Deployment>(Some("ls-abc123"), WEBHOOKS));
        assert_eq!(workload.count::<HorizontalPodAutoscaler>(), 2);
        let service: Service = workload.object(Some("ls-abc123"), WEBHOOKS).unwrap();
        let ports = service.spec.unwrap().ports.unwrap();
        let port = &ports[0];
        assert_eq!(port.port, 9443);
        assert_eq!(port.target_port, Some(IntOrString::Int(9443)));
    }

    #[tokio::test]
    async fn test_readiness_aggregates_both_deployments() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let landscaper = LandscaperInstaller::new(landscaper_config(), &clusters);
        landscaper.install(&imports()).await.unwrap();

        mark_deployment_ready(&workload, "ls-abc123", CONTROLLER);
        let result = landscaper.check_readiness().await;
        assert_eq!(result.reasons().len(), 1);
        assert!(result.message().contains(WEBHOOKS));

        mark_deployment_ready(&workload, "ls-abc123", WEBHOOKS);
        assert!(landscaper.check_readiness().await.is_ready());
    }

    #[tokio::test]
    async fn test_uninstall_removes_everything() {
        let workload = MockClusterClient::new("workload");
        let clusters = clusters(&MockClusterClient::new("platform"), &MockClusterClient::new("mcp"), &workload);
        let landscaper = LandscaperInstaller::new(landscaper_config(), &clusters);
        landscaper.install(&imports()).await.unwrap();

        landscaper.uninstall().await.unwrap();
        assert_eq!(workload.count::<Deployment>(), 0);
        assert_eq!(workload.count::<HorizontalPodAutoscaler>(), 0);
        assert_eq!(workload.count::<Service>(), 0);
        assert_eq!(workload.count::<Secret>(), 0);
    }
}
