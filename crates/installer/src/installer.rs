//! Installs, uninstalls and checks all components of one instance

use crate::components::{
    Clusters, Component, DeployerInstaller, Exports, LandscaperInstaller, RbacInstaller,
};
use crate::config::InstanceConfiguration;
use crate::error::InstallError;
use crate::readiness::CheckResult;
use crate::workload::delete_namespace;
use cluster_client::ClusterClient;
use std::sync::Arc;
use tracing::info;

/// All components of one instance, in install order
#[derive(Debug)]
pub struct InstanceInstaller {
    rbac: RbacInstaller,
    manifest_deployer: DeployerInstaller,
    helm_deployer: DeployerInstaller,
    landscaper: LandscaperInstaller,
    workload: Arc<dyn ClusterClient>,
    workload_namespace: String,
}

impl InstanceInstaller {
    pub fn new(config: InstanceConfiguration, clusters: &Clusters) -> Self {
        let workload_namespace = config.landscaper.target.namespace.clone();
        Self {
            rbac: RbacInstaller::new(config.rbac, clusters),
            manifest_deployer: DeployerInstaller::manifest(config.manifest_deployer, clusters),
            helm_deployer: DeployerInstaller::helm(config.helm_deployer, clusters),
            landscaper: LandscaperInstaller::new(config.landscaper, clusters),
            workload: Arc::clone(&clusters.workload),
            workload_namespace,
        }
    }

    fn workload_components(&self) -> [&dyn Component; 3] {
        [&self.manifest_deployer, &self.helm_deployer, &self.landscaper]
    }

    /// Installs RBAC, then the deployers, then Landscaper.
    ///
    /// Stops at the first failing component; nothing is rolled back.
    pub async fn install(&self) -> Result<(), InstallError> {
        let exports = self.rbac.install(&Exports::default()).await?;
        for component in self.workload_components() {
            component.install(&exports).await?;
        }
        info!("Installed all components into namespace {}", self.workload_namespace);
        Ok(())
    }

    /// Removes the components in reverse install order.
    ///
    /// The shared workload namespace goes after the workload components and
    /// before RBAC.
    pub async fn uninstall(&self) -> Result<(), InstallError> {
        for component in self.workload_components().into_iter().rev() {
            component.uninstall().await?;
        }
        delete_namespace(self.workload.as_ref(), &self.workload_namespace).await?;
        self.rbac.uninstall().await?;
        info!("Uninstalled all components of namespace {}", self.workload_namespace);
        Ok(())
    }

    /// Readiness of all components, in install order.
    pub async fn check_readiness(&self) -> CheckResult {
        let mut result = self.rbac.check_readiness().await;
        for component in self.workload_components() {
            result.merge(component.check_readiness().await);
        }
        result
    }
}
