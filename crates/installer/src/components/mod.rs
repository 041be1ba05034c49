//! Component installers
//!
//! One installer per Landscaper component. Components are installed in the
//! order RBAC, manifest deployer, helm deployer, Landscaper; the exports of
//! RBAC (a kubeconfig for the control plane) are imported by the others.

pub mod deployer;
pub mod landscaper;
pub mod rbac;

pub use deployer::{DeployerInstaller, DeployerKind};
pub use landscaper::LandscaperInstaller;
pub use rbac::RbacInstaller;

use crate::error::InstallError;
use crate::readiness::CheckResult;
use cluster_client::ClusterClient;
use std::sync::Arc;

/// Values a component hands to the components installed after it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exports {
    /// Kubeconfig granting access to the control plane
    pub kubeconfig: Option<Vec<u8>>,
}

/// The clusters an instance touches
#[derive(Clone)]
pub struct Clusters {
    /// Cluster holding the instance records and image pull secrets
    pub platform: Arc<dyn ClusterClient>,

    /// The tenant's control plane (MCP)
    pub mcp: Arc<dyn ClusterClient>,

    /// Kubeconfig the MCP client was built from
    pub mcp_kubeconfig: Vec<u8>,

    /// Cluster running the components
    pub workload: Arc<dyn ClusterClient>,
}

impl std::fmt::Debug for Clusters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clusters")
            .field("platform", &self.platform.cluster_name())
            .field("mcp", &self.mcp.cluster_name())
            .field("workload", &self.workload.cluster_name())
            .finish_non_exhaustive()
    }
}

/// One installable component
#[async_trait::async_trait]
pub trait Component: Send + Sync {
    /// Component name, used for object names and labels
    fn name(&self) -> &str;

    /// Installs or updates the component; idempotent.
    async fn install(&self, imports: &Exports) -> Result<Exports, InstallError>;

    /// Removes everything `install` created; missing objects count as removed.
    async fn uninstall(&self) -> Result<(), InstallError>;

    /// Reports whether the component is up.
    async fn check_readiness(&self) -> CheckResult;
}
