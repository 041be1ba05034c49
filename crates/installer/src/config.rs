//! Per-component configuration tree
//!
//! Produced by the controller's configuration assembler, consumed read-only
//! by the component installers. Each struct defaults itself independently.

use crate::error::InstallError;
use crate::values::{DeploymentConfig, Defaults};
use serde::{Deserialize, Serialize};

/// Namespace on the control plane holding the Landscaper service account
pub const DEFAULT_RBAC_NAMESPACE: &str = "landscaper-system";

/// Port the webhooks server listens on
pub const DEFAULT_WEBHOOKS_PORT: i32 = 9443;

/// Who the components are installed for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentity {
    /// Stable instance identifier
    pub instance_id: String,

    /// Landscaper version
    pub version: String,
}

/// Where workload components are installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadTarget {
    /// Namespace on the workload cluster (`ls-<instanceId>`)
    pub namespace: String,

    /// Namespace on the platform cluster holding the image pull secrets
    pub platform_namespace: String,

    /// Names of the image pull secrets to sync from the platform namespace
    #[serde(default)]
    pub image_pull_secrets: Vec<String>,
}

impl WorkloadTarget {
    fn validate(&self) -> Result<(), InstallError> {
        if self.namespace.is_empty() {
            return Err(InstallError::InvalidValues("workload namespace is empty".to_string()));
        }
        Ok(())
    }
}

/// RBAC on the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RbacConfig {
    pub identity: InstanceIdentity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl RbacConfig {
    /// Namespace of the service account after defaulting
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_RBAC_NAMESPACE)
    }
}

impl Defaults for RbacConfig {
    fn apply_defaults(&mut self) {
        self.namespace.get_or_insert_with(|| DEFAULT_RBAC_NAMESPACE.to_string());
    }

    fn validate(&self) -> Result<(), InstallError> {
        if self.identity.instance_id.is_empty() {
            return Err(InstallError::InvalidValues("instance id is empty".to_string()));
        }
        Ok(())
    }
}

/// One deployer (manifest or helm)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeployerConfig {
    pub identity: InstanceIdentity,

    pub target: WorkloadTarget,

    #[serde(default)]
    pub deployment: DeploymentConfig,
}

impl Defaults for DeployerConfig {
    fn apply_defaults(&mut self) {
        self.deployment.apply_defaults();
    }

    fn validate(&self) -> Result<(), InstallError> {
        self.target.validate()?;
        self.deployment.validate()
    }
}

/// Landscaper controller and webhooks server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LandscaperConfig {
    pub identity: InstanceIdentity,

    pub target: WorkloadTarget,

    #[serde(default)]
    pub controller: DeploymentConfig,

    #[serde(default)]
    pub webhooks: DeploymentConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhooks_port: Option<i32>,

    /// Deployers the controller hands work to
    #[serde(default)]
    pub deployers: Vec<String>,
}

impl LandscaperConfig {
    /// Webhooks port after defaulting
    pub fn webhooks_port(&self) -> i32 {
        self.webhooks_port.unwrap_or(DEFAULT_WEBHOOKS_PORT)
    }
}

impl Defaults for LandscaperConfig {
    fn apply_defaults(&mut self) {
        self.controller.apply_defaults();
        self.webhooks.apply_defaults();
        self.webhooks_port.get_or_insert(DEFAULT_WEBHOOKS_PORT);
        if self.deployers.is_empty() {
            self.deployers = vec!["manifest".to_string(), "helm".to_string()];
        }
    }

    fn validate(&self) -> Result<(), InstallError> {
        self.target.validate()?;
        self.controller.validate()?;
        self.webhooks.validate()
    }
}

/// Configuration of every component of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfiguration {
    pub rbac: RbacConfig,
    pub manifest_deployer: DeployerConfig,
    pub helm_deployer: DeployerConfig,
    pub landscaper: LandscaperConfig,
}

impl Defaults for InstanceConfiguration {
    fn apply_defaults(&mut self) {
        self.rbac.apply_defaults();
        self.manifest_deployer.apply_defaults();
        self.helm_deployer.apply_defaults();
        self.landscaper.apply_defaults();
    }

    fn validate(&self) -> Result<(), InstallError> {
        self.rbac.validate()?;
        self.manifest_deployer.validate()?;
        self.helm_deployer.validate()?;
        self.landscaper.validate()
    }
}
