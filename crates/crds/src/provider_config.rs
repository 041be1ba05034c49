//! LandscaperProviderConfig CRD
//!
//! Cluster-scoped, provider-wide configuration: where images come from,
//! which versions may be installed, and how components are sized.

use crate::references::LocalObjectReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "landscaper.services.microscaler.io",
    version = "v1alpha1",
    kind = "LandscaperProviderConfig",
    shortname = "lspc"
)]
#[serde(rename_all = "camelCase")]
pub struct LandscaperProviderConfigSpec {
    /// Image repository prefix (e.g. "europe-docker.pkg.dev/landscaper/images")
    pub repository: String,

    /// Versions that may be installed
    #[serde(default)]
    pub versions: Vec<VersionEntry>,

    /// Default image paths below `repository`
    #[serde(default)]
    pub image_paths: ImagePaths,

    /// Explicit image references, used verbatim when set
    #[serde(default)]
    pub image_overrides: ImageOverrides,

    /// Image pull secrets in the provider namespace, synced into every workload namespace
    #[serde(default)]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Per-component sizing defaults
    #[serde(default)]
    pub deployment: DeploymentDefaults,

    /// Log verbosity of all components ("error", "info", "debug")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
}

/// A version advertised by the provider catalog
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    /// Version tag (e.g. "v0.127.0")
    pub version: String,

    /// Image paths for this version, overlaying the default paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_paths: Option<ImagePaths>,
}

/// Image path per component, relative to the repository
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImagePaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscaper_controller: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscaper_webhooks: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_deployer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_deployer: Option<String>,
}

/// Full image reference per component
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscaper_controller: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscaper_webhooks: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_deployer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm_deployer: Option<String>,
}

/// Sizing defaults for every deployed component
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentDefaults {
    #[serde(default)]
    pub landscaper_controller: ComponentDefaults,

    #[serde(default)]
    pub landscaper_webhooks: ComponentDefaults,

    #[serde(default)]
    pub manifest_deployer: ComponentDefaults,

    #[serde(default)]
    pub helm_deployer: ComponentDefaults,
}

/// Sizing defaults for one component; unset fields fall back to built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefaults {
    /// Resource requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceAmounts>,

    /// Resource limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceAmounts>,

    /// Minimum number of replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Maximum number of replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    /// Average CPU utilization the autoscaler targets, in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpu_utilization: Option<i32>,

    /// Client QPS towards the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qps: Option<f32>,

    /// Client burst towards the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<i32>,

    /// Number of parallel workers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<u32>,
}

/// CPU and memory quantities
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAmounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}
