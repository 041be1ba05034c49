//! AccessRequest CRD
//!
//! Requests credentials with a given permission set for a cluster that was
//! granted through a `ClusterRequest`. A granted request points at a secret
//! carrying a `kubeconfig` key.

use crate::cluster_request::{PlatformRequest, RequestPhase};
use crate::references::NamespacedReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "clusters.microscaler.io",
    version = "v1alpha1",
    kind = "AccessRequest",
    namespaced,
    status = "AccessRequestStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestSpec {
    /// Cluster the access is requested for
    pub cluster_ref: NamespacedReference,

    /// Requested permissions
    pub permissions: Vec<PermissionRule>,
}

/// A single RBAC-style permission rule
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    /// API groups the rule applies to ("*" for all)
    pub api_groups: Vec<String>,

    /// Resources the rule applies to ("*" for all)
    pub resources: Vec<String>,

    /// Allowed verbs ("*" for all)
    pub verbs: Vec<String>,
}

impl PermissionRule {
    /// All verbs on all resources in all API groups
    pub fn cluster_admin() -> Self {
        Self {
            api_groups: vec!["*".to_string()],
            resources: vec!["*".to_string()],
            verbs: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequestStatus {
    /// Request phase
    #[serde(default)]
    pub phase: RequestPhase,

    /// Secret holding the issued kubeconfig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<NamespacedReference>,

    /// Reason for denial or progress information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PlatformRequest for AccessRequest {
    fn request_phase(&self) -> RequestPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    fn request_message(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.message.as_deref())
    }
}
