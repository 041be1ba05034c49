//! ClusterRequest CRD
//!
//! Platform API object asking the platform to provide a cluster for a
//! given purpose. The platform answers by moving the request to `Granted`
//! (with a reference to the cluster) or `Denied`.

use crate::references::NamespacedReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the platform cluster access resources
pub const CLUSTERS_API_GROUP: &str = "clusters.microscaler.io";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "clusters.microscaler.io",
    version = "v1alpha1",
    kind = "ClusterRequest",
    namespaced,
    status = "ClusterRequestStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequestSpec {
    /// Purpose of the requested cluster (e.g. "mcp")
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequestStatus {
    /// Request phase
    #[serde(default)]
    pub phase: RequestPhase,

    /// Granted cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<NamespacedReference>,

    /// Reason for denial or progress information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Phase of a platform request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum RequestPhase {
    /// Not yet answered
    #[default]
    Pending,

    /// Request was granted
    Granted,

    /// Request was denied
    Denied,
}

/// Common view on requests answered by the platform
pub trait PlatformRequest {
    /// Current phase of the request
    fn request_phase(&self) -> RequestPhase;

    /// Message attached by the platform
    fn request_message(&self) -> Option<&str>;
}

impl PlatformRequest for ClusterRequest {
    fn request_phase(&self) -> RequestPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    fn request_message(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.message.as_deref())
    }
}
