//! LandscaperInstance CRD
//!
//! A tenant's desired Landscaper installation. The instance lives in the
//! namespace of its owning control plane; the control plane's access secret
//! (`<name>.kubeconfig`) is expected next to it.

use crate::conditions::Condition;
use crate::references::ProviderConfigReference;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the Landscaper provider resources
pub const API_GROUP: &str = "landscaper.services.microscaler.io";

/// Finalizer gating physical deletion until all components are torn down
pub const FINALIZER: &str = "landscaper.services.microscaler.io/finalizer";

/// Annotation carrying a one-shot operation request
pub const OPERATION_ANNOTATION: &str = "landscaper.services.microscaler.io/operation";

/// Operation annotation value requesting a fresh reconciliation
pub const OPERATION_RECONCILE: &str = "reconcile";

/// Suffix of the secret holding the control plane kubeconfig
pub const KUBECONFIG_SECRET_SUFFIX: &str = ".kubeconfig";

/// Data key of the control plane kubeconfig inside its secret
pub const KUBECONFIG_KEY: &str = "kubeconfig";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "landscaper.services.microscaler.io",
    version = "v1alpha1",
    kind = "LandscaperInstance",
    namespaced,
    status = "LandscaperInstanceStatus",
    shortname = "lsi",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LandscaperInstanceSpec {
    /// Landscaper version to install; must be advertised by the provider config
    pub version: String,

    /// Provider configuration to use (defaults to the controller-wide default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config_ref: Option<ProviderConfigReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LandscaperInstanceStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: InstancePhase,

    /// Generation last acted upon by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Stable identifier, assigned once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Name of the resolved provider configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<String>,

    /// Installed / Ready / Uninstalled conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Instance lifecycle phase
///
/// Serializes as PascalCase ("Progressing", "Ready", "Terminating").
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum InstancePhase {
    /// Components are being installed or are not ready yet
    #[default]
    Progressing,

    /// Deletion was requested; components are being removed
    Terminating,

    /// All components are installed and ready
    Ready,
}

impl std::fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InstancePhase::Progressing => "Progressing",
            InstancePhase::Terminating => "Terminating",
            InstancePhase::Ready => "Ready",
        };
        f.write_str(s)
    }
}

impl LandscaperInstance {
    /// Current phase; instances without status are progressing.
    pub fn phase(&self) -> InstancePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Whether the controller finalizer is present.
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    /// Whether a deletion marker is set.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the one-shot reconcile operation annotation is set.
    pub fn reconcile_requested(&self) -> bool {
        self.annotations()
            .get(OPERATION_ANNOTATION)
            .is_some_and(|v| v == OPERATION_RECONCILE)
    }

    /// Name of the secret holding the control plane kubeconfig.
    pub fn kubeconfig_secret_name(&self) -> String {
        format!("{}{}", self.name_any(), KUBECONFIG_SECRET_SUFFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn instance(annotations: BTreeMap<String, String>) -> LandscaperInstance {
        LandscaperInstance {
            metadata: ObjectMeta {
                name: Some("tenant-a".to_string()),
                namespace: Some("project-x".to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: LandscaperInstanceSpec {
                version: "v0.127.0".to_string(),
                provider_config_ref: None,
            },
            status: None,
        }
    }

    #[test]
    fn test_phase_defaults_to_progressing() {
        assert_eq!(instance(BTreeMap::new()).phase(), InstancePhase::Progressing);
    }

    #[test]
    fn test_reconcile_requested_requires_exact_value() {
        let mut annotations = BTreeMap::new();
        annotations.insert(OPERATION_ANNOTATION.to_string(), "ignore".to_string());
        assert!(!instance(annotations.clone()).reconcile_requested());

        annotations.insert(OPERATION_ANNOTATION.to_string(), OPERATION_RECONCILE.to_string());
        assert!(instance(annotations).reconcile_requested());
    }

    #[test]
    fn test_kubeconfig_secret_name() {
        assert_eq!(instance(BTreeMap::new()).kubeconfig_secret_name(), "tenant-a.kubeconfig");
    }
}
