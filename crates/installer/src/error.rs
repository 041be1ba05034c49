//! Installer errors

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur while installing, uninstalling or checking components
#[derive(Debug, Error)]
pub enum InstallError {
    /// Cluster API error
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// YAML marshaling error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration values failed validation
    #[error("Invalid values: {0}")]
    InvalidValues(String),

    /// A component needs an export of a component installed before it
    #[error("Missing import: {0}")]
    MissingImport(String),

    /// A dependency is not there yet; retrying later is expected to succeed
    #[error("Pending: {0}")]
    Pending(String),

    /// A mutate function changed the name or namespace of the object it was given
    #[error("Mutation changed identity of {kind} {name}")]
    IdentityChanged { kind: String, name: String },

    /// The control plane kubeconfig could not be interpreted
    #[error("Invalid kubeconfig: {0}")]
    Kubeconfig(String),
}

impl InstallError {
    /// Whether the error only reports a dependency that is not there yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, InstallError::Pending(_))
    }
}
