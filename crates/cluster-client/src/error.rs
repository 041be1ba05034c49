//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to a cluster API endpoint
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object already exists or was modified concurrently
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API server rejected the request
    #[error("API error on cluster {cluster} ({code}): {message}")]
    Api {
        cluster: String,
        code: u16,
        message: String,
    },

    /// Transport or client-side error from kube-rs
    #[error("Kubernetes error on cluster {cluster}: {source}")]
    Kube {
        cluster: String,
        #[source]
        source: kube::Error,
    },

    /// Kubeconfig could not be parsed or turned into a client
    #[error("Invalid kubeconfig: {0}")]
    Kubeconfig(String),

    /// Object is missing identity fields required by the operation
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClusterError {
    /// Classifies a kube-rs error, separating 404 and 409 responses.
    pub fn from_kube(cluster: &str, error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 404 => {
                ClusterError::NotFound(response.message)
            }
            kube::Error::Api(response) if response.code == 409 => {
                ClusterError::Conflict(response.message)
            }
            kube::Error::Api(response) => ClusterError::Api {
                cluster: cluster.to_string(),
                code: response.code,
                message: response.message,
            },
            source => ClusterError::Kube {
                cluster: cluster.to_string(),
                source,
            },
        }
    }

    /// Whether the error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// Whether the error reports a conflicting write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }
}
