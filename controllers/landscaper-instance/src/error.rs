//! Controller-specific error types.
//!
//! Errors of the lower layers (cluster access, component installation,
//! credential resolution) convert into `ControllerError` via `#[from]`.

use cluster_client::ClusterError;
use installer::InstallError;
use kube::Error as KubeError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving control plane credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Access secret does not exist
    #[error("Access secret {0} not found")]
    SecretNotFound(String),

    /// Access secret exists but lacks the kubeconfig key
    #[error("Access secret {secret} has no {key} key")]
    MissingKey { secret: String, key: String },

    /// The platform denied a cluster or access request
    #[error("{kind} {name} was denied: {message}")]
    Denied {
        kind: String,
        name: String,
        message: String,
    },

    /// A request was neither granted nor denied in time
    #[error("Timed out after {timeout:?} waiting for {kind} {name} to be granted")]
    Timeout {
        kind: String,
        name: String,
        timeout: Duration,
    },

    /// A granted request does not say what was granted
    #[error("Granted {kind} {name} does not reference a {missing}")]
    IncompleteGrant {
        kind: String,
        name: String,
        missing: String,
    },

    /// Platform API error
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// Errors that can occur in the Landscaper instance controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client construction or watch error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster API error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Component install, uninstall or values error
    #[error("Install error: {0}")]
    Install(#[from] InstallError),

    /// Control plane credentials could not be resolved
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Referenced provider configuration does not exist
    #[error("Provider config not found: {0}")]
    ProviderConfigNotFound(String),

    /// Requested version is not offered by the provider configuration
    #[error("Version {version} is not offered by provider config {provider_config} (available: {available:?})")]
    UnsupportedVersion {
        version: String,
        provider_config: String,
        available: Vec<String>,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Metrics server I/O error
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// Status could not be written, possibly after an earlier failure
    #[error(
        "Failed to persist status: {source}{}",
        .prior.as_ref().map(|p| format!(" (after: {})", p)).unwrap_or_default()
    )]
    StatusPersistence {
        source: ClusterError,
        prior: Option<Box<ControllerError>>,
    },
}

impl ControllerError {
    /// Combines a status persistence failure with the attempt's outcome.
    pub fn status_persistence(source: ClusterError, prior: Option<ControllerError>) -> Self {
        ControllerError::StatusPersistence {
            source,
            prior: prior.map(Box::new),
        }
    }
}
