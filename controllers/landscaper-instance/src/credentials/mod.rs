//! Credential broker
//!
//! Resolves access to an instance's control plane (MCP). The reconciler only
//! sees the `CredentialResolver` trait; which strategy runs is decided at
//! startup:
//! - `SecretCredentialResolver`: reads `<instance>.kubeconfig` next to the instance
//! - `AccessRequestResolver`: asks the platform for a cluster and for access to it

mod access_request;
mod factory;
mod secret;

pub use access_request::AccessRequestResolver;
pub use factory::{ClientFactory, KubeClientFactory};
pub use secret::SecretCredentialResolver;

use crate::error::CredentialError;
use cluster_client::ClusterClient;
use crds::LandscaperInstance;
use std::sync::Arc;

/// Access to a control plane
#[derive(Debug, Clone)]
pub struct ClusterAccess {
    /// Kubeconfig the client was built from
    pub kubeconfig: Vec<u8>,
    pub client: Arc<dyn ClusterClient>,
}

/// Resolves control plane access for an instance
#[async_trait::async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, instance: &LandscaperInstance) -> Result<ClusterAccess, CredentialError>;

    /// Gives back whatever `resolve` obtained for `instance`. Called once all
    /// components are gone; must tolerate nothing being left to release.
    async fn release(&self, _instance: &LandscaperInstance) -> Result<(), CredentialError> {
        Ok(())
    }
}
