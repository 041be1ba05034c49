//! Construction of cluster clients from kubeconfig bytes

use crate::error::CredentialError;
use cluster_client::{ClusterClient, KubeClusterClient};
use std::sync::Arc;

/// Builds a client for the cluster a kubeconfig points at
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync {
    /// `name` identifies the cluster in logs and errors.
    async fn from_kubeconfig(&self, name: &str, kubeconfig: &[u8]) -> Result<Arc<dyn ClusterClient>, CredentialError>;
}

/// Builds kube-rs backed clients
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeClientFactory;

#[async_trait::async_trait]
impl ClientFactory for KubeClientFactory {
    async fn from_kubeconfig(&self, name: &str, kubeconfig: &[u8]) -> Result<Arc<dyn ClusterClient>, CredentialError> {
        let client = KubeClusterClient::from_kubeconfig(name, kubeconfig).await?;
        Ok(Arc::new(client))
    }
}
