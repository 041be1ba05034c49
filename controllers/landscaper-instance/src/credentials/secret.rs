//! Direct lookup of the control plane kubeconfig secret

use super::{ClientFactory, ClusterAccess, CredentialResolver};
use crate::error::CredentialError;
use cluster_client::{ClusterClient, typed};
use crds::{KUBECONFIG_KEY, LandscaperInstance};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

/// Reads a kubeconfig from a secret on the platform cluster.
///
/// Returns `SecretNotFound` or `MissingKey` when the secret or its
/// `kubeconfig` key is absent.
pub(super) async fn read_kubeconfig(
    platform: &dyn ClusterClient,
    namespace: &str,
    name: &str,
) -> Result<Vec<u8>, CredentialError> {
    let qualified = format!("{}/{}", namespace, name);
    let secret = typed::get::<Secret>(platform, Some(namespace), name)
        .await?
        .ok_or_else(|| CredentialError::SecretNotFound(qualified.clone()))?;

    secret
        .data
        .and_then(|mut data| data.remove(KUBECONFIG_KEY))
        .map(|bytes| bytes.0)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| CredentialError::MissingKey {
            secret: qualified,
            key: KUBECONFIG_KEY.to_string(),
        })
}

/// Resolves access through the `<instance>.kubeconfig` secret in the
/// instance's namespace
#[derive(Clone)]
pub struct SecretCredentialResolver {
    platform: Arc<dyn ClusterClient>,
    factory: Arc<dyn ClientFactory>,
}

impl std::fmt::Debug for SecretCredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCredentialResolver")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl SecretCredentialResolver {
    pub fn new(platform: Arc<dyn ClusterClient>, factory: Arc<dyn ClientFactory>) -> Self {
        Self { platform, factory }
    }
}

#[async_trait::async_trait]
impl CredentialResolver for SecretCredentialResolver {
    async fn resolve(&self, instance: &LandscaperInstance) -> Result<ClusterAccess, CredentialError> {
        let namespace = instance.namespace().unwrap_or_default();
        let secret_name = instance.kubeconfig_secret_name();

        let kubeconfig = read_kubeconfig(self.platform.as_ref(), &namespace, &secret_name).await?;
        debug!("Read control plane kubeconfig from secret {}/{}", namespace, secret_name);

        let client = self
            .factory
            .from_kubeconfig(&format!("mcp/{}/{}", namespace, instance.name_any()), &kubeconfig)
            .await?;
        Ok(ClusterAccess { kubeconfig, client })
    }
}
