//! Landscaper Instance Controller
//!
//! Installs, monitors and removes Landscaper for tenant control planes:
//! - LandscaperInstance: one tenant's Landscaper, reconciled through the
//!   Progressing / Ready / Terminating phases
//! - LandscaperProviderConfig: image catalog and sizing defaults
//!
//! Components run on a dedicated workload cluster; Landscaper's RBAC lives on
//! the tenant control plane, reached with credentials from the platform.

mod assembler;
mod backoff;
mod config;
mod controller;
mod credentials;
mod error;
mod metrics;
mod provider;
mod reconciler;

#[cfg(test)]
mod test_utils;

use crate::config::{ControllerConfig, CredentialMode};
use crate::controller::Context;
use crate::credentials::{AccessRequestResolver, CredentialResolver, KubeClientFactory, SecretCredentialResolver};
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use cluster_client::{ClusterClient, KubeClusterClient};
use crds::LandscaperInstance;
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Crypto provider already installed: {:?}", e);
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kube=warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Landscaper Instance Controller");

    let config = ControllerConfig::from_env()?;
    config.log();

    let kube_client = Client::try_default().await?;
    let platform: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new("platform", kube_client.clone()));
    let workload: Arc<dyn ClusterClient> = match &config.workload_kubeconfig {
        Some(path) => {
            let kubeconfig = tokio::fs::read(path).await.map_err(|e| {
                ControllerError::InvalidConfig(format!(
                    "cannot read WORKLOAD_KUBECONFIG {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Arc::new(KubeClusterClient::from_kubeconfig("workload", &kubeconfig).await?)
        }
        None => Arc::clone(&platform),
    };

    let factory = Arc::new(KubeClientFactory);
    let credentials: Arc<dyn CredentialResolver> = match config.credential_mode {
        CredentialMode::Secret => Arc::new(SecretCredentialResolver::new(Arc::clone(&platform), factory)),
        CredentialMode::AccessRequest => Arc::new(AccessRequestResolver::new(
            Arc::clone(&platform),
            factory,
            config.access_request_timeout,
        )),
    };

    let reconciler = Reconciler::new(platform, workload, credentials, ReconcilerSettings::from(&config));
    let metrics = Arc::new(Metrics::new()?);
    let ctx = Arc::new(Context::new(reconciler, Arc::clone(&metrics)));

    let api: Api<LandscaperInstance> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(kube_client, namespace),
        None => Api::all(kube_client),
    };

    tokio::select! {
        _ = controller::run(api, ctx) => {
            info!("Controller finished");
        }
        result = metrics::serve(config.metrics_addr, metrics) => {
            if let Err(e) = &result {
                error!("Probes and metrics server failed: {}", e);
            }
            result?;
        }
    }

    info!("Landscaper Instance Controller stopped");
    Ok(())
}
