//! Readiness checks and their aggregation

use cluster_client::{ClusterClient, typed};
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

/// Outcome of a readiness check
///
/// An ordered list of reasons why something is not ready; empty means ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    reasons: Vec<String>,
}

impl CheckResult {
    /// A passing result
    pub fn ready() -> Self {
        Self::default()
    }

    /// A failing result with one reason
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
        }
    }

    pub fn is_ready(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    /// All reasons joined by ", "
    pub fn message(&self) -> String {
        self.reasons.join(", ")
    }

    /// Appends the reasons of `other`.
    pub fn merge(&mut self, other: CheckResult) {
        self.reasons.extend(other.reasons);
    }

    /// Concatenates all results in order; never short-circuits.
    pub fn aggregate(results: impl IntoIterator<Item = CheckResult>) -> Self {
        results.into_iter().collect()
    }
}

impl FromIterator<CheckResult> for CheckResult {
    fn from_iter<I: IntoIterator<Item = CheckResult>>(iter: I) -> Self {
        let mut aggregated = CheckResult::ready();
        for result in iter {
            aggregated.merge(result);
        }
        aggregated
    }
}

/// Judges a live Deployment.
///
/// Ready means the controller has observed the current generation and the
/// total, updated and available replica counts all match the desired count.
pub fn check_deployment(deployment: &Deployment) -> CheckResult {
    let key = format!(
        "deployment {}/{}",
        deployment.namespace().unwrap_or_default(),
        deployment.name_any()
    );
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let Some(status) = deployment.status.as_ref() else {
        return CheckResult::not_ready(format!("{}: no status reported yet", key));
    };

    let generation = deployment.metadata.generation.unwrap_or_default();
    let observed = status.observed_generation.unwrap_or_default();
    if observed < generation {
        return CheckResult::not_ready(format!(
            "{}: observed generation {} is behind generation {}",
            key, observed, generation
        ));
    }

    let replicas = status.replicas.unwrap_or_default();
    let updated = status.updated_replicas.unwrap_or_default();
    let available = status.available_replicas.unwrap_or_default();
    if replicas != desired || updated != desired || available != desired {
        return CheckResult::not_ready(format!(
            "{}: {}/{} replicas available ({} updated, {} total)",
            key, available, desired, updated, replicas
        ));
    }

    CheckResult::ready()
}

/// Fetches a Deployment and judges it; fetch errors become reasons.
pub async fn check_deployment_readiness(
    client: &dyn ClusterClient,
    namespace: &str,
    name: &str,
) -> CheckResult {
    match typed::get::<Deployment>(client, Some(namespace), name).await {
        Ok(Some(deployment)) => check_deployment(&deployment),
        Ok(None) => CheckResult::not_ready(format!("deployment {}/{}: not found", namespace, name)),
        Err(e) => CheckResult::not_ready(format!(
            "deployment {}/{}: failed to fetch: {}",
            namespace, name, e
        )),
    }
}
