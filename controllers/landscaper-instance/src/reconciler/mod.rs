//! LandscaperInstance reconciler
//!
//! One call handles one attempt for one instance. Instances move through
//! three phases:
//! - `Progressing`: components are installed and checked for readiness
//! - `Ready`: everything is up; nothing is done until the instance changes
//!   or a reconcile is requested through the operation annotation
//! - `Terminating`: components are removed, then the finalizer is released
//!
//! Status is always written as the last step of an attempt, also after a
//! failure. The reconciler keeps no retry state; failed attempts are retried
//! by the controller glue with backoff.

mod create;
mod delete;


use crate::assembler::ConfigurationAssembler;
use crate::config::{ControllerConfig, DEFAULT_PROVIDER_CONFIG, DEFAULT_PROVIDER_NAMESPACE, DEFAULT_READINESS_RECHECK_SECS};
use crate::credentials::{ClusterAccess, CredentialResolver};
use crate::error::ControllerError;
use cluster_client::{ClusterClient, ClusterError, typed};
use crds::{
    Condition, ConditionStatus, ConditionType, LandscaperInstance, LandscaperInstanceStatus, set_condition,
};
use installer::Clusters;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// What the controller should do after a successful attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Wait for the next change of the instance
    Done,
    /// Check again after the given delay
    RequeueAfter(Duration),
}

/// Reconciler settings taken from the controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSettings {
    /// Platform namespace holding the image pull secrets
    pub provider_namespace: String,
    /// Provider configuration of instances that do not reference one
    pub default_provider_config: String,
    /// Delay between readiness checks while components come up
    pub readiness_recheck: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            provider_namespace: DEFAULT_PROVIDER_NAMESPACE.to_string(),
            default_provider_config: DEFAULT_PROVIDER_CONFIG.to_string(),
            readiness_recheck: Duration::from_secs(DEFAULT_READINESS_RECHECK_SECS),
        }
    }
}

impl From<&ControllerConfig> for ReconcilerSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            provider_namespace: config.provider_namespace.clone(),
            default_provider_config: config.default_provider_config.clone(),
            readiness_recheck: config.readiness_recheck,
        }
    }
}

/// Reconciles LandscaperInstances
pub struct Reconciler {
    platform: Arc<dyn ClusterClient>,
    workload: Arc<dyn ClusterClient>,
    credentials: Arc<dyn CredentialResolver>,
    assembler: ConfigurationAssembler,
    settings: ReconcilerSettings,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("platform", &self.platform)
            .field("workload", &self.workload)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        platform: Arc<dyn ClusterClient>,
        workload: Arc<dyn ClusterClient>,
        credentials: Arc<dyn CredentialResolver>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            platform,
            workload,
            credentials,
            assembler: ConfigurationAssembler::new(settings.provider_namespace.clone()),
            settings,
        }
    }

    /// Runs one attempt for the instance `namespace/name`.
    ///
    /// A missing instance is already final and not an error.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome, ControllerError> {
        let Some(instance) =
            typed::get::<LandscaperInstance>(self.platform.as_ref(), Some(namespace), name).await?
        else {
            debug!("LandscaperInstance {}/{} not found, nothing to do", namespace, name);
            return Ok(ReconcileOutcome::Done);
        };

        if instance.is_deleting() {
            if !instance.has_finalizer() {
                debug!(
                    "LandscaperInstance {}/{} is deleting without our finalizer, nothing to do",
                    namespace, name
                );
                return Ok(ReconcileOutcome::Done);
            }
            self.reconcile_delete(instance).await
        } else {
            self.reconcile_create(instance).await
        }
    }

    /// Clusters the installers work against for one attempt
    fn clusters(&self, access: ClusterAccess) -> Clusters {
        Clusters {
            platform: Arc::clone(&self.platform),
            mcp: access.client,
            mcp_kubeconfig: access.kubeconfig,
            workload: Arc::clone(&self.workload),
        }
    }

    /// Provider configuration named by the instance, or the default one
    fn provider_config_name(&self, instance: &LandscaperInstance) -> String {
        instance
            .spec
            .provider_config_ref
            .as_ref()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| self.settings.default_provider_config.clone())
    }

    /// Writes `status` and returns the instance as stored afterwards.
    async fn persist_status(
        &self,
        instance: &LandscaperInstance,
        status: &LandscaperInstanceStatus,
    ) -> Result<LandscaperInstance, ClusterError> {
        typed::patch_status::<LandscaperInstance, _>(
            self.platform.as_ref(),
            instance.namespace().as_deref(),
            &instance.name_any(),
            status,
        )
        .await
    }

    /// Writes `status` and combines a write failure with the attempt's result.
    ///
    /// With `object_may_be_gone`, a NotFound means the instance was deleted
    /// after its finalizer was released and is not an error.
    async fn finish(
        &self,
        instance: &LandscaperInstance,
        status: &LandscaperInstanceStatus,
        result: Result<ReconcileOutcome, ControllerError>,
        object_may_be_gone: bool,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let persisted = match self.persist_status(instance, status).await {
            Ok(_) => Ok(()),
            Err(e) if object_may_be_gone && e.is_not_found() => {
                debug!("LandscaperInstance {} is gone, status not written", instance_key(instance));
                Ok(())
            }
            Err(e) => Err(e),
        };

        match (result, persisted) {
            (result, Ok(())) => result,
            (Ok(_), Err(e)) => Err(ControllerError::status_persistence(e, None)),
            (Err(prior), Err(e)) => Err(ControllerError::status_persistence(e, Some(prior))),
        }
    }
}

/// `namespace/name` of an instance
pub fn instance_key(instance: &LandscaperInstance) -> String {
    format!("{}/{}", instance.namespace().unwrap_or_default(), instance.name_any())
}

/// Stable identifier of the instance `namespace/name`
pub fn instance_id(namespace: &str, name: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}/{}", namespace, name).as_bytes())
        .simple()
        .to_string()
}

fn set_status_condition(
    status: &mut LandscaperInstanceStatus,
    type_: ConditionType,
    condition_status: ConditionStatus,
    generation: Option<i64>,
    reason: &str,
    message: impl Into<String>,
) {
    set_condition(
        &mut status.conditions,
        Condition::new(type_, condition_status, generation, reason, message),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_is_stable_and_distinct() {
        let id = instance_id("project-x", "tenant-a");
        assert_eq!(id, instance_id("project-x", "tenant-a"));
        assert_ne!(id, instance_id("project-y", "tenant-a"));
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_settings_from_config() {
        let config = ControllerConfig::from_lookup(|key| match key {
            "DEFAULT_PROVIDER_CONFIG" => Some("gold".to_string()),
            "READINESS_RECHECK_SECS" => Some("5".to_string()),
            _ => None,
        })
        .unwrap();
        let settings = ReconcilerSettings::from(&config);
        assert_eq!(settings.default_provider_config, "gold");
        assert_eq!(settings.readiness_recheck, Duration::from_secs(5));
        assert_eq!(settings.provider_namespace, "landscaper-provider-system");
    }
}
