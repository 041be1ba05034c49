//! Delete path

use super::{ReconcileOutcome, Reconciler, instance_id, instance_key, set_status_condition};
use crate::error::ControllerError;
use cluster_client::typed;
use crds::{
    ConditionStatus, ConditionType, FINALIZER, InstancePhase, LandscaperInstance, LandscaperInstanceStatus,
    LandscaperProviderConfig, reasons,
};
use installer::{InstanceIdentity, InstanceInstaller};
use kube::ResourceExt;
use serde_json::json;
use tracing::{info, warn};

impl Reconciler {
    pub(super) async fn reconcile_delete(
        &self,
        instance: LandscaperInstance,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let key = instance_key(&instance);
        let mut status = instance.status.clone().unwrap_or_default();

        // the status write moves resourceVersion on; later patches need the stored one
        let instance = if status.phase != InstancePhase::Terminating {
            status.phase = InstancePhase::Terminating;
            let stored = self.persist_status(&instance, &status).await?;
            info!("LandscaperInstance {} is terminating", key);
            stored
        } else {
            instance
        };

        let result = self.delete_steps(&instance, &mut status).await;
        let released = result.is_ok();
        self.finish(&instance, &status, result, released).await
    }

    async fn delete_steps(
        &self,
        instance: &LandscaperInstance,
        status: &mut LandscaperInstanceStatus,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let key = instance_key(instance);
        let generation = instance.metadata.generation;
        let identity = InstanceIdentity {
            instance_id: status
                .instance_id
                .clone()
                .unwrap_or_else(|| instance_id(&instance.namespace().unwrap_or_default(), &instance.name_any())),
            version: instance.spec.version.clone(),
        };

        if let Err(e) = self.uninstall(instance, &identity).await {
            set_status_condition(
                status,
                ConditionType::Uninstalled,
                ConditionStatus::False,
                generation,
                reasons::UNINSTALL_FAILED,
                e.to_string(),
            );
            return Err(e);
        }
        set_status_condition(
            status,
            ConditionType::Uninstalled,
            ConditionStatus::True,
            generation,
            reasons::UNINSTALL_SUCCEEDED,
            "All components removed",
        );

        self.remove_finalizer(instance).await?;
        info!("Removed finalizer from LandscaperInstance {}", key);
        Ok(ReconcileOutcome::Done)
    }

    /// Resolves access and configuration, removes all components and then
    /// releases the control plane access.
    async fn uninstall(&self, instance: &LandscaperInstance, identity: &InstanceIdentity) -> Result<(), ControllerError> {
        let access = self.credentials.resolve(instance).await?;

        let provider_name = self.provider_config_name(instance);
        let provider = typed::get::<LandscaperProviderConfig>(self.platform.as_ref(), None, &provider_name).await?;
        if provider.is_none() {
            warn!(
                "Provider config {} not found, uninstalling LandscaperInstance {} without it",
                provider_name,
                instance_key(instance)
            );
        }

        let config = self
            .assembler
            .assemble_for_uninstall(identity, provider.as_ref().map(|p| &p.spec));
        InstanceInstaller::new(config, &self.clusters(access)).uninstall().await?;
        self.credentials.release(instance).await?;
        Ok(())
    }

    async fn remove_finalizer(&self, instance: &LandscaperInstance) -> Result<(), ControllerError> {
        let finalizers: Vec<&String> = instance.finalizers().iter().filter(|f| *f != FINALIZER).collect();
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": instance.resource_version(),
            }
        });
        typed::patch::<LandscaperInstance>(
            self.platform.as_ref(),
            instance.namespace().as_deref(),
            &instance.name_any(),
            &patch,
        )
        .await?;
        Ok(())
    }
}
