//! Create/update path

use super::{ReconcileOutcome, Reconciler, instance_id, instance_key, set_status_condition};
use crate::error::ControllerError;
use crate::provider::ProviderCatalog;
use cluster_client::typed;
use crds::{
    ConditionStatus, ConditionType, FINALIZER, InstancePhase, LandscaperInstance, LandscaperInstanceStatus,
    LandscaperProviderConfig, OPERATION_ANNOTATION, find_condition, reasons,
};
use installer::{InstanceIdentity, InstanceInstaller};
use kube::ResourceExt;
use serde_json::json;
use tracing::{debug, info};

impl Reconciler {
    pub(super) async fn reconcile_create(
        &self,
        mut instance: LandscaperInstance,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let mut status = instance.status.clone().unwrap_or_default();
        let result = self.create_steps(&mut instance, &mut status).await;
        self.finish(&instance, &status, result, false).await
    }

    async fn create_steps(
        &self,
        instance: &mut LandscaperInstance,
        status: &mut LandscaperInstanceStatus,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let key = instance_key(instance);

        if !instance.has_finalizer() {
            *instance = self.add_finalizer(instance).await?;
            info!("Added finalizer to LandscaperInstance {}", key);
        }

        // outside Ready the annotation stays until the instance gets there
        if instance.reconcile_requested() && status.phase == InstancePhase::Ready {
            status.phase = InstancePhase::Progressing;
            info!("Reconcile requested for LandscaperInstance {}", key);
            *instance = self.clear_operation(instance).await?;
        }

        let generation = instance.metadata.generation;
        if status.observed_generation != generation {
            debug!(
                "LandscaperInstance {} generation changed from {:?} to {:?}",
                key, status.observed_generation, generation
            );
            status.observed_generation = generation;
            status.phase = InstancePhase::Progressing;
        }

        if status.phase == InstancePhase::Ready {
            debug!("LandscaperInstance {} is ready, nothing to do", key);
            return Ok(ReconcileOutcome::Done);
        }

        let namespace = instance.namespace().unwrap_or_default();
        let id = status
            .instance_id
            .get_or_insert_with(|| instance_id(&namespace, &instance.name_any()))
            .clone();

        for type_ in ConditionType::ALL {
            if find_condition(&status.conditions, type_).is_none() {
                set_status_condition(status, type_, ConditionStatus::Unknown, generation, reasons::PENDING, "");
            }
        }

        let identity = InstanceIdentity {
            instance_id: id,
            version: instance.spec.version.clone(),
        };
        let installer = match self.install(instance, status, &identity).await {
            Ok(installer) => installer,
            Err(e) => {
                set_status_condition(
                    status,
                    ConditionType::Installed,
                    ConditionStatus::False,
                    generation,
                    reasons::INSTALL_FAILED,
                    e.to_string(),
                );
                return Err(e);
            }
        };
        set_status_condition(
            status,
            ConditionType::Installed,
            ConditionStatus::True,
            generation,
            reasons::INSTALL_SUCCEEDED,
            format!("Landscaper {} installed", identity.version),
        );

        let readiness = installer.check_readiness().await;
        if !readiness.is_ready() {
            info!("LandscaperInstance {} is not ready yet: {}", key, readiness.message());
            set_status_condition(
                status,
                ConditionType::Ready,
                ConditionStatus::False,
                generation,
                reasons::NOT_READY,
                readiness.message(),
            );
            return Ok(ReconcileOutcome::RequeueAfter(self.settings.readiness_recheck));
        }

        status.phase = InstancePhase::Ready;
        set_status_condition(
            status,
            ConditionType::Ready,
            ConditionStatus::True,
            generation,
            reasons::READY,
            "All components are ready",
        );
        info!("LandscaperInstance {} is ready", key);
        Ok(ReconcileOutcome::Done)
    }

    /// Resolves access and configuration, then installs all components.
    async fn install(
        &self,
        instance: &LandscaperInstance,
        status: &mut LandscaperInstanceStatus,
        identity: &InstanceIdentity,
    ) -> Result<InstanceInstaller, ControllerError> {
        let access = self.credentials.resolve(instance).await?;

        let provider_name = self.provider_config_name(instance);
        status.provider_config = Some(provider_name.clone());
        let provider = typed::get::<LandscaperProviderConfig>(self.platform.as_ref(), None, &provider_name)
            .await?
            .ok_or_else(|| ControllerError::ProviderConfigNotFound(provider_name.clone()))?;

        let config = self
            .assembler
            .assemble(identity, &ProviderCatalog::new(&provider_name, &provider.spec))?;
        let installer = InstanceInstaller::new(config, &self.clusters(access));
        installer.install().await?;
        Ok(installer)
    }

    async fn add_finalizer(&self, instance: &LandscaperInstance) -> Result<LandscaperInstance, ControllerError> {
        let mut finalizers = instance.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": instance.resource_version(),
            }
        });
        Ok(typed::patch::<LandscaperInstance>(
            self.platform.as_ref(),
            instance.namespace().as_deref(),
            &instance.name_any(),
            &patch,
        )
        .await?)
    }

    async fn clear_operation(&self, instance: &LandscaperInstance) -> Result<LandscaperInstance, ControllerError> {
        let patch = json!({
            "metadata": {
                "annotations": { OPERATION_ANNOTATION: null }
            }
        });
        Ok(typed::patch::<LandscaperInstance>(
            self.platform.as_ref(),
            instance.namespace().as_deref(),
            &instance.name_any(),
            &patch,
        )
        .await?)
    }
}
