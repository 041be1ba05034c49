//! Configuration assembler
//!
//! Turns an instance (identity and requested version) and the provider-wide
//! defaults into the per-component configuration tree the installers consume.

use crate::error::ControllerError;
use crate::provider::{ComponentImage, ProviderCatalog};
use crds::{ComponentDefaults, LandscaperProviderConfigSpec, ResourceAmounts};
use installer::values::{AutoscalingConfig, ClientSettings, ResourceConfig, ResourceList};
use installer::{
    DeployerConfig, Defaults, DeploymentConfig, ImageConfig, InstanceConfiguration, InstanceIdentity,
    LandscaperConfig, RbacConfig, Verbosity, WorkloadTarget,
};

/// Workload namespace of an instance
pub fn workload_namespace(instance_id: &str) -> String {
    format!("ls-{}", instance_id)
}

/// Builds fully-defaulted configuration trees
#[derive(Debug, Clone)]
pub struct ConfigurationAssembler {
    platform_namespace: String,
}

impl ConfigurationAssembler {
    /// `platform_namespace` holds the image pull secrets on the platform cluster.
    pub fn new(platform_namespace: impl Into<String>) -> Self {
        Self {
            platform_namespace: platform_namespace.into(),
        }
    }

    /// Configuration for installing `identity` with the provider's images and sizing.
    ///
    /// Fails when the version is not offered or the verbosity is unknown.
    pub fn assemble(
        &self,
        identity: &InstanceIdentity,
        catalog: &ProviderCatalog<'_>,
    ) -> Result<InstanceConfiguration, ControllerError> {
        let verbosity = catalog
            .spec()
            .verbosity
            .as_deref()
            .map(str::parse::<Verbosity>)
            .transpose()?;
        let image = |component| catalog.resolve_image(component, &identity.version);

        Ok(self.build(
            identity,
            catalog.spec(),
            verbosity,
            [
                image(ComponentImage::ManifestDeployer)?,
                image(ComponentImage::HelmDeployer)?,
                image(ComponentImage::LandscaperController)?,
                image(ComponentImage::LandscaperWebhooks)?,
            ],
        ))
    }

    /// Configuration for removing `identity`.
    ///
    /// Uninstalling only needs object names, so images are left unresolved
    /// and the provider configuration may be gone already.
    pub fn assemble_for_uninstall(
        &self,
        identity: &InstanceIdentity,
        provider: Option<&LandscaperProviderConfigSpec>,
    ) -> InstanceConfiguration {
        let fallback;
        let spec = match provider {
            Some(spec) => spec,
            None => {
                fallback = empty_provider_config();
                &fallback
            }
        };
        self.build(identity, spec, None, Default::default())
    }

    fn build(
        &self,
        identity: &InstanceIdentity,
        spec: &LandscaperProviderConfigSpec,
        verbosity: Option<Verbosity>,
        [manifest_image, helm_image, controller_image, webhooks_image]: [ImageConfig; 4],
    ) -> InstanceConfiguration {
        let target = WorkloadTarget {
            namespace: workload_namespace(&identity.instance_id),
            platform_namespace: self.platform_namespace.clone(),
            image_pull_secrets: spec.image_pull_secrets.iter().map(|s| s.name.clone()).collect(),
        };
        let defaults = &spec.deployment;

        let mut config = InstanceConfiguration {
            rbac: RbacConfig {
                identity: identity.clone(),
                namespace: None,
            },
            manifest_deployer: DeployerConfig {
                identity: identity.clone(),
                target: target.clone(),
                deployment: deployment(&defaults.manifest_deployer, manifest_image, verbosity),
            },
            helm_deployer: DeployerConfig {
                identity: identity.clone(),
                target: target.clone(),
                deployment: deployment(&defaults.helm_deployer, helm_image, verbosity),
            },
            landscaper: LandscaperConfig {
                identity: identity.clone(),
                target,
                controller: deployment(&defaults.landscaper_controller, controller_image, verbosity),
                webhooks: deployment(&defaults.landscaper_webhooks, webhooks_image, verbosity),
                ..Default::default()
            },
        };
        config.apply_defaults();
        config
    }
}

fn deployment(defaults: &ComponentDefaults, image: ImageConfig, verbosity: Option<Verbosity>) -> DeploymentConfig {
    DeploymentConfig {
        image,
        resources: ResourceConfig {
            requests: resource_list(defaults.requests.as_ref()),
            limits: resource_list(defaults.limits.as_ref()),
        },
        autoscaling: AutoscalingConfig {
            min_replicas: defaults.min_replicas,
            max_replicas: defaults.max_replicas,
            target_cpu_utilization: defaults.target_cpu_utilization,
        },
        client: ClientSettings {
            qps: defaults.qps,
            burst: defaults.burst,
        },
        workers: defaults.workers,
        verbosity,
    }
}

fn resource_list(amounts: Option<&ResourceAmounts>) -> ResourceList {
    ResourceList {
        cpu: amounts.and_then(|a| a.cpu.clone()),
        memory: amounts.and_then(|a| a.memory.clone()),
    }
}

fn empty_provider_config() -> LandscaperProviderConfigSpec {
    LandscaperProviderConfigSpec {
        repository: String::new(),
        versions: Vec::new(),
        image_paths: Default::default(),
        image_overrides: Default::default(),
        image_pull_secrets: Vec::new(),
        deployment: Default::default(),
        verbosity: None,
    }
}
