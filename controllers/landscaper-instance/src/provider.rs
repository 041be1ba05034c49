//! Provider catalog
//!
//! Answers which versions may be installed and which image every component
//! runs for a version, based on a `LandscaperProviderConfig`.

use crate::error::ControllerError;
use crds::{ImageOverrides, ImagePaths, LandscaperProviderConfigSpec};
use installer::ImageConfig;

/// Image-carrying components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentImage {
    LandscaperController,
    LandscaperWebhooks,
    ManifestDeployer,
    HelmDeployer,
}

impl ComponentImage {
    /// Path below the repository when neither the version nor the provider names one
    pub fn default_path(self) -> &'static str {
        match self {
            ComponentImage::LandscaperController => "landscaper-controller",
            ComponentImage::LandscaperWebhooks => "landscaper-webhooks-server",
            ComponentImage::ManifestDeployer => "manifest-deployer-controller",
            ComponentImage::HelmDeployer => "helm-deployer-controller",
        }
    }

    fn path(self, paths: &ImagePaths) -> Option<&str> {
        match self {
            ComponentImage::LandscaperController => paths.landscaper_controller.as_deref(),
            ComponentImage::LandscaperWebhooks => paths.landscaper_webhooks.as_deref(),
            ComponentImage::ManifestDeployer => paths.manifest_deployer.as_deref(),
            ComponentImage::HelmDeployer => paths.helm_deployer.as_deref(),
        }
    }

    fn image_override(self, overrides: &ImageOverrides) -> Option<&str> {
        match self {
            ComponentImage::LandscaperController => overrides.landscaper_controller.as_deref(),
            ComponentImage::LandscaperWebhooks => overrides.landscaper_webhooks.as_deref(),
            ComponentImage::ManifestDeployer => overrides.manifest_deployer.as_deref(),
            ComponentImage::HelmDeployer => overrides.helm_deployer.as_deref(),
        }
    }
}

/// Read-only view of one provider configuration
#[derive(Debug, Clone, Copy)]
pub struct ProviderCatalog<'a> {
    name: &'a str,
    spec: &'a LandscaperProviderConfigSpec,
}

impl<'a> ProviderCatalog<'a> {
    pub fn new(name: &'a str, spec: &'a LandscaperProviderConfigSpec) -> Self {
        Self { name, spec }
    }

    /// The provider configuration itself
    pub fn spec(&self) -> &'a LandscaperProviderConfigSpec {
        self.spec
    }

    /// Versions offered, in declaration order.
    pub fn versions(&self) -> Vec<String> {
        self.spec.versions.iter().map(|v| v.version.clone()).collect()
    }

    /// Image of `component` for `version`.
    ///
    /// An override is used verbatim. Otherwise the reference is composed
    /// from the repository, the version's path (falling back to the
    /// provider-wide path, then the built-in one) and the version as tag.
    /// Fails when the version is not offered.
    pub fn resolve_image(&self, component: ComponentImage, version: &str) -> Result<ImageConfig, ControllerError> {
        let entry = self
            .spec
            .versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| ControllerError::UnsupportedVersion {
                version: version.to_string(),
                provider_config: self.name.to_string(),
                available: self.versions(),
            })?;

        if let Some(image) = component.image_override(&self.spec.image_overrides) {
            return Ok(ImageConfig::explicit(image));
        }

        let path = entry
            .image_paths
            .as_ref()
            .and_then(|paths| component.path(paths))
            .or_else(|| component.path(&self.spec.image_paths))
            .unwrap_or_else(|| component.default_path());

        Ok(ImageConfig::composed(&self.spec.repository, path, version))
    }
}
