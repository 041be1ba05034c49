//! Component configuration values
//!
//! Every leaf of the configuration tree can default itself, so installers can
//! be exercised with partially filled values. [`ValuesHelper`] freezes a
//! defaulted tree together with its YAML rendering and content hash.

use crate::error::InstallError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Default CPU request of every component
pub const DEFAULT_CPU_REQUEST: &str = "100m";

/// Default memory request of every component
pub const DEFAULT_MEMORY_REQUEST: &str = "128Mi";

/// Default memory limit of every component
pub const DEFAULT_MEMORY_LIMIT: &str = "512Mi";

/// Default client QPS towards the control plane
pub const DEFAULT_QPS: f32 = 30.0;

/// Default client burst towards the control plane
pub const DEFAULT_BURST: i32 = 60;

/// Default number of parallel workers
pub const DEFAULT_WORKERS: u32 = 5;

/// Fills unset fields with built-in defaults.
///
/// `apply_defaults` must be idempotent: applying it twice yields the same
/// values as applying it once.
pub trait Defaults {
    /// Fill unset fields
    fn apply_defaults(&mut self);

    /// Check the defaulted values
    fn validate(&self) -> Result<(), InstallError> {
        Ok(())
    }
}

/// SHA-256 of `bytes`, hex encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Image of one component
///
/// `image` is an explicit reference and wins over the composition of
/// `repository`, `path` and `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ImageConfig {
    /// An explicit image reference
    pub fn explicit(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Default::default()
        }
    }

    /// An image composed from repository, path and tag
    pub fn composed(repository: impl Into<String>, path: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: None,
            repository: Some(repository.into()),
            path: Some(path.into()),
            tag: Some(tag.into()),
        }
    }

    /// The image reference to deploy.
    pub fn reference(&self) -> Result<String, InstallError> {
        if let Some(image) = &self.image {
            return Ok(image.clone());
        }
        match (&self.repository, &self.path, &self.tag) {
            (Some(repository), Some(path), Some(tag)) => Ok(format!(
                "{}/{}:{}",
                repository.trim_end_matches('/'),
                path.trim_start_matches('/'),
                tag
            )),
            _ => Err(InstallError::InvalidValues(
                "image needs either an explicit reference or repository, path and tag".to_string(),
            )),
        }
    }
}

impl Defaults for ImageConfig {
    fn apply_defaults(&mut self) {}

    fn validate(&self) -> Result<(), InstallError> {
        self.reference().map(|_| ())
    }
}

/// CPU and memory quantities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Resource requests and limits of one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    #[serde(default)]
    pub requests: ResourceList,

    #[serde(default)]
    pub limits: ResourceList,
}

impl Defaults for ResourceConfig {
    fn apply_defaults(&mut self) {
        self.requests.cpu.get_or_insert_with(|| DEFAULT_CPU_REQUEST.to_string());
        self.requests.memory.get_or_insert_with(|| DEFAULT_MEMORY_REQUEST.to_string());
        self.limits.memory.get_or_insert_with(|| DEFAULT_MEMORY_LIMIT.to_string());
    }
}

/// Horizontal autoscaling bounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,

    /// Average CPU utilization target in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpu_utilization: Option<i32>,
}

impl AutoscalingConfig {
    /// Minimum replicas after defaulting
    pub fn min(&self) -> i32 {
        self.min_replicas.unwrap_or(1)
    }

    /// Maximum replicas after defaulting
    pub fn max(&self) -> i32 {
        self.max_replicas.unwrap_or(3)
    }

    /// CPU utilization target after defaulting
    pub fn target_cpu(&self) -> i32 {
        self.target_cpu_utilization.unwrap_or(80)
    }
}

impl Defaults for AutoscalingConfig {
    fn apply_defaults(&mut self) {
        self.min_replicas = Some(self.min());
        self.max_replicas = Some(self.max());
        self.target_cpu_utilization = Some(self.target_cpu());
    }

    fn validate(&self) -> Result<(), InstallError> {
        if self.min() < 1 {
            return Err(InstallError::InvalidValues(format!(
                "minReplicas must be at least 1, got {}",
                self.min()
            )));
        }
        if self.max() < self.min() {
            return Err(InstallError::InvalidValues(format!(
                "maxReplicas {} is below minReplicas {}",
                self.max(),
                self.min()
            )));
        }
        if !(1..=100).contains(&self.target_cpu()) {
            return Err(InstallError::InvalidValues(format!(
                "targetCpuUtilization must be within 1..=100, got {}",
                self.target_cpu()
            )));
        }
        Ok(())
    }
}

/// Rate limits of the client towards the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qps: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burst: Option<i32>,
}

impl Defaults for ClientSettings {
    fn apply_defaults(&mut self) {
        self.qps.get_or_insert(DEFAULT_QPS);
        self.burst.get_or_insert(DEFAULT_BURST);
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Error,
    #[default]
    Info,
    Debug,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verbosity::Error => "error",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for Verbosity {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Verbosity::Error),
            "info" => Ok(Verbosity::Info),
            "debug" => Ok(Verbosity::Debug),
            other => Err(InstallError::InvalidValues(format!(
                "unknown verbosity {:?}, expected error, info or debug",
                other
            ))),
        }
    }
}

/// Everything needed to run one deployed component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub resources: ResourceConfig,

    #[serde(default)]
    pub autoscaling: AutoscalingConfig,

    #[serde(default)]
    pub client: ClientSettings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,
}

impl Defaults for DeploymentConfig {
    fn apply_defaults(&mut self) {
        self.image.apply_defaults();
        self.resources.apply_defaults();
        self.autoscaling.apply_defaults();
        self.client.apply_defaults();
        self.workers.get_or_insert(DEFAULT_WORKERS);
        self.verbosity.get_or_insert_with(Verbosity::default);
    }

    fn validate(&self) -> Result<(), InstallError> {
        self.image.validate()?;
        self.autoscaling.validate()?;
        if self.workers == Some(0) {
            return Err(InstallError::InvalidValues("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Defaulted values together with their YAML rendering and content hash
///
/// Request-scoped: built per installer call and never persisted.
#[derive(Debug, Clone)]
pub struct ValuesHelper<V> {
    values: V,
    yaml: String,
    hash: String,
}

impl<V> ValuesHelper<V>
where
    V: Defaults + Serialize,
{
    /// Defaults and validates `values`, then renders and hashes them.
    pub fn new(mut values: V) -> Result<Self, InstallError> {
        values.apply_defaults();
        values.validate()?;
        let yaml = serde_yaml::to_string(&values)?;
        let hash = content_hash(yaml.as_bytes());
        Ok(Self { values, yaml, hash })
    }

    /// The defaulted values
    pub fn values(&self) -> &V {
        &self.values
    }

    /// YAML rendering of the defaulted values
    pub fn yaml(&self) -> &str {
        &self.yaml
    }

    /// SHA-256 of the YAML rendering, hex encoded
    pub fn hash(&self) -> &str {
        &self.hash
    }
}
