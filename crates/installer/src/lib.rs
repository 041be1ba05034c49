//! Landscaper component installer
//!
//! Declarative, idempotent installation of the Landscaper components of one
//! instance across the control plane (RBAC) and the workload cluster
//! (deployers, controller, webhooks).
//!
//! # Features
//!
//! - **Configuration tree**: per-component values that default themselves
//! - **ValuesHelper**: defaulted values with a SHA-256 content hash that
//!   rolls pods when the configuration changes
//! - **create_or_update**: generic apply primitive writing only on change
//! - **Components**: RBAC, manifest deployer, helm deployer, Landscaper
//! - **Readiness**: Deployment checks aggregated into one result

pub mod apply;
pub mod components;
pub mod config;
pub mod error;
pub mod installer;
#[cfg(test)]
mod installer_test;
pub mod labels;
pub mod readiness;
pub mod values;
pub mod workload;

#[cfg(test)]
mod test_utils;

pub use apply::{OperationResult, create_or_update, delete_if_exists};
pub use components::{Clusters, Component, Exports};
pub use config::{
    DeployerConfig, InstanceConfiguration, InstanceIdentity, LandscaperConfig, RbacConfig, WorkloadTarget,
};
pub use error::InstallError;
pub use installer::InstanceInstaller;
pub use readiness::CheckResult;
pub use values::{Defaults, DeploymentConfig, ImageConfig, ValuesHelper, Verbosity};
