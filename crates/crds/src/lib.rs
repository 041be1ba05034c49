//! Landscaper Provider CRD Definitions
//!
//! Kubernetes Custom Resource Definitions consumed and produced by the
//! Landscaper instance controller:
//! - `LandscaperInstance`: a tenant's desired Landscaper installation
//! - `LandscaperProviderConfig`: provider-wide image catalog and sizing defaults
//! - `ClusterRequest` / `AccessRequest`: platform API used to obtain cluster access

pub mod access_request;
pub mod cluster_request;
pub mod conditions;
pub mod landscaper_instance;
pub mod provider_config;
pub mod references;

pub use access_request::*;
pub use cluster_request::*;
pub use conditions::*;
pub use landscaper_instance::*;
pub use provider_config::*;
pub use references::*;
