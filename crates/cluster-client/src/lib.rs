//! Cluster client
//!
//! Object-level access to the Kubernetes API endpoints the Landscaper
//! provider works against: the platform cluster holding instance records,
//! the per-tenant control plane, and the workload cluster.
//!
//! # Features
//!
//! - **`ClusterClient` trait**: JSON-level get/create/replace/patch/delete
//! - **kube-rs implementation**: `KubeClusterClient`, including construction
//!   from raw kubeconfig bytes
//! - **Typed helpers**: `typed::{get, list, create, replace, patch, patch_status, delete}`
//! - **Mock**: in-memory `MockClusterClient` behind the `test-util` feature

pub mod client;
pub mod error;
pub mod kube_client;
pub mod merge;
pub mod typed;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ClusterClient;
pub use error::ClusterError;
pub use kube_client::KubeClusterClient;
#[cfg(feature = "test-util")]
pub use mock::{MockClusterClient, Verb, WriteRecord};
