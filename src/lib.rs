//! Doris Operator - CRD-driven Kubernetes operator for Apache Doris clusters
//!
//! A `DorisCluster` declares up to four independently scaled roles:
//! - FE: metadata and query frontend
//! - BE: storage and execution backend
//! - CN: stateless compute nodes
//! - Broker: data movement to and from external storage
//!
//! The operator converges each declared role into a ConfigMap, Services and a
//! StatefulSet, and tears those objects down when a role is removed.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (DorisCluster, DorisAutoscaler)
//! - [`resources`] - Pure builders mapping a cluster spec to Kubernetes objects
//! - [`controller`] - Reconciliation pipeline and kube-runtime glue
//! - [`error`] - Error types and error aggregation

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod error;
pub mod resources;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// API group of the operator's custom resources and annotations
pub const API_GROUP: &str = "doris.al-assad.github.io";

/// Field manager name used for server-side writes
pub const FIELD_MANAGER: &str = "doris-operator";

/// Value of the `app.kubernetes.io/managed-by` label on managed objects
pub const MANAGED_BY: &str = "doris-operator";

/// Default image repository when neither the role nor the cluster sets one
pub const DEFAULT_IMAGE_REPOSITORY: &str = "apache/doris";
