//! Controller implementation for DorisCluster
//!
//! This module contains the reconciliation pipeline and the kube-runtime glue
//! around it. Controllers follow the Kubernetes controller pattern: every pass
//! rebuilds the desired objects from the spec and converges the live ones.

pub mod client;
mod cluster;
pub mod role;
pub mod stage;

#[cfg(test)]
mod testing;

pub use client::{
    ApplyOutcome, AutoscalerLookup, KubeClientImpl, ObjectStore, StatusWriter,
};
pub use cluster::{
    error_policy, reconcile, status_for, ClusterReconciler, Context, ContextBuilder,
    ReconcilerConfig, RECONCILED_CONDITION,
};
pub use role::{RoleDescriptor, RoleReconciler, DESCRIPTORS};
pub use stage::{Stage, StageResult};
