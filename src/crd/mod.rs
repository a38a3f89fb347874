//! Custom Resource Definitions for the Doris operator
//!
//! This module contains all CRD definitions used by the operator.

mod autoscaler;
mod cluster;
mod types;

pub use autoscaler::{DorisAutoscaler, DorisAutoscalerSpec};
pub use cluster::{DorisCluster, DorisClusterSpec, DorisClusterStatus};
pub use types::{
    ComponentSpec, Condition, ConditionStatus, FeServiceSpec, FeSpec, HadoopConf, Role,
    RoleDeclaration, StageAction, StageStatus,
};
