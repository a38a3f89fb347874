//! DorisAutoscaler Custom Resource Definition
//!
//! A DorisAutoscaler binds an external scaling controller to the CN role of a
//! DorisCluster. While one exists, the CN replica count belongs to it and the
//! cluster reconciler stops writing `spec.replicas` on the CN StatefulSet.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a DorisAutoscaler
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "doris.al-assad.github.io",
    version = "v1beta1",
    kind = "DorisAutoscaler",
    plural = "dorisautoscalers",
    shortname = "das",
    namespaced,
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.cluster"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DorisAutoscalerSpec {
    /// Name of the DorisCluster in the same namespace
    pub cluster: String,

    /// Lower bound for CN replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,

    /// Upper bound for CN replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,
}

impl DorisAutoscaler {
    /// True if this autoscaler targets the named cluster
    pub fn targets(&self, cluster_name: &str) -> bool {
        self.spec.cluster == cluster_name
    }
}
