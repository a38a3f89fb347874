//! Supporting types for Doris CRDs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvVar, HostAlias, Toleration, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One of the independently scaled roles of a Doris cluster
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Frontend: metadata, query planning, client endpoint
    Fe,
    /// Backend: storage and execution
    Be,
    /// Compute node: stateless execution
    Cn,
    /// Broker: external storage access
    Broker,
}

impl Role {
    /// All roles in reconciliation order
    pub const ALL: [Role; 4] = [Role::Fe, Role::Be, Role::Cn, Role::Broker];

    /// Short lowercase name used in object names, labels and config file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fe => "fe",
            Self::Be => "be",
            Self::Cn => "cn",
            Self::Broker => "broker",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a role is wanted in the cluster
///
/// This is the only input deciding between the apply and delete paths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RoleDeclaration<'a> {
    /// The role is declared with this configuration
    Declared(&'a ComponentSpec),
    /// The role is not part of the cluster
    Absent,
}

impl<'a> From<Option<&'a ComponentSpec>> for RoleDeclaration<'a> {
    fn from(spec: Option<&'a ComponentSpec>) -> Self {
        match spec {
            Some(spec) => Self::Declared(spec),
            None => Self::Absent,
        }
    }
}

impl RoleDeclaration<'_> {
    /// True for [`RoleDeclaration::Declared`]
    pub fn is_declared(&self) -> bool {
        matches!(self, Self::Declared(_))
    }
}

fn default_replicas() -> i32 {
    1
}

/// Desired configuration shared by every role
///
/// Unset placement fields fall back to the cluster-wide value, then to a
/// compiled-in default.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Number of pods in the StatefulSet
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Full image reference overriding `<imageRepository>:<role>-<version>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Entries rendered into the role's configuration file
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configs: BTreeMap<String, String>,

    /// Resource requests; `storage` sizes the data volume claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<BTreeMap<String, Quantity>>,

    /// Resource limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, Quantity>>,

    /// StorageClass of the data volume claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// ServiceAccount for the pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Pod affinity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Pod tolerations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// PriorityClass of the pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// StatefulSet update strategy type (RollingUpdate or OnDelete)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateful_set_update_strategy: Option<String>,

    /// Extra /etc/hosts entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_aliases: Vec<HostAlias>,

    /// Environment variables appended to the main container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_envs: Vec<EnvVar>,

    /// Volumes appended to the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_volumes: Vec<Volume>,

    /// Volume mounts appended to the main container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_volume_mounts: Vec<VolumeMount>,

    /// Sidecar containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_containers: Vec<Container>,

    /// Init containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_init_containers: Vec<Container>,
}

/// FE role specification
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeSpec {
    /// Settings shared with other roles
    #[serde(flatten)]
    pub component: ComponentSpec,

    /// Client-facing Service customization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<FeServiceSpec>,
}

/// Customization of the FE client Service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeServiceSpec {
    /// Service type (ClusterIP, NodePort, LoadBalancer)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// External traffic policy (Cluster or Local)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_traffic_policy: Option<String>,

    /// NodePort for the HTTP port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_port: Option<i32>,

    /// NodePort for the MySQL query port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_port: Option<i32>,
}

/// Hadoop client configuration shared by all roles
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HadoopConf {
    /// File name to content, merged into every role's ConfigMap
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,

    /// Host entries for HDFS nodes, merged into every role's pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<HostAlias>,
}

/// Result status of a reconciliation stage
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage finished without error
    Succeeded,
    /// Stage aborted with an error
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// What a reconciliation stage did to its objects
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum StageAction {
    /// Objects were created or updated
    Apply,
    /// Objects were deleted
    Delete,
}

impl std::fmt::Display for StageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apply => write!(f, "Apply"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Reconciled)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}
