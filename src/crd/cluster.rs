//! DorisCluster Custom Resource Definition
//!
//! A DorisCluster declares the desired FE, BE, CN and Broker roles of one
//! Doris cluster. A role that is left out is torn down by the operator.

use k8s_openapi::api::core::v1::{Affinity, LocalObjectReference, Toleration};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ComponentSpec, Condition, FeServiceSpec, FeSpec, HadoopConf, Role, RoleDeclaration,
    StageAction, StageStatus,
};
use crate::error::TaggedErrors;
use crate::resources::{port_table, ObjectKey};

/// Specification for a DorisCluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "doris.al-assad.github.io",
    version = "v1beta1",
    kind = "DorisCluster",
    plural = "dorisclusters",
    shortname = "dc",
    status = "DorisClusterStatus",
    namespaced,
    printcolumn = r#"{"name":"Stage","type":"string","jsonPath":".status.stage"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.stageStatus"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DorisClusterSpec {
    /// Doris version, used as the image tag suffix
    pub version: String,

    /// Image repository for all roles (default `apache/doris`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_repository: Option<String>,

    /// Image pull policy for all containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Image pull secrets for all pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Default ServiceAccount for all roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,

    /// Default affinity for all roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Default tolerations for all roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Default PriorityClass for all roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Default StatefulSet update strategy type for all roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateful_set_update_strategy: Option<String>,

    /// Hadoop client configuration shared by all roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hadoop_conf: Option<HadoopConf>,

    /// Frontend role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fe: Option<FeSpec>,

    /// Backend role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub be: Option<ComponentSpec>,

    /// Compute node role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cn: Option<ComponentSpec>,

    /// Broker role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker: Option<ComponentSpec>,
}

impl DorisClusterSpec {
    /// Whether `role` is declared, and with which configuration
    pub fn role(&self, role: Role) -> RoleDeclaration<'_> {
        match role {
            Role::Fe => self.fe.as_ref().map(|fe| &fe.component).into(),
            Role::Be => self.be.as_ref().into(),
            Role::Cn => self.cn.as_ref().into(),
            Role::Broker => self.broker.as_ref().into(),
        }
    }

    /// Client Service customization of the FE role
    pub fn fe_service(&self) -> Option<&FeServiceSpec> {
        self.fe.as_ref().and_then(|fe| fe.service.as_ref())
    }

    /// Image of a role's main container
    ///
    /// CN nodes run the BE image.
    pub fn image_for(&self, role: Role, component: &ComponentSpec) -> String {
        if let Some(image) = &component.image {
            return image.clone();
        }
        let repository = self
            .image_repository
            .as_deref()
            .unwrap_or(crate::DEFAULT_IMAGE_REPOSITORY);
        let flavor = match role {
            Role::Cn => Role::Be.as_str(),
            other => other.as_str(),
        };
        format!("{}:{}-{}", repository, flavor, self.version)
    }

    /// Validate the cluster specification
    ///
    /// Every declared role is checked and all problems are reported together,
    /// tagged by role.
    pub fn validate(&self) -> crate::Result<()> {
        let mut errors = TaggedErrors::new();

        if self.version.trim().is_empty() {
            errors.push("cluster", "version must not be empty");
        }

        for role in Role::ALL {
            let RoleDeclaration::Declared(spec) = self.role(role) else {
                continue;
            };
            if spec.replicas < 0 {
                errors.push(
                    role.as_str(),
                    format!("replicas must not be negative, got {}", spec.replicas),
                );
            }
            // Only ports the operator exposes are checked; Doris accepts
            // values such as -1 for listeners it should not open.
            for def in port_table(role) {
                let Some(value) = spec.configs.get(def.config_key) else {
                    continue;
                };
                match value.trim().parse::<i32>() {
                    Ok(port) if (1..=65535).contains(&port) => {}
                    _ => errors.push(
                        role.as_str(),
                        format!("config '{}' is not a valid port: '{}'", def.config_key, value),
                    ),
                }
            }
        }

        errors.into_result()
    }
}

impl DorisCluster {
    /// Namespace and name of this cluster
    ///
    /// Returns `None` for objects without a namespace, which the API server
    /// never produces for this namespaced kind.
    pub fn key(&self) -> Option<ObjectKey> {
        Some(ObjectKey::new(self.namespace()?, self.name_any()))
    }
}

/// Status for a DorisCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DorisClusterStatus {
    /// Last stage reached by the reconciler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,

    /// Outcome of that stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_status: Option<StageStatus>,

    /// Action taken by that stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_action: Option<StageAction>,

    /// Error message of a failed stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the spec the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions representing the cluster state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl DorisClusterStatus {
    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Set the observed generation and return self for chaining
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    /// Add a condition and return self for chaining
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// Keep the transition time of every condition whose status is unchanged
    ///
    /// `lastTransitionTime` only moves when a condition flips.
    pub fn carry_transition_times(mut self, previous: Option<&DorisClusterStatus>) -> Self {
        let Some(previous) = previous else {
            return self;
        };
        for condition in &mut self.conditions {
            if let Some(old) = previous
                .conditions
                .iter()
                .find(|c| c.type_ == condition.type_ && c.status == condition.status)
            {
                condition.last_transition_time = old.last_transition_time;
            }
        }
        self
    }
}
