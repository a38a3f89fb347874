//! Resource builders for Doris roles
//!
//! Every function here is a pure mapping from a [`DorisCluster`] to a
//! Kubernetes object. Builders return `None` when the role they serve is not
//! declared and never talk to the API server.
//!
//! Object identities are derived from the cluster's own namespace and name,
//! the role, and the object kind, so re-running a builder always targets the
//! same object.
//!
//! [`DorisCluster`]: crate::crd::DorisCluster

pub mod be;
pub mod broker;
pub mod cn;
pub mod common;
pub mod fe;
pub mod secret;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::crd::Role;
use crate::Error;

/// Namespace and name of a namespaced object
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    fn derive(&self, suffix: &str) -> Self {
        Self::new(self.namespace.clone(), format!("{}-{}", self.name, suffix))
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of a managed object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// Operator account Secret
    Secret,
    /// Role configuration bundle
    ConfigMap,
    /// Client-facing Service
    Service,
    /// Headless peer Service
    PeerService,
    /// Role workload
    StatefulSet,
}

impl ObjectKind {
    /// Short name used in stage identifiers and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::ConfigMap => "configmap",
            Self::Service => "service",
            Self::PeerService => "peer-service",
            Self::StatefulSet => "statefulset",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully built object ready to be written to the API server
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedObject {
    /// Operator account Secret
    Secret(Secret),
    /// Role configuration bundle
    ConfigMap(ConfigMap),
    /// Client-facing Service
    Service(Service),
    /// Headless peer Service
    PeerService(Service),
    /// Role workload
    StatefulSet(StatefulSet),
}

impl ManagedObject {
    /// Kind of this object
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Secret(_) => ObjectKind::Secret,
            Self::ConfigMap(_) => ObjectKind::ConfigMap,
            Self::Service(_) => ObjectKind::Service,
            Self::PeerService(_) => ObjectKind::PeerService,
            Self::StatefulSet(_) => ObjectKind::StatefulSet,
        }
    }

    /// Metadata of the wrapped object
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Secret(o) => &o.metadata,
            Self::ConfigMap(o) => &o.metadata,
            Self::Service(o) | Self::PeerService(o) => &o.metadata,
            Self::StatefulSet(o) => &o.metadata,
        }
    }

    /// Namespace and name of the wrapped object
    pub fn key(&self) -> crate::Result<ObjectKey> {
        let meta = self.metadata();
        match (meta.namespace.as_ref(), meta.name.as_ref()) {
            (Some(ns), Some(name)) => Ok(ObjectKey::new(ns.clone(), name.clone())),
            _ => Err(Error::internal_with_context(
                "resources",
                format!("{} is missing namespace or name", self.kind()),
            )),
        }
    }

    /// Serialize the wrapped object to JSON
    pub fn to_value(&self) -> crate::Result<serde_json::Value> {
        let value = match self {
            Self::Secret(o) => serde_json::to_value(o)?,
            Self::ConfigMap(o) => serde_json::to_value(o)?,
            Self::Service(o) | Self::PeerService(o) => serde_json::to_value(o)?,
            Self::StatefulSet(o) => serde_json::to_value(o)?,
        };
        Ok(value)
    }
}

// =============================================================================
// Object identities
// =============================================================================

/// ConfigMap holding a role's configuration: `<cluster>-<role>-config`
pub fn config_map_key(cluster: &ObjectKey, role: Role) -> ObjectKey {
    cluster.derive(&format!("{}-config", role))
}

/// Client-facing Service of a role: `<cluster>-<role>`
pub fn service_key(cluster: &ObjectKey, role: Role) -> ObjectKey {
    cluster.derive(role.as_str())
}

/// Headless peer Service of a role: `<cluster>-<role>-peer`
pub fn peer_service_key(cluster: &ObjectKey, role: Role) -> ObjectKey {
    cluster.derive(&format!("{}-peer", role))
}

/// StatefulSet of a role: `<cluster>-<role>`
pub fn stateful_set_key(cluster: &ObjectKey, role: Role) -> ObjectKey {
    cluster.derive(role.as_str())
}

/// Secret holding the operator's SQL account: `<cluster>-operator-account`
pub fn account_secret_key(cluster: &ObjectKey) -> ObjectKey {
    cluster.derive("operator-account")
}

/// Port table of a role
///
/// CN shares the BE ports since it runs the BE binary.
pub fn port_table(role: Role) -> &'static [common::PortDef] {
    match role {
        Role::Fe => fe::PORTS,
        Role::Be | Role::Cn => be::PORTS,
        Role::Broker => broker::PORTS,
    }
}

/// Key of the object of `kind` owned by `role`
///
/// The account Secret is shared by all roles and ignores `role`.
pub fn object_key(cluster: &ObjectKey, role: Role, kind: ObjectKind) -> ObjectKey {
    match kind {
        ObjectKind::Secret => account_secret_key(cluster),
        ObjectKind::ConfigMap => config_map_key(cluster, role),
        ObjectKind::Service => service_key(cluster, role),
        ObjectKind::PeerService => peer_service_key(cluster, role),
        ObjectKind::StatefulSet => stateful_set_key(cluster, role),
    }
}
