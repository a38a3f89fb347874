//! Per-role reconciliation
//!
//! All four roles share one reconciler. What differs between them lives in a
//! static [`RoleDescriptor`]: the builders to call, the pod template
//! annotation carrying the config hash, whether the role has a client-facing
//! Service, and whether an autoscaler may own its replica count.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use tracing::{debug, info, instrument};

use super::client::{AutoscalerLookup, ObjectStore};
use super::stage::{Stage, StageResult};
use crate::crd::{DorisCluster, Role, RoleDeclaration, StageAction};
use crate::resources::{self, be, broker, cn, common, fe, ManagedObject, ObjectKey, ObjectKind};
use crate::Error;

/// Static description of how to reconcile one role
pub struct RoleDescriptor {
    /// The role described
    pub role: Role,
    /// Pod template annotation carrying the config hash
    pub hash_annotation: &'static str,
    /// Whether a bound DorisAutoscaler owns the replica count
    pub replicas_owned_by_autoscaler: bool,
    /// ConfigMap builder
    pub config_map: fn(&DorisCluster) -> Option<ConfigMap>,
    /// Client Service builder, `None` for roles without one
    pub service: Option<fn(&DorisCluster) -> Option<Service>>,
    /// Headless peer Service builder
    pub peer_service: fn(&DorisCluster) -> Option<Service>,
    /// StatefulSet builder
    pub stateful_set: fn(&DorisCluster) -> Option<StatefulSet>,
}

impl RoleDescriptor {
    /// Whether the role has a client-facing Service
    pub fn has_client_service(&self) -> bool {
        self.service.is_some()
    }

    /// Descriptor of `role`
    pub fn for_role(role: Role) -> &'static RoleDescriptor {
        match role {
            Role::Fe => &DESCRIPTORS[0],
            Role::Be => &DESCRIPTORS[1],
            Role::Cn => &DESCRIPTORS[2],
            Role::Broker => &DESCRIPTORS[3],
        }
    }

    /// Objects of this role in deletion order
    fn delete_order(&self) -> impl Iterator<Item = ObjectKind> + '_ {
        [
            Some(ObjectKind::StatefulSet),
            self.has_client_service().then_some(ObjectKind::Service),
            Some(ObjectKind::PeerService),
            Some(ObjectKind::ConfigMap),
        ]
        .into_iter()
        .flatten()
    }
}

/// Descriptors of every role, in reconciliation order
pub static DESCRIPTORS: [RoleDescriptor; 4] = [
    RoleDescriptor {
        role: Role::Fe,
        hash_annotation: fe::CONFIG_HASH_ANNOTATION,
        replicas_owned_by_autoscaler: false,
        config_map: fe::config_map,
        service: Some(fe::service),
        peer_service: fe::peer_service,
        stateful_set: fe::stateful_set,
    },
    RoleDescriptor {
        role: Role::Be,
        hash_annotation: be::CONFIG_HASH_ANNOTATION,
        replicas_owned_by_autoscaler: false,
        config_map: be::config_map,
        service: Some(be::service),
        peer_service: be::peer_service,
        stateful_set: be::stateful_set,
    },
    RoleDescriptor {
        role: Role::Cn,
        hash_annotation: cn::CONFIG_HASH_ANNOTATION,
        replicas_owned_by_autoscaler: true,
        config_map: cn::config_map,
        service: Some(cn::service),
        peer_service: cn::peer_service,
        stateful_set: cn::stateful_set,
    },
    RoleDescriptor {
        role: Role::Broker,
        hash_annotation: broker::CONFIG_HASH_ANNOTATION,
        replicas_owned_by_autoscaler: false,
        config_map: broker::config_map,
        service: None,
        peer_service: broker::peer_service,
        stateful_set: broker::stateful_set,
    },
];

/// Put `hash` on the pod template under `annotation`
///
/// A changed hash changes the pod template and rolls the StatefulSet.
pub fn stamp_config_hash(sts: &mut StatefulSet, annotation: &str, hash: String) {
    if let Some(spec) = sts.spec.as_mut() {
        spec.template
            .metadata
            .get_or_insert_with(Default::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(annotation.to_string(), hash);
    }
}

type StepResult = Result<(), (ObjectKind, Error)>;

fn at(kind: ObjectKind) -> impl FnOnce(Error) -> (ObjectKind, Error) {
    move |e| (kind, e)
}

fn not_built(role: Role, kind: ObjectKind) -> (ObjectKind, Error) {
    (
        kind,
        Error::internal_with_context("builder", format!("{} {} was not built", role, kind)),
    )
}

/// Converges the objects of one role toward its declaration
pub struct RoleReconciler<'a> {
    cluster: &'a DorisCluster,
    cluster_key: &'a ObjectKey,
    store: &'a dyn ObjectStore,
    autoscalers: &'a dyn AutoscalerLookup,
}

impl<'a> RoleReconciler<'a> {
    /// Create a reconciler for the roles of `cluster`
    pub fn new(
        cluster: &'a DorisCluster,
        cluster_key: &'a ObjectKey,
        store: &'a dyn ObjectStore,
        autoscalers: &'a dyn AutoscalerLookup,
    ) -> Self {
        Self {
            cluster,
            cluster_key,
            store,
            autoscalers,
        }
    }

    /// Apply the role if declared, tear it down otherwise
    #[instrument(skip_all, fields(cluster = %self.cluster_key, role = descriptor.role.as_str()))]
    pub async fn reconcile(&self, descriptor: &RoleDescriptor) -> StageResult {
        let role = descriptor.role;
        let (action, outcome) = match self.cluster.spec.role(role) {
            RoleDeclaration::Declared(_) => (StageAction::Apply, self.apply(descriptor).await),
            RoleDeclaration::Absent => (StageAction::Delete, self.delete(descriptor).await),
        };
        match outcome {
            Ok(()) => StageResult::succeeded(Stage::Role(role), Some(action)),
            Err((kind, error)) => {
                StageResult::failed(Stage::Resource(role, kind), Some(action), error)
            }
        }
    }

    async fn put(&self, object: ManagedObject) -> StepResult {
        let kind = object.kind();
        let outcome = self
            .store
            .create_or_update(&object)
            .await
            .map_err(at(kind))?;
        debug!(kind = %kind, ?outcome, "object applied");
        Ok(())
    }

    async fn apply(&self, d: &RoleDescriptor) -> StepResult {
        let role = d.role;
        let cluster = self.cluster;

        let config_map =
            (d.config_map)(cluster).ok_or_else(|| not_built(role, ObjectKind::ConfigMap))?;
        let hash = common::config_hash(&config_map.data.clone().unwrap_or_default());
        self.put(ManagedObject::ConfigMap(config_map)).await?;

        if let Some(build) = d.service {
            let service = build(cluster).ok_or_else(|| not_built(role, ObjectKind::Service))?;
            self.put(ManagedObject::Service(service)).await?;
        }

        let peer =
            (d.peer_service)(cluster).ok_or_else(|| not_built(role, ObjectKind::PeerService))?;
        self.put(ManagedObject::PeerService(peer)).await?;

        let mut sts =
            (d.stateful_set)(cluster).ok_or_else(|| not_built(role, ObjectKind::StatefulSet))?;
        stamp_config_hash(&mut sts, d.hash_annotation, hash);

        if d.replicas_owned_by_autoscaler {
            let bound = self
                .autoscalers
                .find_bound_autoscaler(self.cluster_key)
                .await
                .map_err(at(ObjectKind::StatefulSet))?;
            if let Some(scaler) = bound {
                debug!(
                    autoscaler = %kube::ResourceExt::name_any(&scaler),
                    "replicas owned by autoscaler"
                );
                if let Some(spec) = sts.spec.as_mut() {
                    spec.replicas = None;
                }
            }
        }

        self.put(ManagedObject::StatefulSet(sts)).await
    }

    async fn delete(&self, d: &RoleDescriptor) -> StepResult {
        for kind in d.delete_order() {
            let key = resources::object_key(self.cluster_key, d.role, kind);
            let deleted = self
                .store
                .delete_if_exists(kind, &key)
                .await
                .map_err(at(kind))?;
            if deleted {
                info!(kind = %kind, object = %key, "deleted object of undeclared role");
            }
        }
        Ok(())
    }
}
