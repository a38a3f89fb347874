//! Test fixtures and an in-memory object store
//!
//! The in-memory store follows the same comparison rules as the Kubernetes
//! client so multi-pass scenarios can be checked without an API server.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::client::{is_subset, overlay, ApplyOutcome, AutoscalerLookup, ObjectStore};
use crate::crd::{
    ComponentSpec, DorisAutoscaler, DorisAutoscalerSpec, DorisCluster, DorisClusterSpec, FeSpec,
};
use crate::resources::{ManagedObject, ObjectKey, ObjectKind};
use crate::Error;

pub fn component(replicas: i32) -> ComponentSpec {
    ComponentSpec {
        replicas,
        ..Default::default()
    }
}

pub fn fe_spec(replicas: i32) -> FeSpec {
    FeSpec {
        component: component(replicas),
        service: None,
    }
}

/// A cluster named `doris` in namespace `data`
pub fn cluster_with(spec: DorisClusterSpec) -> DorisCluster {
    let mut cluster = DorisCluster::new("doris", spec);
    cluster.metadata.namespace = Some("data".to_string());
    cluster.metadata.uid = Some("0b7c6a2e-cluster".to_string());
    cluster.metadata.generation = Some(1);
    cluster
}

pub fn autoscaler(cluster: &str) -> DorisAutoscaler {
    let mut scaler = DorisAutoscaler::new(
        &format!("{}-cn", cluster),
        DorisAutoscalerSpec {
            cluster: cluster.to_string(),
            min_replicas: Some(1),
            max_replicas: Some(10),
        },
    );
    scaler.metadata.namespace = Some("data".to_string());
    scaler
}

/// Services and peer Services share one API kind
fn api_kind(kind: ObjectKind) -> ObjectKind {
    match kind {
        ObjectKind::PeerService => ObjectKind::Service,
        other => other,
    }
}

/// One write issued against the store
#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Create(ObjectKind, String),
    Update(ObjectKind, String),
    Delete(ObjectKind, String),
}

/// In-memory [`ObjectStore`] recording every write
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<(ObjectKind, ObjectKey), Value>>,
    writes: Mutex<Vec<Write>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: ObjectKind, name: &str) -> Option<Value> {
        let key = (api_kind(kind), ObjectKey::new("data", name));
        self.objects.lock().unwrap().get(&key).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .map(|(kind, key)| format!("{}/{}", kind, key.name))
            .collect()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    pub fn updates(&self) -> Vec<Write> {
        self.writes()
            .into_iter()
            .filter(|w| matches!(w, Write::Update(..)))
            .collect()
    }

    /// Overwrite a field on a stored object, as another controller would
    pub fn set_field(&self, kind: ObjectKind, name: &str, pointer: &str, value: Value) {
        let key = (api_kind(kind), ObjectKey::new("data", name));
        if let Some(target) = self
            .objects
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|o| o.pointer_mut(pointer))
        {
            *target = value;
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn exists(&self, kind: ObjectKind, key: &ObjectKey) -> Result<bool, Error> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .contains_key(&(api_kind(kind), key.clone())))
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), Error> {
        let key = object.key()?;
        let mut objects = self.objects.lock().unwrap();
        let slot = (api_kind(object.kind()), key.clone());
        if objects.contains_key(&slot) {
            return Err(Error::internal_with_context("memory-store", "already exists"));
        }
        objects.insert(slot, object.to_value()?);
        self.writes
            .lock()
            .unwrap()
            .push(Write::Create(object.kind(), key.name));
        Ok(())
    }

    async fn create_or_update(&self, object: &ManagedObject) -> Result<ApplyOutcome, Error> {
        let key = object.key()?;
        let desired = object.to_value()?;
        let mut objects = self.objects.lock().unwrap();
        let slot = (api_kind(object.kind()), key.clone());

        let outcome = match objects.get_mut(&slot) {
            None => {
                objects.insert(slot, desired);
                ApplyOutcome::Created
            }
            Some(_) if object.kind() == ObjectKind::Secret => ApplyOutcome::Unchanged,
            Some(live) if object.kind() == ObjectKind::ConfigMap => {
                if live.get("data") == desired.get("data") {
                    ApplyOutcome::Unchanged
                } else {
                    *live = desired;
                    ApplyOutcome::Updated
                }
            }
            Some(live) => {
                if is_subset(&desired, live) {
                    ApplyOutcome::Unchanged
                } else {
                    *live = overlay(live, &desired);
                    ApplyOutcome::Updated
                }
            }
        };

        let write = match outcome {
            ApplyOutcome::Created => Some(Write::Create(object.kind(), key.name)),
            ApplyOutcome::Updated => Some(Write::Update(object.kind(), key.name)),
            ApplyOutcome::Unchanged => None,
        };
        self.writes.lock().unwrap().extend(write);
        Ok(outcome)
    }

    async fn delete_if_exists(&self, kind: ObjectKind, key: &ObjectKey) -> Result<bool, Error> {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&(api_kind(kind), key.clone()))
            .is_some();
        if removed {
            self.writes
                .lock()
                .unwrap()
                .push(Write::Delete(kind, key.name.clone()));
        }
        Ok(removed)
    }
}

/// In-memory [`AutoscalerLookup`] whose bindings can change between passes
#[derive(Default)]
pub struct MemoryAutoscalers {
    scalers: Mutex<Vec<DorisAutoscaler>>,
}

impl MemoryAutoscalers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, scaler: DorisAutoscaler) {
        self.scalers.lock().unwrap().push(scaler);
    }
}

#[async_trait]
impl AutoscalerLookup for MemoryAutoscalers {
    async fn find_bound_autoscaler(
        &self,
        cluster: &ObjectKey,
    ) -> Result<Option<DorisAutoscaler>, Error> {
        Ok(self
            .scalers
            .lock()
            .unwrap()
            .iter()
            .find(|a| {
                a.metadata.namespace.as_deref() == Some(cluster.namespace.as_str())
                    && a.targets(&cluster.name)
            })
            .cloned())
    }
}
