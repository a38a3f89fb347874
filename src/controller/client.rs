//! Kubernetes access for the reconciler
//!
//! The reconciliation pipeline talks to the cluster only through the traits in
//! this module so that tests can substitute mocks or an in-memory store.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{DorisAutoscaler, DorisCluster, DorisClusterStatus};
use crate::resources::{ManagedObject, ObjectKey, ObjectKind};
use crate::Error;

/// What `create_or_update` did to the live object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The object did not exist and was created
    Created,
    /// The object differed from the desired state and was updated
    Updated,
    /// The live object already carried the desired state
    Unchanged,
}

/// Namespaced object storage keyed by kind, namespace and name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether an object exists
    async fn exists(&self, kind: ObjectKind, key: &ObjectKey) -> Result<bool, Error>;

    /// Create an object that is known not to exist
    async fn create(&self, object: &ManagedObject) -> Result<(), Error>;

    /// Create the object, or update it when the live state differs
    ///
    /// Fields left unset in the desired object are not touched on the live
    /// one, so a StatefulSet without `replicas` keeps its current count.
    async fn create_or_update(&self, object: &ManagedObject) -> Result<ApplyOutcome, Error>;

    /// Delete an object, returning false if it was already gone
    async fn delete_if_exists(&self, kind: ObjectKind, key: &ObjectKey) -> Result<bool, Error>;
}

/// Lookup of autoscalers bound to a cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AutoscalerLookup: Send + Sync {
    /// Find the DorisAutoscaler in the cluster's namespace that targets it
    async fn find_bound_autoscaler(
        &self,
        cluster: &ObjectKey,
    ) -> Result<Option<DorisAutoscaler>, Error>;
}

/// Writer for the DorisCluster status subresource
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Patch the status of a DorisCluster
    async fn patch_status(
        &self,
        cluster: &ObjectKey,
        status: &DorisClusterStatus,
    ) -> Result<(), Error>;
}

// =============================================================================
// Content comparison
// =============================================================================

/// Resource maps whose values are quantities the API server canonicalizes
const QUANTITY_MAPS: &[&str] = &["requests", "limits"];

/// True if every field set in `desired` has the same value in `live`
///
/// Objects compare key by key and ignore keys only present in `live`. Arrays
/// must have the same length and compare element by element, so a removed
/// container or port is detected. Resource quantities compare by value, so
/// `0.5` matches the `500m` stored by the API server.
pub fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d.iter().all(|(k, dv)| match l.get(k) {
            Some(lv) if QUANTITY_MAPS.contains(&k.as_str()) => quantities_match(dv, lv),
            Some(lv) => is_subset(dv, lv),
            None => dv.is_null(),
        }),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| is_subset(dv, lv))
        }
        (d, l) => d == l,
    }
}

fn quantities_match(desired: &Value, live: &Value) -> bool {
    let (Value::Object(d), Value::Object(l)) = (desired, live) else {
        return is_subset(desired, live);
    };
    d.iter().all(|(name, dq)| match (l.get(name), dq) {
        (None, dq) => dq.is_null(),
        (Some(Value::String(lq)), Value::String(dq)) => dq == lq || same_quantity(dq, lq),
        (Some(lq), dq) => dq == lq,
    })
}

fn same_quantity(a: &str, b: &str) -> bool {
    match (parse_quantity(a), parse_quantity(b)) {
        (Some(a), Some(b)) => (a - b).abs() <= f64::EPSILON * a.abs().max(b.abs()) * 4.0,
        _ => false,
    }
}

/// Numeric value of a Kubernetes quantity such as `500m`, `1.5`, or `4Gi`
pub fn parse_quantity(quantity: &str) -> Option<f64> {
    const SUFFIXES: &[(&str, f64)] = &[
        ("Ki", 1024.0),
        ("Mi", 1048576.0),
        ("Gi", 1073741824.0),
        ("Ti", 1099511627776.0),
        ("Pi", 1125899906842624.0),
        ("Ei", 1152921504606846976.0),
        ("m", 1e-3),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];
    let quantity = quantity.trim();
    for (suffix, factor) in SUFFIXES {
        if let Some(number) = quantity.strip_suffix(suffix) {
            if let Ok(n) = number.parse::<f64>() {
                return Some(n * factor);
            }
        }
    }
    quantity.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Overlay `patch` onto `base`, recursing into objects
///
/// Keys absent from `patch` are kept. Arrays and scalars in `patch` replace
/// those in `base` unless `base` already carries them, in which case the
/// live entries and their server defaults stay as they are.
pub fn merge_into(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(b), Value::Object(p)) => {
            for (k, pv) in p {
                match b.get_mut(k) {
                    Some(bv) => merge_into(bv, pv),
                    None => {
                        b.insert(k.clone(), pv.clone());
                    }
                }
            }
        }
        (b, p) if is_subset(p, b) => {}
        (b, p) => *b = p.clone(),
    }
}

/// Full object to write back when `live` has drifted from `desired`
///
/// The result is the live object with the desired fields laid over it, so a
/// replace converges to exactly what [`is_subset`] checks. Fields the desired
/// object leaves unset, such as `spec.replicas` under an autoscaler, keep
/// their live values. The live `resourceVersion` is kept so the replace
/// fails on a concurrent write.
pub fn overlay(live: &Value, desired: &Value) -> Value {
    let mut merged = live.clone();
    if let Some(meta) = merged.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("managedFields");
    }
    merge_into(&mut merged, desired);
    merged
}

/// Status fields a pass may leave unset
const STATUS_FIELDS: &[&str] = &[
    "stage",
    "stageStatus",
    "stageAction",
    "message",
    "observedGeneration",
    "conditions",
];

/// Merge patch replacing the whole status
///
/// Unset fields are sent as `null` so values left over from an earlier pass,
/// such as the message of a failure, are removed.
pub fn status_patch(status: &DorisClusterStatus) -> Result<Value, Error> {
    let mut value = serde_json::to_value(status)?;
    if let Value::Object(fields) = &mut value {
        for field in STATUS_FIELDS {
            fields.entry(*field).or_insert(Value::Null);
        }
    }
    Ok(serde_json::json!({ "status": value }))
}

// =============================================================================
// Kubernetes implementation
// =============================================================================

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(crate::FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }

    async fn exists_as<K>(&self, key: &ObjectKey) -> Result<bool, Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        Ok(self.api::<K>(&key.namespace).get_opt(&key.name).await?.is_some())
    }

    async fn create_as<K>(&self, key: &ObjectKey, object: &K) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        self.api::<K>(&key.namespace)
            .create(&Self::post_params(), object)
            .await?;
        Ok(())
    }

    /// Create, or replace the live object with the desired fields laid over it
    async fn apply_as<K>(&self, key: &ObjectKey, desired: &K) -> Result<ApplyOutcome, Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Serialize + Debug,
        K::DynamicType: Default,
    {
        let api = self.api::<K>(&key.namespace);
        let Some(live) = api.get_opt(&key.name).await? else {
            api.create(&Self::post_params(), desired).await?;
            return Ok(ApplyOutcome::Created);
        };

        let desired = serde_json::to_value(desired)?;
        let live = serde_json::to_value(&live)?;
        if is_subset(&desired, &live) {
            return Ok(ApplyOutcome::Unchanged);
        }

        let replacement: K = serde_json::from_value(overlay(&live, &desired))?;
        api.replace(&key.name, &Self::post_params(), &replacement).await?;
        Ok(ApplyOutcome::Updated)
    }

    /// Create, or replace the ConfigMap when its data differs
    ///
    /// Replacing drops keys that are no longer rendered, which a merge would
    /// keep.
    async fn apply_config_map(
        &self,
        key: &ObjectKey,
        desired: &ConfigMap,
    ) -> Result<ApplyOutcome, Error> {
        let api = self.api::<ConfigMap>(&key.namespace);
        let Some(live) = api.get_opt(&key.name).await? else {
            api.create(&Self::post_params(), desired).await?;
            return Ok(ApplyOutcome::Created);
        };

        let labels_match = is_subset(
            &serde_json::to_value(&desired.metadata.labels)?,
            &serde_json::to_value(&live.metadata.labels)?,
        );
        if live.data == desired.data && labels_match {
            return Ok(ApplyOutcome::Unchanged);
        }

        let mut replacement = desired.clone();
        replacement.metadata.resource_version = live.metadata.resource_version.clone();
        api.replace(&key.name, &Self::post_params(), &replacement).await?;
        Ok(ApplyOutcome::Updated)
    }

    async fn delete_as<K>(&self, key: &ObjectKey) -> Result<bool, Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        match self
            .api::<K>(&key.namespace)
            .delete(&key.name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeClientImpl {
    async fn exists(&self, kind: ObjectKind, key: &ObjectKey) -> Result<bool, Error> {
        match kind {
            ObjectKind::Secret => self.exists_as::<Secret>(key).await,
            ObjectKind::ConfigMap => self.exists_as::<ConfigMap>(key).await,
            ObjectKind::Service | ObjectKind::PeerService => self.exists_as::<Service>(key).await,
            ObjectKind::StatefulSet => self.exists_as::<StatefulSet>(key).await,
        }
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), Error> {
        let key = object.key()?;
        match object {
            ManagedObject::Secret(o) => self.create_as(&key, o).await,
            ManagedObject::ConfigMap(o) => self.create_as(&key, o).await,
            ManagedObject::Service(o) | ManagedObject::PeerService(o) => {
                self.create_as(&key, o).await
            }
            ManagedObject::StatefulSet(o) => self.create_as(&key, o).await,
        }
    }

    async fn create_or_update(&self, object: &ManagedObject) -> Result<ApplyOutcome, Error> {
        let key = object.key()?;
        let outcome = match object {
            // Secret payloads are write-only on the wire and never compared.
            ManagedObject::Secret(o) => {
                if self.exists_as::<Secret>(&key).await? {
                    ApplyOutcome::Unchanged
                } else {
                    self.create_as(&key, o).await?;
                    ApplyOutcome::Created
                }
            }
            ManagedObject::ConfigMap(o) => self.apply_config_map(&key, o).await?,
            ManagedObject::Service(o) | ManagedObject::PeerService(o) => {
                self.apply_as(&key, o).await?
            }
            ManagedObject::StatefulSet(o) => self.apply_as(&key, o).await?,
        };
        debug!(kind = %object.kind(), object = %key, ?outcome, "applied object");
        Ok(outcome)
    }

    async fn delete_if_exists(&self, kind: ObjectKind, key: &ObjectKey) -> Result<bool, Error> {
        match kind {
            ObjectKind::Secret => self.delete_as::<Secret>(key).await,
            ObjectKind::ConfigMap => self.delete_as::<ConfigMap>(key).await,
            ObjectKind::Service | ObjectKind::PeerService => self.delete_as::<Service>(key).await,
            ObjectKind::StatefulSet => self.delete_as::<StatefulSet>(key).await,
        }
    }
}

#[async_trait]
impl AutoscalerLookup for KubeClientImpl {
    async fn find_bound_autoscaler(
        &self,
        cluster: &ObjectKey,
    ) -> Result<Option<DorisAutoscaler>, Error> {
        let scalers = self
            .api::<DorisAutoscaler>(&cluster.namespace)
            .list(&ListParams::default())
            .await?;
        Ok(scalers.items.into_iter().find(|a| a.targets(&cluster.name)))
    }
}

#[async_trait]
impl StatusWriter for KubeClientImpl {
    async fn patch_status(
        &self,
        cluster: &ObjectKey,
        status: &DorisClusterStatus,
    ) -> Result<(), Error> {
        let api = self.api::<DorisCluster>(&cluster.namespace);
        let status_patch = status_patch(status)?;

        api.patch_status(
            &cluster.name,
            &PatchParams::apply(crate::FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn live_defaults_do_not_count_as_drift() {
        let desired = json!({
            "spec": {"replicas": 3, "template": {"spec": {"containers": [{"name": "fe"}]}}}
        });
        let live = json!({
            "metadata": {"resourceVersion": "42"},
            "spec": {
                "replicas": 3,
                "revisionHistoryLimit": 10,
                "template": {"spec": {"containers": [{
                    "name": "fe",
                    "terminationMessagePath": "/dev/termination-log"
                }]}}
            }
        });
        assert!(is_subset(&desired, &live));
    }

    #[test]
    fn changed_or_removed_entries_are_drift() {
        let live = json!({"spec": {"replicas": 3, "ports": [{"port": 1}, {"port": 2}]}});
        assert!(!is_subset(&json!({"spec": {"replicas": 4}}), &live));
        assert!(!is_subset(&json!({"spec": {"ports": [{"port": 1}]}}), &live));
        assert!(!is_subset(&json!({"spec": {"paused": true}}), &live));
    }

    /// Story: a StatefulSet without replicas leaves the live count alone
    #[test]
    fn story_missing_replicas_is_not_drift() {
        let desired = json!({"spec": {"serviceName": "doris-cn-peer"}});
        let mut live = json!({"spec": {"replicas": 5, "serviceName": "doris-cn-peer"}});
        assert!(is_subset(&desired, &live));

        merge_into(&mut live, &json!({"spec": {"serviceName": "x"}}));
        assert_eq!(live["spec"]["replicas"], 5);
        assert_eq!(live["spec"]["serviceName"], "x");
    }

    #[test]
    fn merge_replaces_arrays() {
        let mut base = json!({"ports": [1, 2, 3], "keep": true});
        merge_into(&mut base, &json!({"ports": [4]}));
        assert_eq!(base, json!({"ports": [4], "keep": true}));
    }

    #[test]
    fn merge_keeps_matching_arrays_with_their_defaults() {
        let mut base = json!({"ports": [{"port": 1, "protocol": "TCP"}]});
        merge_into(&mut base, &json!({"ports": [{"port": 1}]}));
        assert_eq!(base["ports"][0]["protocol"], "TCP");
    }

    #[test]
    fn status_patch_clears_unset_fields() {
        let status = DorisClusterStatus {
            stage: Some("complete".to_string()),
            ..Default::default()
        };
        let patch = status_patch(&status).unwrap();
        assert_eq!(patch["status"]["stage"], "complete");
        assert_eq!(patch["status"]["message"], Value::Null);
        assert!(patch["status"].as_object().unwrap().contains_key("message"));
    }

    #[test]
    fn quantities_compare_by_value() {
        let live = json!({"resources": {"requests": {"cpu": "500m", "memory": "1Gi"}}});
        let same = json!({"resources": {"requests": {"cpu": "0.5", "memory": "1024Mi"}}});
        let more = json!({"resources": {"requests": {"cpu": "1"}}});
        assert!(is_subset(&same, &live));
        assert!(!is_subset(&more, &live));

        assert_eq!(parse_quantity("4Gi"), Some(4.0 * 1073741824.0));
        assert_eq!(parse_quantity("2k"), Some(2000.0));
        assert_eq!(parse_quantity("1e3"), Some(1000.0));
        assert_eq!(parse_quantity("lots"), None);
    }

    /// Story: dropping an env var converges in one write
    ///
    /// The replacement drops the stale entry, keeps the live replica count
    /// and resourceVersion, and the next comparison finds nothing to do.
    #[test]
    fn story_overlay_converges_after_removed_entry() {
        let live = json!({
            "metadata": {
                "name": "doris-be",
                "resourceVersion": "7",
                "managedFields": [{"manager": "x"}]
            },
            "spec": {
                "replicas": 5,
                "template": {"spec": {"containers": [{
                    "name": "be",
                    "env": [{"name": "A", "value": "1"}, {"name": "B", "value": "2"}],
                    "resources": {"requests": {"cpu": "500m"}}
                }]}}
            }
        });
        let desired = json!({
            "metadata": {"name": "doris-be"},
            "spec": {
                "template": {"spec": {"containers": [{
                    "name": "be",
                    "env": [{"name": "A", "value": "1"}],
                    "resources": {"requests": {"cpu": "0.5"}}
                }]}}
            }
        });
        assert!(!is_subset(&desired, &live));

        let replaced = overlay(&live, &desired);
        assert_eq!(replaced["metadata"]["resourceVersion"], "7");
        assert!(replaced["metadata"].get("managedFields").is_none());
        assert_eq!(replaced["spec"]["replicas"], 5);
        let env = replaced["spec"]["template"]["spec"]["containers"][0]["env"]
            .as_array()
            .unwrap();
        assert_eq!(env.len(), 1);
        assert!(is_subset(&desired, &replaced));
    }
}
