//! CN (compute node) resources
//!
//! CN nodes run the BE binary with `be_node_role = computation` and keep only
//! a local cache on disk. Their replica count may be owned by a
//! DorisAutoscaler; that decision is made by the reconciler, not here.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

use super::common::{self, DataVolume, WorkloadProfile};
use crate::crd::{DorisCluster, Role};

/// Pod template annotation carrying the CN config hash
pub const CONFIG_HASH_ANNOTATION: &str = "doris.al-assad.github.io/cn-config";

const NODE_ROLE_KEY: &str = "be_node_role";
const NODE_ROLE: &str = "computation";

const PROFILE: WorkloadProfile = WorkloadProfile {
    role: Role::Cn,
    ports: super::be::PORTS,
    conf_file: "be.conf",
    conf_mount_path: "/etc/apache-doris/be/",
    log_mount_path: "/opt/apache-doris/be/log",
    data_volume: Some(DataVolume {
        name: "cn-cache",
        mount_path: "/opt/apache-doris/be/storage",
    }),
    readiness_port: "heartbeat-port",
    metrics_port: Some("webserver-port"),
};

/// CN ConfigMap, always declaring the computation node role
pub fn config_map(cluster: &DorisCluster) -> Option<ConfigMap> {
    let (key, cn) = common::declared(cluster, Role::Cn)?;
    let mut configs: BTreeMap<String, String> = cn.configs.clone();
    configs.insert(NODE_ROLE_KEY.to_string(), NODE_ROLE.to_string());
    Some(common::build_config_map(cluster, &key, &PROFILE, &configs))
}

/// CN client Service
pub fn service(cluster: &DorisCluster) -> Option<Service> {
    let (key, cn) = common::declared(cluster, Role::Cn)?;
    Some(common::build_service(cluster, &key, &PROFILE, cn))
}

/// CN headless peer Service
pub fn peer_service(cluster: &DorisCluster) -> Option<Service> {
    let (key, cn) = common::declared(cluster, Role::Cn)?;
    Some(common::build_peer_service(cluster, &key, &PROFILE, cn))
}

/// CN StatefulSet with the replica count from the spec
pub fn stateful_set(cluster: &DorisCluster) -> Option<StatefulSet> {
    let (key, cn) = common::declared(cluster, Role::Cn)?;
    Some(common::build_stateful_set(cluster, &key, &PROFILE, cn, vec![]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ComponentSpec, DorisClusterSpec};

    fn cluster(cn: ComponentSpec) -> DorisCluster {
        let mut cluster = DorisCluster::new(
            "doris",
            DorisClusterSpec {
                version: "2.1.7".to_string(),
                cn: Some(cn),
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some("data".to_string());
        cluster
    }

    #[test]
    fn config_forces_computation_role() {
        let cn = ComponentSpec {
            configs: BTreeMap::from([
                ("be_node_role".to_string(), "mix".to_string()),
                ("brpc_port".to_string(), "18060".to_string()),
            ]),
            ..Default::default()
        };
        let cm = config_map(&cluster(cn)).unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("doris-cn-config"));
        let conf = &cm.data.unwrap()["be.conf"];
        assert!(conf.contains("be_node_role = computation\n"));
        assert!(conf.contains("brpc_port = 18060\n"));
    }

    #[test]
    fn runs_be_image_with_declared_replicas() {
        let cn = ComponentSpec {
            replicas: 3,
            ..Default::default()
        };
        let sts = stateful_set(&cluster(cn)).unwrap();
        assert_eq!(sts.metadata.name.as_deref(), Some("doris-cn"));
        let spec = sts.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(
            spec.template.spec.unwrap().containers[0].image.as_deref(),
            Some("apache/doris:be-2.1.7")
        );
    }
}
