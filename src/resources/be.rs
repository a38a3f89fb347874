//! BE (backend) resources

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

use super::common::{self, DataVolume, PortDef, WorkloadProfile};
use crate::crd::{DorisCluster, Role};

/// Pod template annotation carrying the BE config hash
pub const CONFIG_HASH_ANNOTATION: &str = "doris.al-assad.github.io/be-config";

/// Port table shared by BE and CN, which run the same binary
pub const PORTS: &[PortDef] = &[
    PortDef {
        name: "be-port",
        config_key: "be_port",
        default: 9060,
        client: true,
    },
    PortDef {
        name: "webserver-port",
        config_key: "webserver_port",
        default: 8040,
        client: true,
    },
    PortDef {
        name: "heartbeat-port",
        config_key: "heartbeat_service_port",
        default: 9050,
        client: false,
    },
    PortDef {
        name: "brpc-port",
        config_key: "brpc_port",
        default: 8060,
        client: false,
    },
];

const PROFILE: WorkloadProfile = WorkloadProfile {
    role: Role::Be,
    ports: PORTS,
    conf_file: "be.conf",
    conf_mount_path: "/etc/apache-doris/be/",
    log_mount_path: "/opt/apache-doris/be/log",
    data_volume: Some(DataVolume {
        name: "be-storage",
        mount_path: "/opt/apache-doris/be/storage",
    }),
    readiness_port: "heartbeat-port",
    metrics_port: Some("webserver-port"),
};

/// BE ConfigMap
pub fn config_map(cluster: &DorisCluster) -> Option<ConfigMap> {
    let (key, be) = common::declared(cluster, Role::Be)?;
    Some(common::build_config_map(cluster, &key, &PROFILE, &be.configs))
}

/// BE client Service
pub fn service(cluster: &DorisCluster) -> Option<Service> {
    let (key, be) = common::declared(cluster, Role::Be)?;
    Some(common::build_service(cluster, &key, &PROFILE, be))
}

/// BE headless peer Service
pub fn peer_service(cluster: &DorisCluster) -> Option<Service> {
    let (key, be) = common::declared(cluster, Role::Be)?;
    Some(common::build_peer_service(cluster, &key, &PROFILE, be))
}

/// BE StatefulSet
pub fn stateful_set(cluster: &DorisCluster) -> Option<StatefulSet> {
    let (key, be) = common::declared(cluster, Role::Be)?;
    Some(common::build_stateful_set(cluster, &key, &PROFILE, be, vec![]))
}
