//! FE (frontend) resources
//!
//! FE nodes keep the cluster metadata in `fe-meta` and serve MySQL clients on
//! the query port. The client Service can be exposed through a NodePort or a
//! LoadBalancer via `spec.fe.service`.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

use super::common::{self, DataVolume, PortDef, WorkloadProfile};
use crate::crd::{DorisCluster, Role};

/// Pod template annotation carrying the FE config hash
pub const CONFIG_HASH_ANNOTATION: &str = "doris.al-assad.github.io/fe-config";

/// HTTP port name
pub const HTTP_PORT: &str = "http-port";
/// MySQL protocol port name
pub const QUERY_PORT: &str = "query-port";

/// FE port table
pub const PORTS: &[PortDef] = &[
    PortDef {
        name: HTTP_PORT,
        config_key: "http_port",
        default: 8030,
        client: true,
    },
    PortDef {
        name: "edit-log-port",
        config_key: "edit_log_port",
        default: 9010,
        client: false,
    },
    PortDef {
        name: "rpc-port",
        config_key: "rpc_port",
        default: 9020,
        client: false,
    },
    PortDef {
        name: QUERY_PORT,
        config_key: "query_port",
        default: 9030,
        client: true,
    },
];

const PROFILE: WorkloadProfile = WorkloadProfile {
    role: Role::Fe,
    ports: PORTS,
    conf_file: "fe.conf",
    conf_mount_path: "/etc/apache-doris/fe/",
    log_mount_path: "/opt/apache-doris/fe/log",
    data_volume: Some(DataVolume {
        name: "fe-meta",
        mount_path: "/opt/apache-doris/fe/doris-meta",
    }),
    readiness_port: QUERY_PORT,
    metrics_port: Some(HTTP_PORT),
};

/// FE ConfigMap
pub fn config_map(cluster: &DorisCluster) -> Option<ConfigMap> {
    let (key, fe) = common::declared(cluster, Role::Fe)?;
    Some(common::build_config_map(cluster, &key, &PROFILE, &fe.configs))
}

/// FE client Service with the user's type, traffic policy and NodePorts
pub fn service(cluster: &DorisCluster) -> Option<Service> {
    let (key, fe) = common::declared(cluster, Role::Fe)?;
    let mut svc = common::build_service(cluster, &key, &PROFILE, fe);

    if let (Some(custom), Some(spec)) = (cluster.spec.fe_service(), svc.spec.as_mut()) {
        if let Some(type_) = &custom.type_ {
            spec.type_ = Some(type_.clone());
        }
        spec.external_traffic_policy = custom.external_traffic_policy.clone();
        for port in spec.ports.iter_mut().flatten() {
            port.node_port = match port.name.as_deref() {
                Some(HTTP_PORT) => custom.http_port,
                Some(QUERY_PORT) => custom.query_port,
                _ => None,
            };
        }
    }
    Some(svc)
}

/// FE headless peer Service
pub fn peer_service(cluster: &DorisCluster) -> Option<Service> {
    let (key, fe) = common::declared(cluster, Role::Fe)?;
    Some(common::build_peer_service(cluster, &key, &PROFILE, fe))
}

/// FE StatefulSet
pub fn stateful_set(cluster: &DorisCluster) -> Option<StatefulSet> {
    let (key, fe) = common::declared(cluster, Role::Fe)?;
    Some(common::build_stateful_set(cluster, &key, &PROFILE, fe, vec![]))
}
