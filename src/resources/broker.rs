//! Broker resources
//!
//! Brokers are only reached by FE and BE through their peer Service, so there
//! is no client-facing Service for this role.

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};

use super::common::{self, PortDef, WorkloadProfile};
use crate::crd::{DorisCluster, Role};

/// Pod template annotation carrying the Broker config hash
pub const CONFIG_HASH_ANNOTATION: &str = "doris.al-assad.github.io/broker-config";

/// Broker port table
pub const PORTS: &[PortDef] = &[PortDef {
    name: "broker-ipc-port",
    config_key: "broker_ipc_port",
    default: 8000,
    client: false,
}];

const PROFILE: WorkloadProfile = WorkloadProfile {
    role: Role::Broker,
    ports: PORTS,
    conf_file: "apache_hdfs_broker.conf",
    conf_mount_path: "/etc/apache-doris/broker/",
    log_mount_path: "/opt/apache-doris/apache_hdfs_broker/log",
    data_volume: None,
    readiness_port: "broker-ipc-port",
    metrics_port: None,
};

/// Broker ConfigMap
pub fn config_map(cluster: &DorisCluster) -> Option<ConfigMap> {
    let (key, broker) = common::declared(cluster, Role::Broker)?;
    Some(common::build_config_map(cluster, &key, &PROFILE, &broker.configs))
}

/// Broker headless peer Service
pub fn peer_service(cluster: &DorisCluster) -> Option<Service> {
    let (key, broker) = common::declared(cluster, Role::Broker)?;
    Some(common::build_peer_service(cluster, &key, &PROFILE, broker))
}

/// Broker StatefulSet
pub fn stateful_set(cluster: &DorisCluster) -> Option<StatefulSet> {
    let (key, broker) = common::declared(cluster, Role::Broker)?;
    Some(common::build_stateful_set(cluster, &key, &PROFILE, broker, vec![]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ComponentSpec, DorisClusterSpec};

    #[test]
    fn broker_has_no_data_volume_or_scrape_annotations() {
        let mut cluster = DorisCluster::new(
            "doris",
            DorisClusterSpec {
                version: "2.1.7".to_string(),
                broker: Some(ComponentSpec::default()),
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some("data".to_string());

        let sts = stateful_set(&cluster).unwrap();
        let spec = sts.spec.unwrap();
        assert!(spec.volume_claim_templates.is_none());
        let template = spec.template;
        assert!(template.metadata.unwrap().annotations.unwrap().is_empty());
        assert_eq!(template.spec.unwrap().volumes.unwrap().len(), 2);

        let peer = peer_service(&cluster).unwrap();
        assert_eq!(peer.metadata.name.as_deref(), Some("doris-broker-peer"));
    }
}
