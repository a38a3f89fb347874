//! Building blocks shared by all role builders
//!
//! A role is described by a [`WorkloadProfile`]: its port table, where its
//! configuration and logs live, and which port the readiness probe and the
//! Prometheus scraper use. The `build_*` functions turn a profile plus the
//! role's [`ComponentSpec`] into Kubernetes objects; the per-role modules only
//! add what is specific to them.

use std::collections::BTreeMap;

use aws_lc_rs::digest;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, HostAlias, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Probe, ResourceRequirements, SecretKeySelector, Service, ServicePort,
    ServiceSpec, TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;

use super::{config_map_key, peer_service_key, service_key, stateful_set_key, ObjectKey};
use crate::crd::{ComponentSpec, DorisCluster, Role, RoleDeclaration};

/// Label carrying the application name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
/// Label carrying the owning cluster's name
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
/// Label carrying the role
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
/// Label carrying the managing controller
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Secret key holding the operator account's user name
pub const ACCOUNT_USER_KEY: &str = "user";
/// Secret key holding the operator account's password
pub const ACCOUNT_PASSWORD_KEY: &str = "password";

const DEFAULT_UPDATE_STRATEGY: &str = "RollingUpdate";
const CONFIG_VOLUME: &str = "conf";
const LOG_VOLUME: &str = "log";

// =============================================================================
// Ports
// =============================================================================

/// One named port of a role
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortDef {
    /// Port name on the container and the Services
    pub name: &'static str,
    /// Config key overriding the port number
    pub config_key: &'static str,
    /// Port number when the config key is unset or unusable
    pub default: i32,
    /// Whether the client-facing Service exposes this port
    pub client: bool,
}

/// Port number for `def`, read from its own config key
///
/// Falls back to the default when the key is missing or not a valid port.
pub fn resolve_port(configs: &BTreeMap<String, String>, def: &PortDef) -> i32 {
    configs
        .get(def.config_key)
        .and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|p| (1..=65535).contains(p))
        .unwrap_or(def.default)
}

/// Resolve the port named `name` in `ports`
pub fn port_by_name(
    configs: &BTreeMap<String, String>,
    ports: &[PortDef],
    name: &str,
) -> Option<i32> {
    ports
        .iter()
        .find(|p| p.name == name)
        .map(|p| resolve_port(configs, p))
}

fn service_ports<'p>(
    configs: &BTreeMap<String, String>,
    ports: impl Iterator<Item = &'p PortDef>,
) -> Vec<ServicePort> {
    ports
        .map(|def| {
            let port = resolve_port(configs, def);
            ServicePort {
                name: Some(def.name.to_string()),
                port,
                target_port: Some(IntOrString::Int(port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }
        })
        .collect()
}

// =============================================================================
// Configuration
// =============================================================================

/// Render a role's configuration file as sorted `key = value` lines
pub fn render_conf(configs: &BTreeMap<String, String>) -> String {
    configs
        .iter()
        .map(|(k, v)| format!("{} = {}\n", k, v))
        .collect()
}

/// Deterministic digest of ConfigMap data
///
/// SHA-256 over key/value pairs in key order, truncated to 16 hex chars.
/// Keys and values are NUL-terminated so that `{"ab": "c"}` and
/// `{"a": "bc"}` hash differently.
pub fn config_hash(data: &BTreeMap<String, String>) -> String {
    let mut ctx = digest::Context::new(&digest::SHA256);
    for (key, value) in data {
        ctx.update(key.as_bytes());
        ctx.update(&[0]);
        ctx.update(value.as_bytes());
        ctx.update(&[0]);
    }
    ctx.finish()
        .as_ref()
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Cluster host aliases followed by the role's, one entry per IP
///
/// A role entry for an IP already present adds its host names to that entry.
pub fn merge_host_aliases(cluster: &[HostAlias], role: &[HostAlias]) -> Vec<HostAlias> {
    let mut merged: Vec<HostAlias> = Vec::new();
    for alias in cluster.iter().chain(role) {
        match merged.iter_mut().find(|a| a.ip == alias.ip) {
            Some(existing) => {
                let names = existing.hostnames.get_or_insert_with(Vec::new);
                for name in alias.hostnames.iter().flatten() {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
            None => merged.push(alias.clone()),
        }
    }
    merged
}

// =============================================================================
// Metadata
// =============================================================================

/// Labels identifying the objects of one role of one cluster
pub fn labels(cluster_name: &str, role: Role) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), "doris".to_string()),
        (LABEL_INSTANCE.to_string(), cluster_name.to_string()),
        (LABEL_COMPONENT.to_string(), role.to_string()),
        (LABEL_MANAGED_BY.to_string(), crate::MANAGED_BY.to_string()),
    ])
}

/// Metadata for an object owned by `cluster`
///
/// The controller owner reference is only set when the cluster has a UID,
/// which is always the case for objects read from the API server.
pub fn owned_meta(cluster: &DorisCluster, key: &ObjectKey, role: Option<Role>) -> ObjectMeta {
    let labels = match role {
        Some(role) => labels(&key_cluster_name(cluster), role),
        None => BTreeMap::from([
            (LABEL_NAME.to_string(), "doris".to_string()),
            (LABEL_INSTANCE.to_string(), key_cluster_name(cluster)),
            (LABEL_MANAGED_BY.to_string(), crate::MANAGED_BY.to_string()),
        ]),
    };
    ObjectMeta {
        name: Some(key.name.clone()),
        namespace: Some(key.namespace.clone()),
        labels: Some(labels),
        owner_references: cluster.controller_owner_ref(&()).map(|r| vec![r]),
        ..Default::default()
    }
}

fn key_cluster_name(cluster: &DorisCluster) -> String {
    cluster.metadata.name.clone().unwrap_or_default()
}

/// Cluster key and role spec, or `None` when the role is absent
pub fn declared(cluster: &DorisCluster, role: Role) -> Option<(ObjectKey, &ComponentSpec)> {
    match cluster.spec.role(role) {
        RoleDeclaration::Declared(spec) => Some((cluster.key()?, spec)),
        RoleDeclaration::Absent => None,
    }
}

fn fallback<T: Clone>(role: &Option<T>, cluster: &Option<T>) -> Option<T> {
    role.clone().or_else(|| cluster.clone())
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

// =============================================================================
// Workload profile
// =============================================================================

/// Persistent data directory of a role
#[derive(Clone, Copy, Debug)]
pub struct DataVolume {
    /// Volume and claim template name
    pub name: &'static str,
    /// Mount path in the main container
    pub mount_path: &'static str,
}

/// Static description of how a role runs
#[derive(Clone, Copy, Debug)]
pub struct WorkloadProfile {
    /// The role described
    pub role: Role,
    /// Every port the role listens on
    pub ports: &'static [PortDef],
    /// File name of the rendered configuration inside the ConfigMap
    pub conf_file: &'static str,
    /// Directory the ConfigMap is mounted at
    pub conf_mount_path: &'static str,
    /// Directory the role writes logs to
    pub log_mount_path: &'static str,
    /// Persistent data directory, if the role has one
    pub data_volume: Option<DataVolume>,
    /// Port name probed for readiness
    pub readiness_port: &'static str,
    /// Port name scraped by Prometheus, if any
    pub metrics_port: Option<&'static str>,
}

impl WorkloadProfile {
    fn client_ports(&self) -> impl Iterator<Item = &'static PortDef> {
        self.ports.iter().filter(|p| p.client)
    }
}

// =============================================================================
// Builders
// =============================================================================

/// ConfigMap carrying the rendered config file plus Hadoop client files
///
/// The role's own file wins when a Hadoop file has the same name.
pub fn build_config_map(
    cluster: &DorisCluster,
    cluster_key: &ObjectKey,
    profile: &WorkloadProfile,
    configs: &BTreeMap<String, String>,
) -> ConfigMap {
    let mut data = cluster
        .spec
        .hadoop_conf
        .as_ref()
        .map(|h| h.config.clone())
        .unwrap_or_default();
    data.insert(profile.conf_file.to_string(), render_conf(configs));

    ConfigMap {
        metadata: owned_meta(
            cluster,
            &config_map_key(cluster_key, profile.role),
            Some(profile.role),
        ),
        data: Some(data),
        ..Default::default()
    }
}

/// Client-facing Service exposing the role's client ports
pub fn build_service(
    cluster: &DorisCluster,
    cluster_key: &ObjectKey,
    profile: &WorkloadProfile,
    component: &ComponentSpec,
) -> Service {
    let cluster_name = &cluster_key.name;
    Service {
        metadata: owned_meta(
            cluster,
            &service_key(cluster_key, profile.role),
            Some(profile.role),
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels(cluster_name, profile.role)),
            ports: Some(service_ports(&component.configs, profile.client_ports())),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Headless Service giving each pod a stable DNS name
pub fn build_peer_service(
    cluster: &DorisCluster,
    cluster_key: &ObjectKey,
    profile: &WorkloadProfile,
    component: &ComponentSpec,
) -> Service {
    let cluster_name = &cluster_key.name;
    Service {
        metadata: owned_meta(
            cluster,
            &peer_service_key(cluster_key, profile.role),
            Some(profile.role),
        ),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(labels(cluster_name, profile.role)),
            ports: Some(service_ports(&component.configs, profile.ports.iter())),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// StatefulSet running the role
///
/// `extra_env` is added to the main container before the user's own
/// variables. The config hash annotation is not set here.
pub fn build_stateful_set(
    cluster: &DorisCluster,
    cluster_key: &ObjectKey,
    profile: &WorkloadProfile,
    component: &ComponentSpec,
    extra_env: Vec<EnvVar>,
) -> StatefulSet {
    let role = profile.role;
    let spec = &cluster.spec;
    let pod_labels = labels(&cluster_key.name, role);

    let storage = component
        .requests
        .as_ref()
        .and_then(|r| r.get("storage"))
        .cloned();

    let mut volumes = vec![
        Volume {
            name: CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_key(cluster_key, role).name,
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: LOG_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    ];
    let mut mounts = vec![
        VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: profile.conf_mount_path.to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: LOG_VOLUME.to_string(),
            mount_path: profile.log_mount_path.to_string(),
            ..Default::default()
        },
    ];

    // Without a storage request the data directory lives as long as the pod.
    let mut claims = Vec::new();
    if let Some(data) = profile.data_volume {
        mounts.push(VolumeMount {
            name: data.name.to_string(),
            mount_path: data.mount_path.to_string(),
            ..Default::default()
        });
        match storage {
            Some(size) => claims.push(PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(data.name.to_string()),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    storage_class_name: component.storage_class_name.clone(),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([("storage".to_string(), size)])),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            None => volumes.push(Volume {
                name: data.name.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }),
        }
    }
    volumes.extend(component.additional_volumes.iter().cloned());
    mounts.extend(component.additional_volume_mounts.iter().cloned());

    let mut containers = vec![main_container(
        cluster,
        cluster_key,
        profile,
        component,
        mounts,
        extra_env,
    )];
    containers.extend(component.additional_containers.iter().cloned());

    let cluster_hosts = spec
        .hadoop_conf
        .as_ref()
        .map(|h| h.hosts.as_slice())
        .unwrap_or_default();
    let host_aliases = merge_host_aliases(cluster_hosts, &component.host_aliases);

    let strategy = fallback(
        &component.stateful_set_update_strategy,
        &spec.stateful_set_update_strategy,
    )
    .unwrap_or_else(|| DEFAULT_UPDATE_STRATEGY.to_string());

    StatefulSet {
        metadata: owned_meta(cluster, &stateful_set_key(cluster_key, role), Some(role)),
        spec: Some(StatefulSetSpec {
            replicas: Some(component.replicas),
            service_name: peer_service_key(cluster_key, role).name,
            selector: LabelSelector {
                match_labels: Some(pod_labels.clone()),
                ..Default::default()
            },
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some(strategy),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: Some(metrics_annotations(profile, component)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    init_containers: non_empty(component.additional_init_containers.clone()),
                    volumes: Some(volumes),
                    service_account_name: fallback(
                        &component.service_account,
                        &spec.service_account,
                    ),
                    affinity: fallback(&component.affinity, &spec.affinity),
                    tolerations: fallback(&component.tolerations, &spec.tolerations),
                    priority_class_name: fallback(
                        &component.priority_class_name,
                        &spec.priority_class_name,
                    ),
                    host_aliases: non_empty(host_aliases),
                    image_pull_secrets: non_empty(spec.image_pull_secrets.clone()),
                    ..Default::default()
                }),
            },
            volume_claim_templates: non_empty(claims),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn metrics_annotations(
    profile: &WorkloadProfile,
    component: &ComponentSpec,
) -> BTreeMap<String, String> {
    let Some(port) = profile
        .metrics_port
        .and_then(|name| port_by_name(&component.configs, profile.ports, name))
    else {
        return BTreeMap::new();
    };
    BTreeMap::from([
        ("prometheus.io/path".to_string(), "/metrics".to_string()),
        ("prometheus.io/port".to_string(), port.to_string()),
        ("prometheus.io/scrape".to_string(), "true".to_string()),
    ])
}

fn main_container(
    cluster: &DorisCluster,
    cluster_key: &ObjectKey,
    profile: &WorkloadProfile,
    component: &ComponentSpec,
    volume_mounts: Vec<VolumeMount>,
    extra_env: Vec<EnvVar>,
) -> Container {
    let role = profile.role;
    let configs = &component.configs;

    let ports = profile
        .ports
        .iter()
        .map(|def| ContainerPort {
            name: Some(def.name.to_string()),
            container_port: resolve_port(configs, def),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect();

    let secret = super::account_secret_key(cluster_key).name;
    let mut env = vec![
        EnvVar {
            name: "FE_SVC".to_string(),
            value: Some(service_key(cluster_key, Role::Fe).name),
            ..Default::default()
        },
        secret_env("ACC_USER", &secret, ACCOUNT_USER_KEY),
        secret_env("ACC_PWD", &secret, ACCOUNT_PASSWORD_KEY),
    ];
    env.extend(extra_env);
    env.extend(component.additional_envs.iter().cloned());

    let requests = component.requests.as_ref().map(|r| {
        r.iter()
            .filter(|(name, _)| name.as_str() != "storage")
            .map(|(name, q)| (name.clone(), q.clone()))
            .collect::<BTreeMap<_, _>>()
    });
    let resources =
        (requests.is_some() || component.limits.is_some()).then(|| ResourceRequirements {
            requests: requests.filter(|r| !r.is_empty()),
            limits: component.limits.clone(),
            ..Default::default()
        });

    let readiness_probe =
        port_by_name(configs, profile.ports, profile.readiness_port).map(|port| Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(port),
                ..Default::default()
            }),
            initial_delay_seconds: Some(3),
            timeout_seconds: Some(1),
            period_seconds: Some(5),
            success_threshold: Some(1),
            failure_threshold: Some(3),
            ..Default::default()
        });

    Container {
        name: role.to_string(),
        image: Some(cluster.spec.image_for(role, component)),
        image_pull_policy: cluster.spec.image_pull_policy.clone(),
        ports: Some(ports),
        env: Some(env),
        resources,
        readiness_probe,
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DorisClusterSpec, HadoopConf};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    const PORTS: &[PortDef] = &[
        PortDef {
            name: "http-port",
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
        readiness_port: "http-port",
        metrics_port: Some("http-port"),
    };

    fn configs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn cluster() -> DorisCluster {
        let mut cluster = DorisCluster::new(
            "doris",
            DorisClusterSpec {
                version: "2.1.7".to_string(),
                ..Default::default()
            },
        );
        cluster.metadata.namespace = Some("data".to_string());
        cluster.metadata.uid = Some("uid-1".to_string());
        cluster
    }

    fn key() -> ObjectKey {
        ObjectKey::new("data", "doris")
    }

    // =========================================================================
    // Ports and config rendering
    // =========================================================================

    #[test]
    fn port_reads_its_own_config_key() {
        let c = configs(&[("http_port", "18030"), ("query_port", "19030")]);
        assert_eq!(resolve_port(&c, &PORTS[0]), 18030);
        assert_eq!(resolve_port(&c, &PORTS[1]), 9010);
    }

    #[test]
    fn unusable_port_value_falls_back_to_default() {
        let c = configs(&[("http_port", "abc"), ("edit_log_port", "0")]);
        assert_eq!(resolve_port(&c, &PORTS[0]), 8030);
        assert_eq!(resolve_port(&c, &PORTS[1]), 9010);
    }

    #[test]
    fn conf_is_rendered_sorted() {
        let c = configs(&[("b", "2"), ("a", "1")]);
        assert_eq!(render_conf(&c), "a = 1\nb = 2\n");
    }

    #[test]
    fn config_hash_is_stable_and_content_sensitive() {
        let a = configs(&[("fe.conf", "http_port = 8030\n")]);
        let b = configs(&[("fe.conf", "http_port = 8031\n")]);
        assert_eq!(config_hash(&a), config_hash(&a.clone()));
        assert_ne!(config_hash(&a), config_hash(&b));
        assert_eq!(config_hash(&a).len(), 16);

        let split_one = configs(&[("ab", "c")]);
        let split_two = configs(&[("a", "bc")]);
        assert_ne!(config_hash(&split_one), config_hash(&split_two));
    }

    #[test]
    fn host_aliases_merge_by_ip() {
        let alias = |ip: &str, names: &[&str]| HostAlias {
            ip: ip.to_string(),
            hostnames: Some(names.iter().map(|n| n.to_string()).collect()),
        };
        let merged = merge_host_aliases(
            &[alias("10.0.0.1", &["nn1"])],
            &[alias("10.0.0.1", &["nn1", "namenode"]), alias("10.0.0.2", &["dn1"])],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged[0].hostnames.as_deref().unwrap(),
            &["nn1".to_string(), "namenode".to_string()]
        );
        assert_eq!(merged[1].ip, "10.0.0.2");
    }

    // =========================================================================
    // Object builders
    // =========================================================================

    /// Story: hadoop files ride along in every role's ConfigMap
    #[test]
    fn story_config_map_merges_hadoop_files() {
        let mut cluster = cluster();
        cluster.spec.hadoop_conf = Some(HadoopConf {
            config: configs(&[("core-site.xml", "<configuration/>"), ("fe.conf", "stale")]),
            hosts: vec![],
        });
        let cm = build_config_map(&cluster, &key(), &PROFILE, &configs(&[("http_port", "8030")]));
        let data = cm.data.unwrap();
        assert_eq!(data["fe.conf"], "http_port = 8030\n");
        assert_eq!(data["core-site.xml"], "<configuration/>");
        assert_eq!(cm.metadata.name.as_deref(), Some("doris-fe-config"));

        let owners = cm.metadata.owner_references.unwrap();
        assert_eq!(owners[0].uid, "uid-1");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn client_service_exposes_only_client_ports() {
        let component = ComponentSpec::default();
        let svc = build_service(&cluster(), &key(), &PROFILE, &component);
        let spec = svc.spec.unwrap();
        let ports = spec.ports.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some("http-port"));
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
    }

    #[test]
    fn peer_service_is_headless_with_all_ports() {
        let component = ComponentSpec::default();
        let svc = build_peer_service(&cluster(), &key(), &PROFILE, &component);
        assert_eq!(svc.metadata.name.as_deref(), Some("doris-fe-peer"));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.ports.unwrap().len(), 2);
    }

    /// Story: the workload carries ports, probe, secrets and placement fallbacks
    #[test]
    fn story_stateful_set_assembles_pod() {
        let mut cluster = cluster();
        cluster.spec.service_account = Some("doris-sa".to_string());
        cluster.spec.priority_class_name = Some("high".to_string());
        let component = ComponentSpec {
            replicas: 3,
            configs: configs(&[("http_port", "18030")]),
            priority_class_name: Some("critical".to_string()),
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("4".to_string())),
                ("storage".to_string(), Quantity("100Gi".to_string())),
            ])),
            ..Default::default()
        };

        let sts = build_stateful_set(&cluster, &key(), &PROFILE, &component, vec![]);
        let spec = sts.spec.unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(Some(spec.service_name.as_str()), Some("doris-fe-peer"));
        assert_eq!(
            spec.update_strategy.unwrap().type_.as_deref(),
            Some("RollingUpdate")
        );

        let claims = spec.volume_claim_templates.unwrap();
        assert_eq!(claims[0].metadata.name.as_deref(), Some("fe-meta"));

        let template = spec.template;
        let annotations = template.metadata.unwrap().annotations.unwrap();
        assert_eq!(annotations["prometheus.io/port"], "18030");

        let pod = template.spec.unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some("doris-sa"));
        assert_eq!(pod.priority_class_name.as_deref(), Some("critical"));

        let main = &pod.containers[0];
        assert_eq!(main.image.as_deref(), Some("apache/doris:fe-2.1.7"));
        let probe_port = &main
            .readiness_probe
            .as_ref()
            .unwrap()
            .tcp_socket
            .as_ref()
            .unwrap()
            .port;
        assert_eq!(probe_port, &IntOrString::Int(18030));

        let requests = main.resources.as_ref().unwrap().requests.as_ref().unwrap();
        assert!(requests.contains_key("cpu"));
        assert!(!requests.contains_key("storage"));

        let env = main.env.as_ref().unwrap();
        let pwd = env.iter().find(|e| e.name == "ACC_PWD").unwrap();
        let selector = pwd
            .value_from
            .as_ref()
            .unwrap()
            .secret_key_ref
            .as_ref()
            .unwrap();
        assert_eq!(selector.name, "doris-operator-account");
        assert_eq!(selector.key, "password");
    }

    #[test]
    fn data_dir_without_storage_request_is_ephemeral() {
        let component = ComponentSpec::default();
        let sts = build_stateful_set(&cluster(), &key(), &PROFILE, &component, vec![]);
        let spec = sts.spec.unwrap();
        assert!(spec.volume_claim_templates.is_none());
        let volumes = spec.template.spec.unwrap().volumes.unwrap();
        let meta = volumes.iter().find(|v| v.name == "fe-meta").unwrap();
        assert!(meta.empty_dir.is_some());
    }
}
