//! Child objects derived from a `MariaDB`. Everything here is pure: the same
//! object always yields the same children.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    StatefulSet, StatefulSetPersistentVolumeClaimRetentionPolicy, StatefulSetSpec,
    StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapProjection, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, ExecAction, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Probe, ProjectedVolumeSource, Secret, SecretKeySelector, Service, ServicePort,
    ServiceSpec, Volume, VolumeMount, VolumeProjection, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt, core::ObjectMeta};
use serde::Serialize;

use crate::{
    crds::mariadb::{DEFAULT_PORT, DEFAULT_REPLICAS, DEFAULT_STORAGE_SIZE, MariaDB, MariaDBSpec},
    error::BuildError,
    role::{self, CONF_D_MOUNT, CONFIG_MAP_MOUNT, INITDB_MOUNT},
};

pub const IMAGE_REPOSITORY: &str = "quay.io/mariadb-foundation/mariadb-devel";
pub const ROOT_PASSWORD_KEY: &str = "mariadb-root-password";
pub const PORT_NAME: &str = "mariadb";

const CONTAINER_NAME: &str = "mariadb";
const DATA_VOLUME: &str = "datadir";
const CONF_D_VOLUME: &str = "mariadb-conf-d";
const INITDB_VOLUME: &str = "initdb";
const CONFIG_MAP_VOLUME: &str = "mariadb-config-map";

const PRIMARY_CNF_BODY: &str = "[mariadb]
log-bin
log-basename=mariadb
";

const REPLICA_CNF_BODY: &str = "[mariadb]
log-basename=mariadb
";

const PRIMARY_SQL_BODY: &str = "CREATE USER 'repluser'@'%' IDENTIFIED BY 'replsecret';
GRANT REPLICATION SLAVE ON *.* TO 'repluser'@'%';
";

pub fn secret_name(cluster: &str) -> String {
    format!("{cluster}-secret")
}

pub fn config_map_name(cluster: &str) -> String {
    format!("{cluster}-config")
}

pub fn headless_service_name(cluster: &str) -> String {
    format!("{cluster}-headless")
}

pub fn resolve_image(spec: &MariaDBSpec) -> String {
    match spec.image.as_deref() {
        Some(image) if !image.is_empty() => image.to_string(),
        _ => format!("{IMAGE_REPOSITORY}:{}", spec.image_version),
    }
}

pub fn resolve_port(spec: &MariaDBSpec) -> i32 {
    spec.port.unwrap_or(DEFAULT_PORT)
}

pub fn resolve_replicas(spec: &MariaDBSpec) -> i32 {
    spec.replicas.unwrap_or(DEFAULT_REPLICAS)
}

pub fn resolve_storage_size(spec: &MariaDBSpec) -> String {
    spec.data_storage_size
        .clone()
        .unwrap_or_else(|| DEFAULT_STORAGE_SIZE.into())
}

/// Labels on every child; the first two also select the pods.
pub fn labels(cluster: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(cluster);
    labels.insert(
        "app.kubernetes.io/managed-by".into(),
        "mariadb-operator".into(),
    );
    labels
}

fn selector_labels(cluster: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".into(), "mariadb".into()),
        ("app.kubernetes.io/instance".into(), cluster.to_string()),
    ])
}

fn metadata(name: String, cluster: &str, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        labels: Some(labels(cluster)),
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

/// Everything but the root secret, which is bootstrapped separately.
#[derive(Debug, Clone, PartialEq)]
pub struct Children {
    pub config_map: ConfigMap,
    pub service: Service,
    pub stateful_set: StatefulSet,
}

pub fn owner_ref(cluster: &MariaDB) -> Result<OwnerReference, BuildError> {
    cluster
        .controller_owner_ref(&())
        .ok_or(BuildError::NoOwnerReference)
}

pub fn desired_children(cluster: &MariaDB) -> Result<Children, BuildError> {
    cluster.spec.validate()?;
    let owner = owner_ref(cluster)?;
    let name = cluster.name_any();
    Ok(Children {
        config_map: build_config_map(&name, &owner),
        service: build_headless_service(&name, &cluster.spec, &owner),
        stateful_set: build_statefulset(&name, &cluster.spec, &owner),
    })
}

pub fn build_root_secret(cluster: &str, password: &str, owner: &OwnerReference) -> Secret {
    Secret {
        metadata: metadata(secret_name(cluster), cluster, owner),
        type_: Some("Opaque".into()),
        string_data: Some(BTreeMap::from([(
            ROOT_PASSWORD_KEY.to_string(),
            password.to_string(),
        )])),
        ..Default::default()
    }
}

pub fn build_config_map(cluster: &str, owner: &OwnerReference) -> ConfigMap {
    ConfigMap {
        metadata: metadata(config_map_name(cluster), cluster, owner),
        data: Some(BTreeMap::from([
            (role::PRIMARY_CNF.to_string(), PRIMARY_CNF_BODY.to_string()),
            (role::REPLICA_CNF.to_string(), REPLICA_CNF_BODY.to_string()),
            (role::PRIMARY_SQL.to_string(), PRIMARY_SQL_BODY.to_string()),
        ])),
        ..Default::default()
    }
}

pub fn build_headless_service(
    cluster: &str,
    spec: &MariaDBSpec,
    owner: &OwnerReference,
) -> Service {
    let port = resolve_port(spec);
    Service {
        metadata: metadata(headless_service_name(cluster), cluster, owner),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".into()),
            publish_not_ready_addresses: Some(true),
            selector: Some(selector_labels(cluster)),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.into()),
                port,
                target_port: Some(IntOrString::String(PORT_NAME.into())),
                protocol: Some("TCP".into()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn exec_probe(args: &[&str], initial_delay: i32) -> Probe {
    let mut command = vec!["healthcheck.sh".to_string()];
    command.extend(args.iter().map(|a| a.to_string()));
    Probe {
        exec: Some(ExecAction {
            command: Some(command),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(5),
        timeout_seconds: Some(3),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.into(),
        mount_path: path.into(),
        ..Default::default()
    }
}

fn empty_dir(name: &str) -> Volume {
    Volume {
        name: name.into(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

fn plain_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn init_container(image: &str) -> Container {
    Container {
        name: format!("{CONTAINER_NAME}-init"),
        image: Some(image.to_string()),
        command: Some(vec![
            "/bin/bash".into(),
            "-c".into(),
            role::startup_script(),
        ]),
        volume_mounts: Some(vec![
            mount(CONFIG_MAP_VOLUME, CONFIG_MAP_MOUNT),
            mount(CONF_D_VOLUME, CONF_D_MOUNT),
            mount(INITDB_VOLUME, INITDB_MOUNT),
        ]),
        ..Default::default()
    }
}

fn database_container(cluster: &str, spec: &MariaDBSpec, image: String, port: i32) -> Container {
    Container {
        name: CONTAINER_NAME.into(),
        image: Some(image),
        args: Some(vec![
            format!("--port={port}"),
            format!("--datadir={}", spec.data_storage_path),
        ]),
        env: Some(vec![
            EnvVar {
                name: "MARIADB_ROOT_PASSWORD".into(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        name: secret_name(cluster),
                        key: ROOT_PASSWORD_KEY.into(),
                        optional: Some(false),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            plain_env("MARIADB_USER", &spec.username),
            plain_env("MARIADB_PASSWORD", &spec.password),
            plain_env("MARIADB_DATABASE", &spec.database),
            plain_env("MARIADB_MYSQL_LOCALHOST_USER", "1"),
            plain_env("MYSQL_INITDB_SKIP_TZINFO", "yes"),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some(PORT_NAME.into()),
            container_port: port,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            mount(DATA_VOLUME, &spec.data_storage_path),
            mount(CONF_D_VOLUME, CONF_D_MOUNT),
            mount(INITDB_VOLUME, INITDB_MOUNT),
        ]),
        liveness_probe: Some(exec_probe(&["--connect", "--innodb_initialized"], 20)),
        readiness_probe: Some(exec_probe(&["--connect"], 5)),
        ..Default::default()
    }
}

pub fn build_statefulset(
    cluster: &str,
    spec: &MariaDBSpec,
    owner: &OwnerReference,
) -> StatefulSet {
    let image = resolve_image(spec);
    let port = resolve_port(spec);
    StatefulSet {
        metadata: metadata(cluster.to_string(), cluster, owner),
        spec: Some(StatefulSetSpec {
            replicas: Some(resolve_replicas(spec)),
            service_name: Some(headless_service_name(cluster)),
            selector: LabelSelector {
                match_labels: Some(selector_labels(cluster)),
                ..Default::default()
            },
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".into()),
                ..Default::default()
            }),
            persistent_volume_claim_retention_policy: Some(
                StatefulSetPersistentVolumeClaimRetentionPolicy {
                    when_deleted: Some("Delete".into()),
                    when_scaled: Some("Retain".into()),
                },
            ),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(cluster)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: Some(vec![init_container(&image)]),
                    containers: vec![database_container(cluster, spec, image, port)],
                    volumes: Some(vec![
                        empty_dir(CONF_D_VOLUME),
                        empty_dir(INITDB_VOLUME),
                        Volume {
                            name: CONFIG_MAP_VOLUME.into(),
                            projected: Some(ProjectedVolumeSource {
                                sources: Some(vec![VolumeProjection {
                                    config_map: Some(ConfigMapProjection {
                                        name: config_map_name(cluster),
                                        ..Default::default()
                                    }),
                                    ..Default::default()
                                }]),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(DATA_VOLUME.into()),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".into()]),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(BTreeMap::from([(
                            "storage".to_string(),
                            Quantity(resolve_storage_size(spec)),
                        )])),
                        limits: None,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The body sent when an existing child is patched. Fields the API server
/// only accepts at creation, and the owner reference, are left out so later
/// passes never touch them.
pub trait PatchView: Serialize {
    const CREATION_ONLY: &'static [&'static str];

    fn patch_view(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut body = serde_json::to_value(self)?;
        for path in Self::CREATION_ONLY.iter().copied() {
            let (parent, field) = path.rsplit_once('/').unwrap_or(("", path));
            if let Some(obj) = body.pointer_mut(parent).and_then(|v| v.as_object_mut()) {
                obj.remove(field);
            }
        }
        Ok(body)
    }
}

impl PatchView for ConfigMap {
    const CREATION_ONLY: &'static [&'static str] = &["/metadata/ownerReferences"];
}

impl PatchView for Service {
    const CREATION_ONLY: &'static [&'static str] = &[
        "/metadata/ownerReferences",
        "/spec/clusterIP",
        "/spec/clusterIPs",
    ];
}

impl PatchView for StatefulSet {
    const CREATION_ONLY: &'static [&'static str] = &[
        "/metadata/ownerReferences",
        "/spec/selector",
        "/spec/serviceName",
        "/spec/volumeClaimTemplates",
        "/spec/podManagementPolicy",
    ];
}
