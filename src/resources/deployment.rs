// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Control plane `Deployment`.
//!
//! One Deployment `<tcp>` runs kube-apiserver, kube-controller-manager and
//! kube-scheduler side by side, plus the trust daemon sidecar when worker
//! bootstrap is enabled. Containers and volumes are merged by name into the
//! live object so fields defaulted by the API server never cause an update.
//!
//! The pod template carries the checksums recorded by the certificate and
//! configuration resources, so a regenerated Secret rolls the control plane.
//!
//! Kubeconfigs, service account keys and the datastore connection are
//! produced outside of the operator and only referenced here:
//!
//! | Secret | Keys |
//! |--------|------|
//! | `<tcp>-controller-manager-kubeconfig` | `controller-manager.conf` |
//! | `<tcp>-scheduler-kubeconfig` | `scheduler.conf` |
//! | `<tcp>-sa-certificate` | `sa.pub`, `sa.key` |
//! | `<tcp>-datastore-config` | `endpoints`, `ca.crt`, `tls.crt`, `tls.key` |

use super::certificate::CertificateKind;
use super::kubeadm_config::configmap_name;
use super::trustd_credentials::credentials_secret_name;
use super::{now_rfc3339, set_controller_reference, tenant_prefixed_name, ManagedResource, TenantClientFactory};
use crate::constants::{DEFAULT_CLUSTER_DOMAIN, DEFAULT_SERVICE_CIDR, KUBERNETES_IMAGE_REGISTRY};
use crate::crd::{
    KubernetesDeploymentStatus, KubernetesVersionStatus, TalosBootstrapSpec, TenantControlPlane,
};
use crate::labels::{merge_maps, steward_labels, CONTROL_PLANE_LABEL};
use crate::readiness::{apply_version_status, compute_version_status};
use crate::reconcilers::upsert::{upsert, UpsertResult};
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EnvVar, EnvVarSource, KeyToPath, PodSpec,
    Probe, ProjectedVolumeSource, ResourceRequirements, SecretKeySelector,
    SecretProjection, SecretVolumeSource, SecurityContext, TCPSocketAction, Volume, VolumeMount,
    VolumeProjection,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::debug;

const RESOURCE_NAME: &str = "deployment";

pub const CONTAINER_NAME_API_SERVER: &str = "kube-apiserver";
pub const CONTAINER_NAME_CONTROLLER_MANAGER: &str = "kube-controller-manager";
pub const CONTAINER_NAME_SCHEDULER: &str = "kube-scheduler";
pub const CONTAINER_NAME_TRUSTD: &str = "steward-trustd";

const VOLUME_PKI: &str = "kubernetes-pki";
const VOLUME_KONNECTIVITY: &str = "konnectivity-pki";
const VOLUME_KUBEADM_CONFIG: &str = "kubeadm-config";
const VOLUME_CONTROLLER_MANAGER_KUBECONFIG: &str = "controller-manager-kubeconfig";
const VOLUME_SCHEDULER_KUBECONFIG: &str = "scheduler-kubeconfig";
const VOLUME_DATASTORE: &str = "datastore-certificate";
const VOLUME_TRUSTD_CREDS: &str = "trustd-creds";

const PKI_DIR: &str = "/etc/kubernetes/pki";
const KONNECTIVITY_DIR: &str = "/etc/kubernetes/konnectivity/pki";
const KUBEADM_DIR: &str = "/etc/kubernetes/kubeadm";
const CONTROLLER_MANAGER_DIR: &str = "/etc/kubernetes/controller-manager";
const SCHEDULER_DIR: &str = "/etc/kubernetes/scheduler";
const DATASTORE_DIR: &str = "/etc/kubernetes/datastore";
const TRUSTD_CERT_DIR: &str = "/etc/steward-trustd/certs";

const SA_SUFFIX: &str = "sa-certificate";
const CONTROLLER_MANAGER_KUBECONFIG_SUFFIX: &str = "controller-manager-kubeconfig";
const SCHEDULER_KUBECONFIG_SUFFIX: &str = "scheduler-kubeconfig";
const DATASTORE_SUFFIX: &str = "datastore-config";

/// Prefix of the pod template annotations carrying material checksums.
pub const CHECKSUM_ANNOTATION_PREFIX: &str = "checksum.steward.butlerlabs.dev/";

/// `0644`, the API server default for Secret volumes.
const DEFAULT_MODE: i32 = 420;

/// UID of `nobody`, used by the trust daemon sidecar.
const TRUSTD_NONROOT_UID: i64 = 65534;

const CONTROLLER_MANAGER_PORT: i32 = 10257;
const SCHEDULER_PORT: i32 = 10259;

#[must_use]
pub fn deployment_name(tcp: &TenantControlPlane) -> String {
    tcp.name_any()
}

fn image(component: &str, version: &str) -> String {
    format!("{KUBERNETES_IMAGE_REGISTRY}/{component}:{version}")
}

fn selector_labels(tcp: &TenantControlPlane) -> BTreeMap<String, String> {
    BTreeMap::from([(CONTROL_PLANE_LABEL.to_string(), tcp.name_any())])
}

fn tcp_probe(port: i32, initial_delay: i32, period: i32) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        timeout_seconds: Some(1),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: String, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret,
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

/// Checksums of every piece of material mounted into the control plane pods.
///
/// Empty checksums are skipped so a resource that has not reported yet does
/// not produce an empty annotation.
#[must_use]
pub fn material_checksums(tcp: &TenantControlPlane) -> BTreeMap<String, String> {
    let status = tcp.status_or_default();
    let certs = &status.certificates;
    [
        (CertificateKind::Ca.resource_name(), &certs.ca.checksum),
        (
            CertificateKind::FrontProxyCa.resource_name(),
            &certs.front_proxy_ca.checksum,
        ),
        (CertificateKind::ApiServer.resource_name(), &certs.api_server.checksum),
        (
            CertificateKind::ApiServerKubeletClient.resource_name(),
            &certs.api_server_kubelet_client.checksum,
        ),
        (
            CertificateKind::Konnectivity.resource_name(),
            &status.addons.konnectivity.certificate.checksum,
        ),
        ("kubeadm-config", &status.kubeadm_config.checksum),
        (
            "trustd-credentials",
            &status.addons.worker_bootstrap.credentials.checksum,
        ),
    ]
    .into_iter()
    .filter(|(_, checksum)| !checksum.is_empty())
    .map(|(name, checksum)| (format!("{CHECKSUM_ANNOTATION_PREFIX}{name}"), checksum.clone()))
    .collect()
}

fn build_api_server_container(tcp: &TenantControlPlane) -> Container {
    let profile = &tcp.spec.network_profile;
    let service_cidr = profile.service_cidr.as_deref().unwrap_or(DEFAULT_SERVICE_CIDR);
    let cluster_domain = profile.cluster_domain.as_deref().unwrap_or(DEFAULT_CLUSTER_DOMAIN);
    let (ca_crt, _) = CertificateKind::Ca.keys();
    let (front_proxy_crt, _) = CertificateKind::FrontProxyCa.keys();
    let (server_crt, server_key) = CertificateKind::ApiServer.keys();
    let (kubelet_crt, kubelet_key) = CertificateKind::ApiServerKubeletClient.keys();

    let mut args = vec![
        format!("--secure-port={}", profile.port),
        "--authorization-mode=Node,RBAC".to_string(),
        "--enable-bootstrap-token-auth=true".to_string(),
        "--allow-privileged=true".to_string(),
        format!("--service-cluster-ip-range={service_cidr}"),
        format!("--service-account-issuer=https://kubernetes.default.svc.{cluster_domain}"),
        format!("--client-ca-file={PKI_DIR}/{ca_crt}"),
        format!("--tls-cert-file={PKI_DIR}/{server_crt}"),
        format!("--tls-private-key-file={PKI_DIR}/{server_key}"),
        format!("--kubelet-client-certificate={PKI_DIR}/{kubelet_crt}"),
        format!("--kubelet-client-key={PKI_DIR}/{kubelet_key}"),
        format!("--requestheader-client-ca-file={PKI_DIR}/{front_proxy_crt}"),
        "--requestheader-allowed-names=front-proxy-client".to_string(),
        "--requestheader-username-headers=X-Remote-User".to_string(),
        "--requestheader-group-headers=X-Remote-Group".to_string(),
        "--requestheader-extra-headers-prefix=X-Remote-Extra-".to_string(),
        format!("--service-account-key-file={PKI_DIR}/sa.pub"),
        format!("--service-account-signing-key-file={PKI_DIR}/sa.key"),
        "--etcd-servers=$(DATASTORE_ENDPOINTS)".to_string(),
        format!("--etcd-cafile={DATASTORE_DIR}/ca.crt"),
        format!("--etcd-certfile={DATASTORE_DIR}/tls.crt"),
        format!("--etcd-keyfile={DATASTORE_DIR}/tls.key"),
    ];

    let mut mounts = vec![
        mount(VOLUME_PKI, PKI_DIR),
        mount(VOLUME_KUBEADM_CONFIG, KUBEADM_DIR),
        mount(VOLUME_DATASTORE, DATASTORE_DIR),
    ];
    if CertificateKind::Konnectivity.is_enabled(tcp) {
        let (tls_crt, tls_key) = CertificateKind::Konnectivity.keys();
        args.push(format!("--proxy-client-cert-file={KONNECTIVITY_DIR}/{tls_crt}"));
        args.push(format!("--proxy-client-key-file={KONNECTIVITY_DIR}/{tls_key}"));
        mounts.push(mount(VOLUME_KONNECTIVITY, KONNECTIVITY_DIR));
    }

    Container {
        name: CONTAINER_NAME_API_SERVER.into(),
        image: Some(image(CONTAINER_NAME_API_SERVER, &tcp.spec.kubernetes.version)),
        image_pull_policy: Some("IfNotPresent".into()),
        command: Some(vec![CONTAINER_NAME_API_SERVER.into()]),
        args: Some(args),
        env: Some(vec![secret_env(
            "DATASTORE_ENDPOINTS",
            tenant_prefixed_name(tcp, DATASTORE_SUFFIX),
            "endpoints",
        )]),
        ports: Some(vec![ContainerPort {
            name: Some("https".into()),
            container_port: profile.port,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        volume_mounts: Some(mounts),
        readiness_probe: Some(tcp_probe(profile.port, 5, 10)),
        liveness_probe: Some(tcp_probe(profile.port, 15, 20)),
        ..Default::default()
    }
}

fn build_controller_manager_container(tcp: &TenantControlPlane) -> Container {
    let profile = &tcp.spec.network_profile;
    let service_cidr = profile.service_cidr.as_deref().unwrap_or(DEFAULT_SERVICE_CIDR);
    let kubeconfig = format!("{CONTROLLER_MANAGER_DIR}/controller-manager.conf");
    let (ca_crt, ca_key) = CertificateKind::Ca.keys();
    let (front_proxy_crt, _) = CertificateKind::FrontProxyCa.keys();

    let mut args = vec![
        format!("--kubeconfig={kubeconfig}"),
        format!("--authentication-kubeconfig={kubeconfig}"),
        format!("--authorization-kubeconfig={kubeconfig}"),
        "--bind-address=0.0.0.0".to_string(),
        format!("--cluster-name={}", tcp.name_any()),
        format!("--cluster-signing-cert-file={PKI_DIR}/{ca_crt}"),
        format!("--cluster-signing-key-file={PKI_DIR}/{ca_key}"),
        format!("--client-ca-file={PKI_DIR}/{ca_crt}"),
        format!("--requestheader-client-ca-file={PKI_DIR}/{front_proxy_crt}"),
        format!("--root-ca-file={PKI_DIR}/{ca_crt}"),
        format!("--service-account-private-key-file={PKI_DIR}/sa.key"),
        format!("--service-cluster-ip-range={service_cidr}"),
        "--controllers=*,bootstrapsigner,tokencleaner".to_string(),
        "--use-service-account-credentials=true".to_string(),
    ];
    if let Some(pod_cidr) = profile.pod_cidr.as_deref() {
        args.push("--allocate-node-cidrs=true".to_string());
        args.push(format!("--cluster-cidr={pod_cidr}"));
    }

    Container {
        name: CONTAINER_NAME_CONTROLLER_MANAGER.into(),
        image: Some(image(CONTAINER_NAME_CONTROLLER_MANAGER, &tcp.spec.kubernetes.version)),
        image_pull_policy: Some("IfNotPresent".into()),
        command: Some(vec![CONTAINER_NAME_CONTROLLER_MANAGER.into()]),
        args: Some(args),
        volume_mounts: Some(vec![
            mount(VOLUME_PKI, PKI_DIR),
            mount(VOLUME_CONTROLLER_MANAGER_KUBECONFIG, CONTROLLER_MANAGER_DIR),
        ]),
        liveness_probe: Some(tcp_probe(CONTROLLER_MANAGER_PORT, 15, 20)),
        ..Default::default()
    }
}

fn build_scheduler_container(tcp: &TenantControlPlane) -> Container {
    let kubeconfig = format!("{SCHEDULER_DIR}/scheduler.conf");
    Container {
        name: CONTAINER_NAME_SCHEDULER.into(),
        image: Some(image(CONTAINER_NAME_SCHEDULER, &tcp.spec.kubernetes.version)),
        image_pull_policy: Some("IfNotPresent".into()),
        command: Some(vec![CONTAINER_NAME_SCHEDULER.into()]),
        args: Some(vec![
            format!("--kubeconfig={kubeconfig}"),
            format!("--authentication-kubeconfig={kubeconfig}"),
            format!("--authorization-kubeconfig={kubeconfig}"),
            "--bind-address=0.0.0.0".to_string(),
            "--leader-elect=true".to_string(),
        ]),
        volume_mounts: Some(vec![mount(VOLUME_SCHEDULER_KUBECONFIG, SCHEDULER_DIR)]),
        liveness_probe: Some(tcp_probe(SCHEDULER_PORT, 15, 20)),
        ..Default::default()
    }
}

fn trustd_resources(talos: &TalosBootstrapSpec) -> ResourceRequirements {
    talos.resources.clone().unwrap_or_else(|| ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("10m".to_string())),
            ("memory".to_string(), Quantity("32Mi".to_string())),
        ])),
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("100m".to_string())),
            ("memory".to_string(), Quantity("128Mi".to_string())),
        ])),
        ..Default::default()
    })
}

/// Build the trust daemon sidecar serving worker bootstrap requests.
#[must_use]
pub fn build_trustd_container(tcp: &TenantControlPlane, talos: &TalosBootstrapSpec) -> Container {
    let image = match talos.image_tag.as_deref() {
        Some(tag) if !tag.is_empty() => format!("{}:{tag}", talos.image),
        _ => talos.image.clone(),
    };

    Container {
        name: CONTAINER_NAME_TRUSTD.into(),
        image: Some(image),
        image_pull_policy: Some("IfNotPresent".into()),
        ports: Some(vec![ContainerPort {
            name: Some("grpc".into()),
            container_port: talos.port,
            protocol: Some("TCP".into()),
            ..Default::default()
        }]),
        env: Some(vec![
            env("TRUSTD_PORT", talos.port.to_string()),
            env("TRUSTD_TENANT", tcp.name_any()),
            env("TRUSTD_CERT_DIR", TRUSTD_CERT_DIR),
            secret_env("TRUSTD_TOKEN", credentials_secret_name(tcp), "token"),
        ]),
        volume_mounts: Some(vec![mount(VOLUME_TRUSTD_CREDS, TRUSTD_CERT_DIR)]),
        readiness_probe: Some(tcp_probe(talos.port, 5, 10)),
        liveness_probe: Some(tcp_probe(talos.port, 15, 20)),
        resources: Some(trustd_resources(talos)),
        security_context: Some(SecurityContext {
            run_as_non_root: Some(true),
            run_as_user: Some(TRUSTD_NONROOT_UID),
            read_only_root_filesystem: Some(true),
            allow_privilege_escalation: Some(false),
            capabilities: Some(Capabilities {
                drop: Some(vec!["ALL".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn secret_volume(name: &str, secret: String) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret),
            default_mode: Some(DEFAULT_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn project(secret: String, keys: &[&str]) -> VolumeProjection {
    VolumeProjection {
        secret: Some(SecretProjection {
            name: secret,
            items: Some(
                keys.iter()
                    .map(|key| KeyToPath {
                        key: (*key).to_string(),
                        path: (*key).to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Volumes of the control plane pods.
///
/// The Kubernetes PKI is a single projected volume so every component sees
/// the usual kubeadm layout under `/etc/kubernetes/pki`.
#[must_use]
pub fn build_volumes(tcp: &TenantControlPlane) -> Vec<Volume> {
    let mut pki: Vec<VolumeProjection> = [
        CertificateKind::Ca,
        CertificateKind::FrontProxyCa,
        CertificateKind::ApiServer,
        CertificateKind::ApiServerKubeletClient,
    ]
    .into_iter()
    .map(|kind| {
        let (crt, key) = kind.keys();
        project(kind.secret_name(tcp), &[crt, key])
    })
    .collect();
    pki.push(project(tenant_prefixed_name(tcp, SA_SUFFIX), &["sa.pub", "sa.key"]));

    let mut volumes = vec![
        Volume {
            name: VOLUME_PKI.to_string(),
            projected: Some(ProjectedVolumeSource {
                sources: Some(pki),
                default_mode: Some(DEFAULT_MODE),
            }),
            ..Default::default()
        },
        Volume {
            name: VOLUME_KUBEADM_CONFIG.to_string(),
            config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                name: configmap_name(tcp),
                default_mode: Some(DEFAULT_MODE),
                ..Default::default()
            }),
            ..Default::default()
        },
        secret_volume(
            VOLUME_CONTROLLER_MANAGER_KUBECONFIG,
            tenant_prefixed_name(tcp, CONTROLLER_MANAGER_KUBECONFIG_SUFFIX),
        ),
        secret_volume(
            VOLUME_SCHEDULER_KUBECONFIG,
            tenant_prefixed_name(tcp, SCHEDULER_KUBECONFIG_SUFFIX),
        ),
        secret_volume(VOLUME_DATASTORE, tenant_prefixed_name(tcp, DATASTORE_SUFFIX)),
    ];
    if CertificateKind::Konnectivity.is_enabled(tcp) {
        volumes.push(secret_volume(
            VOLUME_KONNECTIVITY,
            CertificateKind::Konnectivity.secret_name(tcp),
        ));
    }
    if tcp.wants_worker_bootstrap() {
        volumes.push(secret_volume(VOLUME_TRUSTD_CREDS, credentials_secret_name(tcp)));
    }
    volumes
}

/// Desired containers, in pod order.
#[must_use]
pub fn build_containers(tcp: &TenantControlPlane) -> Vec<Container> {
    let mut containers = vec![
        build_api_server_container(tcp),
        build_controller_manager_container(tcp),
        build_scheduler_container(tcp),
    ];
    let talos = tcp
        .spec
        .addons
        .worker_bootstrap
        .as_ref()
        .filter(|_| tcp.wants_worker_bootstrap())
        .and_then(|wb| wb.talos.as_ref());
    if let Some(talos) = talos {
        containers.push(build_trustd_container(tcp, talos));
    }
    containers
}

/// Overwrite the managed fields of `current` with `desired`, keeping the rest.
fn merge_container(current: &mut Container, desired: Container) {
    current.image = desired.image;
    current.image_pull_policy = desired.image_pull_policy;
    current.command = desired.command;
    current.args = desired.args;
    current.env = desired.env;
    current.ports = desired.ports;
    current.volume_mounts = desired.volume_mounts;
    current.readiness_probe = desired.readiness_probe;
    current.liveness_probe = desired.liveness_probe;
    current.resources = desired.resources;
    current.security_context = desired.security_context;
}

fn merge_containers(current: Vec<Container>, desired: Vec<Container>) -> Vec<Container> {
    let mut existing: BTreeMap<String, Container> =
        current.into_iter().map(|c| (c.name.clone(), c)).collect();
    desired
        .into_iter()
        .map(|d| match existing.remove(&d.name) {
            Some(mut c) => {
                merge_container(&mut c, d);
                c
            }
            None => d,
        })
        .collect()
}

fn merge_volumes(current: Vec<Volume>, desired: Vec<Volume>) -> Vec<Volume> {
    let mut existing: BTreeMap<String, Volume> =
        current.into_iter().map(|v| (v.name.clone(), v)).collect();
    desired
        .into_iter()
        .map(|d| match existing.remove(&d.name) {
            Some(mut v) => {
                v.secret = d.secret;
                v.config_map = d.config_map;
                v.projected = d.projected;
                v
            }
            None => d,
        })
        .collect()
}

#[must_use]
pub fn build_deployment_template(tcp: &TenantControlPlane) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(tcp)),
            namespace: tcp.namespace(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Apply the desired control plane workload onto `deploy`.
///
/// Containers and volumes not managed here are dropped; the ones managed here
/// keep any field the API server defaulted.
pub fn mutate_deployment(deploy: &mut Deployment, tcp: &TenantControlPlane) {
    let additional = &tcp.spec.control_plane.deployment.additional_metadata;
    let selector = selector_labels(tcp);
    let labels = merge_maps(&[
        &deploy.labels().clone(),
        &steward_labels(&tcp.name_any(), RESOURCE_NAME),
        &additional.labels,
    ]);
    deploy.metadata.labels = Some(labels.clone());
    deploy.metadata.annotations = Some(merge_maps(&[
        &deploy.annotations().clone(),
        &additional.annotations,
    ]));

    let spec = deploy.spec.get_or_insert_with(DeploymentSpec::default);
    spec.replicas = Some(tcp.desired_replicas());
    spec.selector = LabelSelector {
        match_labels: Some(selector),
        ..Default::default()
    };

    let template = &mut spec.template;
    let meta = template.metadata.get_or_insert_with(ObjectMeta::default);
    meta.labels = Some(merge_maps(&[&meta.labels.clone().unwrap_or_default(), &labels]));
    let mut annotations = meta.annotations.take().unwrap_or_default();
    annotations.retain(|k, _| !k.starts_with(CHECKSUM_ANNOTATION_PREFIX));
    annotations.extend(material_checksums(tcp));
    annotations.extend(additional.annotations.clone());
    meta.annotations = Some(annotations);

    let pod = template.spec.get_or_insert_with(PodSpec::default);
    pod.containers = merge_containers(std::mem::take(&mut pod.containers), build_containers(tcp));
    pod.volumes = Some(merge_volumes(
        pod.volumes.take().unwrap_or_default(),
        build_volumes(tcp),
    ));

    set_controller_reference(&mut deploy.metadata, tcp);
}

/// `k=v` pairs of the selector, comma separated.
#[must_use]
pub fn format_label_selector(selector: &LabelSelector) -> String {
    selector
        .match_labels
        .as_ref()
        .map(|labels| {
            labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// Status projection of the persisted Deployment.
#[must_use]
pub fn deployment_status(deploy: &Deployment) -> KubernetesDeploymentStatus {
    KubernetesDeploymentStatus {
        name: deploy.name_any(),
        namespace: deploy.namespace().unwrap_or_default(),
        selector: deploy
            .spec
            .as_ref()
            .map(|s| format_label_selector(&s.selector))
            .unwrap_or_default(),
        deployment_status: deploy.status.clone(),
        last_update: Some(now_rfc3339()),
    }
}

/// Whether the recorded Deployment or version status is stale.
#[must_use]
pub fn deployment_status_is_stale(tcp: &TenantControlPlane, deploy: &Deployment) -> bool {
    let recorded = tcp.status_or_default().kubernetes;
    if recorded.deployment.deployment_status != deploy.status {
        return true;
    }
    if recorded.version.version != tcp.spec.kubernetes.version {
        return true;
    }
    recorded.version.status.unwrap_or(KubernetesVersionStatus::Unknown)
        != compute_version_status(tcp, deploy)
}

pub struct DeploymentResource {
    client: Client,
    deployment: Option<Deployment>,
}

impl DeploymentResource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            deployment: None,
        }
    }
}

#[async_trait]
impl ManagedResource for DeploymentResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    async fn define(&mut self, _tcp: &TenantControlPlane, _: &dyn TenantClientFactory) -> Result<()> {
        self.deployment = None;
        Ok(())
    }

    fn should_cleanup(&self, _tcp: &TenantControlPlane) -> bool {
        false
    }

    async fn cleanup(&mut self, _tcp: &TenantControlPlane) -> Result<bool> {
        Ok(false)
    }

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &tcp.namespace().unwrap_or_default());
        let (result, deploy) = upsert(&api, build_deployment_template(tcp), |deploy| {
            mutate_deployment(deploy, tcp);
            Ok(())
        })
        .await?;
        debug!(tcp = %tcp.name_any(), result = ?result, "Reconciled control plane Deployment");
        self.deployment = Some(deploy);
        Ok(result)
    }

    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool {
        self.deployment
            .as_ref()
            .is_some_and(|deploy| deployment_status_is_stale(tcp, deploy))
    }

    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()> {
        let Some(deploy) = self.deployment.as_ref() else {
            return Ok(());
        };
        let version_status = compute_version_status(tcp, deploy);
        apply_version_status(tcp, version_status);
        tcp.status_mut().kubernetes.deployment = deployment_status(deploy);
        Ok(())
    }
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod deployment_tests;
