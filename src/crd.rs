// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for tenant control planes.
//!
//! This module defines the [`TenantControlPlane`] CRD: a Kubernetes control plane
//! (kube-apiserver, controller-manager, scheduler) running as a Deployment inside
//! the management cluster, exposed through a Service, an Ingress or a Gateway.
//!
//! The spec carries the desired state (network profile, exposure mode, Kubernetes
//! version, addons). The status carries what the operator observed and generated:
//! certificate checksums, child object status, the published endpoint and the
//! rollout state of the control plane version.
//!
//! # Example
//!
//! ```rust,no_run
//! use steward::crd::{NetworkProfileSpec, TenantControlPlaneSpec, KubernetesSpec};
//!
//! let spec = TenantControlPlaneSpec {
//!     kubernetes: KubernetesSpec {
//!         version: "v1.31.2".to_string(),
//!     },
//!     network_profile: NetworkProfileSpec {
//!         address: "10.40.0.100".to_string(),
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! ```

use crate::constants::{DEFAULT_API_SERVER_PORT, DEFAULT_TRUSTD_IMAGE, DEFAULT_TRUSTD_PORT};
use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::{LoadBalancerStatus, ResourceRequirements};
use k8s_openapi::api::networking::v1::IngressLoadBalancerStatus;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `TenantControlPlane` describes a tenant Kubernetes control plane hosted as
/// workloads of the management cluster.
///
/// # Example
///
/// ```yaml
/// apiVersion: steward.butlerlabs.dev/v1alpha1
/// kind: TenantControlPlane
/// metadata:
///   name: tenant-a
///   namespace: tenants
/// spec:
///   controlPlane:
///     deployment:
///       replicas: 2
///     service:
///       serviceType: LoadBalancer
///   kubernetes:
///     version: v1.31.2
///   networkProfile:
///     port: 6443
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "steward.butlerlabs.dev",
    version = "v1alpha1",
    kind = "TenantControlPlane",
    namespaced,
    shortname = "tcp",
    doc = "TenantControlPlane describes a tenant Kubernetes control plane running as Pods of the management cluster.",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.kubernetes.version"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.kubernetes.version.status"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.controlPlaneEndpoint"}"#
)]
#[kube(status = "TenantControlPlaneStatus")]
#[serde(rename_all = "camelCase")]
pub struct TenantControlPlaneSpec {
    /// Control plane workload and exposure settings.
    #[serde(default)]
    pub control_plane: ControlPlaneSpec,

    /// Kubernetes distribution settings.
    pub kubernetes: KubernetesSpec,

    /// Addressing of the tenant API server.
    #[serde(default)]
    pub network_profile: NetworkProfileSpec,

    /// Optional addons.
    #[serde(default)]
    pub addons: AddonsSpec,

    /// Write restrictions enforced on the tenant datastore.
    #[serde(default)]
    pub write_permissions: WritePermissions,
}

/// Labels and annotations propagated to a generated object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneSpec {
    #[serde(default)]
    pub deployment: DeploymentSpec,

    #[serde(default)]
    pub service: ServiceSpec,

    /// Expose the API server through an Ingress with TLS passthrough.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,

    /// Expose the API server through a Gateway API listener.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewaySpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Number of control plane replicas; defaults to 2. Zero puts the tenant to sleep.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub replicas: Option<i32>,

    #[serde(default)]
    pub additional_metadata: AdditionalMetadata,
}

/// Kubernetes Service type for the control plane Service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    /// Value used in `Service.spec.type`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClusterIP => "ClusterIP",
            Self::NodePort => "NodePort",
            Self::LoadBalancer => "LoadBalancer",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default)]
    pub service_type: ServiceType,

    #[serde(default)]
    pub additional_metadata: AdditionalMetadata,

    /// Extra ports appended after the `kube-apiserver` port.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_ports: Vec<AdditionalPort>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalPort {
    pub name: String,
    pub port: i32,
    pub target_port: i32,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_protocol: Option<String>,
}

fn default_protocol() -> String {
    "TCP".to_string()
}

/// Ingress controller flavour, selecting the TLS passthrough annotations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IngressControllerType {
    #[default]
    Generic,
    Nginx,
    Haproxy,
    Traefik,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Hostname routed to the API server, optionally with a `:port` suffix.
    #[serde(default)]
    pub hostname: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,

    #[serde(default)]
    pub controller_type: IngressControllerType,

    #[serde(default)]
    pub additional_metadata: AdditionalMetadata,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Hostname of the Gateway listener routing to the API server.
    #[serde(default)]
    pub hostname: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSpec {
    /// Kubernetes version, e.g. `v1.31.2`.
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfileSpec {
    /// Static address of the API server. Must be an IP when set.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    /// API server port.
    #[serde(default = "default_api_server_port")]
    pub port: i32,

    /// Extra SANs for the API server certificate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cert_sans: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_cidr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_cidr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load_balancer_source_ranges: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_class: Option<String>,

    /// Publish the declared address as a Service external IP.
    #[serde(default, rename = "allowAddressAsExternalIP")]
    pub allow_address_as_external_ip: bool,
}

fn default_api_server_port() -> i32 {
    DEFAULT_API_SERVER_PORT
}

impl Default for NetworkProfileSpec {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: DEFAULT_API_SERVER_PORT,
            cert_sans: Vec::new(),
            service_cidr: None,
            pod_cidr: None,
            cluster_domain: None,
            load_balancer_source_ranges: Vec::new(),
            load_balancer_class: None,
            allow_address_as_external_ip: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonsSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub konnectivity: Option<KonnectivitySpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_bootstrap: Option<WorkerBootstrapSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp_proxy: Option<TcpProxySpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KonnectivitySpec {
    #[serde(default)]
    pub server: KonnectivityServerSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KonnectivityServerSpec {
    #[serde(default = "default_konnectivity_port")]
    pub port: i32,
}

fn default_konnectivity_port() -> i32 {
    8132
}

impl Default for KonnectivityServerSpec {
    fn default() -> Self {
        Self {
            port: default_konnectivity_port(),
        }
    }
}

/// Immutable OS bootstrap provider for worker nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkerBootstrapProvider {
    #[default]
    Talos,
}

impl WorkerBootstrapProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Talos => "talos",
        }
    }
}

/// Worker node bootstrap through an OS trust side channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerBootstrapSpec {
    pub provider: WorkerBootstrapProvider,

    /// Required when the provider is `talos`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub talos: Option<TalosBootstrapSpec>,

    #[serde(default)]
    pub csr_approval: CsrApprovalSpec,

    /// CIDRs worker IP SANs must fall into for CSR auto-approval. Empty allows all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_subnets: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TalosBootstrapSpec {
    #[serde(default = "default_trustd_image")]
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,

    #[serde(default = "default_trustd_port")]
    pub port: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Extra SANs for the trust daemon server certificate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cert_sans: Vec<String>,
}

fn default_trustd_image() -> String {
    DEFAULT_TRUSTD_IMAGE.to_string()
}

fn default_trustd_port() -> i32 {
    DEFAULT_TRUSTD_PORT
}

impl Default for TalosBootstrapSpec {
    fn default() -> Self {
        Self {
            image: default_trustd_image(),
            image_tag: None,
            port: DEFAULT_TRUSTD_PORT,
            resources: None,
            cert_sans: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsrApprovalSpec {
    #[serde(default = "default_true")]
    pub auto_approve: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CsrApprovalSpec {
    fn default() -> Self {
        Self { auto_approve: true }
    }
}

/// tcp-proxy addon deployed inside the tenant cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TcpProxySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Direct endpoint of the API server reachable from tenant workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WritePermissions {
    #[serde(default)]
    pub block_create: bool,
    #[serde(default)]
    pub block_update: bool,
    #[serde(default)]
    pub block_delete: bool,
}

impl WritePermissions {
    /// Whether any write operation is blocked.
    #[must_use]
    pub fn has_any_limitation(&self) -> bool {
        self.block_create || self.block_update || self.block_delete
    }
}

// ============================================================================
// Status
// ============================================================================

/// Condition represents an observation of a resource's current state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `Ready`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Rollout state of the tenant control plane version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum KubernetesVersionStatus {
    Sleeping,
    NotReady,
    WriteLimited,
    Provisioning,
    Upgrading,
    Ready,
    #[default]
    Unknown,
}

impl std::fmt::Display for KubernetesVersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sleeping => "Sleeping",
            Self::NotReady => "NotReady",
            Self::WriteLimited => "WriteLimited",
            Self::Provisioning => "Provisioning",
            Self::Upgrading => "Upgrading",
            Self::Ready => "Ready",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantControlPlaneStatus {
    #[serde(default)]
    pub certificates: CertificatesStatus,

    #[serde(default)]
    pub kubeadm_config: KubeadmConfigStatus,

    #[serde(default)]
    pub kubernetes: KubernetesStatus,

    #[serde(default)]
    pub addons: AddonsStatus,

    /// Authoritative external endpoint, always `host:port`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub control_plane_endpoint: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Tracks a Secret holding generated key material.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,

    /// Checksum of the persisted Secret payload.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificatesStatus {
    #[serde(default)]
    pub ca: CertificateStatus,
    #[serde(default, rename = "frontProxyCA")]
    pub front_proxy_ca: CertificateStatus,
    #[serde(default)]
    pub api_server: CertificateStatus,
    #[serde(default)]
    pub api_server_kubelet_client: CertificateStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmConfigStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub configmap_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesStatus {
    #[serde(default)]
    pub version: KubernetesVersion,
    #[serde(default)]
    pub deployment: KubernetesDeploymentStatus,
    #[serde(default)]
    pub service: KubernetesServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<KubernetesIngressStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesVersion {
    /// Last version fully rolled out.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<KubernetesVersionStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesDeploymentStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_status: Option<DeploymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesServiceStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default)]
    pub port: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesIngressStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<IngressLoadBalancerStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddonsStatus {
    #[serde(default)]
    pub konnectivity: KonnectivityStatus,
    #[serde(default)]
    pub worker_bootstrap: WorkerBootstrapStatus,
    #[serde(default)]
    pub tcp_proxy: TcpProxyStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KonnectivityStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub certificate: CertificateStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkerBootstrapStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<WorkerBootstrapProvider>,
    #[serde(default)]
    pub credentials: CertificateStatus,
    /// Trust daemon endpoint for worker nodes (`host:port`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(default)]
    pub service: KubernetesServiceStatus,
}

/// Status of an object living in the tenant cluster.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalObjectStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TcpProxyStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub service_account: ExternalObjectStatus,
    #[serde(default)]
    pub cluster_role: ExternalObjectStatus,
    #[serde(default)]
    pub cluster_role_binding: ExternalObjectStatus,
    #[serde(default)]
    pub service: ExternalObjectStatus,
    #[serde(default)]
    pub deployment: ExternalObjectStatus,
}

impl TenantControlPlane {
    /// Status view that tolerates a missing status subresource.
    #[must_use]
    pub fn status_or_default(&self) -> TenantControlPlaneStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Mutable status, created on first access.
    pub fn status_mut(&mut self) -> &mut TenantControlPlaneStatus {
        self.status.get_or_insert_with(TenantControlPlaneStatus::default)
    }

    /// Desired control plane replicas, applying the default.
    #[must_use]
    pub fn desired_replicas(&self) -> i32 {
        self.spec
            .control_plane
            .deployment
            .replicas
            .unwrap_or(crate::constants::DEFAULT_CONTROL_PLANE_REPLICAS)
    }

    /// Whether the worker bootstrap addon is requested with a supported provider.
    #[must_use]
    pub fn wants_worker_bootstrap(&self) -> bool {
        self.spec
            .addons
            .worker_bootstrap
            .as_ref()
            .is_some_and(|wb| wb.provider == WorkerBootstrapProvider::Talos)
    }
}
