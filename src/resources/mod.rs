// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Managed child resources of a tenant control plane.
//!
//! Every object the operator owns is wrapped in a [`ManagedResource`]: a small
//! state machine the [`Orchestrator`](crate::reconcilers::orchestrator::Orchestrator)
//! drives through `define`, then either `cleanup` or `create_or_update`, then
//! the status projection. Resources are rebuilt for every reconcile and only
//! remember the object fetched or written during that run.
//!
//! The mutation logic of each resource lives in a pure `mutate_*`/`build_*`
//! function so it can be unit tested without an API server.
//!
//! ## Management cluster
//!
//! | Resource | Object |
//! |----------|--------|
//! | `service` | Service `<tcp>` |
//! | `ingress` | Ingress `<tcp>` |
//! | `traefik-ingressroutetcp` | Traefik `IngressRouteTCP` `<tcp>` |
//! | `trustd-service` | `steward-trustd` port on Service `<tcp>` |
//! | `ca-certificate` | Secret `<tcp>-ca-certificate` |
//! | `front-proxy-ca-certificate` | Secret `<tcp>-front-proxy-ca-certificate` |
//! | `kubeadm-config` | ConfigMap `<tcp>-kubeadmconfig` |
//! | `api-server-certificate` | Secret `<tcp>-api-server-certificate` |
//! | `api-server-kubelet-client-certificate` | Secret `<tcp>-api-server-kubelet-client-certificate` |
//! | `konnectivity-certificate` | Secret `<tcp>-konnectivity-certificate` |
//! | `trustd-credentials` | Secret `<tcp>-trustd-creds` |
//! | `deployment` | Deployment `<tcp>` |
//!
//! ## Tenant cluster
//!
//! The tcp-proxy addon, see [`tcp_proxy`].

pub mod certificate;
pub mod deployment;
pub mod ingress;
pub mod kubeadm_config;
pub mod service;
pub mod tcp_proxy;
pub mod traefik;
pub mod trustd_credentials;
pub mod trustd_service;

use crate::config::OperatorConfig;
use crate::constants::{
    ADMIN_KUBECONFIG_KEY, ADMIN_KUBECONFIG_SUFFIX, API_GROUP_VERSION, KIND_TENANT_CONTROL_PLANE,
};
use crate::crd::TenantControlPlane;
use crate::labels::is_project_owned;
use crate::metrics::Metrics;
use crate::reconcilers::upsert::UpsertResult;
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, Resource, ResourceExt};
use std::sync::Arc;
use tokio::sync::OnceCell;

use self::certificate::{CertificateKind, CertificateResource};
use self::deployment::DeploymentResource;
use self::ingress::IngressResource;
use self::kubeadm_config::KubeadmConfigResource;
use self::service::ServiceResource;
use self::traefik::TraefikIngressRouteResource;
use self::trustd_credentials::TrustdCredentialsResource;
use self::trustd_service::TrustdServiceResource;

/// A child object of a tenant control plane, reconciled by the orchestrator.
///
/// Implementations must be idempotent: running the same sequence twice against
/// an unchanged tenant control plane yields [`UpsertResult::None`] the second
/// time and leaves `should_status_be_updated` false.
#[async_trait]
pub trait ManagedResource: Send + Sync {
    /// Identifier used in logs and as the `resource` metrics label.
    fn name(&self) -> &'static str;

    /// Bind the target object identity for this run.
    ///
    /// Tenant-side resources acquire their tenant cluster client here.
    async fn define(
        &mut self,
        tcp: &TenantControlPlane,
        tenants: &dyn TenantClientFactory,
    ) -> Result<()>;

    /// Whether the governing feature was removed and the object must go.
    fn should_cleanup(&self, tcp: &TenantControlPlane) -> bool;

    /// Delete the object if it is owned by `tcp`. Returns whether anything changed.
    async fn cleanup(&mut self, tcp: &TenantControlPlane) -> Result<bool>;

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult>;

    /// Whether the recorded status diverges from the observed object.
    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool;

    /// Project the observed object into `tcp.status`.
    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()>;
}

/// Source of clients for tenant clusters.
#[async_trait]
pub trait TenantClientFactory: Send + Sync {
    /// Client authenticated against the tenant API server of `tcp`.
    async fn tenant_client(&self, tcp: &TenantControlPlane) -> Result<Client>;
}

/// [`TenantClientFactory`] loading the admin kubeconfig Secret of the tenant.
///
/// The Secret `<tcp>-admin-kubeconfig` (key `admin.conf`) is written by the
/// kubeconfig generator running next to the operator.
#[derive(Clone)]
pub struct KubeconfigClientFactory {
    client: Client,
}

impl KubeconfigClientFactory {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Name of the admin kubeconfig Secret of a tenant control plane.
#[must_use]
pub fn admin_kubeconfig_secret_name(tcp: &TenantControlPlane) -> String {
    tenant_prefixed_name(tcp, ADMIN_KUBECONFIG_SUFFIX)
}

#[async_trait]
impl TenantClientFactory for KubeconfigClientFactory {
    async fn tenant_client(&self, tcp: &TenantControlPlane) -> Result<Client> {
        let namespace = tcp.namespace().unwrap_or_default();
        let secret_name = admin_kubeconfig_secret_name(tcp);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);

        let secret = secrets
            .get_opt(&secret_name)
            .await?
            .ok_or_else(|| anyhow!("admin kubeconfig secret {namespace}/{secret_name} not found yet"))?;
        let raw = secret
            .data
            .as_ref()
            .and_then(|d| d.get(ADMIN_KUBECONFIG_KEY))
            .ok_or_else(|| anyhow!("secret {namespace}/{secret_name} has no {ADMIN_KUBECONFIG_KEY} key"))?;
        let yaml = std::str::from_utf8(&raw.0)
            .with_context(|| format!("{ADMIN_KUBECONFIG_KEY} in {secret_name} is not UTF-8"))?;

        let kubeconfig = Kubeconfig::from_yaml(yaml)
            .with_context(|| format!("failed to parse kubeconfig from {secret_name}"))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .with_context(|| format!("failed to load kubeconfig from {secret_name}"))?;
        Client::try_from(config).context("failed to build tenant cluster client")
    }
}

/// [`TenantClientFactory`] building the tenant client at most once.
///
/// Scoped to a single reconcile of one tenant control plane, so every tenant
/// resource shares the client instead of reloading the kubeconfig Secret.
/// Failures are not cached.
pub struct CachedClientFactory {
    inner: Arc<dyn TenantClientFactory>,
    client: OnceCell<Client>,
}

impl CachedClientFactory {
    #[must_use]
    pub fn new(inner: Arc<dyn TenantClientFactory>) -> Self {
        Self {
            inner,
            client: OnceCell::new(),
        }
    }
}

#[async_trait]
impl TenantClientFactory for CachedClientFactory {
    async fn tenant_client(&self, tcp: &TenantControlPlane) -> Result<Client> {
        self.client
            .get_or_try_init(|| self.inner.tenant_client(tcp))
            .await
            .cloned()
    }
}

/// `<tcp>-<suffix>`
#[must_use]
pub fn tenant_prefixed_name(tcp: &TenantControlPlane, suffix: &str) -> String {
    format!("{}-{suffix}", tcp.name_any())
}

/// Controller owner reference pointing at `tcp`.
#[must_use]
pub fn build_owner_references(tcp: &TenantControlPlane) -> Vec<OwnerReference> {
    vec![OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_TENANT_CONTROL_PLANE.to_string(),
        name: tcp.name_any(),
        uid: tcp.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]
}

/// Make `tcp` the controller of the object, keeping unrelated owner references.
pub fn set_controller_reference(meta: &mut ObjectMeta, tcp: &TenantControlPlane) {
    let uid = tcp.metadata.uid.clone().unwrap_or_default();
    let mut refs = meta.owner_references.take().unwrap_or_default();
    refs.retain(|r| r.uid != uid && r.controller != Some(true));
    refs.extend(build_owner_references(tcp));
    meta.owner_references = Some(refs);
}

/// Whether `obj` carries an owner reference to `tcp`.
#[must_use]
pub fn is_controlled_by<K: Resource>(obj: &K, tcp: &TenantControlPlane) -> bool {
    let uid = tcp.metadata.uid.as_deref().unwrap_or_default();
    !uid.is_empty()
        && obj
            .meta()
            .owner_references
            .as_ref()
            .is_some_and(|refs| refs.iter().any(|r| r.uid == uid))
}

/// Whether `obj` belongs to `tcp`: an owner reference with its UID, or the
/// project label for objects living in the tenant cluster.
#[must_use]
pub fn is_owned_by<K: Resource>(obj: &K, tcp: &TenantControlPlane) -> bool {
    is_controlled_by(obj, tcp) || is_project_owned(obj.meta().labels.as_ref())
}

/// RFC 3339 timestamp for `lastUpdate` status fields.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Management cluster resources of a tenant control plane, in reconcile order.
#[must_use]
pub fn management_resources(
    client: &Client,
    config: &Arc<OperatorConfig>,
    metrics: &Arc<Metrics>,
) -> Vec<Box<dyn ManagedResource>> {
    let certificate = |kind| -> Box<dyn ManagedResource> {
        Box::new(CertificateResource::new(
            client.clone(),
            kind,
            config.expiration_threshold(),
            metrics.clone(),
        ))
    };

    vec![
        Box::new(ServiceResource::new(client.clone())),
        Box::new(IngressResource::new(client.clone())),
        Box::new(TraefikIngressRouteResource::new(client.clone())),
        Box::new(TrustdServiceResource::new(client.clone())),
        certificate(CertificateKind::Ca),
        certificate(CertificateKind::FrontProxyCa),
        Box::new(KubeadmConfigResource::new(client.clone())),
        certificate(CertificateKind::ApiServer),
        certificate(CertificateKind::ApiServerKubeletClient),
        certificate(CertificateKind::Konnectivity),
        Box::new(TrustdCredentialsResource::new(
            client.clone(),
            config.expiration_threshold(),
            metrics.clone(),
        )),
        Box::new(DeploymentResource::new(client.clone())),
    ]
}

/// Tenant cluster resources (tcp-proxy addon), in reconcile order.
#[must_use]
pub fn tenant_resources(config: &Arc<OperatorConfig>) -> Vec<Box<dyn ManagedResource>> {
    tcp_proxy::resources(&config.tcp_proxy_image)
}
