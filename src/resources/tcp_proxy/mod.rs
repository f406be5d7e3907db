// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! tcp-proxy addon, deployed inside the tenant cluster.
//!
//! When the API server is exposed through an Ingress or a Gateway, in-cluster
//! clients of the tenant cannot reach `kubernetes.default.svc` directly. The
//! tcp-proxy runs in `kube-system` of the tenant, takes over the `kubernetes`
//! EndpointSlice and forwards connections to the external endpoint.
//!
//! Every object is driven by the same [`AddonResource`], parametrized by an
//! [`AddonKind`] describing the object identity, its desired state and its
//! status slot under `status.addons.tcpProxy`.
//!
//! | Resource | Object |
//! |----------|--------|
//! | `tcp-proxy-service-account` | ServiceAccount `kube-system/steward-tcp-proxy` |
//! | `tcp-proxy-cluster-role` | ClusterRole `steward:tcp-proxy` |
//! | `tcp-proxy-cluster-role-binding` | ClusterRoleBinding `steward:tcp-proxy` |
//! | `tcp-proxy-service` | Service `kube-system/steward-tcp-proxy` |
//! | `tcp-proxy-agent` | Deployment `kube-system/steward-tcp-proxy` |

pub mod agent;
pub mod cluster_role;
pub mod cluster_role_binding;
pub mod service;
pub mod service_account;

use super::{is_owned_by, now_rfc3339, ManagedResource, TenantClientFactory};
use crate::crd::{ExternalObjectStatus, TcpProxyStatus, TenantControlPlane};
use crate::reconcilers::upsert::{delete_if_owned, upsert, UpsertResult};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::{debug, info};

use self::agent::AgentKind;
use self::cluster_role::ClusterRoleKind;
use self::cluster_role_binding::ClusterRoleBindingKind;
use self::service::ServiceKind;
use self::service_account::ServiceAccountKind;

/// Operator level settings of the addon.
#[derive(Clone, Debug)]
pub struct AddonSettings {
    /// Image used when the spec leaves it unset.
    pub default_image: String,
}

/// One kind of object making up the addon.
pub trait AddonKind: Send + Sync + 'static {
    type Object: Resource<DynamicType = ()>
        + Clone
        + Default
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static;

    const RESOURCE_NAME: &'static str;

    /// Whether this kind owns `status.addons.tcpProxy.enabled`.
    const TRACKS_ENABLED: bool = false;

    fn object_name() -> &'static str;

    /// Namespace of the object, `None` for cluster scoped kinds.
    fn object_namespace() -> Option<&'static str>;

    fn api(client: Client) -> Api<Self::Object>;

    /// Apply the desired state onto `obj`; must be deterministic.
    ///
    /// # Errors
    ///
    /// Fails when the desired state depends on information not known yet.
    fn mutate(obj: &mut Self::Object, tcp: &TenantControlPlane, settings: &AddonSettings) -> Result<()>;

    fn status_slot(status: &mut TcpProxyStatus) -> &mut ExternalObjectStatus;

    fn recorded(status: &TcpProxyStatus) -> &ExternalObjectStatus;
}

/// Whether the addon is requested.
#[must_use]
pub fn is_enabled(tcp: &TenantControlPlane) -> bool {
    tcp.spec.addons.tcp_proxy.is_some()
}

fn was_enabled(tcp: &TenantControlPlane) -> bool {
    tcp.status
        .as_ref()
        .is_some_and(|s| s.addons.tcp_proxy.enabled)
}

/// Empty object carrying only the identity of `A`.
#[must_use]
pub fn build_template<A: AddonKind>() -> A::Object {
    let mut obj = A::Object::default();
    obj.meta_mut().name = Some(A::object_name().to_string());
    obj.meta_mut().namespace = A::object_namespace().map(str::to_string);
    obj
}

/// Status entry for an object persisted in the tenant cluster.
#[must_use]
pub fn external_status<K: Resource>(obj: &K) -> ExternalObjectStatus {
    ExternalObjectStatus {
        name: obj.meta().name.clone().unwrap_or_default(),
        namespace: obj.meta().namespace.clone().unwrap_or_default(),
        last_update: Some(now_rfc3339()),
    }
}

/// Whether the recorded status of `A` diverges from the addon state.
#[must_use]
pub fn status_is_stale<A: AddonKind>(tcp: &TenantControlPlane, object_name: &str) -> bool {
    let recorded = tcp.status_or_default().addons.tcp_proxy;
    let slot = A::recorded(&recorded);
    if !is_enabled(tcp) {
        return if A::TRACKS_ENABLED {
            recorded.enabled
        } else {
            !slot.name.is_empty()
        };
    }
    (A::TRACKS_ENABLED && !recorded.enabled) || slot.name != object_name
}

/// Project the addon state of `A` into `tcp.status`.
pub fn apply_status<A: AddonKind>(tcp: &mut TenantControlPlane, observed: Option<&A::Object>) {
    let enabled = is_enabled(tcp);
    let status = &mut tcp.status_mut().addons.tcp_proxy;
    *A::status_slot(status) = match observed {
        Some(obj) if enabled => external_status(obj),
        _ => ExternalObjectStatus::default(),
    };
    if A::TRACKS_ENABLED {
        status.enabled = enabled;
    }
}

/// [`ManagedResource`] driving one [`AddonKind`] through a tenant cluster client.
pub struct AddonResource<A: AddonKind> {
    settings: AddonSettings,
    client: Option<Client>,
    object: Option<A::Object>,
    kind: PhantomData<A>,
}

impl<A: AddonKind> AddonResource<A> {
    #[must_use]
    pub fn new(settings: AddonSettings) -> Self {
        Self {
            settings,
            client: None,
            object: None,
            kind: PhantomData,
        }
    }

    fn api(&self) -> Result<Api<A::Object>> {
        self.client
            .clone()
            .map(A::api)
            .context("tenant cluster client not acquired")
    }
}

#[async_trait]
impl<A: AddonKind> ManagedResource for AddonResource<A> {
    fn name(&self) -> &'static str {
        A::RESOURCE_NAME
    }

    async fn define(&mut self, tcp: &TenantControlPlane, tenants: &dyn TenantClientFactory) -> Result<()> {
        self.object = None;
        self.client = None;
        // Nothing to create or clean up: do not require the tenant to be reachable.
        if !is_enabled(tcp) && !was_enabled(tcp) {
            return Ok(());
        }
        let client = tenants
            .tenant_client(tcp)
            .await
            .with_context(|| format!("unable to retrieve the tenant cluster client for {}", A::RESOURCE_NAME))?;
        self.client = Some(client);
        Ok(())
    }

    fn should_cleanup(&self, tcp: &TenantControlPlane) -> bool {
        !is_enabled(tcp) && was_enabled(tcp)
    }

    async fn cleanup(&mut self, tcp: &TenantControlPlane) -> Result<bool> {
        let api = self.api()?;
        let deleted = delete_if_owned(&api, A::object_name(), |obj: &A::Object| is_owned_by(obj, tcp)).await?;
        if deleted {
            info!(tcp = %tcp.name_any(), resource = A::RESOURCE_NAME, "Deleted tcp-proxy object from tenant cluster");
        }
        Ok(deleted)
    }

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult> {
        if !is_enabled(tcp) {
            return Ok(UpsertResult::None);
        }
        let api = self.api()?;
        let settings = &self.settings;
        let (result, obj) = upsert(&api, build_template::<A>(), |obj| A::mutate(obj, tcp, settings)).await?;
        debug!(tcp = %tcp.name_any(), resource = A::RESOURCE_NAME, result = ?result, "Reconciled tcp-proxy object");
        self.object = Some(obj);
        Ok(result)
    }

    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool {
        let name = self
            .object
            .as_ref()
            .map(|o| o.name_any())
            .unwrap_or_default();
        status_is_stale::<A>(tcp, &name)
    }

    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()> {
        apply_status::<A>(tcp, self.object.as_ref());
        Ok(())
    }
}

/// The tcp-proxy resources, in reconcile order.
#[must_use]
pub fn resources(default_image: &str) -> Vec<Box<dyn ManagedResource>> {
    let settings = AddonSettings {
        default_image: default_image.to_string(),
    };
    vec![
        Box::new(AddonResource::<ServiceAccountKind>::new(settings.clone())),
        Box::new(AddonResource::<ClusterRoleKind>::new(settings.clone())),
        Box::new(AddonResource::<ClusterRoleBindingKind>::new(settings.clone())),
        Box::new(AddonResource::<ServiceKind>::new(settings.clone())),
        Box::new(AddonResource::<AgentKind>::new(settings)),
    ]
}
