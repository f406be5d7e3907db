// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Traefik `IngressRouteTCP` for SNI passthrough.
//!
//! Traefik does not honour passthrough on plain Ingress objects, so when the
//! Ingress controller type is `traefik` a `traefik.io/v1alpha1` route is
//! managed next to the Ingress. The CRD is not compiled in; the object is
//! handled as a [`DynamicObject`].

use super::{is_controlled_by, set_controller_reference, ManagedResource, TenantClientFactory};
use crate::address::host_and_port_from_hostname;
use crate::crd::{IngressControllerType, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels};
use crate::reconcilers::upsert::{delete_if_owned, upsert, UpsertResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::info;

const RESOURCE_NAME: &str = "traefik-ingressroutetcp";

pub const TRAEFIK_GROUP: &str = "traefik.io";
pub const TRAEFIK_VERSION: &str = "v1alpha1";
pub const INGRESS_ROUTE_TCP_KIND: &str = "IngressRouteTCP";

const ENTRY_POINT: &str = "websecure";

/// API resource of Traefik's `IngressRouteTCP`.
#[must_use]
pub fn ingress_route_tcp_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(TRAEFIK_GROUP, TRAEFIK_VERSION, INGRESS_ROUTE_TCP_KIND),
        "ingressroutetcps",
    )
}

fn wants_route(tcp: &TenantControlPlane) -> bool {
    tcp.spec
        .control_plane
        .ingress
        .as_ref()
        .is_some_and(|i| i.controller_type == IngressControllerType::Traefik)
}

pub struct TraefikIngressRouteResource {
    client: Client,
}

impl TraefikIngressRouteResource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, tcp: &TenantControlPlane) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            &tcp.namespace().unwrap_or_default(),
            &ingress_route_tcp_resource(),
        )
    }
}

#[must_use]
pub fn build_route_template(tcp: &TenantControlPlane) -> DynamicObject {
    DynamicObject::new(&tcp.name_any(), &ingress_route_tcp_resource())
        .within(&tcp.namespace().unwrap_or_default())
}

/// Apply the desired route onto `route`.
///
/// # Errors
///
/// Fails when no Ingress hostname is set or the Service is not recorded yet.
pub fn mutate_route(route: &mut DynamicObject, tcp: &TenantControlPlane) -> Result<()> {
    let Some(ingress) = tcp.spec.control_plane.ingress.as_ref() else {
        bail!("ingress spec is not set");
    };
    if ingress.hostname.is_empty() {
        bail!("missing hostname for IngressRouteTCP");
    }
    let service = tcp.status_or_default().kubernetes.service;
    if service.name.is_empty() || service.port == 0 {
        bail!("IngressRouteTCP cannot be configured yet: service not ready");
    }
    let (host, _) = host_and_port_from_hostname(&ingress.hostname, 0);

    let labels = merge_maps(&[
        &route.labels().clone(),
        &steward_labels(&tcp.name_any(), RESOURCE_NAME),
        &ingress.additional_metadata.labels,
    ]);
    route.metadata.labels = Some(labels);
    let annotations = merge_maps(&[
        &route.annotations().clone(),
        &ingress.additional_metadata.annotations,
    ]);
    route.metadata.annotations = Some(annotations);

    route.data["spec"] = json!({
        "entryPoints": [ENTRY_POINT],
        "routes": [{
            "match": format!("HostSNI(`{host}`)"),
            "services": [{
                "name": service.name,
                "port": service.port,
            }],
        }],
        "tls": { "passthrough": true },
    });

    set_controller_reference(&mut route.metadata, tcp);
    Ok(())
}

#[async_trait]
impl ManagedResource for TraefikIngressRouteResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    async fn define(&mut self, _tcp: &TenantControlPlane, _: &dyn TenantClientFactory) -> Result<()> {
        Ok(())
    }

    fn should_cleanup(&self, tcp: &TenantControlPlane) -> bool {
        !wants_route(tcp)
    }

    async fn cleanup(&mut self, tcp: &TenantControlPlane) -> Result<bool> {
        // A missing Traefik CRD answers 404 like a missing object.
        let deleted = delete_if_owned(&self.api(tcp), &tcp.name_any(), |route: &DynamicObject| {
            is_controlled_by(route, tcp)
        })
        .await?;
        if deleted {
            info!(tcp = %tcp.name_any(), resource = RESOURCE_NAME, "Deleted IngressRouteTCP");
        }
        Ok(deleted)
    }

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult> {
        if !wants_route(tcp) {
            return Ok(UpsertResult::None);
        }
        let (result, _) = upsert(&self.api(tcp), build_route_template(tcp), |route| {
            mutate_route(route, tcp)
        })
        .await?;
        Ok(result)
    }

    fn should_status_be_updated(&self, _tcp: &TenantControlPlane) -> bool {
        false
    }

    async fn update_status(&mut self, _tcp: &mut TenantControlPlane) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "traefik_tests.rs"]
mod traefik_tests;
