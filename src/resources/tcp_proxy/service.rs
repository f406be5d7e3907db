// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ClusterIP Service in front of the tcp-proxy pods.

use super::agent::PROXY_PORT_NAME;
use super::{AddonKind, AddonSettings};
use crate::constants::{TCP_PROXY_NAME, TCP_PROXY_PORT, TENANT_ADDON_NAMESPACE};
use crate::crd::{ExternalObjectStatus, TcpProxyStatus, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels, APP_LABEL};
use anyhow::Result;
use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;

pub struct ServiceKind;

impl AddonKind for ServiceKind {
    type Object = Service;

    const RESOURCE_NAME: &'static str = "tcp-proxy-service";

    fn object_name() -> &'static str {
        TCP_PROXY_NAME
    }

    fn object_namespace() -> Option<&'static str> {
        Some(TENANT_ADDON_NAMESPACE)
    }

    fn api(client: Client) -> Api<Service> {
        Api::namespaced(client, TENANT_ADDON_NAMESPACE)
    }

    fn mutate(svc: &mut Service, tcp: &TenantControlPlane, _: &AddonSettings) -> Result<()> {
        svc.metadata.labels = Some(merge_maps(&[
            &svc.labels().clone(),
            &steward_labels(&tcp.name_any(), Self::RESOURCE_NAME),
        ]));

        let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
        spec.type_ = Some("ClusterIP".to_string());
        spec.selector = Some(BTreeMap::from([(
            APP_LABEL.to_string(),
            TCP_PROXY_NAME.to_string(),
        )]));
        // Keep the allocated port fields, only the managed ones are rewritten.
        let mut port = spec
            .ports
            .take()
            .and_then(|ports| ports.into_iter().next())
            .unwrap_or_default();
        port.name = Some(PROXY_PORT_NAME.to_string());
        port.port = TCP_PROXY_PORT;
        port.target_port = Some(IntOrString::String(PROXY_PORT_NAME.to_string()));
        port.protocol = Some("TCP".to_string());
        spec.ports = Some(vec![port]);
        Ok(())
    }

    fn status_slot(status: &mut TcpProxyStatus) -> &mut ExternalObjectStatus {
        &mut status.service
    }

    fn recorded(status: &TcpProxyStatus) -> &ExternalObjectStatus {
        &status.service
    }
}
