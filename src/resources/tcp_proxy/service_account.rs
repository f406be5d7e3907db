// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ServiceAccount of the tcp-proxy pods.

use super::{AddonKind, AddonSettings};
use crate::constants::{TCP_PROXY_NAME, TENANT_ADDON_NAMESPACE};
use crate::crd::{ExternalObjectStatus, TcpProxyStatus, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels};
use anyhow::Result;
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::{Api, Client, ResourceExt};

pub struct ServiceAccountKind;

impl AddonKind for ServiceAccountKind {
    type Object = ServiceAccount;

    const RESOURCE_NAME: &'static str = "tcp-proxy-service-account";

    fn object_name() -> &'static str {
        TCP_PROXY_NAME
    }

    fn object_namespace() -> Option<&'static str> {
        Some(TENANT_ADDON_NAMESPACE)
    }

    fn api(client: Client) -> Api<ServiceAccount> {
        Api::namespaced(client, TENANT_ADDON_NAMESPACE)
    }

    fn mutate(sa: &mut ServiceAccount, tcp: &TenantControlPlane, _: &AddonSettings) -> Result<()> {
        sa.metadata.labels = Some(merge_maps(&[
            &sa.labels().clone(),
            &steward_labels(&tcp.name_any(), Self::RESOURCE_NAME),
        ]));
        Ok(())
    }

    fn status_slot(status: &mut TcpProxyStatus) -> &mut ExternalObjectStatus {
        &mut status.service_account
    }

    fn recorded(status: &TcpProxyStatus) -> &ExternalObjectStatus {
        &status.service_account
    }
}
