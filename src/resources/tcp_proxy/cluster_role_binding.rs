// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ClusterRoleBinding of the tcp-proxy ServiceAccount.

use super::{AddonKind, AddonSettings};
use crate::constants::{TCP_PROXY_NAME, TCP_PROXY_RBAC_NAME, TENANT_ADDON_NAMESPACE};
use crate::crd::{ExternalObjectStatus, TcpProxyStatus, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels};
use anyhow::Result;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use kube::{Api, Client, ResourceExt};

pub struct ClusterRoleBindingKind;

impl AddonKind for ClusterRoleBindingKind {
    type Object = ClusterRoleBinding;

    const RESOURCE_NAME: &'static str = "tcp-proxy-cluster-role-binding";

    fn object_name() -> &'static str {
        TCP_PROXY_RBAC_NAME
    }

    fn object_namespace() -> Option<&'static str> {
        None
    }

    fn api(client: Client) -> Api<ClusterRoleBinding> {
        Api::all(client)
    }

    fn mutate(binding: &mut ClusterRoleBinding, tcp: &TenantControlPlane, _: &AddonSettings) -> Result<()> {
        binding.metadata.labels = Some(merge_maps(&[
            &binding.labels().clone(),
            &steward_labels(&tcp.name_any(), Self::RESOURCE_NAME),
        ]));
        binding.role_ref = RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: TCP_PROXY_RBAC_NAME.to_string(),
        };
        binding.subjects = Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: TCP_PROXY_NAME.to_string(),
            namespace: Some(TENANT_ADDON_NAMESPACE.to_string()),
            ..Default::default()
        }]);
        Ok(())
    }

    fn status_slot(status: &mut TcpProxyStatus) -> &mut ExternalObjectStatus {
        &mut status.cluster_role_binding
    }

    fn recorded(status: &TcpProxyStatus) -> &ExternalObjectStatus {
        &status.cluster_role_binding
    }
}
