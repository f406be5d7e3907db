// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! ClusterRole granting the tcp-proxy control over the `kubernetes` EndpointSlice.

use super::{AddonKind, AddonSettings};
use crate::constants::TCP_PROXY_RBAC_NAME;
use crate::crd::{ExternalObjectStatus, TcpProxyStatus, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels};
use anyhow::Result;
use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use kube::{Api, Client, ResourceExt};

pub struct ClusterRoleKind;

fn rule(api_group: &str, resource: &str, verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(vec![resource.to_string()]),
        verbs: verbs.iter().map(|v| (*v).to_string()).collect(),
        ..Default::default()
    }
}

/// Rules of the tcp-proxy ClusterRole.
#[must_use]
pub fn build_rules() -> Vec<PolicyRule> {
    vec![
        rule(
            "discovery.k8s.io",
            "endpointslices",
            &["get", "list", "watch", "create", "update", "patch"],
        ),
        rule("", "services", &["get", "list", "watch"]),
        // leader election
        rule("coordination.k8s.io", "leases", &["get", "create", "update"]),
        rule("", "events", &["create", "patch"]),
    ]
}

impl AddonKind for ClusterRoleKind {
    type Object = ClusterRole;

    const RESOURCE_NAME: &'static str = "tcp-proxy-cluster-role";

    fn object_name() -> &'static str {
        TCP_PROXY_RBAC_NAME
    }

    fn object_namespace() -> Option<&'static str> {
        None
    }

    fn api(client: Client) -> Api<ClusterRole> {
        Api::all(client)
    }

    fn mutate(role: &mut ClusterRole, tcp: &TenantControlPlane, _: &AddonSettings) -> Result<()> {
        role.metadata.labels = Some(merge_maps(&[
            &role.labels().clone(),
            &steward_labels(&tcp.name_any(), Self::RESOURCE_NAME),
        ]));
        role.rules = Some(build_rules());
        Ok(())
    }

    fn status_slot(status: &mut TcpProxyStatus) -> &mut ExternalObjectStatus {
        &mut status.cluster_role
    }

    fn recorded(status: &TcpProxyStatus) -> &ExternalObjectStatus {
        &status.cluster_role
    }
}
