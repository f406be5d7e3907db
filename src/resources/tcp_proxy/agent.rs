// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! tcp-proxy Deployment.
//!
//! The proxy forwards in-cluster API traffic of the tenant to the upstream
//! endpoint of the control plane:
//!
//! 1. `spec.addons.tcpProxy.internalEndpoint`, with the API server port
//!    appended when it carries none;
//! 2. the Gateway hostname with the API server port, unless an Ingress class
//!    takes precedence;
//! 3. the recorded `status.controlPlaneEndpoint` (port 443 when missing).

use super::{AddonKind, AddonSettings};
use crate::address::{assigned_control_plane_address, host_and_port_from_hostname, join_host_port};
use crate::constants::{
    INGRESS_GATEWAY_PORT, TCP_PROXY_HEALTH_PORT, TCP_PROXY_METRICS_PORT, TCP_PROXY_NAME,
    TCP_PROXY_PORT, TCP_PROXY_REPLICAS, TENANT_ADDON_NAMESPACE,
};
use crate::crd::{ExternalObjectStatus, TcpProxySpec, TcpProxyStatus, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels, APP_LABEL};
use anyhow::{Context as _, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, Probe, ResourceRequirements, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;

pub const CONTAINER_NAME: &str = "tcp-proxy";
pub const PROXY_PORT_NAME: &str = "proxy";
const PRIORITY_CLASS: &str = "system-cluster-critical";

pub struct AgentKind;

/// Endpoint the proxy forwards to, as `host:port`.
///
/// # Errors
///
/// Fails while no control plane endpoint has been recorded and neither an
/// internal endpoint nor a Gateway hostname is configured.
pub fn upstream_endpoint(tcp: &TenantControlPlane) -> Result<String> {
    let api_port = tcp.spec.network_profile.port;

    let internal = tcp
        .spec
        .addons
        .tcp_proxy
        .as_ref()
        .and_then(|p| p.internal_endpoint.as_deref())
        .filter(|e| !e.is_empty());
    if let Some(internal) = internal {
        let (host, port) = host_and_port_from_hostname(internal, api_port);
        return Ok(join_host_port(&host, port));
    }

    let control_plane = &tcp.spec.control_plane;
    let ingress_class = control_plane
        .ingress
        .as_ref()
        .and_then(|i| i.ingress_class_name.as_deref())
        .unwrap_or_default();
    if let Some(gateway) = control_plane.gateway.as_ref() {
        if !gateway.hostname.is_empty() && ingress_class.is_empty() {
            let (host, _) = host_and_port_from_hostname(&gateway.hostname, api_port);
            return Ok(join_host_port(&host, api_port));
        }
    }

    let (host, port) = assigned_control_plane_address(&tcp.status_or_default())
        .context("cannot resolve the tcp-proxy upstream endpoint")?;
    let port = if port == 0 { INGRESS_GATEWAY_PORT } else { port };
    Ok(join_host_port(&host, port))
}

fn http_probe(path: &str, initial_delay: i32, timeout: i32, period: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(TCP_PROXY_HEALTH_PORT),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        timeout_seconds: Some(timeout),
        period_seconds: Some(period),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn port(name: &str, container_port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

fn default_resources() -> ResourceRequirements {
    ResourceRequirements {
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("10m".to_string())),
            ("memory".to_string(), Quantity("32Mi".to_string())),
        ])),
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("100m".to_string())),
            ("memory".to_string(), Quantity("64Mi".to_string())),
        ])),
        ..Default::default()
    }
}

/// Apply the desired proxy container onto `container`, keeping defaulted fields.
pub fn mutate_container(container: &mut Container, spec: &TcpProxySpec, image: &str, endpoint: &str) {
    container.name = CONTAINER_NAME.to_string();
    container.image = Some(image.to_string());
    container.args = Some(vec![
        format!("--external-endpoint={endpoint}"),
        format!("--listen-port={TCP_PROXY_PORT}"),
        format!("--health-port={TCP_PROXY_HEALTH_PORT}"),
        format!("--metrics-port={TCP_PROXY_METRICS_PORT}"),
        "--manage-endpoint-slice=true".to_string(),
    ]);
    container.ports = Some(vec![
        port(PROXY_PORT_NAME, TCP_PROXY_PORT),
        port("health", TCP_PROXY_HEALTH_PORT),
        port("metrics", TCP_PROXY_METRICS_PORT),
    ]);
    container.liveness_probe = Some(http_probe("/healthz", 5, 5, 10));
    container.readiness_probe = Some(http_probe("/readyz", 3, 3, 5));
    container.security_context = Some(SecurityContext {
        run_as_non_root: Some(true),
        read_only_root_filesystem: Some(true),
        allow_privilege_escalation: Some(false),
        ..Default::default()
    });
    container.resources = Some(spec.resources.clone().unwrap_or_else(default_resources));
}

/// Apply the desired tcp-proxy Deployment onto `deploy`.
///
/// # Errors
///
/// Fails when the addon is disabled or the upstream endpoint is unknown.
pub fn mutate_agent(deploy: &mut Deployment, tcp: &TenantControlPlane, settings: &AddonSettings) -> Result<()> {
    let spec = tcp
        .spec
        .addons
        .tcp_proxy
        .as_ref()
        .context("tcp-proxy addon is not enabled")?;
    let endpoint = upstream_endpoint(tcp)?;
    let image = spec
        .image
        .as_deref()
        .filter(|i| !i.is_empty())
        .unwrap_or(&settings.default_image);

    deploy.metadata.labels = Some(merge_maps(&[
        &deploy.labels().clone(),
        &steward_labels(&tcp.name_any(), AgentKind::RESOURCE_NAME),
    ]));

    let selector = BTreeMap::from([(APP_LABEL.to_string(), TCP_PROXY_NAME.to_string())]);
    let deploy_spec = deploy.spec.get_or_insert_with(DeploymentSpec::default);
    deploy_spec.replicas = Some(TCP_PROXY_REPLICAS);
    deploy_spec.selector = LabelSelector {
        match_labels: Some(selector.clone()),
        ..Default::default()
    };

    let template = &mut deploy_spec.template;
    let meta = template.metadata.get_or_insert_with(ObjectMeta::default);
    meta.labels = Some(merge_maps(&[&meta.labels.clone().unwrap_or_default(), &selector]));

    let pod = template.spec.get_or_insert_with(PodSpec::default);
    pod.priority_class_name = Some(PRIORITY_CLASS.to_string());
    pod.service_account_name = Some(TCP_PROXY_NAME.to_string());
    pod.automount_service_account_token = Some(true);
    pod.node_selector = Some(BTreeMap::from([(
        "kubernetes.io/os".to_string(),
        "linux".to_string(),
    )]));
    if pod.containers.len() != 1 {
        pod.containers = vec![Container::default()];
    }
    mutate_container(&mut pod.containers[0], spec, image, &endpoint);
    Ok(())
}

impl AddonKind for AgentKind {
    type Object = Deployment;

    const RESOURCE_NAME: &'static str = "tcp-proxy-agent";
    const TRACKS_ENABLED: bool = true;

    fn object_name() -> &'static str {
        TCP_PROXY_NAME
    }

    fn object_namespace() -> Option<&'static str> {
        Some(TENANT_ADDON_NAMESPACE)
    }

    fn api(client: Client) -> Api<Deployment> {
        Api::namespaced(client, TENANT_ADDON_NAMESPACE)
    }

    fn mutate(deploy: &mut Deployment, tcp: &TenantControlPlane, settings: &AddonSettings) -> Result<()> {
        mutate_agent(deploy, tcp, settings)
    }

    fn status_slot(status: &mut TcpProxyStatus) -> &mut ExternalObjectStatus {
        &mut status.deployment
    }

    fn recorded(status: &TcpProxyStatus) -> &ExternalObjectStatus {
        &status.deployment
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod agent_tests;
