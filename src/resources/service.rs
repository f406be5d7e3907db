// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Control plane `Service`.
//!
//! The Service carries the `kube-apiserver` port first, followed by any port
//! owned by another resource (the trust daemon port) and then the additional
//! ports from the spec. It is never cleaned up: it lives as long as the tenant
//! control plane and is garbage collected through its owner reference.

use super::{set_controller_reference, ManagedResource, TenantClientFactory};
use crate::address::{declared_address, external_address, service_name};
use crate::constants::API_SERVER_PORT_NAME;
use crate::crd::{KubernetesServiceStatus, ServiceType, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels, CONTROL_PLANE_LABEL};
use crate::reconcilers::upsert::{upsert, UpsertResult};
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const RESOURCE_NAME: &str = "service";

pub struct ServiceResource {
    client: Client,
    service: Option<Service>,
}

impl ServiceResource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            service: None,
        }
    }
}

/// Empty Service carrying only the identity of the control plane Service.
#[must_use]
pub fn build_service_template(tcp: &TenantControlPlane) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(service_name(tcp)),
            namespace: tcp.namespace(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn api_server_port(existing: Option<&ServicePort>, port: i32) -> ServicePort {
    let mut api_port = existing.cloned().unwrap_or_default();
    api_port.name = Some(API_SERVER_PORT_NAME.to_string());
    api_port.protocol = Some("TCP".to_string());
    api_port.port = port;
    api_port.target_port = Some(IntOrString::Int(port));
    api_port
}

/// Apply the desired state of the control plane Service onto `svc`.
///
/// `declared` is the declared address when it can already be resolved; it is
/// only used to publish the address as an external IP.
pub fn mutate_service(svc: &mut Service, tcp: &TenantControlPlane, declared: Option<&str>) {
    let service_spec = &tcp.spec.control_plane.service;
    let profile = &tcp.spec.network_profile;
    let metadata = &service_spec.additional_metadata;

    let labels = merge_maps(&[
        &svc.labels().clone(),
        &steward_labels(&tcp.name_any(), RESOURCE_NAME),
        &metadata.labels,
    ]);
    svc.metadata.labels = Some(labels);
    let annotations = merge_maps(&[&svc.annotations().clone(), &metadata.annotations]);
    svc.metadata.annotations = Some(annotations);

    let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = Some(BTreeMap::from([(
        CONTROL_PLANE_LABEL.to_string(),
        tcp.name_any(),
    )]));

    let managed: BTreeSet<&str> = std::iter::once(API_SERVER_PORT_NAME)
        .chain(service_spec.additional_ports.iter().map(|p| p.name.as_str()))
        .collect();

    let existing = spec.ports.take().unwrap_or_default();
    let mut ports = vec![api_server_port(existing.first(), profile.port)];
    // Ports owned by other resources survive, e.g. the trust daemon port.
    ports.extend(
        existing
            .into_iter()
            .skip(1)
            .filter(|p| !managed.contains(p.name.as_deref().unwrap_or_default())),
    );
    ports.extend(service_spec.additional_ports.iter().map(|p| ServicePort {
        name: Some(p.name.clone()),
        protocol: Some(p.protocol.clone()),
        app_protocol: p.app_protocol.clone(),
        port: p.port,
        target_port: Some(IntOrString::Int(p.target_port)),
        ..Default::default()
    }));

    let external_ip = declared
        .filter(|a| profile.allow_address_as_external_ip && !a.is_empty())
        .map(|a| vec![a.to_string()]);

    match service_spec.service_type {
        ServiceType::LoadBalancer => {
            if let Some(class) = profile.load_balancer_class.as_ref() {
                spec.load_balancer_class = Some(class.clone());
            }
            if !profile.load_balancer_source_ranges.is_empty() {
                spec.load_balancer_source_ranges = Some(profile.load_balancer_source_ranges.clone());
            }
        }
        ServiceType::NodePort => {
            ports[0].node_port = Some(profile.port);
            if external_ip.is_some() {
                spec.external_ips = external_ip;
            }
        }
        ServiceType::ClusterIP => {
            if external_ip.is_some() {
                spec.external_ips = external_ip;
            }
        }
    }
    spec.type_ = Some(service_spec.service_type.as_str().to_string());
    spec.ports = Some(ports);

    set_controller_reference(&mut svc.metadata, tcp);
}

/// Status projection of the control plane Service.
#[must_use]
pub fn service_status(svc: &Service) -> KubernetesServiceStatus {
    KubernetesServiceStatus {
        name: svc.name_any(),
        namespace: svc.namespace().unwrap_or_default(),
        port: svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .and_then(|p| p.first())
            .map_or(0, |p| p.port),
        load_balancer: svc.status.as_ref().and_then(|s| s.load_balancer.clone()),
    }
}

/// Whether the recorded Service status or endpoint is stale.
///
/// An endpoint that cannot be computed yet never forces an update.
#[must_use]
pub fn service_status_is_stale(tcp: &TenantControlPlane, svc: &Service) -> bool {
    let status = tcp.status_or_default();
    if status.kubernetes.service != service_status(svc) {
        return true;
    }
    external_address(tcp, Some(svc))
        .is_ok_and(|addr| addr.endpoint() != status.control_plane_endpoint)
}

#[async_trait]
impl ManagedResource for ServiceResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    async fn define(&mut self, _tcp: &TenantControlPlane, _: &dyn TenantClientFactory) -> Result<()> {
        self.service = None;
        Ok(())
    }

    fn should_cleanup(&self, _tcp: &TenantControlPlane) -> bool {
        false
    }

    async fn cleanup(&mut self, _tcp: &TenantControlPlane) -> Result<bool> {
        Ok(false)
    }

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult> {
        let namespace = tcp.namespace().unwrap_or_default();
        let api: Api<Service> = Api::namespaced(self.client.clone(), &namespace);

        // A LoadBalancer address is only known once the Service exists, so a
        // resolution failure here is expected on first creation.
        let existing = api.get_opt(&service_name(tcp)).await?;
        let declared = declared_address(tcp, existing.as_ref()).ok();
        if declared.is_none() {
            debug!(tcp = %tcp.name_any(), "Declared address not resolvable yet");
        }

        let (result, svc) = upsert(&api, build_service_template(tcp), |svc| {
            mutate_service(svc, tcp, declared.as_deref());
            Ok(())
        })
        .await?;
        self.service = Some(svc);
        Ok(result)
    }

    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool {
        self.service
            .as_ref()
            .is_some_and(|svc| service_status_is_stale(tcp, svc))
    }

    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()> {
        let Some(svc) = self.service.as_ref() else {
            return Ok(());
        };
        let endpoint = external_address(tcp, Some(svc))?.endpoint();
        let status = tcp.status_mut();
        status.kubernetes.service = service_status(svc);
        status.control_plane_endpoint = endpoint;
        Ok(())
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod service_tests;
