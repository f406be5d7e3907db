// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Trust daemon port on the control plane Service.
//!
//! Worker nodes reach the trust daemon sidecar through the same Service as the
//! API server. This resource only owns the `steward-trustd` port; the rest of
//! the Service belongs to [`super::service`].

use super::service::build_service_template;
use super::{set_controller_reference, ManagedResource, TenantClientFactory};
use crate::address::service_name;
use crate::constants::TRUSTD_PORT_NAME;
use crate::crd::{KubernetesServiceStatus, ServiceType, TenantControlPlane};
use crate::reconcilers::upsert::{upsert, UpsertResult};
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

const RESOURCE_NAME: &str = "trustd-service";

/// Trust daemon port of `tcp`, when worker bootstrap is requested.
#[must_use]
pub fn trustd_port(tcp: &TenantControlPlane) -> Option<i32> {
    if !tcp.wants_worker_bootstrap() {
        return None;
    }
    tcp.spec
        .addons
        .worker_bootstrap
        .as_ref()
        .and_then(|wb| wb.talos.as_ref())
        .map(|talos| talos.port)
}

fn service_ports(svc: &Service) -> &[ServicePort] {
    svc.spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or_default()
}

/// Port number of the trust daemon port on `svc`, 0 when absent.
#[must_use]
pub fn find_trustd_port(svc: &Service) -> i32 {
    service_ports(svc)
        .iter()
        .find(|p| p.name.as_deref() == Some(TRUSTD_PORT_NAME))
        .map_or(0, |p| p.port)
}

/// Add or update the trust daemon port.
///
/// A Service without ports has not been populated yet and is left alone.
pub fn mutate_trustd_port(svc: &mut Service, tcp: &TenantControlPlane, port: i32) {
    let Some(ports) = svc.spec.as_mut().and_then(|s| s.ports.as_mut()) else {
        return;
    };
    if ports.is_empty() {
        return;
    }
    let node_port =
        (tcp.spec.control_plane.service.service_type == ServiceType::NodePort).then_some(port);

    match ports
        .iter_mut()
        .find(|p| p.name.as_deref() == Some(TRUSTD_PORT_NAME))
    {
        Some(existing) => {
            existing.port = port;
            existing.target_port = Some(IntOrString::Int(port));
            existing.protocol = Some("TCP".to_string());
            if node_port.is_some() {
                existing.node_port = node_port;
            }
        }
        None => ports.push(ServicePort {
            name: Some(TRUSTD_PORT_NAME.to_string()),
            port,
            target_port: Some(IntOrString::Int(port)),
            protocol: Some("TCP".to_string()),
            node_port,
            ..Default::default()
        }),
    }
    set_controller_reference(&mut svc.metadata, tcp);
}

pub fn remove_trustd_port(svc: &mut Service) {
    if let Some(ports) = svc.spec.as_mut().and_then(|s| s.ports.as_mut()) {
        ports.retain(|p| p.name.as_deref() != Some(TRUSTD_PORT_NAME));
    }
}

/// Status of the trust daemon exposure, empty when the addon is off.
#[must_use]
pub fn trustd_service_status(tcp: &TenantControlPlane, svc: Option<&Service>) -> KubernetesServiceStatus {
    match (trustd_port(tcp), svc) {
        (Some(_), Some(svc)) => KubernetesServiceStatus {
            name: svc.name_any(),
            namespace: svc.namespace().unwrap_or_default(),
            port: find_trustd_port(svc),
            load_balancer: svc.status.as_ref().and_then(|s| s.load_balancer.clone()),
        },
        _ => KubernetesServiceStatus::default(),
    }
}

pub struct TrustdServiceResource {
    client: Client,
    service: Option<Service>,
}

impl TrustdServiceResource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            service: None,
        }
    }

    fn api(&self, tcp: &TenantControlPlane) -> Api<Service> {
        Api::namespaced(self.client.clone(), &tcp.namespace().unwrap_or_default())
    }
}

#[async_trait]
impl ManagedResource for TrustdServiceResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    async fn define(&mut self, _tcp: &TenantControlPlane, _: &dyn TenantClientFactory) -> Result<()> {
        self.service = None;
        Ok(())
    }

    fn should_cleanup(&self, tcp: &TenantControlPlane) -> bool {
        trustd_port(tcp).is_none()
            && !tcp
                .status_or_default()
                .addons
                .worker_bootstrap
                .service
                .name
                .is_empty()
    }

    async fn cleanup(&mut self, tcp: &TenantControlPlane) -> Result<bool> {
        let api = self.api(tcp);
        if api.get_opt(&service_name(tcp)).await?.is_none() {
            return Ok(false);
        }
        let (result, svc) = upsert(&api, build_service_template(tcp), |svc| {
            remove_trustd_port(svc);
            Ok(())
        })
        .await?;
        self.service = Some(svc);
        if result == UpsertResult::Updated {
            info!(tcp = %tcp.name_any(), resource = RESOURCE_NAME, "Removed trust daemon port");
        }
        Ok(result == UpsertResult::Updated)
    }

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult> {
        let Some(port) = trustd_port(tcp) else {
            return Ok(UpsertResult::None);
        };
        let api = self.api(tcp);
        if api.get_opt(&service_name(tcp)).await?.is_none() {
            debug!(tcp = %tcp.name_any(), "Control plane service not created yet");
            return Ok(UpsertResult::None);
        }
        let (result, svc) = upsert(&api, build_service_template(tcp), |svc| {
            mutate_trustd_port(svc, tcp, port);
            Ok(())
        })
        .await?;
        self.service = Some(svc);
        Ok(result)
    }

    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool {
        let recorded = tcp.status_or_default().addons.worker_bootstrap.service;
        if trustd_port(tcp).is_none() {
            return !recorded.name.is_empty();
        }
        match self.service.as_ref() {
            Some(svc) => recorded != trustd_service_status(tcp, Some(svc)),
            None => false,
        }
    }

    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()> {
        let status = trustd_service_status(tcp, self.service.as_ref());
        tcp.status_mut().addons.worker_bootstrap.service = status;
        Ok(())
    }
}

#[cfg(test)]
#[path = "trustd_service_tests.rs"]
mod trustd_service_tests;
