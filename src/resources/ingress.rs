// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Control plane `Ingress` with TLS passthrough.
//!
//! The API server terminates TLS itself, so the Ingress only routes by SNI.
//! Controllers that need explicit opt-in for passthrough get their annotations
//! from [`controller_annotations`]; user annotations always win.

use super::{is_controlled_by, set_controller_reference, ManagedResource, TenantClientFactory};
use crate::address::host_and_port_from_hostname;
use crate::crd::{IngressControllerType, KubernetesIngressStatus, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels};
use crate::reconcilers::upsert::{delete_if_owned, upsert, UpsertResult};
use anyhow::{bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec as K8sIngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::info;

const RESOURCE_NAME: &str = "ingress";

pub struct IngressResource {
    client: Client,
    ingress: Option<Ingress>,
}

impl IngressResource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            ingress: None,
        }
    }

    fn api(&self, tcp: &TenantControlPlane) -> Api<Ingress> {
        Api::namespaced(self.client.clone(), &tcp.namespace().unwrap_or_default())
    }
}

/// TLS passthrough annotations for an ingress controller flavour.
#[must_use]
pub fn controller_annotations(controller: IngressControllerType) -> BTreeMap<String, String> {
    let pairs: &[(&str, &str)] = match controller {
        IngressControllerType::Haproxy => &[("haproxy.org/ssl-passthrough", "true")],
        IngressControllerType::Nginx => &[
            ("nginx.ingress.kubernetes.io/ssl-passthrough", "true"),
            ("nginx.ingress.kubernetes.io/backend-protocol", "HTTPS"),
        ],
        IngressControllerType::Generic | IngressControllerType::Traefik => &[],
    };
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[must_use]
pub fn build_ingress_template(tcp: &TenantControlPlane) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(tcp.name_any()),
            namespace: tcp.namespace(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Apply the desired Ingress state onto `ing`.
///
/// # Errors
///
/// Fails while the control plane Service is not recorded in status yet, and
/// when the Ingress spec has no hostname.
pub fn mutate_ingress(ing: &mut Ingress, tcp: &TenantControlPlane) -> Result<()> {
    let Some(spec) = tcp.spec.control_plane.ingress.as_ref() else {
        bail!("ingress is not configured");
    };
    let service = tcp.status_or_default().kubernetes.service;
    if service.name.is_empty() || service.port == 0 {
        bail!("ingress cannot be configured yet");
    }
    if spec.hostname.is_empty() {
        bail!("missing hostname to expose the tenant control plane using an Ingress resource");
    }
    let (host, _) = host_and_port_from_hostname(&spec.hostname, 0);

    let labels = merge_maps(&[
        &ing.labels().clone(),
        &steward_labels(&tcp.name_any(), RESOURCE_NAME),
        &spec.additional_metadata.labels,
    ]);
    ing.metadata.labels = Some(labels);
    let annotations = merge_maps(&[
        &ing.annotations().clone(),
        &controller_annotations(spec.controller_type),
        &spec.additional_metadata.annotations,
    ]);
    ing.metadata.annotations = Some(annotations);

    let ingress_spec = ing.spec.get_or_insert_with(K8sIngressSpec::default);
    if let Some(class) = spec.ingress_class_name.as_ref().filter(|c| !c.is_empty()) {
        ingress_spec.ingress_class_name = Some(class.clone());
    }

    let path = HTTPIngressPath {
        path: Some("/".to_string()),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.name,
                port: Some(ServiceBackendPort {
                    number: Some(service.port),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    };
    ingress_spec.rules = Some(vec![IngressRule {
        host: Some(host.clone()),
        http: Some(HTTPIngressRuleValue { paths: vec![path] }),
    }]);
    ingress_spec.tls = Some(vec![IngressTLS {
        hosts: Some(vec![host]),
        ..Default::default()
    }]);

    set_controller_reference(&mut ing.metadata, tcp);
    Ok(())
}

/// Status to record for `ing`, `None` when no Ingress is configured.
#[must_use]
pub fn ingress_status(tcp: &TenantControlPlane, ing: Option<&Ingress>) -> Option<KubernetesIngressStatus> {
    tcp.spec.control_plane.ingress.as_ref()?;
    let ing = ing?;
    Some(KubernetesIngressStatus {
        name: ing.name_any(),
        namespace: ing.namespace().unwrap_or_default(),
        load_balancer: ing.status.as_ref().and_then(|s| s.load_balancer.clone()),
    })
}

#[async_trait]
impl ManagedResource for IngressResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    async fn define(&mut self, _tcp: &TenantControlPlane, _: &dyn TenantClientFactory) -> Result<()> {
        self.ingress = None;
        Ok(())
    }

    fn should_cleanup(&self, tcp: &TenantControlPlane) -> bool {
        tcp.spec.control_plane.ingress.is_none()
    }

    async fn cleanup(&mut self, tcp: &TenantControlPlane) -> Result<bool> {
        let deleted = delete_if_owned(&self.api(tcp), &tcp.name_any(), |ing: &Ingress| {
            is_controlled_by(ing, tcp)
        })
        .await?;
        if deleted {
            info!(tcp = %tcp.name_any(), resource = RESOURCE_NAME, "Deleted Ingress");
        }
        Ok(deleted)
    }

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult> {
        if tcp.spec.control_plane.ingress.is_none() {
            return Ok(UpsertResult::None);
        }
        let (result, ing) = upsert(&self.api(tcp), build_ingress_template(tcp), |ing| {
            mutate_ingress(ing, tcp)
        })
        .await?;
        self.ingress = Some(ing);
        Ok(result)
    }

    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool {
        tcp.status_or_default().kubernetes.ingress != ingress_status(tcp, self.ingress.as_ref())
    }

    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()> {
        let status = ingress_status(tcp, self.ingress.as_ref());
        tcp.status_mut().kubernetes.ingress = status;
        Ok(())
    }
}

#[cfg(test)]
#[path = "ingress_tests.rs"]
mod ingress_tests;
