// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! kubeadm configuration of the tenant control plane.
//!
//! The ConfigMap `<tcp>-kubeadmconfig` carries a two-document YAML payload
//! (`ClusterConfiguration` then `InitConfiguration`) consumed by the phases
//! that render kubeconfigs and bootstrap tokens for the tenant.

use super::{now_rfc3339, set_controller_reference, tenant_prefixed_name, ManagedResource, TenantClientFactory};
use crate::address::{declared_address, external_address, service_name};
use crate::checksum::{calculate_map_checksum, get_object_checksum, set_object_checksum};
use crate::constants::{
    DEFAULT_CLUSTER_DOMAIN, DEFAULT_POD_CIDR, DEFAULT_SERVICE_CIDR, KUBERNETES_IMAGE_REGISTRY,
};
use crate::crd::{KubeadmConfigStatus, TenantControlPlane};
use crate::labels::{merge_maps, steward_labels};
use crate::reconcilers::upsert::{upsert, UpsertResult};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;

const RESOURCE_NAME: &str = "kubeadm-config";

/// Suffix of the ConfigMap name.
pub const CONFIGMAP_SUFFIX: &str = "kubeadmconfig";

/// Key of the YAML payload.
pub const KUBEADM_CONFIG_KEY: &str = "kubeadmconfig";

const KUBEADM_API_VERSION: &str = "kubeadm.k8s.io/v1beta4";
const CERTIFICATES_DIR: &str = "/etc/kubernetes/pki";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfiguration<'a> {
    api_version: &'a str,
    kind: &'a str,
    cluster_name: String,
    kubernetes_version: &'a str,
    control_plane_endpoint: String,
    certificates_dir: &'a str,
    image_repository: &'a str,
    networking: Networking<'a>,
    api_server: ApiServer,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Networking<'a> {
    dns_domain: &'a str,
    pod_subnet: &'a str,
    service_subnet: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiServer {
    #[serde(rename = "certSANs", skip_serializing_if = "Vec::is_empty")]
    cert_sans: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitConfiguration<'a> {
    api_version: &'a str,
    kind: &'a str,
    #[serde(rename = "localAPIEndpoint")]
    local_api_endpoint: LocalApiEndpoint,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocalApiEndpoint {
    advertise_address: String,
    bind_port: i32,
}

/// Render the kubeadm configuration.
///
/// `advertise_address` must be the declared address (an IP); `endpoint` is the
/// external `host:port` clients use.
///
/// # Errors
///
/// Returns an error if YAML serialization fails.
pub fn render_kubeadm_config(
    tcp: &TenantControlPlane,
    advertise_address: &str,
    endpoint: &str,
) -> Result<String> {
    let profile = &tcp.spec.network_profile;
    let cluster = ClusterConfiguration {
        api_version: KUBEADM_API_VERSION,
        kind: "ClusterConfiguration",
        cluster_name: tcp.name_any(),
        kubernetes_version: &tcp.spec.kubernetes.version,
        control_plane_endpoint: endpoint.to_string(),
        certificates_dir: CERTIFICATES_DIR,
        image_repository: KUBERNETES_IMAGE_REGISTRY,
        networking: Networking {
            dns_domain: profile.cluster_domain.as_deref().unwrap_or(DEFAULT_CLUSTER_DOMAIN),
            pod_subnet: profile.pod_cidr.as_deref().unwrap_or(DEFAULT_POD_CIDR),
            service_subnet: profile.service_cidr.as_deref().unwrap_or(DEFAULT_SERVICE_CIDR),
        },
        api_server: ApiServer {
            cert_sans: profile.cert_sans.clone(),
        },
    };
    let init = InitConfiguration {
        api_version: KUBEADM_API_VERSION,
        kind: "InitConfiguration",
        local_api_endpoint: LocalApiEndpoint {
            advertise_address: advertise_address.to_string(),
            bind_port: profile.port,
        },
    };

    let cluster = serde_yaml::to_string(&cluster).context("failed to encode ClusterConfiguration")?;
    let init = serde_yaml::to_string(&init).context("failed to encode InitConfiguration")?;
    Ok(format!("{cluster}---\n{init}"))
}

#[must_use]
pub fn configmap_name(tcp: &TenantControlPlane) -> String {
    tenant_prefixed_name(tcp, CONFIGMAP_SUFFIX)
}

#[must_use]
pub fn build_kubeadm_config_template(tcp: &TenantControlPlane) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(configmap_name(tcp)),
            namespace: tcp.namespace(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Apply the desired kubeadm configuration onto `cm`.
///
/// # Errors
///
/// Fails while the declared address cannot be resolved from `service`.
pub fn mutate_kubeadm_config(
    cm: &mut ConfigMap,
    tcp: &TenantControlPlane,
    service: Option<&Service>,
) -> Result<()> {
    let address = declared_address(tcp, service)
        .context("cannot retrieve the tenant control plane address")?;
    let endpoint = external_address(tcp, service)?.endpoint();

    cm.metadata.labels = Some(merge_maps(&[
        &cm.labels().clone(),
        &steward_labels(&tcp.name_any(), RESOURCE_NAME),
    ]));

    let data = BTreeMap::from([(
        KUBEADM_CONFIG_KEY.to_string(),
        render_kubeadm_config(tcp, &address, &endpoint)?,
    )]);
    set_object_checksum(&mut cm.metadata, &calculate_map_checksum(&data));
    cm.data = Some(data);

    set_controller_reference(&mut cm.metadata, tcp);
    Ok(())
}

/// Status projection of the persisted ConfigMap.
#[must_use]
pub fn kubeadm_config_status(cm: &ConfigMap) -> KubeadmConfigStatus {
    KubeadmConfigStatus {
        configmap_name: cm.name_any(),
        checksum: get_object_checksum(&cm.metadata)
            .unwrap_or_default()
            .to_string(),
        last_update: Some(now_rfc3339()),
    }
}

pub struct KubeadmConfigResource {
    client: Client,
    configmap: Option<ConfigMap>,
}

impl KubeadmConfigResource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            configmap: None,
        }
    }
}

#[async_trait]
impl ManagedResource for KubeadmConfigResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    async fn define(&mut self, _tcp: &TenantControlPlane, _: &dyn TenantClientFactory) -> Result<()> {
        self.configmap = None;
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
        let services: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let service = services.get_opt(&service_name(tcp)).await?;

        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace);
        let (result, cm) = upsert(&api, build_kubeadm_config_template(tcp), |cm| {
            mutate_kubeadm_config(cm, tcp, service.as_ref())
        })
        .await
        .inspect_err(|e| error!(tcp = %tcp.name_any(), error = %e, "Cannot render kubeadm configuration"))?;
        self.configmap = Some(cm);
        Ok(result)
    }

    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool {
        let Some(cm) = self.configmap.as_ref() else {
            return false;
        };
        let recorded = tcp.status_or_default().kubeadm_config;
        Some(recorded.checksum.as_str()) != get_object_checksum(&cm.metadata)
            || recorded.configmap_name != cm.name_any()
    }

    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()> {
        if let Some(cm) = self.configmap.as_ref() {
            tcp.status_mut().kubeadm_config = kubeadm_config_status(cm);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "kubeadm_config_tests.rs"]
mod kubeadm_config_tests;
