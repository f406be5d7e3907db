// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Worker bootstrap credentials Secret `<tcp>-trustd-creds`.
//!
//! Holds the OS CA, the trust daemon server chain and the machine token. The
//! CA and token survive every reconcile; the server certificate is
//! re-validated against the CA and follows the exposure topology. A rotation
//! marker on the Secret regenerates the key material and keeps the token.

use super::{
    is_controlled_by, now_rfc3339, set_controller_reference, tenant_prefixed_name, ManagedResource,
    TenantClientFactory,
};
use crate::address::{declared_address, host_and_port_from_hostname, join_host_port, service_name};
use super::certificate::invalid_reason;
use crate::checksum::{
    calculate_secret_checksum, get_object_checksum, is_rotation_requested, is_unchanged,
    mark_rotated, set_object_checksum,
};
use crate::crd::{CertificateStatus, TenantControlPlane, WorkerBootstrapStatus};
use crate::labels::{merge_maps, steward_labels};
use crate::metrics::Metrics;
use crate::pki::san::{resolved_topology_sans, trustd_sans, SanSet};
use crate::pki::trust::{stored_token, TrustCredentials};
use crate::reconcilers::upsert::{delete_if_owned, upsert, UpsertResult};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const RESOURCE_NAME: &str = "trustd-credentials";

/// Secret name suffix.
pub const SECRET_SUFFIX: &str = "trustd-creds";

#[must_use]
pub fn credentials_secret_name(tcp: &TenantControlPlane) -> String {
    tenant_prefixed_name(tcp, SECRET_SUFFIX)
}

/// Trust daemon endpoint advertised to worker nodes.
///
/// Gateway hostname, then Ingress hostname, then the first load balancer
/// ingress of the control plane Service, paired with the trust daemon port.
/// Empty while none is known.
#[must_use]
pub fn trustd_endpoint(tcp: &TenantControlPlane) -> String {
    let Some(talos) = tcp
        .spec
        .addons
        .worker_bootstrap
        .as_ref()
        .and_then(|wb| wb.talos.as_ref())
    else {
        return String::new();
    };
    let port = talos.port;
    let control_plane = &tcp.spec.control_plane;

    let routed = match (control_plane.gateway.as_ref(), control_plane.ingress.as_ref()) {
        (Some(gateway), _) => Some(gateway.hostname.as_str()),
        (None, Some(ingress)) => Some(ingress.hostname.as_str()),
        (None, None) => None,
    };
    if let Some(hostname) = routed {
        let (host, _) = host_and_port_from_hostname(hostname, 0);
        if host.is_empty() {
            return String::new();
        }
        return join_host_port(&host, port);
    }

    tcp.status
        .as_ref()
        .and_then(|s| s.kubernetes.service.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_deref())
        .unwrap_or_default()
        .iter()
        .find_map(|entry| {
            entry
                .ip
                .as_deref()
                .filter(|ip| !ip.is_empty())
                .or_else(|| entry.hostname.as_deref().filter(|h| !h.is_empty()))
        })
        .map(|host| join_host_port(host, port))
        .unwrap_or_default()
}

/// Credentials to persist and, when material was generated, why.
///
/// # Errors
///
/// Returns an error when existing material cannot be loaded or signing fails.
pub fn desired_credentials(
    tcp: &TenantControlPlane,
    existing: Option<&Secret>,
    sans: &SanSet,
    threshold: Duration,
) -> Result<(TrustCredentials, Option<&'static str>)> {
    let data = existing.and_then(|s| s.data.as_ref());
    if existing.is_some_and(|s| is_rotation_requested(&s.metadata)) {
        let creds = TrustCredentials::rotate(&tcp.name_any(), sans, stored_token(data))?;
        return Ok((creds, Some("rotation")));
    }

    let Some(creds) =
        TrustCredentials::from_secret_data(data).context("cannot load trust daemon credentials")?
    else {
        return Ok((TrustCredentials::generate(&tcp.name_any(), sans)?, Some("missing")));
    };
    match creds.check_server(sans, threshold) {
        Ok(()) => Ok((creds, None)),
        Err(e) => {
            debug!(tcp = %tcp.name_any(), reason = %e, "Trust daemon server certificate no longer valid");
            Ok((creds.regenerate_server(sans)?, Some(invalid_reason(&e))))
        }
    }
}

#[must_use]
pub fn build_credentials_template(tcp: &TenantControlPlane) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(credentials_secret_name(tcp)),
            namespace: tcp.namespace(),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn mutate_credentials(
    secret: &mut Secret,
    tcp: &TenantControlPlane,
    creds: &TrustCredentials,
    regenerated: bool,
    now: chrono::DateTime<chrono::Utc>,
) {
    secret.metadata.labels = Some(merge_maps(&[
        &secret.labels().clone(),
        &steward_labels(&tcp.name_any(), RESOURCE_NAME),
    ]));
    let data = creds.to_secret_data();
    set_object_checksum(&mut secret.metadata, &calculate_secret_checksum(Some(&data)));
    secret.data = Some(data);
    if regenerated && is_rotation_requested(&secret.metadata) {
        mark_rotated(&mut secret.metadata, now);
    }
    set_controller_reference(&mut secret.metadata, tcp);
}

/// Worker bootstrap status for `tcp`, keeping the Service part untouched.
#[must_use]
pub fn worker_bootstrap_status(tcp: &TenantControlPlane, secret: &Secret) -> WorkerBootstrapStatus {
    let recorded = tcp.status_or_default().addons.worker_bootstrap;
    WorkerBootstrapStatus {
        enabled: true,
        provider: tcp.spec.addons.worker_bootstrap.as_ref().map(|wb| wb.provider),
        credentials: CertificateStatus {
            secret_name: secret.name_any(),
            checksum: get_object_checksum(&secret.metadata)
                .unwrap_or_default()
                .to_string(),
            last_update: Some(now_rfc3339()),
        },
        endpoint: trustd_endpoint(tcp),
        service: recorded.service,
    }
}

pub struct TrustdCredentialsResource {
    client: Client,
    threshold: Duration,
    metrics: Arc<Metrics>,
    secret: Option<Secret>,
}

impl TrustdCredentialsResource {
    #[must_use]
    pub fn new(client: Client, threshold: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            client,
            threshold,
            metrics,
            secret: None,
        }
    }
}

#[async_trait]
impl ManagedResource for TrustdCredentialsResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    async fn define(&mut self, _tcp: &TenantControlPlane, _: &dyn TenantClientFactory) -> Result<()> {
        self.secret = None;
        Ok(())
    }

    fn should_cleanup(&self, tcp: &TenantControlPlane) -> bool {
        !tcp.wants_worker_bootstrap() && tcp.status_or_default().addons.worker_bootstrap.enabled
    }

    async fn cleanup(&mut self, tcp: &TenantControlPlane) -> Result<bool> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &tcp.namespace().unwrap_or_default());
        let deleted = delete_if_owned(&secrets, &credentials_secret_name(tcp), |s: &Secret| {
            is_controlled_by(s, tcp)
        })
        .await?;
        if deleted {
            info!(tcp = %tcp.name_any(), resource = RESOURCE_NAME, "Deleted trust daemon credentials");
        }
        Ok(deleted)
    }

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult> {
        if !tcp.wants_worker_bootstrap() {
            return Ok(UpsertResult::None);
        }
        let namespace = tcp.namespace().unwrap_or_default();
        let services: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let service = services.get_opt(&service_name(tcp)).await?;
        let declared = declared_address(tcp, service.as_ref()).ok();
        let sans = trustd_sans(tcp, &resolved_topology_sans(tcp, declared.as_deref(), &[]).await);

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let existing = secrets.get_opt(&credentials_secret_name(tcp)).await?;
        let (creds, reason) = desired_credentials(tcp, existing.as_ref(), &sans, self.threshold)?;
        if let Some(reason) = reason {
            info!(tcp = %tcp.name_any(), reason, "Generated trust daemon credentials");
            self.metrics.record_certificate_regeneration(RESOURCE_NAME, reason);
        } else {
            debug!(tcp = %tcp.name_any(), "Trust daemon credentials up to date");
        }

        let now = chrono::Utc::now();
        let (result, secret) = upsert(&secrets, build_credentials_template(tcp), |secret| {
            mutate_credentials(secret, tcp, &creds, reason.is_some(), now);
            Ok(())
        })
        .await?;
        self.secret = Some(secret);
        Ok(result)
    }

    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool {
        let recorded = tcp.status_or_default().addons.worker_bootstrap;
        if !tcp.wants_worker_bootstrap() {
            return recorded.enabled;
        }
        let Some(secret) = self.secret.as_ref() else {
            return false;
        };
        let checksum = calculate_secret_checksum(secret.data.as_ref());
        !recorded.enabled
            || recorded.credentials.secret_name != secret.name_any()
            || !is_unchanged(&secret.metadata, &checksum, &recorded.credentials.checksum)
            || recorded.endpoint != trustd_endpoint(tcp)
    }

    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()> {
        if !tcp.wants_worker_bootstrap() {
            tcp.status_mut().addons.worker_bootstrap = WorkerBootstrapStatus::default();
            return Ok(());
        }
        if let Some(secret) = self.secret.as_ref() {
            let status = worker_bootstrap_status(tcp, secret);
            tcp.status_mut().addons.worker_bootstrap = status;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "trustd_credentials_tests.rs"]
mod trustd_credentials_tests;
