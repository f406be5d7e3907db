// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Control plane certificates.
//!
//! One [`CertificateResource`] per [`CertificateKind`]. The two CAs are
//! generated once and then only re-issued on an explicit rotation request;
//! leaves are re-checked against their CA on every reconcile and reissued when
//! any check fails.
//!
//! The Secret payload checksum is stored on the Secret and mirrored into the
//! tenant control plane status, so dependent objects (the Deployment pod
//! template) roll when material changes.

use super::{
    is_controlled_by, now_rfc3339, set_controller_reference, tenant_prefixed_name, ManagedResource,
    TenantClientFactory,
};
use crate::address::declared_address;
use crate::checksum::{
    calculate_secret_checksum, get_object_checksum, is_rotation_requested, is_unchanged,
    mark_rotated, set_object_checksum,
};
use crate::crd::{CertificateStatus, TenantControlPlane, TenantControlPlaneStatus};
use crate::labels::{
    merge_maps, steward_labels, CERTIFICATE_LIFECYCLE_LABEL, CERTIFICATE_X509_VALUE,
};
use crate::metrics::Metrics;
use crate::pki::authority::{CertificateAuthority, KeyAlgorithm, LeafProfile, LeafUsage};
use crate::pki::san::{api_server_sans, konnectivity_sans, resolved_topology_sans, SanSet};
use crate::pki::validity::{check_ca, check_leaf, InvalidCertificate};
use crate::pki::CertificatePrivateKeyPair;
use crate::reconcilers::upsert::{delete_if_owned, upsert, ObjectStore, UpsertResult};
use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";

/// The certificates generated for every tenant control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CertificateKind {
    /// Cluster CA, signs the control plane leaves.
    Ca,
    /// Front proxy CA used for API aggregation.
    FrontProxyCa,
    /// kube-apiserver serving certificate.
    ApiServer,
    /// Client certificate the API server presents to kubelets.
    ApiServerKubeletClient,
    /// konnectivity-server serving certificate, only with the addon enabled.
    Konnectivity,
}

impl CertificateKind {
    /// Resource name, also the Secret name suffix.
    #[must_use]
    pub fn resource_name(self) -> &'static str {
        match self {
            Self::Ca => "ca-certificate",
            Self::FrontProxyCa => "front-proxy-ca-certificate",
            Self::ApiServer => "api-server-certificate",
            Self::ApiServerKubeletClient => "api-server-kubelet-client-certificate",
            Self::Konnectivity => "konnectivity-certificate",
        }
    }

    #[must_use]
    pub fn secret_name(self, tcp: &TenantControlPlane) -> String {
        tenant_prefixed_name(tcp, self.resource_name())
    }

    /// Secret keys holding the certificate and the private key.
    #[must_use]
    pub fn keys(self) -> (&'static str, &'static str) {
        match self {
            Self::Ca => ("ca.crt", "ca.key"),
            Self::FrontProxyCa => ("front-proxy-ca.crt", "front-proxy-ca.key"),
            Self::ApiServer => ("apiserver.crt", "apiserver.key"),
            Self::ApiServerKubeletClient => {
                ("apiserver-kubelet-client.crt", "apiserver-kubelet-client.key")
            }
            Self::Konnectivity => ("tls.crt", "tls.key"),
        }
    }

    #[must_use]
    pub fn is_authority(self) -> bool {
        matches!(self, Self::Ca | Self::FrontProxyCa)
    }

    #[must_use]
    pub fn common_name(self) -> &'static str {
        match self {
            Self::Ca => "kubernetes",
            Self::FrontProxyCa => "front-proxy-ca",
            Self::ApiServer => "kube-apiserver",
            Self::ApiServerKubeletClient => "kube-apiserver-kubelet-client",
            Self::Konnectivity => "system:konnectivity-server",
        }
    }

    fn organization(self) -> Option<&'static str> {
        match self {
            Self::ApiServerKubeletClient => Some("kubeadm:cluster-admins"),
            _ => None,
        }
    }

    fn usage(self) -> LeafUsage {
        match self {
            Self::ApiServerKubeletClient => LeafUsage::Client,
            _ => LeafUsage::Server,
        }
    }

    fn secret_type(self) -> Option<&'static str> {
        (self == Self::Konnectivity).then_some(TLS_SECRET_TYPE)
    }

    /// Whether the certificate is wanted for `tcp`.
    #[must_use]
    pub fn is_enabled(self, tcp: &TenantControlPlane) -> bool {
        match self {
            Self::Konnectivity => tcp.spec.addons.konnectivity.is_some(),
            _ => true,
        }
    }

    /// Status slot recording this certificate.
    pub fn status_slot(self, status: &mut TenantControlPlaneStatus) -> &mut CertificateStatus {
        match self {
            Self::Ca => &mut status.certificates.ca,
            Self::FrontProxyCa => &mut status.certificates.front_proxy_ca,
            Self::ApiServer => &mut status.certificates.api_server,
            Self::ApiServerKubeletClient => &mut status.certificates.api_server_kubelet_client,
            Self::Konnectivity => &mut status.addons.konnectivity.certificate,
        }
    }

    #[must_use]
    pub fn recorded_status(self, tcp: &TenantControlPlane) -> CertificateStatus {
        let mut status = tcp.status_or_default();
        std::mem::take(self.status_slot(&mut status))
    }
}

/// What to do with the persisted material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Plan {
    Keep,
    /// Generate new material; the reason is used as metrics label.
    Generate(&'static str),
}

/// Metrics label for a failed validity check.
#[must_use]
pub fn invalid_reason(err: &InvalidCertificate) -> &'static str {
    match err {
        InvalidCertificate::Unparsable(_) => "unparsable",
        InvalidCertificate::KeyMismatch => "key-mismatch",
        InvalidCertificate::SignatureInvalid => "signature",
        InvalidCertificate::Expiring { .. } => "expiring",
        InvalidCertificate::MissingSans { .. } => "missing-sans",
        InvalidCertificate::UnexpectedSans { .. } => "unexpected-sans",
    }
}

/// Certificate and key stored under the keys of `kind`, if both are present.
#[must_use]
pub fn read_pair(
    data: Option<&BTreeMap<String, ByteString>>,
    kind: CertificateKind,
) -> Option<CertificatePrivateKeyPair> {
    let (cert_key, key_key) = kind.keys();
    let data = data?;
    let certificate = data.get(cert_key).filter(|v| !v.0.is_empty())?;
    let private_key = data.get(key_key).filter(|v| !v.0.is_empty())?;
    Some(CertificatePrivateKeyPair {
        certificate: String::from_utf8_lossy(&certificate.0).into_owned(),
        private_key: String::from_utf8_lossy(&private_key.0).into_owned(),
        chain: None,
    })
}

/// Decide what to do with a CA Secret.
///
/// A CA is generated when absent and re-issued only on request. A Secret that
/// lost its certificate or key is regenerated with a warning. Persisted CA
/// material that fails to parse is an error: replacing it silently would
/// invalidate every certificate it signed.
///
/// # Errors
///
/// Returns an error when the stored pair is unusable.
pub fn authority_plan(
    kind: CertificateKind,
    existing: Option<&Secret>,
    threshold: Duration,
) -> Result<Plan> {
    let Some(secret) = existing else {
        return Ok(Plan::Generate("missing"));
    };
    if is_rotation_requested(&secret.metadata) {
        return Ok(Plan::Generate("rotation"));
    }
    let Some(pair) = read_pair(secret.data.as_ref(), kind) else {
        warn!(
            secret = %secret.name_any(),
            "CA Secret has no certificate or key, generating a new CA"
        );
        return Ok(Plan::Generate("invalid"));
    };
    let info = check_ca(&pair).map_err(|e| {
        anyhow!(
            "{} holds unusable CA material ({e}), annotate it for rotation to reissue",
            secret.name_any()
        )
    })?;
    if info.expires_within(threshold) {
        warn!(
            secret = %secret.name_any(),
            not_after = info.not_after,
            "CA certificate is about to expire, request a rotation"
        );
    }
    Ok(Plan::Keep)
}

/// Decide what to do with a leaf Secret.
#[must_use]
pub fn leaf_plan(
    kind: CertificateKind,
    existing: Option<&Secret>,
    ca_cert_pem: &str,
    required: &SanSet,
    threshold: Duration,
) -> Plan {
    let Some(secret) = existing else {
        return Plan::Generate("missing");
    };
    if is_rotation_requested(&secret.metadata) {
        return Plan::Generate("rotation");
    }
    let Some(pair) = read_pair(secret.data.as_ref(), kind) else {
        return Plan::Generate("missing");
    };
    match check_leaf(&pair, ca_cert_pem, required, threshold) {
        Ok(()) => Plan::Keep,
        Err(e) => {
            debug!(secret = %secret.name_any(), reason = %e, "Leaf certificate no longer valid");
            Plan::Generate(invalid_reason(&e))
        }
    }
}

fn pair_data(kind: CertificateKind, pair: &CertificatePrivateKeyPair) -> BTreeMap<String, ByteString> {
    let (cert_key, key_key) = kind.keys();
    BTreeMap::from([
        (cert_key.to_string(), ByteString(pair.certificate.clone().into_bytes())),
        (key_key.to_string(), ByteString(pair.private_key.clone().into_bytes())),
    ])
}

/// Generate fresh material for `kind`.
///
/// Leaves need the signing CA and the SANs they must carry.
///
/// # Errors
///
/// Returns an error when the CA is missing for a leaf or generation fails.
pub fn generate(
    kind: CertificateKind,
    ca: Option<&CertificateAuthority>,
    sans: &SanSet,
) -> Result<BTreeMap<String, ByteString>> {
    if kind.is_authority() {
        let authority = CertificateAuthority::generate(kind.common_name(), KeyAlgorithm::EcdsaP256)?;
        return Ok(pair_data(kind, &authority.to_pair()));
    }
    let ca = ca.with_context(|| format!("{} requires the cluster CA", kind.resource_name()))?;
    let pair = ca.issue(&LeafProfile {
        common_name: kind.common_name(),
        organization: kind.organization(),
        usage: kind.usage(),
        sans,
        algorithm: KeyAlgorithm::EcdsaP256,
    })?;
    Ok(pair_data(kind, &pair))
}

#[must_use]
pub fn build_certificate_template(tcp: &TenantControlPlane, kind: CertificateKind) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(kind.secret_name(tcp)),
            namespace: tcp.namespace(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Apply labels, type, checksum and ownership, installing `material` when set.
///
/// The rotation marker is only consumed together with new material.
pub fn mutate_certificate(
    secret: &mut Secret,
    tcp: &TenantControlPlane,
    kind: CertificateKind,
    material: Option<&BTreeMap<String, ByteString>>,
    now: chrono::DateTime<chrono::Utc>,
) {
    let mut component = steward_labels(&tcp.name_any(), kind.resource_name());
    if !kind.is_authority() {
        component.insert(
            CERTIFICATE_LIFECYCLE_LABEL.to_string(),
            CERTIFICATE_X509_VALUE.to_string(),
        );
    }
    secret.metadata.labels = Some(merge_maps(&[&secret.labels().clone(), &component]));

    if let Some(material) = material {
        secret.data = Some(material.clone());
        if is_rotation_requested(&secret.metadata) {
            mark_rotated(&mut secret.metadata, now);
        }
    }
    if let Some(type_) = kind.secret_type() {
        secret.type_ = Some(type_.to_string());
    }

    let checksum = calculate_secret_checksum(secret.data.as_ref());
    set_object_checksum(&mut secret.metadata, &checksum);
    set_controller_reference(&mut secret.metadata, tcp);
}

/// Status projection of a persisted certificate Secret.
#[must_use]
pub fn certificate_status(secret: &Secret) -> CertificateStatus {
    CertificateStatus {
        secret_name: secret.name_any(),
        checksum: get_object_checksum(&secret.metadata)
            .unwrap_or_default()
            .to_string(),
        last_update: Some(now_rfc3339()),
    }
}

/// Inputs a certificate reconcile needs besides the Secret itself.
pub struct CertificateInputs<'a> {
    /// Signing CA, required for leaves.
    pub ca: Option<&'a CertificateAuthority>,
    /// SANs a server leaf must carry.
    pub required: &'a SanSet,
    pub threshold: Duration,
}

/// Outcome of [`ensure_certificate`].
#[derive(Debug)]
pub struct Ensured {
    pub result: UpsertResult,
    pub secret: Secret,
    /// Set when new material was generated.
    pub regenerated: Option<&'static str>,
}

/// Converge the certificate Secret of `kind` in `store`.
///
/// # Errors
///
/// Returns an error on unusable CA material, generation failures and API errors.
pub async fn ensure_certificate<S>(
    store: &S,
    tcp: &TenantControlPlane,
    kind: CertificateKind,
    inputs: &CertificateInputs<'_>,
) -> Result<Ensured>
where
    S: ObjectStore<Secret> + ?Sized,
{
    let name = kind.secret_name(tcp);
    let existing = store
        .get_opt(&name)
        .await
        .with_context(|| format!("failed to get {name}"))?;

    let plan = match inputs.ca {
        _ if kind.is_authority() => authority_plan(kind, existing.as_ref(), inputs.threshold)?,
        Some(ca) => leaf_plan(
            kind,
            existing.as_ref(),
            ca.cert_pem(),
            inputs.required,
            inputs.threshold,
        ),
        None => bail!("{} requires the cluster CA", kind.resource_name()),
    };

    let (material, regenerated) = match plan {
        Plan::Keep => (None, None),
        Plan::Generate(reason) => (Some(generate(kind, inputs.ca, inputs.required)?), Some(reason)),
    };

    let now = chrono::Utc::now();
    let (result, secret) = upsert(store, build_certificate_template(tcp, kind), |secret| {
        mutate_certificate(secret, tcp, kind, material.as_ref(), now);
        Ok(())
    })
    .await?;

    Ok(Ensured {
        result,
        secret,
        regenerated,
    })
}

/// Load the cluster CA of `tcp`.
///
/// # Errors
///
/// Fails while the CA Secret does not exist yet or holds malformed PEM.
pub async fn load_cluster_ca<S>(store: &S, tcp: &TenantControlPlane) -> Result<CertificateAuthority>
where
    S: ObjectStore<Secret> + ?Sized,
{
    let name = CertificateKind::Ca.secret_name(tcp);
    let secret = store
        .get_opt(&name)
        .await
        .with_context(|| format!("failed to get {name}"))?
        .ok_or_else(|| anyhow!("CA secret {name} not available yet"))?;
    let pair = read_pair(secret.data.as_ref(), CertificateKind::Ca)
        .ok_or_else(|| anyhow!("CA secret {name} has no certificate data"))?;
    Ok(CertificateAuthority::from_pem(&pair.certificate, &pair.private_key)?)
}

/// SANs a leaf of `kind` must carry.
pub async fn required_sans(
    tcp: &TenantControlPlane,
    kind: CertificateKind,
    service: Option<&Service>,
) -> SanSet {
    match kind {
        CertificateKind::ApiServer | CertificateKind::Konnectivity => {
            let declared = declared_address(tcp, service).ok();
            let topology = resolved_topology_sans(tcp, declared.as_deref(), &[]).await;
            if kind == CertificateKind::ApiServer {
                api_server_sans(tcp, &topology)
            } else {
                konnectivity_sans(tcp, &topology)
            }
        }
        _ => SanSet::new(),
    }
}

pub struct CertificateResource {
    client: Client,
    kind: CertificateKind,
    threshold: Duration,
    metrics: Arc<Metrics>,
    secret: Option<Secret>,
}

impl CertificateResource {
    #[must_use]
    pub fn new(
        client: Client,
        kind: CertificateKind,
        threshold: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            client,
            kind,
            threshold,
            metrics,
            secret: None,
        }
    }
}

#[async_trait]
impl ManagedResource for CertificateResource {
    fn name(&self) -> &'static str {
        self.kind.resource_name()
    }

    async fn define(&mut self, _tcp: &TenantControlPlane, _: &dyn TenantClientFactory) -> Result<()> {
        self.secret = None;
        Ok(())
    }

    fn should_cleanup(&self, tcp: &TenantControlPlane) -> bool {
        self.kind == CertificateKind::Konnectivity
            && !self.kind.is_enabled(tcp)
            && tcp.status_or_default().addons.konnectivity.enabled
    }

    async fn cleanup(&mut self, tcp: &TenantControlPlane) -> Result<bool> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &tcp.namespace().unwrap_or_default());
        let deleted = delete_if_owned(&secrets, &self.kind.secret_name(tcp), |s: &Secret| {
            is_controlled_by(s, tcp)
        })
        .await?;
        if deleted {
            info!(tcp = %tcp.name_any(), resource = self.name(), "Deleted certificate secret");
        }
        Ok(deleted)
    }

    async fn create_or_update(&mut self, tcp: &TenantControlPlane) -> Result<UpsertResult> {
        if !self.kind.is_enabled(tcp) {
            return Ok(UpsertResult::None);
        }
        let namespace = tcp.namespace().unwrap_or_default();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);

        let (ca, required) = if self.kind.is_authority() {
            (None, SanSet::new())
        } else {
            let ca = load_cluster_ca(&secrets, tcp).await?;
            let services: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
            let service = services.get_opt(&tcp.name_any()).await?;
            (Some(ca), required_sans(tcp, self.kind, service.as_ref()).await)
        };

        let ensured = ensure_certificate(
            &secrets,
            tcp,
            self.kind,
            &CertificateInputs {
                ca: ca.as_ref(),
                required: &required,
                threshold: self.threshold,
            },
        )
        .await?;

        if let Some(reason) = ensured.regenerated {
            info!(
                tcp = %tcp.name_any(),
                certificate = self.name(),
                reason,
                "Generated certificate"
            );
            self.metrics
                .record_certificate_regeneration(self.name(), reason);
        }
        self.secret = Some(ensured.secret);
        Ok(ensured.result)
    }

    fn should_status_be_updated(&self, tcp: &TenantControlPlane) -> bool {
        if self.kind == CertificateKind::Konnectivity
            && self.kind.is_enabled(tcp) != tcp.status_or_default().addons.konnectivity.enabled
        {
            return true;
        }
        let Some(secret) = self.secret.as_ref() else {
            return false;
        };
        let recorded = self.kind.recorded_status(tcp);
        let checksum = calculate_secret_checksum(secret.data.as_ref());
        recorded.secret_name != secret.name_any()
            || !is_unchanged(&secret.metadata, &checksum, &recorded.checksum)
    }

    async fn update_status(&mut self, tcp: &mut TenantControlPlane) -> Result<()> {
        let kind = self.kind;
        if kind == CertificateKind::Konnectivity && !kind.is_enabled(tcp) {
            tcp.status_mut().addons.konnectivity = Default::default();
            return Ok(());
        }
        let Some(secret) = self.secret.as_ref() else {
            return Ok(());
        };
        let status = tcp.status_mut();
        if kind == CertificateKind::Konnectivity {
            status.addons.konnectivity.enabled = true;
        }
        *kind.status_slot(status) = certificate_status(secret);
        Ok(())
    }
}

#[cfg(test)]
#[path = "certificate_tests.rs"]
mod certificate_tests;
