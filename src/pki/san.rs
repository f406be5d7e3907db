// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Subject Alternative Name computation.
//!
//! A [`SanSet`] is the set of IPs and DNS names a server certificate must
//! cover. Sets are ordered so that rendering and comparison are stable.
//!
//! The required set follows the exposure topology of a tenant control plane:
//! load balancer ingress (for the main Service and the trust daemon Service),
//! the declared address, Ingress/Gateway hostnames together with whatever they
//! currently resolve to, and operator-supplied extras.

use super::{parse_pem, PkiError, Result};
use crate::address::host_and_port_from_hostname;
use crate::constants::{DEFAULT_CLUSTER_DOMAIN, DEFAULT_SERVICE_CIDR};
use crate::crd::TenantControlPlane;
use ipnet::IpNet;
use k8s_openapi::api::core::v1::LoadBalancerStatus;
use kube::ResourceExt;
use rcgen::{string::Ia5String, SanType};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;
use x509_parser::prelude::*;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SanSet {
    pub ips: BTreeSet<IpAddr>,
    pub dns: BTreeSet<String>,
}

impl SanSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, classifying it as IP or DNS name. Empty strings are ignored.
    pub fn insert(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match value.parse::<IpAddr>() {
            Ok(ip) => {
                self.ips.insert(ip);
            }
            Err(_) => {
                self.dns.insert(value.to_ascii_lowercase());
            }
        }
    }

    pub fn insert_ip(&mut self, ip: IpAddr) {
        self.ips.insert(ip);
    }

    pub fn extend<'a>(&mut self, values: impl IntoIterator<Item = &'a str>) {
        for value in values {
            self.insert(value);
        }
    }

    pub fn merge(&mut self, other: &SanSet) {
        self.ips.extend(other.ips.iter().copied());
        self.dns.extend(other.dns.iter().cloned());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.dns.is_empty()
    }

    /// Whether every entry of `required` is present in `self`.
    #[must_use]
    pub fn is_superset_of(&self, required: &SanSet) -> bool {
        self.ips.is_superset(&required.ips) && self.dns.is_superset(&required.dns)
    }

    /// Entries of `required` missing from `self`, for logging.
    #[must_use]
    pub fn missing_from(&self, required: &SanSet) -> Vec<String> {
        required
            .ips
            .difference(&self.ips)
            .map(ToString::to_string)
            .chain(required.dns.difference(&self.dns).cloned())
            .collect()
    }

    /// Render into `rcgen` SAN entries.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::InvalidSan`] when a DNS name is not IA5.
    pub fn to_san_types(&self) -> Result<Vec<SanType>> {
        let mut out: Vec<SanType> = self.ips.iter().copied().map(SanType::IpAddress).collect();
        for name in &self.dns {
            let ia5 =
                Ia5String::try_from(name.clone()).map_err(|_| PkiError::InvalidSan(name.clone()))?;
            out.push(SanType::DnsName(ia5));
        }
        Ok(out)
    }

    /// SANs embedded in the first certificate of a PEM bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::ParseError`] when the certificate cannot be parsed.
    pub fn from_certificate_pem(cert_pem: &str) -> Result<Self> {
        let der = parse_pem(cert_pem)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {e}")))?;

        let mut set = Self::new();
        let san = cert
            .subject_alternative_name()
            .map_err(|e| PkiError::ParseError(format!("invalid SAN extension: {e}")))?;
        let Some(san) = san else {
            return Ok(set);
        };

        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => set.insert(dns),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        set.insert_ip(ip);
                    }
                }
                _ => {}
            }
        }
        Ok(set)
    }
}

/// Decode the raw bytes of an `iPAddress` general name.
#[must_use]
pub fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

/// Replace the first `.k8s.` label with `.konnectivity.`.
///
/// Hostnames without that label are returned unchanged.
#[must_use]
pub fn konnectivity_hostname(hostname: &str) -> String {
    hostname.replacen(".k8s.", ".konnectivity.", 1)
}

fn add_load_balancer(set: &mut SanSet, lb: Option<&LoadBalancerStatus>) {
    for ingress in lb.and_then(|lb| lb.ingress.as_deref()).unwrap_or_default() {
        if let Some(ip) = ingress.ip.as_deref() {
            set.insert(ip);
        }
        if let Some(hostname) = ingress.hostname.as_deref() {
            set.insert(hostname);
        }
    }
}

/// Hostnames routed to the control plane through Ingress or Gateway, port stripped.
#[must_use]
pub fn routed_hostnames(tcp: &TenantControlPlane) -> Vec<String> {
    let control_plane = &tcp.spec.control_plane;
    control_plane
        .ingress
        .as_ref()
        .map(|i| i.hostname.as_str())
        .into_iter()
        .chain(control_plane.gateway.as_ref().map(|g| g.hostname.as_str()))
        .filter(|h| !h.is_empty())
        .map(|h| host_and_port_from_hostname(h, 0).0)
        .collect()
}

/// Topology SANs known without network access.
///
/// Covers the load balancer ingress recorded in status for both the main and
/// the trust daemon Service, the declared address, routed hostnames and
/// `extra` entries.
#[must_use]
pub fn topology_sans(tcp: &TenantControlPlane, declared: Option<&str>, extra: &[String]) -> SanSet {
    let mut set = SanSet::new();
    if let Some(status) = tcp.status.as_ref() {
        add_load_balancer(&mut set, status.kubernetes.service.load_balancer.as_ref());
        add_load_balancer(
            &mut set,
            status.addons.worker_bootstrap.service.load_balancer.as_ref(),
        );
    }
    if let Some(declared) = declared {
        set.insert(declared);
    }
    for host in routed_hostnames(tcp) {
        set.insert(&host);
    }
    set.extend(extra.iter().map(String::as_str));
    set
}

/// IPs a hostname currently resolves to; empty on failure.
pub async fn resolve_host_ips(host: &str) -> Vec<IpAddr> {
    if host.parse::<IpAddr>().is_ok() {
        return Vec::new();
    }
    match tokio::net::lookup_host((host, 0)).await {
        Ok(addrs) => addrs.map(|a| a.ip()).collect(),
        Err(e) => {
            debug!(host = %host, error = %e, "SAN hostname resolution failed, keeping DNS SAN only");
            Vec::new()
        }
    }
}

/// [`topology_sans`] plus the resolved IPs of every routed hostname.
///
/// TLS passthrough proxies present the backend certificate to clients that
/// validate it against the proxy IP, so resolved IPs are added best effort.
pub async fn resolved_topology_sans(
    tcp: &TenantControlPlane,
    declared: Option<&str>,
    extra: &[String],
) -> SanSet {
    let mut set = topology_sans(tcp, declared, extra);
    for host in routed_hostnames(tcp) {
        for ip in resolve_host_ips(&host).await {
            set.insert_ip(ip);
        }
    }
    set
}

/// First usable IP of a service CIDR, the address of the `kubernetes` Service.
#[must_use]
pub fn first_service_ip(cidr: &str) -> Option<IpAddr> {
    match cidr.trim().parse::<IpNet>().ok()? {
        IpNet::V4(net) => u32::from(net.network())
            .checked_add(1)
            .map(|n| IpAddr::V4(Ipv4Addr::from(n))),
        IpNet::V6(net) => u128::from(net.network())
            .checked_add(1)
            .map(|n| IpAddr::V6(Ipv6Addr::from(n))),
    }
}

/// SANs of the kube-apiserver serving certificate.
///
/// Adds the in-cluster names of the `kubernetes` Service and of the control
/// plane Service, loopback, the first service CIDR IP and
/// `networkProfile.certSANs` to the topology set.
#[must_use]
pub fn api_server_sans(tcp: &TenantControlPlane, topology: &SanSet) -> SanSet {
    let profile = &tcp.spec.network_profile;
    let domain = profile
        .cluster_domain
        .as_deref()
        .unwrap_or(DEFAULT_CLUSTER_DOMAIN);
    let name = tcp.name_any();
    let namespace = tcp.namespace().unwrap_or_default();

    let mut set = topology.clone();
    set.extend([
        "kubernetes",
        "kubernetes.default",
        "kubernetes.default.svc",
        "localhost",
        "127.0.0.1",
    ]);
    set.insert(&format!("kubernetes.default.svc.{domain}"));
    set.insert(&name);
    set.insert(&format!("{name}.{namespace}"));
    set.insert(&format!("{name}.{namespace}.svc"));
    set.insert(&format!("{name}.{namespace}.svc.{domain}"));

    let service_cidr = profile
        .service_cidr
        .as_deref()
        .unwrap_or(DEFAULT_SERVICE_CIDR);
    for cidr in service_cidr.split(',') {
        if let Some(ip) = first_service_ip(cidr) {
            set.insert_ip(ip);
        }
    }

    set.extend(profile.cert_sans.iter().map(String::as_str));
    set
}

/// SANs of the konnectivity server certificate: the topology set plus the
/// `.konnectivity.` variant of every routed hostname.
#[must_use]
pub fn konnectivity_sans(tcp: &TenantControlPlane, topology: &SanSet) -> SanSet {
    let mut set = topology.clone();
    for host in routed_hostnames(tcp) {
        set.insert(&konnectivity_hostname(&host));
    }
    set
}

/// SANs of the trust daemon server certificate.
#[must_use]
pub fn trustd_sans(tcp: &TenantControlPlane, topology: &SanSet) -> SanSet {
    let mut set = topology.clone();
    if let Some(talos) = tcp
        .spec
        .addons
        .worker_bootstrap
        .as_ref()
        .and_then(|wb| wb.talos.as_ref())
    {
        set.extend(talos.cert_sans.iter().map(String::as_str));
    }
    set
}

#[cfg(test)]
#[path = "san_tests.rs"]
mod san_tests;
