// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Address resolution for tenant control planes.
//!
//! Two addresses are derived from a [`TenantControlPlane`] and its Service:
//!
//! - the **declared** address, always an IP, used inside the control plane
//!   (kubeadm `advertiseAddress`, certificate SANs);
//! - the **external** address, a hostname or IP plus port, used by clients and
//!   published as `status.controlPlaneEndpoint`.
//!
//! The functions here are pure: callers fetch the Service and pass it in.

use crate::constants::INGRESS_GATEWAY_PORT;
use crate::crd::{TenantControlPlane, TenantControlPlaneStatus};
use crate::errors::AddressError;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, Service};
use kube::ResourceExt;
use std::net::IpAddr;

/// Host and port of the externally reachable API server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalAddress {
    pub host: String,
    pub port: i32,
}

impl ExternalAddress {
    /// `host:port`, bracketing IPv6 hosts.
    #[must_use]
    pub fn endpoint(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

/// Resolve the declared address of the control plane.
///
/// Precedence: `spec.networkProfile.address`, then the Service ClusterIP for
/// ClusterIP/NodePort Services, then the first LoadBalancer ingress IP.
///
/// # Errors
///
/// - [`AddressError::NotYetExposed`] when the Service does not exist yet
/// - [`AddressError::NonExposedLoadBalancer`] while the load balancer has no ingress
/// - [`AddressError::LoadBalancerHostnameNotSupported`] for hostname-only ingress
/// - [`AddressError::MissingValidIp`] otherwise
pub fn declared_address(
    tcp: &TenantControlPlane,
    service: Option<&Service>,
) -> Result<String, AddressError> {
    if !tcp.spec.network_profile.address.is_empty() {
        return Ok(tcp.spec.network_profile.address.clone());
    }

    let Some(service) = service else {
        return Err(AddressError::NotYetExposed);
    };
    let service_name = service.name_any();
    let spec = service.spec.as_ref();
    let service_type = spec
        .and_then(|s| s.type_.as_deref())
        .unwrap_or("ClusterIP");

    match service_type {
        "ClusterIP" | "NodePort" => spec
            .and_then(|s| s.cluster_ip.clone())
            .filter(|ip| !ip.is_empty() && ip != "None")
            .ok_or(AddressError::MissingValidIp {
                service: service_name,
            }),
        "LoadBalancer" => {
            let ingress = service
                .status
                .as_ref()
                .and_then(|s| s.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_deref())
                .unwrap_or_default();
            if ingress.is_empty() {
                return Err(AddressError::NonExposedLoadBalancer {
                    service: service_name,
                });
            }
            load_balancer_address(ingress, &service_name)
        }
        _ => Err(AddressError::MissingValidIp {
            service: service_name,
        }),
    }
}

/// First usable IP of a LoadBalancer ingress list.
///
/// Entries are scanned in order; a hostname seen before any IP is rejected.
fn load_balancer_address(
    ingress: &[LoadBalancerIngress],
    service_name: &str,
) -> Result<String, AddressError> {
    for entry in ingress {
        if let Some(ip) = entry.ip.as_deref().filter(|ip| !ip.is_empty()) {
            return Ok(ip.to_string());
        }
        if entry.hostname.as_deref().is_some_and(|h| !h.is_empty()) {
            return Err(AddressError::LoadBalancerHostnameNotSupported);
        }
    }
    Err(AddressError::MissingValidIp {
        service: service_name.to_string(),
    })
}

/// Resolve the external address of the control plane.
///
/// An Ingress hostname wins over a Gateway hostname; both expose port 443 and
/// drop any `:port` suffix from the hostname. Otherwise the declared address
/// is paired with `spec.networkProfile.port`.
///
/// # Errors
///
/// Propagates [`declared_address`] errors when no hostname is configured.
pub fn external_address(
    tcp: &TenantControlPlane,
    service: Option<&Service>,
) -> Result<ExternalAddress, AddressError> {
    if let Some(host) = routed_hostname(tcp) {
        let (host, _) = host_and_port_from_hostname(&host, INGRESS_GATEWAY_PORT);
        return Ok(ExternalAddress {
            host,
            port: INGRESS_GATEWAY_PORT,
        });
    }

    Ok(ExternalAddress {
        host: declared_address(tcp, service)?,
        port: tcp.spec.network_profile.port,
    })
}

/// Configured Ingress or Gateway hostname, Ingress first.
#[must_use]
pub fn routed_hostname(tcp: &TenantControlPlane) -> Option<String> {
    let control_plane = &tcp.spec.control_plane;
    control_plane
        .ingress
        .as_ref()
        .map(|i| i.hostname.as_str())
        .filter(|h| !h.is_empty())
        .or_else(|| {
            control_plane
                .gateway
                .as_ref()
                .map(|g| g.hostname.as_str())
                .filter(|h| !h.is_empty())
        })
        .map(str::to_string)
}

/// Join host and port, bracketing IPv6 literals.
#[must_use]
pub fn join_host_port(host: &str, port: i32) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{host}]:{port}"),
        _ => format!("{host}:{port}"),
    }
}

/// Split an optional `:port` suffix off a hostname.
///
/// Returns `default_port` when no valid suffix is present.
#[must_use]
pub fn host_and_port_from_hostname(hostname: &str, default_port: i32) -> (String, i32) {
    match hostname.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse::<i32>() {
            Ok(p) => (host.to_string(), p),
            Err(_) => (host.to_string(), default_port),
        },
        _ => (hostname.to_string(), default_port),
    }
}

/// Host and port recorded in `status.controlPlaneEndpoint`.
///
/// # Errors
///
/// Returns [`AddressError::NotYetExposed`] when nothing is recorded yet, and
/// [`AddressError::InvalidEndpoint`] when the value is malformed.
pub fn assigned_control_plane_address(
    status: &TenantControlPlaneStatus,
) -> Result<(String, i32), AddressError> {
    let endpoint = status.control_plane_endpoint.as_str();
    if endpoint.is_empty() {
        return Err(AddressError::NotYetExposed);
    }

    let invalid = |reason: &str| AddressError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = if let Some(rest) = endpoint.strip_prefix('[') {
        let (host, port) = rest
            .split_once("]:")
            .ok_or_else(|| invalid("missing port after IPv6 host"))?;
        (host, port)
    } else {
        let (host, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.contains(':') {
            return Err(invalid("IPv6 host must be bracketed"));
        }
        (host, port)
    };

    let port = port
        .parse::<i32>()
        .map_err(|_| invalid("port is not a number"))?;
    Ok((host.to_string(), port))
}

/// Name of the control plane Service for a tenant control plane.
#[must_use]
pub fn service_name(tcp: &TenantControlPlane) -> String {
    tcp.name_any()
}

#[cfg(test)]
#[path = "address_tests.rs"]
mod address_tests;
