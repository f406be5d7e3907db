// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed errors for address resolution and spec validation.
//!
//! Reconcilers propagate these through `anyhow`; callers that need to branch
//! on the kind (for example to requeue quietly while a load balancer is still
//! provisioning) can `downcast_ref` them.

use thiserror::Error;

/// Failures while resolving the declared or external address of a tenant control plane.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The LoadBalancer Service has no ingress yet; retry on the next reconcile.
    #[error("LoadBalancer service {service} has not been exposed yet")]
    NonExposedLoadBalancer { service: String },

    /// The LoadBalancer only publishes a hostname.
    #[error("hostname not supported for LoadBalancer ingress: use static IP instead")]
    LoadBalancerHostnameNotSupported,

    /// No usable IP could be found for the Service.
    #[error("no valid IP address found for service {service}")]
    MissingValidIp { service: String },

    /// The Service has not been created yet.
    #[error("control plane service does not exist yet")]
    NotYetExposed,

    /// The address recorded in status cannot be split into host and port.
    #[error("invalid control plane endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl AddressError {
    /// Transient errors clear on their own once the cloud provider catches up.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NonExposedLoadBalancer { .. } | Self::NotYetExposed)
    }
}

/// Spec validation failures raised before any child object is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name {name:?} is not a valid RFC 1035 label: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("loadBalancerSourceRanges entry {value:?} is not a valid CIDR")]
    InvalidSourceRange { value: String },

    #[error("certSANs entry {value:?} is neither an IP address nor a DNS name")]
    InvalidCertSan { value: String },

    #[error("worker bootstrap provider {provider} requires its configuration section")]
    MissingProviderConfig { provider: String },

    #[error("worker bootstrap port {port} is out of range")]
    InvalidPort { port: i32 },

    #[error("allowedSubnets entry {value:?} is not a valid CIDR")]
    InvalidSubnet { value: String },
}
