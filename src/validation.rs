// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Spec validation run before any child object is reconciled.
//!
//! Invalid specs are rejected early with a [`ValidationError`] so that no
//! partial set of child objects is created from them.

use crate::crd::{TenantControlPlane, WorkerBootstrapProvider};
use crate::errors::ValidationError;
use ipnet::IpNet;
use kube::ResourceExt;
use std::net::IpAddr;

const DNS1035_MAX_LENGTH: usize = 63;
const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

fn is_dns_label(label: &str, must_start_alpha: bool) -> bool {
    let bytes = label.as_bytes();
    let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
        return false;
    };
    let first_ok = if must_start_alpha {
        first.is_ascii_lowercase()
    } else {
        first.is_ascii_lowercase() || first.is_ascii_digit()
    };
    first_ok
        && (last.is_ascii_lowercase() || last.is_ascii_digit())
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

/// Check an RFC 1035 label (Service names must be one).
///
/// # Errors
///
/// Returns [`ValidationError::InvalidName`] describing the first violation.
pub fn validate_dns1035_label(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };
    if name.len() > DNS1035_MAX_LENGTH {
        return Err(invalid("must be no more than 63 characters"));
    }
    if !is_dns_label(name, true) {
        return Err(invalid(
            "must consist of lower case alphanumeric characters or '-', start with an alphabetic character, and end with an alphanumeric character",
        ));
    }
    Ok(())
}

/// Whether `value` is a DNS-1123 subdomain, optionally with a `*.` wildcard prefix.
#[must_use]
pub fn is_dns1123_subdomain(value: &str) -> bool {
    let value = value.strip_prefix("*.").unwrap_or(value);
    !value.is_empty()
        && value.len() <= DNS1123_SUBDOMAIN_MAX_LENGTH
        && value
            .split('.')
            .all(|label| label.len() <= DNS1035_MAX_LENGTH && is_dns_label(label, false))
}

/// # Errors
///
/// Returns [`ValidationError::InvalidSourceRange`] for the first malformed entry.
pub fn validate_source_ranges(ranges: &[String]) -> Result<(), ValidationError> {
    for value in ranges {
        if value.trim().parse::<IpNet>().is_err() {
            return Err(ValidationError::InvalidSourceRange {
                value: value.clone(),
            });
        }
    }
    Ok(())
}

/// # Errors
///
/// Returns [`ValidationError::InvalidCertSan`] for the first entry that is
/// neither an IP nor a DNS name.
pub fn validate_cert_sans(sans: &[String]) -> Result<(), ValidationError> {
    for value in sans {
        if value.parse::<IpAddr>().is_err() && !is_dns1123_subdomain(value) {
            return Err(ValidationError::InvalidCertSan {
                value: value.clone(),
            });
        }
    }
    Ok(())
}

/// # Errors
///
/// Returns a [`ValidationError`] when the provider section is missing, the
/// trust daemon port is out of range, or an allowed subnet is malformed.
pub fn validate_worker_bootstrap(tcp: &TenantControlPlane) -> Result<(), ValidationError> {
    let Some(wb) = tcp.spec.addons.worker_bootstrap.as_ref() else {
        return Ok(());
    };

    match wb.provider {
        WorkerBootstrapProvider::Talos => {
            let Some(talos) = wb.talos.as_ref() else {
                return Err(ValidationError::MissingProviderConfig {
                    provider: wb.provider.as_str().to_string(),
                });
            };
            if !(1..=65535).contains(&talos.port) {
                return Err(ValidationError::InvalidPort { port: talos.port });
            }
            validate_cert_sans(&talos.cert_sans)?;
        }
    }

    for value in &wb.allowed_subnets {
        if value.trim().parse::<IpNet>().is_err() {
            return Err(ValidationError::InvalidSubnet {
                value: value.clone(),
            });
        }
    }
    Ok(())
}

/// Run every check on a tenant control plane.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate(tcp: &TenantControlPlane) -> Result<(), ValidationError> {
    validate_dns1035_label(&tcp.name_any())?;
    validate_source_ranges(&tcp.spec.network_profile.load_balancer_source_ranges)?;
    validate_cert_sans(&tcp.spec.network_profile.cert_sans)?;
    validate_worker_bootstrap(tcp)
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod validation_tests;
