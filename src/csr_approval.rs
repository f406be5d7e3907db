// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Security policy for auto-approving kubelet serving certificates.
//!
//! Worker nodes joined through the trust daemon request kubelet serving
//! certificates from the tenant API server. This module decides, without any
//! I/O, whether such a request may be approved. Every rejection is a silent
//! [`CsrDecision::Skip`]: an administrator can still approve manually.

use crate::crd::TenantControlPlane;
use crate::pki::san::ip_from_bytes;
use ipnet::IpNet;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use std::net::IpAddr;
use x509_parser::prelude::*;

/// Signer of kubelet serving certificates.
pub const KUBELET_SERVING_SIGNER: &str = "kubernetes.io/kubelet-serving";

/// Username prefix of node identities.
pub const NODE_USER_PREFIX: &str = "system:node:";

/// Group every node identity belongs to.
pub const NODES_GROUP: &str = "system:nodes";

/// Usage required on a kubelet serving request.
pub const SERVER_AUTH_USAGE: &str = "server auth";

pub const APPROVAL_REASON: &str = "StewardAutoApproved";
pub const APPROVAL_MESSAGE: &str =
    "Auto-approved by Steward worker bootstrap CSR approval controller";

/// Why a request was not approved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    AutoApproveDisabled,
    AlreadyDecided,
    WrongSigner,
    NotANode,
    NotInNodesGroup,
    MissingServerAuth,
    UnparsableRequest,
    IpOutsideAllowedSubnets,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoApproveDisabled => "auto_approve_disabled",
            Self::AlreadyDecided => "already_decided",
            Self::WrongSigner => "wrong_signer",
            Self::NotANode => "not_a_node",
            Self::NotInNodesGroup => "not_in_nodes_group",
            Self::MissingServerAuth => "missing_server_auth",
            Self::UnparsableRequest => "unparsable_request",
            Self::IpOutsideAllowedSubnets => "ip_outside_allowed_subnets",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CsrDecision {
    Approve,
    Skip(SkipReason),
}

/// Whether auto-approval is enabled for the tenant control plane.
#[must_use]
pub fn auto_approve_enabled(tcp: &TenantControlPlane) -> bool {
    tcp.spec
        .addons
        .worker_bootstrap
        .as_ref()
        .is_some_and(|wb| wb.csr_approval.auto_approve)
}

/// Whether the request already carries an Approved or Denied condition.
#[must_use]
pub fn is_approved_or_denied(csr: &CertificateSigningRequest) -> bool {
    csr.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Approved" || c.type_ == "Denied")
        })
}

/// Pre-filter applied before the policy: undecided kubelet serving requests only.
#[must_use]
pub fn is_candidate(csr: &CertificateSigningRequest) -> bool {
    csr.spec.signer_name == KUBELET_SERVING_SIGNER && !is_approved_or_denied(csr)
}

/// Parse CIDRs, dropping malformed entries.
#[must_use]
pub fn parse_subnets(subnets: &[String]) -> Vec<IpNet> {
    subnets
        .iter()
        .filter_map(|s| s.trim().parse::<IpNet>().ok())
        .collect()
}

/// IP SANs requested in a PEM (or raw DER) certificate signing request.
///
/// Returns `None` when the request cannot be parsed.
#[must_use]
pub fn requested_ip_sans(request: &[u8]) -> Option<Vec<IpAddr>> {
    let der = match ::pem::parse(request) {
        Ok(block) if block.tag() == "CERTIFICATE REQUEST" => block.contents().to_vec(),
        _ => request.to_vec(),
    };
    let (_, csr) = X509CertificationRequest::from_der(&der).ok()?;

    let mut ips = Vec::new();
    if let Some(extensions) = csr.requested_extensions() {
        for extension in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = extension {
                for name in &san.general_names {
                    if let GeneralName::IPAddress(bytes) = name {
                        ips.extend(ip_from_bytes(bytes));
                    }
                }
            }
        }
    }
    Some(ips)
}

/// Whether every IP lies within at least one subnet.
#[must_use]
pub fn ips_in_subnets(ips: &[IpAddr], subnets: &[IpNet]) -> bool {
    ips.iter()
        .all(|ip| subnets.iter().any(|net| net.contains(ip)))
}

/// Evaluate the auto-approval policy for one request.
#[must_use]
pub fn evaluate(tcp: &TenantControlPlane, csr: &CertificateSigningRequest) -> CsrDecision {
    let Some(worker_bootstrap) = tcp
        .spec
        .addons
        .worker_bootstrap
        .as_ref()
        .filter(|wb| wb.csr_approval.auto_approve)
    else {
        return CsrDecision::Skip(SkipReason::AutoApproveDisabled);
    };

    if is_approved_or_denied(csr) {
        return CsrDecision::Skip(SkipReason::AlreadyDecided);
    }
    if csr.spec.signer_name != KUBELET_SERVING_SIGNER {
        return CsrDecision::Skip(SkipReason::WrongSigner);
    }

    let username = csr.spec.username.as_deref().unwrap_or_default();
    match username.strip_prefix(NODE_USER_PREFIX) {
        Some(node) if !node.is_empty() => {}
        _ => return CsrDecision::Skip(SkipReason::NotANode),
    }

    let in_nodes_group = csr
        .spec
        .groups
        .as_ref()
        .is_some_and(|groups| groups.iter().any(|g| g == NODES_GROUP));
    if !in_nodes_group {
        return CsrDecision::Skip(SkipReason::NotInNodesGroup);
    }

    let server_auth = csr
        .spec
        .usages
        .as_ref()
        .is_some_and(|usages| usages.iter().any(|u| u == SERVER_AUTH_USAGE));
    if !server_auth {
        return CsrDecision::Skip(SkipReason::MissingServerAuth);
    }

    if !worker_bootstrap.allowed_subnets.is_empty() {
        let Some(ips) = requested_ip_sans(&csr.spec.request.0) else {
            return CsrDecision::Skip(SkipReason::UnparsableRequest);
        };
        let subnets = parse_subnets(&worker_bootstrap.allowed_subnets);
        if !ips_in_subnets(&ips, &subnets) {
            return CsrDecision::Skip(SkipReason::IpOutsideAllowedSubnets);
        }
    }

    CsrDecision::Approve
}

#[cfg(test)]
#[path = "csr_approval_tests.rs"]
mod csr_approval_tests;
