// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `csr_approval.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{TenantControlPlane, WorkerBootstrapSpec};
    use crate::csr_approval::{
        evaluate, ips_in_subnets, is_candidate, parse_subnets, requested_ip_sans, CsrDecision,
        SkipReason, KUBELET_SERVING_SIGNER,
    };
    use crate::test_support::tcp;
    use k8s_openapi::api::certificates::v1::{
        CertificateSigningRequest, CertificateSigningRequestCondition,
        CertificateSigningRequestSpec, CertificateSigningRequestStatus,
    };
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use rcgen::{CertificateParams, KeyPair, SanType};
    use std::net::IpAddr;

    fn request_pem(ips: &[&str]) -> Vec<u8> {
        let mut params = CertificateParams::default();
        params.subject_alt_names = ips
            .iter()
            .map(|ip| SanType::IpAddress(ip.parse::<IpAddr>().unwrap()))
            .collect();
        let key = KeyPair::generate().unwrap();
        params
            .serialize_request(&key)
            .unwrap()
            .pem()
            .unwrap()
            .into_bytes()
    }

    fn kubelet_csr(ips: &[&str]) -> CertificateSigningRequest {
        CertificateSigningRequest {
            metadata: ObjectMeta {
                name: Some("csr-abc".to_string()),
                ..Default::default()
            },
            spec: CertificateSigningRequestSpec {
                request: ByteString(request_pem(ips)),
                signer_name: KUBELET_SERVING_SIGNER.to_string(),
                username: Some("system:node:worker-1".to_string()),
                groups: Some(vec![
                    "system:nodes".to_string(),
                    "system:authenticated".to_string(),
                ]),
                usages: Some(vec![
                    "digital signature".to_string(),
                    "server auth".to_string(),
                ]),
                ..Default::default()
            },
            status: None,
        }
    }

    fn tcp_with_bootstrap(subnets: &[&str]) -> TenantControlPlane {
        let mut tcp = tcp("tenant-a");
        tcp.spec.addons.worker_bootstrap = Some(WorkerBootstrapSpec {
            allowed_subnets: subnets.iter().map(|s| (*s).to_string()).collect(),
            ..Default::default()
        });
        tcp
    }

    #[test]
    fn test_approves_valid_node_request() {
        let tcp = tcp_with_bootstrap(&["10.0.0.0/24"]);
        assert_eq!(
            evaluate(&tcp, &kubelet_csr(&["10.0.0.5"])),
            CsrDecision::Approve
        );
    }

    #[test]
    fn test_approves_any_ip_without_subnets() {
        let tcp = tcp_with_bootstrap(&[]);
        assert_eq!(
            evaluate(&tcp, &kubelet_csr(&["192.0.2.99"])),
            CsrDecision::Approve
        );
    }

    #[test]
    fn test_rejects_ip_outside_subnets() {
        let tcp = tcp_with_bootstrap(&["10.0.0.0/24"]);
        assert_eq!(
            evaluate(&tcp, &kubelet_csr(&["10.0.0.5", "10.0.1.5"])),
            CsrDecision::Skip(SkipReason::IpOutsideAllowedSubnets)
        );
    }

    #[test]
    fn test_rejects_non_node_user() {
        let tcp = tcp_with_bootstrap(&[]);
        let mut csr = kubelet_csr(&["10.0.0.5"]);
        csr.spec.username = Some("system:serviceaccount:kube-system:default".to_string());
        assert_eq!(
            evaluate(&tcp, &csr),
            CsrDecision::Skip(SkipReason::NotANode)
        );

        csr.spec.username = Some("system:node:".to_string());
        assert_eq!(
            evaluate(&tcp, &csr),
            CsrDecision::Skip(SkipReason::NotANode)
        );
    }

    #[test]
    fn test_rejects_missing_group_and_usage() {
        let tcp = tcp_with_bootstrap(&[]);
        let mut csr = kubelet_csr(&["10.0.0.5"]);
        csr.spec.groups = Some(vec!["system:authenticated".to_string()]);
        assert_eq!(
            evaluate(&tcp, &csr),
            CsrDecision::Skip(SkipReason::NotInNodesGroup)
        );

        let mut csr = kubelet_csr(&["10.0.0.5"]);
        csr.spec.usages = Some(vec!["client auth".to_string()]);
        assert_eq!(
            evaluate(&tcp, &csr),
            CsrDecision::Skip(SkipReason::MissingServerAuth)
        );
    }

    #[test]
    fn test_prefilter_skips_decided_and_foreign_signers() {
        let tcp = tcp_with_bootstrap(&[]);
        let mut csr = kubelet_csr(&["10.0.0.5"]);
        csr.status = Some(CertificateSigningRequestStatus {
            conditions: Some(vec![CertificateSigningRequestCondition {
                type_: "Denied".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        assert!(!is_candidate(&csr));
        assert_eq!(
            evaluate(&tcp, &csr),
            CsrDecision::Skip(SkipReason::AlreadyDecided)
        );

        let mut csr = kubelet_csr(&["10.0.0.5"]);
        csr.spec.signer_name = "kubernetes.io/kube-apiserver-client".to_string();
        assert!(!is_candidate(&csr));
        assert_eq!(
            evaluate(&tcp, &csr),
            CsrDecision::Skip(SkipReason::WrongSigner)
        );
    }

    #[test]
    fn test_disabled_auto_approve() {
        let mut tcp = tcp_with_bootstrap(&[]);
        if let Some(wb) = tcp.spec.addons.worker_bootstrap.as_mut() {
            wb.csr_approval.auto_approve = false;
        }
        assert_eq!(
            evaluate(&tcp, &kubelet_csr(&["10.0.0.5"])),
            CsrDecision::Skip(SkipReason::AutoApproveDisabled)
        );

        let without_addon = crate::test_support::tcp("tenant-b");
        assert_eq!(
            evaluate(&without_addon, &kubelet_csr(&["10.0.0.5"])),
            CsrDecision::Skip(SkipReason::AutoApproveDisabled)
        );
    }

    #[test]
    fn test_unparsable_request_with_subnets() {
        let tcp = tcp_with_bootstrap(&["10.0.0.0/8"]);
        let mut csr = kubelet_csr(&[]);
        csr.spec.request = ByteString(b"not a csr".to_vec());
        assert_eq!(
            evaluate(&tcp, &csr),
            CsrDecision::Skip(SkipReason::UnparsableRequest)
        );
    }

    #[test]
    fn test_requested_ip_sans_and_subnets() {
        let ips = requested_ip_sans(&request_pem(&["10.0.0.5", "fd00::5"])).unwrap();
        assert_eq!(ips.len(), 2);

        let subnets = parse_subnets(&[
            "10.0.0.0/24".to_string(),
            "fd00::/64".to_string(),
            "bogus".to_string(),
        ]);
        assert_eq!(subnets.len(), 2);
        assert!(ips_in_subnets(&ips, &subnets));
        assert!(!ips_in_subnets(&ips, &subnets[..1]));
    }
}
