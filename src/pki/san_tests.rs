// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `san.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{GatewaySpec, IngressSpec, TalosBootstrapSpec, WorkerBootstrapSpec};
    use crate::pki::san::{
        api_server_sans, first_service_ip, ip_from_bytes, konnectivity_hostname,
        konnectivity_sans, resolved_topology_sans, routed_hostnames, topology_sans, trustd_sans,
        SanSet,
    };
    use crate::test_support::tcp;
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus};
    use std::net::IpAddr;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_insert_classifies_entries() {
        let mut set = SanSet::new();
        set.extend(["10.0.0.1", "API.Example.com", "", "::1"]);
        assert_eq!(set.ips.len(), 2);
        assert!(set.dns.contains("api.example.com"));
    }

    #[test]
    fn test_superset_and_missing() {
        let mut have = SanSet::new();
        have.extend(["10.0.0.1", "a.example.com", "b.example.com"]);
        let mut need = SanSet::new();
        need.extend(["10.0.0.1", "a.example.com"]);
        assert!(have.is_superset_of(&need));

        need.insert("10.0.0.2");
        assert!(!have.is_superset_of(&need));
        assert_eq!(have.missing_from(&need), vec!["10.0.0.2".to_string()]);
    }

    #[test]
    fn test_konnectivity_hostname() {
        assert_eq!(
            konnectivity_hostname("tenant-a.k8s.example.com"),
            "tenant-a.konnectivity.example.com"
        );
        assert_eq!(
            konnectivity_hostname("a.k8s.b.k8s.example.com"),
            "a.konnectivity.b.k8s.example.com"
        );
        assert_eq!(konnectivity_hostname("api.example.com"), "api.example.com");
    }

    #[test]
    fn test_first_service_ip() {
        assert_eq!(first_service_ip("10.96.0.0/16"), Some(ip("10.96.0.1")));
        assert_eq!(first_service_ip("fd00::/108"), Some(ip("fd00::1")));
        assert_eq!(first_service_ip("not-a-cidr"), None);
    }

    #[test]
    fn test_ip_from_bytes() {
        assert_eq!(ip_from_bytes(&[10, 0, 0, 1]), Some(ip("10.0.0.1")));
        assert_eq!(ip_from_bytes(&[1, 2, 3]), None);
    }

    #[test]
    fn test_topology_sans_collects_status_and_hostnames() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.control_plane.ingress = Some(IngressSpec {
            hostname: "tenant-a.k8s.example.com:443".to_string(),
            ..Default::default()
        });
        tcp.spec.control_plane.gateway = Some(GatewaySpec {
            hostname: "gw.example.com".to_string(),
        });
        tcp.status_mut().kubernetes.service.load_balancer = Some(LoadBalancerStatus {
            ingress: Some(vec![LoadBalancerIngress {
                ip: Some("203.0.113.9".to_string()),
                ..Default::default()
            }]),
        });

        assert_eq!(
            routed_hostnames(&tcp),
            vec!["tenant-a.k8s.example.com".to_string(), "gw.example.com".to_string()]
        );

        let set = topology_sans(&tcp, Some("10.96.0.20"), &["extra.example.com".to_string()]);
        assert!(set.ips.contains(&ip("203.0.113.9")));
        assert!(set.ips.contains(&ip("10.96.0.20")));
        assert!(set.dns.contains("tenant-a.k8s.example.com"));
        assert!(set.dns.contains("gw.example.com"));
        assert!(set.dns.contains("extra.example.com"));

        let konnectivity = konnectivity_sans(&tcp, &set);
        assert!(konnectivity.dns.contains("tenant-a.konnectivity.example.com"));
    }

    #[test]
    fn test_api_server_sans_include_cluster_names() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.network_profile.cert_sans = vec!["custom.example.com".to_string()];
        let set = api_server_sans(&tcp, &SanSet::new());

        for name in [
            "kubernetes",
            "kubernetes.default",
            "kubernetes.default.svc",
            "kubernetes.default.svc.cluster.local",
            "tenant-a",
            "tenant-a.tenants",
            "tenant-a.tenants.svc",
            "tenant-a.tenants.svc.cluster.local",
            "localhost",
            "custom.example.com",
        ] {
            assert!(set.dns.contains(name), "missing {name}");
        }
        assert!(set.ips.contains(&ip("10.96.0.1")));
        assert!(set.ips.contains(&ip("127.0.0.1")));
    }

    #[test]
    fn test_trustd_sans_include_talos_extras() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.addons.worker_bootstrap = Some(WorkerBootstrapSpec {
            talos: Some(TalosBootstrapSpec {
                cert_sans: vec!["192.0.2.50".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        });
        let set = trustd_sans(&tcp, &SanSet::new());
        assert!(set.ips.contains(&ip("192.0.2.50")));
    }

    #[tokio::test]
    async fn test_resolution_failure_is_not_fatal() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.control_plane.ingress = Some(IngressSpec {
            hostname: "does-not-exist.invalid".to_string(),
            ..Default::default()
        });
        let set = resolved_topology_sans(&tcp, None, &[]).await;
        assert!(set.dns.contains("does-not-exist.invalid"));
        assert!(set.ips.is_empty());
    }
}
