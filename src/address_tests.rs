// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `address.rs`

#[cfg(test)]
mod tests {
    use crate::address::{
        assigned_control_plane_address, declared_address, external_address,
        host_and_port_from_hostname, join_host_port,
    };
    use crate::crd::{GatewaySpec, IngressSpec, TenantControlPlaneStatus};
    use crate::errors::AddressError;
    use crate::test_support::{load_balancer_service, service, tcp};

    #[test]
    fn test_declared_address_prefers_spec() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.network_profile.address = "192.168.1.10".to_string();
        let svc = service("tenant-a", "ClusterIP", "10.96.0.5");
        assert_eq!(declared_address(&tcp, Some(&svc)).unwrap(), "192.168.1.10");
    }

    #[test]
    fn test_declared_address_cluster_ip_and_node_port() {
        let tcp = tcp("tenant-a");
        let svc = service("tenant-a", "ClusterIP", "10.96.0.5");
        assert_eq!(declared_address(&tcp, Some(&svc)).unwrap(), "10.96.0.5");

        let svc = service("tenant-a", "NodePort", "10.96.0.6");
        assert_eq!(declared_address(&tcp, Some(&svc)).unwrap(), "10.96.0.6");
    }

    #[test]
    fn test_declared_address_without_service() {
        let tcp = tcp("tenant-a");
        assert_eq!(
            declared_address(&tcp, None),
            Err(AddressError::NotYetExposed)
        );
    }

    #[test]
    fn test_load_balancer_first_ip() {
        let tcp = tcp("tenant-a");
        let svc = load_balancer_service("tenant-a", &[(Some("203.0.113.7"), None)]);
        assert_eq!(declared_address(&tcp, Some(&svc)).unwrap(), "203.0.113.7");
    }

    #[test]
    fn test_load_balancer_hostname_is_rejected() {
        let tcp = tcp("tenant-a");
        let svc = load_balancer_service("tenant-a", &[(None, Some("lb.example.com"))]);
        let err = declared_address(&tcp, Some(&svc)).unwrap_err();
        assert_eq!(err, AddressError::LoadBalancerHostnameNotSupported);
        assert_eq!(
            err.to_string(),
            "hostname not supported for LoadBalancer ingress: use static IP instead"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_load_balancer_not_exposed_is_transient() {
        let tcp = tcp("tenant-a");
        let svc = load_balancer_service("tenant-a", &[]);
        let err = declared_address(&tcp, Some(&svc)).unwrap_err();
        assert!(matches!(err, AddressError::NonExposedLoadBalancer { .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_load_balancer_empty_entries_missing_ip() {
        let tcp = tcp("tenant-a");
        let svc = load_balancer_service("tenant-a", &[(None, None)]);
        assert!(matches!(
            declared_address(&tcp, Some(&svc)),
            Err(AddressError::MissingValidIp { .. })
        ));
    }

    #[test]
    fn test_external_address_ingress_strips_port() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.control_plane.ingress = Some(IngressSpec {
            hostname: "tenant-a.k8s.example.com:8443".to_string(),
            ..Default::default()
        });
        let addr = external_address(&tcp, None).unwrap();
        assert_eq!(addr.host, "tenant-a.k8s.example.com");
        assert_eq!(addr.port, 443);
        assert_eq!(addr.endpoint(), "tenant-a.k8s.example.com:443");
    }

    #[test]
    fn test_external_address_ingress_wins_over_gateway() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.control_plane.gateway = Some(GatewaySpec {
            hostname: "gw.example.com:9443".to_string(),
        });
        let addr = external_address(&tcp, None).unwrap();
        assert_eq!(addr.host, "gw.example.com");
        assert_eq!(addr.port, 443);

        tcp.spec.control_plane.ingress = Some(IngressSpec {
            hostname: "in.example.com".to_string(),
            ..Default::default()
        });
        assert_eq!(external_address(&tcp, None).unwrap().host, "in.example.com");
    }

    #[test]
    fn test_external_address_falls_back_to_declared() {
        let mut tcp = tcp("tenant-a");
        tcp.spec.network_profile.port = 6443;
        let svc = load_balancer_service("tenant-a", &[(Some("2001:db8::1"), None)]);
        let addr = external_address(&tcp, Some(&svc)).unwrap();
        assert_eq!(addr.endpoint(), "[2001:db8::1]:6443");
    }

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("10.0.0.1", 6443), "10.0.0.1:6443");
        assert_eq!(join_host_port("::1", 443), "[::1]:443");
        assert_eq!(join_host_port("api.example.com", 443), "api.example.com:443");
    }

    #[test]
    fn test_host_and_port_from_hostname() {
        assert_eq!(
            host_and_port_from_hostname("api.example.com:8443", 443),
            ("api.example.com".to_string(), 8443)
        );
        assert_eq!(
            host_and_port_from_hostname("api.example.com", 443),
            ("api.example.com".to_string(), 443)
        );
        assert_eq!(
            host_and_port_from_hostname("api.example.com:abc", 443),
            ("api.example.com".to_string(), 443)
        );
    }

    #[test]
    fn test_assigned_control_plane_address() {
        let mut status = TenantControlPlaneStatus::default();
        assert_eq!(
            assigned_control_plane_address(&status),
            Err(AddressError::NotYetExposed)
        );

        status.control_plane_endpoint = "10.0.0.1:6443".to_string();
        assert_eq!(
            assigned_control_plane_address(&status).unwrap(),
            ("10.0.0.1".to_string(), 6443)
        );

        status.control_plane_endpoint = "[2001:db8::1]:443".to_string();
        assert_eq!(
            assigned_control_plane_address(&status).unwrap(),
            ("2001:db8::1".to_string(), 443)
        );

        status.control_plane_endpoint = "no-port".to_string();
        assert!(matches!(
            assigned_control_plane_address(&status),
            Err(AddressError::InvalidEndpoint { .. })
        ));
    }
}
