// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `kubeadm_config.rs`

#[cfg(test)]
mod tests {
    use crate::checksum::get_object_checksum;
    use crate::crd::{IngressSpec, ServiceType};
    use crate::resources::kubeadm_config::{
        build_kubeadm_config_template, kubeadm_config_status, mutate_kubeadm_config,
        render_kubeadm_config, KUBEADM_CONFIG_KEY,
    };
    use crate::test_support::{load_balancer_service, service, tcp};

    fn documents(payload: &str) -> Vec<serde_yaml::Value> {
        payload
            .split("---\n")
            .map(|doc| serde_yaml::from_str(doc).unwrap())
            .collect()
    }

    #[test]
    fn test_render_uses_declared_and_external_address() {
        let mut tcp = tcp("alpha");
        tcp.spec.network_profile.cert_sans = vec!["api.example.com".to_string()];
        tcp.spec.network_profile.pod_cidr = Some("10.200.0.0/16".to_string());

        let payload = render_kubeadm_config(&tcp, "10.0.0.5", "alpha.example.com:443").unwrap();
        let docs = documents(&payload);
        assert_eq!(docs.len(), 2);

        let cluster = &docs[0];
        assert_eq!(cluster["kind"].as_str(), Some("ClusterConfiguration"));
        assert_eq!(cluster["kubernetesVersion"].as_str(), Some("v1.31.2"));
        assert_eq!(cluster["controlPlaneEndpoint"].as_str(), Some("alpha.example.com:443"));
        assert_eq!(cluster["networking"]["dnsDomain"].as_str(), Some("cluster.local"));
        assert_eq!(cluster["networking"]["podSubnet"].as_str(), Some("10.200.0.0/16"));
        assert_eq!(cluster["networking"]["serviceSubnet"].as_str(), Some("10.96.0.0/16"));
        assert_eq!(cluster["apiServer"]["certSANs"][0].as_str(), Some("api.example.com"));

        let init = &docs[1];
        assert_eq!(init["kind"].as_str(), Some("InitConfiguration"));
        assert_eq!(init["localAPIEndpoint"]["advertiseAddress"].as_str(), Some("10.0.0.5"));
        assert_eq!(init["localAPIEndpoint"]["bindPort"].as_i64(), Some(6443));
    }

    #[test]
    fn test_mutate_with_ingress_keeps_ip_advertise_address() {
        let mut tcp = tcp("alpha");
        tcp.spec.control_plane.ingress = Some(IngressSpec {
            hostname: "alpha.k8s.example.com".to_string(),
            ..Default::default()
        });
        let svc = service("alpha", "ClusterIP", "10.96.0.20");

        let mut cm = build_kubeadm_config_template(&tcp);
        mutate_kubeadm_config(&mut cm, &tcp, Some(&svc)).unwrap();

        let payload = &cm.data.as_ref().unwrap()[KUBEADM_CONFIG_KEY];
        let docs = documents(payload);
        assert_eq!(
            docs[0]["controlPlaneEndpoint"].as_str(),
            Some("alpha.k8s.example.com:443")
        );
        assert_eq!(
            docs[1]["localAPIEndpoint"]["advertiseAddress"].as_str(),
            Some("10.96.0.20")
        );
        assert_eq!(cm.metadata.name.as_deref(), Some("alpha-kubeadmconfig"));
        assert!(get_object_checksum(&cm.metadata).is_some());
    }

    #[test]
    fn test_mutate_is_deterministic() {
        let tcp = tcp("alpha");
        let svc = service("alpha", "ClusterIP", "10.96.0.20");
        let mut first = build_kubeadm_config_template(&tcp);
        mutate_kubeadm_config(&mut first, &tcp, Some(&svc)).unwrap();
        let mut second = first.clone();
        mutate_kubeadm_config(&mut second, &tcp, Some(&svc)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mutate_fails_until_load_balancer_is_exposed() {
        let mut tcp = tcp("alpha");
        tcp.spec.control_plane.service.service_type = ServiceType::LoadBalancer;
        let pending = load_balancer_service("alpha", &[]);
        let mut cm = build_kubeadm_config_template(&tcp);
        assert!(mutate_kubeadm_config(&mut cm, &tcp, Some(&pending)).is_err());
        assert!(mutate_kubeadm_config(&mut cm, &tcp, None).is_err());

        let exposed = load_balancer_service("alpha", &[(Some("192.0.2.10"), None)]);
        mutate_kubeadm_config(&mut cm, &tcp, Some(&exposed)).unwrap();
        let docs = documents(&cm.data.as_ref().unwrap()[KUBEADM_CONFIG_KEY]);
        assert_eq!(docs[0]["controlPlaneEndpoint"].as_str(), Some("192.0.2.10:6443"));
    }

    #[test]
    fn test_checksum_follows_spec_changes() {
        let mut tcp = tcp("alpha");
        let svc = service("alpha", "ClusterIP", "10.96.0.20");
        let mut cm = build_kubeadm_config_template(&tcp);
        mutate_kubeadm_config(&mut cm, &tcp, Some(&svc)).unwrap();
        let before = kubeadm_config_status(&cm);
        assert_eq!(before.configmap_name, "alpha-kubeadmconfig");

        tcp.spec.kubernetes.version = "v1.32.0".to_string();
        mutate_kubeadm_config(&mut cm, &tcp, Some(&svc)).unwrap();
        assert_ne!(kubeadm_config_status(&cm).checksum, before.checksum);
    }
}
