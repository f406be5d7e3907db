// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `ingress.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{IngressControllerType, IngressSpec, KubernetesIngressStatus};
    use crate::resources::ingress::{
        build_ingress_template, controller_annotations, ingress_status, mutate_ingress,
    };
    use crate::test_support::tcp;
    use std::collections::BTreeMap;

    fn exposed(controller: IngressControllerType) -> crate::crd::TenantControlPlane {
        let mut tcp = tcp("alpha");
        tcp.spec.control_plane.ingress = Some(IngressSpec {
            hostname: "alpha.k8s.example.com:443".to_string(),
            ingress_class_name: Some("nginx".to_string()),
            controller_type: controller,
            ..Default::default()
        });
        let status = tcp.status_mut();
        status.kubernetes.service.name = "alpha".to_string();
        status.kubernetes.service.port = 6443;
        tcp
    }

    #[test]
    fn test_controller_annotations() {
        assert_eq!(
            controller_annotations(IngressControllerType::Haproxy)
                .get("haproxy.org/ssl-passthrough")
                .map(String::as_str),
            Some("true")
        );
        let nginx = controller_annotations(IngressControllerType::Nginx);
        assert_eq!(nginx.len(), 2);
        assert_eq!(
            nginx.get("nginx.ingress.kubernetes.io/backend-protocol").map(String::as_str),
            Some("HTTPS")
        );
        assert!(controller_annotations(IngressControllerType::Generic).is_empty());
    }

    #[test]
    fn test_mutate_ingress_routes_to_service() {
        let tcp = exposed(IngressControllerType::Nginx);
        let mut ing = build_ingress_template(&tcp);
        mutate_ingress(&mut ing, &tcp).unwrap();

        let spec = ing.spec.as_ref().unwrap();
        assert_eq!(spec.ingress_class_name.as_deref(), Some("nginx"));
        let rule = &spec.rules.as_ref().unwrap()[0];
        assert_eq!(rule.host.as_deref(), Some("alpha.k8s.example.com"));
        let path = &rule.http.as_ref().unwrap().paths[0];
        assert_eq!(path.path.as_deref(), Some("/"));
        assert_eq!(path.path_type, "Prefix");
        let backend = path.backend.service.as_ref().unwrap();
        assert_eq!(backend.name, "alpha");
        assert_eq!(backend.port.as_ref().unwrap().number, Some(6443));
        assert_eq!(
            spec.tls.as_ref().unwrap()[0].hosts,
            Some(vec!["alpha.k8s.example.com".to_string()])
        );
        assert!(ing.metadata.owner_references.is_some());
    }

    #[test]
    fn test_user_annotations_override_controller_defaults() {
        let mut tcp = exposed(IngressControllerType::Nginx);
        if let Some(spec) = tcp.spec.control_plane.ingress.as_mut() {
            spec.additional_metadata.annotations = BTreeMap::from([(
                "nginx.ingress.kubernetes.io/backend-protocol".to_string(),
                "GRPCS".to_string(),
            )]);
        }
        let mut ing = build_ingress_template(&tcp);
        mutate_ingress(&mut ing, &tcp).unwrap();
        assert_eq!(
            ing.metadata
                .annotations
                .unwrap()
                .get("nginx.ingress.kubernetes.io/backend-protocol")
                .map(String::as_str),
            Some("GRPCS")
        );
    }

    #[test]
    fn test_mutate_requires_service_status_and_hostname() {
        let mut tcp = exposed(IngressControllerType::Generic);
        tcp.status_mut().kubernetes.service.port = 0;
        let mut ing = build_ingress_template(&tcp);
        let err = mutate_ingress(&mut ing, &tcp).unwrap_err();
        assert!(err.to_string().contains("cannot be configured yet"));

        let mut tcp = exposed(IngressControllerType::Generic);
        if let Some(spec) = tcp.spec.control_plane.ingress.as_mut() {
            spec.hostname.clear();
        }
        assert!(mutate_ingress(&mut ing, &tcp).is_err());
    }

    #[test]
    fn test_ingress_status_follows_spec() {
        let tcp = exposed(IngressControllerType::Generic);
        let mut ing = build_ingress_template(&tcp);
        mutate_ingress(&mut ing, &tcp).unwrap();

        assert_eq!(
            ingress_status(&tcp, Some(&ing)),
            Some(KubernetesIngressStatus {
                name: "alpha".to_string(),
                namespace: "tenants".to_string(),
                load_balancer: None,
            })
        );

        let plain = crate::test_support::tcp("alpha");
        assert_eq!(ingress_status(&plain, Some(&ing)), None);
    }
}
