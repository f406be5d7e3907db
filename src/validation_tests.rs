// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `validation.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{TalosBootstrapSpec, WorkerBootstrapSpec};
    use crate::errors::ValidationError;
    use crate::test_support::tcp;
    use crate::validation::{
        is_dns1123_subdomain, validate, validate_cert_sans, validate_dns1035_label,
        validate_source_ranges, validate_worker_bootstrap,
    };

    #[test]
    fn test_dns1035_label() {
        assert!(validate_dns1035_label("tenant-a").is_ok());
        assert!(validate_dns1035_label("a").is_ok());
        assert!(validate_dns1035_label("1tenant").is_err());
        assert!(validate_dns1035_label("tenant-").is_err());
        assert!(validate_dns1035_label("Tenant").is_err());
        assert!(validate_dns1035_label("tenant.a").is_err());
        assert!(validate_dns1035_label("").is_err());
        assert!(validate_dns1035_label(&"a".repeat(64)).is_err());
        assert!(validate_dns1035_label(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_dns1123_subdomain() {
        assert!(is_dns1123_subdomain("api.example.com"));
        assert!(is_dns1123_subdomain("*.tenants.example.com"));
        assert!(is_dns1123_subdomain("1a.example.com"));
        assert!(!is_dns1123_subdomain("api..example.com"));
        assert!(!is_dns1123_subdomain("-api.example.com"));
        assert!(!is_dns1123_subdomain("api_example.com"));
        assert!(!is_dns1123_subdomain("*"));
    }

    #[test]
    fn test_source_ranges() {
        assert!(validate_source_ranges(&["10.0.0.0/8".to_string(), "::/0".to_string()]).is_ok());
        assert_eq!(
            validate_source_ranges(&["10.0.0.0".to_string()]),
            Err(ValidationError::InvalidSourceRange {
                value: "10.0.0.0".to_string()
            })
        );
    }

    #[test]
    fn test_cert_sans() {
        assert!(validate_cert_sans(&["10.0.0.1".to_string(), "api.example.com".to_string()]).is_ok());
        assert!(validate_cert_sans(&["not a name".to_string()]).is_err());
    }

    #[test]
    fn test_worker_bootstrap_requires_talos_section() {
        let mut tcp = tcp("tenant-a");
        assert!(validate_worker_bootstrap(&tcp).is_ok());

        tcp.spec.addons.worker_bootstrap = Some(WorkerBootstrapSpec::default());
        assert!(matches!(
            validate_worker_bootstrap(&tcp),
            Err(ValidationError::MissingProviderConfig { .. })
        ));

        tcp.spec.addons.worker_bootstrap = Some(WorkerBootstrapSpec {
            talos: Some(TalosBootstrapSpec {
                port: 0,
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(
            validate_worker_bootstrap(&tcp),
            Err(ValidationError::InvalidPort { port: 0 })
        );

        tcp.spec.addons.worker_bootstrap = Some(WorkerBootstrapSpec {
            talos: Some(TalosBootstrapSpec::default()),
            allowed_subnets: vec!["10.0.0.0/33".to_string()],
            ..Default::default()
        });
        assert!(matches!(
            validate_worker_bootstrap(&tcp),
            Err(ValidationError::InvalidSubnet { .. })
        ));
    }

    #[test]
    fn test_validate_full_object() {
        let mut tcp = tcp("tenant-a");
        assert!(validate(&tcp).is_ok());

        tcp.spec.network_profile.load_balancer_source_ranges = vec!["bogus".to_string()];
        assert!(validate(&tcp).is_err());

        let bad_name = crate::test_support::tcp("Tenant_A");
        assert!(matches!(
            validate(&bad_name),
            Err(ValidationError::InvalidName { .. })
        ));
    }
}
