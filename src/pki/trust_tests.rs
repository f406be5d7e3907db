// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `trust.rs`

#[cfg(test)]
mod tests {
    use crate::pki::san::SanSet;
    use crate::pki::authority::{CertificateAuthority, KeyAlgorithm, LeafProfile, LeafUsage};
    use crate::pki::trust::{
        generate_token, stored_token, TrustCredentials, OS_CA_CERT_KEY, TOKEN_KEY,
        TRUSTD_SERVER_CN,
    };
    use crate::pki::validity::{check_leaf, CertificateInfo, InvalidCertificate};
    use crate::pki::CertificatePrivateKeyPair;
    use std::time::Duration;

    const THRESHOLD: Duration = Duration::from_secs(60);

    fn sans(entries: &[&str]) -> SanSet {
        let mut set = SanSet::new();
        set.extend(entries.iter().copied());
        set
    }

    #[test]
    fn test_token_format() {
        let token = generate_token();
        let (prefix, hex) = token.split_once('.').unwrap();
        assert_eq!(prefix, "butler");
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_token(), token);
    }

    #[test]
    fn test_generate_full_set() {
        let required = sans(&["203.0.113.5", "tenant-a.k8s.example.com"]);
        let creds = TrustCredentials::generate("tenant-a", &required).unwrap();

        let ca_info = CertificateInfo::from_pem(&creds.ca_cert).unwrap();
        assert_eq!(ca_info.common_name, "tenant-a OS CA");

        let server_info = CertificateInfo::from_pem(&creds.server_chain).unwrap();
        assert_eq!(server_info.common_name, TRUSTD_SERVER_CN);
        assert!(creds.server_chain.ends_with(&creds.ca_cert));
        assert!(creds.check_server(&required, THRESHOLD).is_ok());

        let leaf = CertificatePrivateKeyPair {
            certificate: creds.server_chain.clone(),
            private_key: creds.server_key.clone(),
            chain: None,
        };
        assert!(check_leaf(&leaf, &creds.ca_cert, &required, THRESHOLD).is_ok());
    }

    #[test]
    fn test_san_divergence_regenerates_server_only() {
        let creds = TrustCredentials::generate("tenant-a", &sans(&["203.0.113.5"])).unwrap();
        let required = sans(&["203.0.113.6"]);
        assert!(matches!(
            creds.check_server(&required, THRESHOLD),
            Err(InvalidCertificate::MissingSans { .. })
        ));

        let updated = creds.regenerate_server(&required).unwrap();
        assert_eq!(updated.ca_cert, creds.ca_cert);
        assert_eq!(updated.ca_key, creds.ca_key);
        assert_eq!(updated.token, creds.token);
        assert_ne!(updated.server_chain, creds.server_chain);
        assert!(updated.check_server(&required, THRESHOLD).is_ok());
    }

    #[test]
    fn test_removed_san_counts_as_divergence() {
        let creds = TrustCredentials::generate("tenant-a", &sans(&["203.0.113.5", "10.0.0.1"]))
            .unwrap();
        match creds.check_server(&sans(&["203.0.113.5"]), THRESHOLD) {
            Err(InvalidCertificate::UnexpectedSans { extra }) => assert_eq!(extra, vec!["10.0.0.1"]),
            other => panic!("expected UnexpectedSans, got {other:?}"),
        }
    }

    #[test]
    fn test_server_signed_by_foreign_ca_is_rejected() {
        let required = sans(&["203.0.113.5"]);
        let creds = TrustCredentials::generate("tenant-a", &required).unwrap();

        let foreign = CertificateAuthority::generate("foreign", KeyAlgorithm::Ed25519).unwrap();
        let leaf = foreign
            .issue(&LeafProfile {
                common_name: TRUSTD_SERVER_CN,
                organization: None,
                usage: LeafUsage::Server,
                sans: &required,
                algorithm: KeyAlgorithm::Ed25519,
            })
            .unwrap();
        let tampered = TrustCredentials {
            server_chain: leaf.certificate,
            server_key: leaf.private_key,
            ..creds.clone()
        };
        assert!(matches!(
            tampered.check_server(&required, THRESHOLD),
            Err(InvalidCertificate::SignatureInvalid)
        ));

        let swapped_key = TrustCredentials {
            server_key: tampered.server_key.clone(),
            ..creds
        };
        assert!(matches!(
            swapped_key.check_server(&required, THRESHOLD),
            Err(InvalidCertificate::KeyMismatch)
        ));
    }

    #[test]
    fn test_server_within_threshold_is_rejected() {
        let required = sans(&["203.0.113.5"]);
        let creds = TrustCredentials::generate("tenant-a", &required).unwrap();
        let far = Duration::from_secs(100 * 365 * 24 * 3600);
        assert!(matches!(
            creds.check_server(&required, far),
            Err(InvalidCertificate::Expiring { .. })
        ));
    }

    #[test]
    fn test_lost_server_certificate_is_rejected() {
        let required = sans(&["203.0.113.5"]);
        let creds = TrustCredentials {
            server_chain: String::new(),
            server_key: String::new(),
            ..TrustCredentials::generate("tenant-a", &required).unwrap()
        };
        assert!(matches!(
            creds.check_server(&required, THRESHOLD),
            Err(InvalidCertificate::Unparsable(_))
        ));
    }

    #[test]
    fn test_rotate_keeps_token() {
        let required = sans(&["203.0.113.5"]);
        let creds = TrustCredentials::generate("tenant-a", &required).unwrap();
        let token = stored_token(Some(&creds.to_secret_data()));
        assert_eq!(token.as_deref(), Some(creds.token.as_str()));

        let rotated = TrustCredentials::rotate("tenant-a", &required, token).unwrap();
        assert_eq!(rotated.token, creds.token);
        assert_ne!(rotated.ca_cert, creds.ca_cert);
        assert_ne!(rotated.server_chain, creds.server_chain);
        assert!(rotated.check_server(&required, THRESHOLD).is_ok());

        let fresh = TrustCredentials::rotate("tenant-a", &required, None).unwrap();
        assert_ne!(fresh.token, creds.token);
    }

    #[test]
    fn test_stored_token_ignores_blank_values() {
        assert!(stored_token(None).is_none());
        let mut data = std::collections::BTreeMap::new();
        data.insert(TOKEN_KEY.to_string(), k8s_openapi::ByteString(b"  \n".to_vec()));
        assert!(stored_token(Some(&data)).is_none());
        data.insert(TOKEN_KEY.to_string(), k8s_openapi::ByteString(b"butler.abc\n".to_vec()));
        assert_eq!(stored_token(Some(&data)).as_deref(), Some("butler.abc"));
    }

    #[test]
    fn test_secret_data_round() {
        let creds = TrustCredentials::generate("tenant-a", &sans(&["10.0.0.1"])).unwrap();
        let data = creds.to_secret_data();
        assert_eq!(data.len(), 5);
        let loaded = TrustCredentials::from_secret_data(Some(&data)).unwrap().unwrap();
        assert_eq!(loaded, creds);
    }

    #[test]
    fn test_from_secret_data_without_ca() {
        assert!(TrustCredentials::from_secret_data(None).unwrap().is_none());

        let mut data = std::collections::BTreeMap::new();
        data.insert(TOKEN_KEY.to_string(), k8s_openapi::ByteString(b"butler.x".to_vec()));
        assert!(TrustCredentials::from_secret_data(Some(&data))
            .unwrap()
            .is_none());

        data.insert(OS_CA_CERT_KEY.to_string(), k8s_openapi::ByteString(Vec::new()));
        assert!(TrustCredentials::from_secret_data(Some(&data))
            .unwrap()
            .is_none());
    }
}
