// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate authority and leaf issuance.
//!
//! Every certificate is backdated by one hour to tolerate clock skew between
//! the management cluster and tenant nodes. CAs are valid for ten years and
//! may sign one level of intermediates; leaves are valid for one year.

use super::san::SanSet;
use super::{parse_pem, validity_window, CertificatePrivateKeyPair, PkiError, Result};
use crate::constants::{CA_VALIDITY_YEARS, LEAF_VALIDITY_YEARS};
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SerialNumber,
};

/// Organization recorded in every certificate subject unless overridden.
pub const DEFAULT_ORGANIZATION: &str = "steward";

/// Key algorithm of a generated keypair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// ECDSA P-256 with SHA-256, used by the control plane CAs.
    EcdsaP256,
    /// Ed25519, used by the worker trust CA.
    Ed25519,
}

impl KeyAlgorithm {
    fn generate(self) -> Result<KeyPair> {
        let generated = match self {
            Self::EcdsaP256 => KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256),
            Self::Ed25519 => KeyPair::generate_for(&rcgen::PKCS_ED25519),
        };
        generated.map_err(|e| PkiError::KeyGenerationFailed(format!("{self:?}: {e}")))
    }
}

/// What a leaf certificate is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafUsage {
    /// TLS server, carries the SAN set.
    Server,
    /// TLS client, carries no SANs.
    Client,
}

/// Subject and usage of a leaf to issue.
#[derive(Clone, Debug)]
pub struct LeafProfile<'a> {
    pub common_name: &'a str,
    pub organization: Option<&'a str>,
    pub usage: LeafUsage,
    pub sans: &'a SanSet,
    pub algorithm: KeyAlgorithm,
}

fn distinguished_name(common_name: &str, organization: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(
        DnType::CommonName,
        DnValue::Utf8String(common_name.to_string()),
    );
    dn.push(
        DnType::OrganizationName,
        DnValue::Utf8String(organization.to_string()),
    );
    dn
}

fn random_serial() -> SerialNumber {
    let mut bytes: [u8; 16] = rand::random();
    // Keep the DER integer positive.
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

/// A CA held as PEM, loaded into an `rcgen` issuer on demand.
#[derive(Clone, Debug)]
pub struct CertificateAuthority {
    cert_pem: String,
    key_pem: String,
}

impl CertificateAuthority {
    /// Generate a fresh self-signed CA.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError`] when key generation or self-signing fails.
    pub fn generate(common_name: &str, algorithm: KeyAlgorithm) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name, DEFAULT_ORGANIZATION);
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(1));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.serial_number = Some(random_serial());

        let (not_before, not_after) = validity_window(CA_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let key = algorithm.generate()?;
        let cert = params.self_signed(&key).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!("failed to self-sign CA {common_name}: {e}"))
        })?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }

    /// Load a CA from persisted PEM.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::ParseError`] when either block is malformed.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        KeyPair::from_pem(key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA key: {e}")))?;
        parse_pem(cert_pem)?;

        Ok(Self {
            cert_pem: cert_pem.to_string(),
            key_pem: key_pem.to_string(),
        })
    }

    #[must_use]
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    #[must_use]
    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// The CA as a certificate/key pair, ready to persist.
    #[must_use]
    pub fn to_pair(&self) -> CertificatePrivateKeyPair {
        CertificatePrivateKeyPair {
            certificate: self.cert_pem.clone(),
            private_key: self.key_pem.clone(),
            chain: None,
        }
    }

    /// Issue a leaf certificate signed by this CA.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError`] when a SAN cannot be encoded, the CA cannot be
    /// loaded, or signing fails.
    pub fn issue(&self, profile: &LeafProfile<'_>) -> Result<CertificatePrivateKeyPair> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(
            profile.common_name,
            profile.organization.unwrap_or(DEFAULT_ORGANIZATION),
        );
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.serial_number = Some(random_serial());

        match profile.usage {
            LeafUsage::Server => {
                params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
                params.subject_alt_names = profile.sans.to_san_types()?;
            }
            LeafUsage::Client => {
                params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
            }
        }

        let (not_before, not_after) = validity_window(LEAF_VALIDITY_YEARS);
        params.not_before = not_before;
        params.not_after = not_after;

        let leaf_key = profile.algorithm.generate()?;
        let ca_key = KeyPair::from_pem(&self.key_pem)
            .map_err(|e| PkiError::ParseError(format!("failed to load CA key: {e}")))?;
        let issuer = Issuer::from_ca_cert_pem(&self.cert_pem, &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {e}")))?;

        let cert = params.signed_by(&leaf_key, &issuer).map_err(|e| {
            PkiError::CertificateGenerationFailed(format!(
                "failed to sign {}: {e}",
                profile.common_name
            ))
        })?;

        let certificate = cert.pem();
        Ok(CertificatePrivateKeyPair {
            chain: Some(format!("{certificate}{}", self.cert_pem)),
            certificate,
            private_key: leaf_key.serialize_pem(),
        })
    }
}

#[cfg(test)]
#[path = "authority_tests.rs"]
mod authority_tests;
