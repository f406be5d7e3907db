// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Re-validation of persisted certificates.
//!
//! Runs on every reconcile, even when checksums match, so that expiring or
//! tampered material is replaced before clients notice.

use super::san::SanSet;
use super::{parse_pem, CertificatePrivateKeyPair, PkiError};
use rcgen::KeyPair;
use std::time::Duration;
use thiserror::Error;
use x509_parser::prelude::*;

/// Why a persisted certificate must be regenerated.
#[derive(Debug, Error)]
pub enum InvalidCertificate {
    #[error("material cannot be parsed: {0}")]
    Unparsable(#[from] PkiError),

    #[error("private key does not match the certificate public key")]
    KeyMismatch,

    #[error("certificate signature does not verify against the CA")]
    SignatureInvalid,

    #[error("certificate expires at {not_after} (within threshold)")]
    Expiring { not_after: i64 },

    #[error("certificate is missing required SANs: {missing:?}")]
    MissingSans { missing: Vec<String> },

    #[error("certificate carries SANs that are no longer required: {extra:?}")]
    UnexpectedSans { extra: Vec<String> },
}

/// Parsed facts about a certificate, detached from its DER buffer.
#[derive(Clone, Debug)]
pub struct CertificateInfo {
    pub not_before: i64,
    pub not_after: i64,
    pub common_name: String,
}

impl CertificateInfo {
    /// # Errors
    ///
    /// Returns [`PkiError::ParseError`] when the PEM or DER is malformed.
    pub fn from_pem(cert_pem: &str) -> Result<Self, PkiError> {
        let der = parse_pem(cert_pem)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {e}")))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
        })
    }

    /// Whether `NotAfter` falls within `threshold` from now.
    #[must_use]
    pub fn expires_within(&self, threshold: Duration) -> bool {
        let now = chrono::Utc::now().timestamp();
        let threshold = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);
        self.not_after <= now.saturating_add(threshold)
    }
}

/// Check that the private key matches the certificate public key.
///
/// # Errors
///
/// Returns [`InvalidCertificate::Unparsable`] or [`InvalidCertificate::KeyMismatch`].
pub fn check_key_pair(pair: &CertificatePrivateKeyPair) -> Result<(), InvalidCertificate> {
    let der = parse_pem(&pair.certificate)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {e}")))?;
    let key = KeyPair::from_pem(&pair.private_key)
        .map_err(|e| PkiError::ParseError(format!("failed to parse private key: {e}")))?;

    let cert_public = &cert.public_key().subject_public_key.data;
    if cert_public.as_ref() != rcgen::PublicKeyData::der_bytes(&key) {
        return Err(InvalidCertificate::KeyMismatch);
    }
    Ok(())
}

/// Full leaf check: key match, CA signature, expiry threshold, SAN superset.
///
/// # Errors
///
/// Returns the first failed check.
pub fn check_leaf(
    pair: &CertificatePrivateKeyPair,
    ca_cert_pem: &str,
    required: &SanSet,
    threshold: Duration,
) -> Result<(), InvalidCertificate> {
    check_key_pair(pair)?;

    let der = parse_pem(&pair.certificate)?;
    let (_, cert) = X509Certificate::from_der(&der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {e}")))?;
    let ca_der = parse_pem(ca_cert_pem)?;
    let (_, ca) = X509Certificate::from_der(&ca_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse CA certificate: {e}")))?;

    if cert.verify_signature(Some(ca.public_key())).is_err() {
        return Err(InvalidCertificate::SignatureInvalid);
    }

    let info = CertificateInfo::from_pem(&pair.certificate)?;
    if info.expires_within(threshold) {
        return Err(InvalidCertificate::Expiring {
            not_after: info.not_after,
        });
    }

    let embedded = SanSet::from_certificate_pem(&pair.certificate)?;
    if !embedded.is_superset_of(required) {
        return Err(InvalidCertificate::MissingSans {
            missing: embedded.missing_from(required),
        });
    }
    Ok(())
}

/// CA check: parse and key match only. Expiry is reported, never acted upon.
///
/// # Errors
///
/// Returns [`InvalidCertificate::Unparsable`] or [`InvalidCertificate::KeyMismatch`].
pub fn check_ca(pair: &CertificatePrivateKeyPair) -> Result<CertificateInfo, InvalidCertificate> {
    check_key_pair(pair)?;
    Ok(CertificateInfo::from_pem(&pair.certificate)?)
}

#[cfg(test)]
#[path = "validity_tests.rs"]
mod validity_tests;
