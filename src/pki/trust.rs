// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Worker bootstrap trust credentials.
//!
//! Immutable-OS worker nodes join through a trust daemon sidecar that needs an
//! OS-level CA, a server certificate chained to it and a machine token. This
//! PKI is independent from the Kubernetes CAs.
//!
//! The token is generated once and never rotated: joined workers keep using
//! it. The CA is kept until a rotation is requested. The server certificate is
//! re-validated against the CA on every reconcile and reissued when any check
//! fails or its SANs stop matching the exposure topology.

use super::authority::{CertificateAuthority, KeyAlgorithm, LeafProfile, LeafUsage};
use super::san::SanSet;
use super::validity::{check_leaf, InvalidCertificate};
use super::{pem_str, CertificatePrivateKeyPair, PkiError, Result};
use crate::constants::{TRUST_TOKEN_BYTES, TRUST_TOKEN_PREFIX};
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::time::Duration;

pub const OS_CA_CERT_KEY: &str = "os-ca.crt";
pub const OS_CA_KEY_KEY: &str = "os-ca.key";
pub const SERVER_CERT_KEY: &str = "server.crt";
pub const SERVER_KEY_KEY: &str = "server.key";
pub const TOKEN_KEY: &str = "token";

/// Common name of the trust daemon server certificate.
pub const TRUSTD_SERVER_CN: &str = "steward-trustd";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustCredentials {
    pub ca_cert: String,
    pub ca_key: String,
    /// Server certificate followed by the CA certificate.
    pub server_chain: String,
    pub server_key: String,
    pub token: String,
}

/// `butler.` followed by 32 hex characters.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; TRUST_TOKEN_BYTES] = rand::random();
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{TRUST_TOKEN_PREFIX}.{hex}")
}

/// Token stored in a Secret payload, if any.
#[must_use]
pub fn stored_token(data: Option<&BTreeMap<String, ByteString>>) -> Option<String> {
    data?
        .get(TOKEN_KEY)
        .and_then(|t| std::str::from_utf8(&t.0).ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn issue_server(ca: &CertificateAuthority, sans: &SanSet) -> Result<(String, String)> {
    let pair = ca.issue(&LeafProfile {
        common_name: TRUSTD_SERVER_CN,
        organization: None,
        usage: LeafUsage::Server,
        sans,
        algorithm: KeyAlgorithm::Ed25519,
    })?;
    let chain = pair
        .chain
        .unwrap_or_else(|| format!("{}{}", pair.certificate, ca.cert_pem()));
    Ok((chain, pair.private_key))
}

impl TrustCredentials {
    /// Generate a complete credential set for `cluster_name`.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError`] when key generation or signing fails.
    pub fn generate(cluster_name: &str, sans: &SanSet) -> Result<Self> {
        let ca = CertificateAuthority::generate(&format!("{cluster_name} OS CA"), KeyAlgorithm::Ed25519)?;
        let (server_chain, server_key) = issue_server(&ca, sans)?;

        Ok(Self {
            ca_cert: ca.cert_pem().to_string(),
            ca_key: ca.key_pem().to_string(),
            server_chain,
            server_key,
            token: generate_token(),
        })
    }

    /// New CA and server certificate, keeping `token` when one exists.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError`] when key generation or signing fails.
    pub fn rotate(cluster_name: &str, sans: &SanSet, token: Option<String>) -> Result<Self> {
        let mut creds = Self::generate(cluster_name, sans)?;
        if let Some(token) = token {
            creds.token = token;
        }
        Ok(creds)
    }

    /// Reissue the server certificate with the existing CA. CA and token are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError`] when the stored CA cannot be loaded or signing fails.
    pub fn regenerate_server(&self, sans: &SanSet) -> Result<Self> {
        let ca = CertificateAuthority::from_pem(&self.ca_cert, &self.ca_key)?;
        let (server_chain, server_key) = issue_server(&ca, sans)?;
        Ok(Self {
            server_chain,
            server_key,
            ..self.clone()
        })
    }

    /// SANs embedded in the server certificate.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError::ParseError`] when the chain cannot be parsed.
    pub fn server_sans(&self) -> Result<SanSet> {
        SanSet::from_certificate_pem(&self.server_chain)
    }

    /// Re-validate the server certificate against the stored CA.
    ///
    /// On top of the leaf checks (key match, CA signature, expiry, required
    /// SANs), SANs that are no longer required also fail.
    ///
    /// # Errors
    ///
    /// Returns the first failed check.
    pub fn check_server(
        &self,
        required: &SanSet,
        threshold: Duration,
    ) -> std::result::Result<(), InvalidCertificate> {
        let pair = CertificatePrivateKeyPair {
            certificate: self.server_chain.clone(),
            private_key: self.server_key.clone(),
            chain: None,
        };
        check_leaf(&pair, &self.ca_cert, required, threshold)?;

        let embedded = self.server_sans()?;
        let extra = required.missing_from(&embedded);
        if !extra.is_empty() {
            return Err(InvalidCertificate::UnexpectedSans { extra });
        }
        Ok(())
    }

    /// Secret payload.
    #[must_use]
    pub fn to_secret_data(&self) -> BTreeMap<String, ByteString> {
        BTreeMap::from([
            (OS_CA_CERT_KEY.to_string(), ByteString(self.ca_cert.clone().into_bytes())),
            (OS_CA_KEY_KEY.to_string(), ByteString(self.ca_key.clone().into_bytes())),
            (SERVER_CERT_KEY.to_string(), ByteString(self.server_chain.clone().into_bytes())),
            (SERVER_KEY_KEY.to_string(), ByteString(self.server_key.clone().into_bytes())),
            (TOKEN_KEY.to_string(), ByteString(self.token.clone().into_bytes())),
        ])
    }

    /// Load credentials from a Secret payload.
    ///
    /// Returns `Ok(None)` when the CA has never been generated. A lost token is
    /// replaced; a lost server certificate is left empty so it gets reissued.
    ///
    /// # Errors
    ///
    /// Returns [`PkiError`] when the CA exists but its key is missing or not UTF-8.
    pub fn from_secret_data(data: Option<&BTreeMap<String, ByteString>>) -> Result<Option<Self>> {
        let Some(data) = data else {
            return Ok(None);
        };
        match data.get(OS_CA_CERT_KEY) {
            Some(ca) if !ca.0.is_empty() => {}
            _ => return Ok(None),
        }

        let field = |key: &str| -> Result<String> {
            let value = data
                .get(key)
                .ok_or_else(|| PkiError::MissingKey(key.to_string()))?;
            Ok(pem_str(&value.0, key)?.to_string())
        };

        Ok(Some(Self {
            ca_cert: field(OS_CA_CERT_KEY)?,
            ca_key: field(OS_CA_KEY_KEY)?,
            server_chain: field(SERVER_CERT_KEY).unwrap_or_default(),
            server_key: field(SERVER_KEY_KEY).unwrap_or_default(),
            token: field(TOKEN_KEY)
                .ok()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(generate_token),
        }))
    }
}

#[cfg(test)]
#[path = "trust_tests.rs"]
mod trust_tests;
