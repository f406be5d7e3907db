// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! X.509 material for tenant control planes.
//!
//! - [`authority`] issues CAs and leaf certificates with `rcgen`
//! - [`san`] computes the Subject Alternative Names a certificate must carry
//! - [`validity`] re-checks persisted material with `x509-parser`
//! - [`trust`] manages the worker bootstrap credentials (a separate Ed25519 CA)
//!
//! Private keys never leave the Secret they are generated for; PEM strings are
//! the interchange format between generation, validation and persistence.

pub mod authority;
pub mod san;
pub mod trust;
pub mod validity;

use thiserror::Error;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("certificate generation failed: {0}")]
    CertificateGenerationFailed(String),

    #[error("certificate parsing error: {0}")]
    ParseError(String),

    #[error("invalid subject alternative name {0:?}")]
    InvalidSan(String),

    #[error("secret is missing key {0}")]
    MissingKey(String),
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// A certificate and its private key, PEM encoded.
///
/// `chain` holds the leaf followed by its issuer when the consumer needs the
/// full chain to complete a TLS handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificatePrivateKeyPair {
    pub certificate: String,
    pub private_key: String,
    pub chain: Option<String>,
}

/// Decode the first PEM block and return its DER bytes.
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let block = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {e}")))?;
    Ok(block.contents().to_vec())
}

/// UTF-8 view of a Secret value holding PEM text.
pub fn pem_str<'a>(data: &'a [u8], key: &str) -> Result<&'a str> {
    std::str::from_utf8(data)
        .map_err(|e| PkiError::ParseError(format!("{key} is not valid UTF-8: {e}")))
}

/// Current time minus the clock skew tolerance, and `years` after now.
pub(crate) fn validity_window(years: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    let skew = ::time::Duration::seconds(
        i64::try_from(crate::constants::CLOCK_SKEW_TOLERANCE.as_secs()).unwrap_or(3600),
    );
    (now - skew, now + ::time::Duration::days(years * 365))
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
