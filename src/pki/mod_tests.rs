// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `pki/mod.rs`

#[cfg(test)]
mod tests {
    use crate::pki::{parse_pem, pem_str, validity_window, PkiError};

    #[test]
    fn test_parse_pem_rejects_garbage() {
        let err = parse_pem("not a pem").unwrap_err();
        assert!(matches!(err, PkiError::ParseError(_)));
    }

    #[test]
    fn test_parse_pem_returns_contents() {
        let block = ::pem::Pem::new("CERTIFICATE", vec![1u8, 2, 3]);
        let encoded = ::pem::encode(&block);
        assert_eq!(parse_pem(&encoded).unwrap(), vec![1u8, 2, 3]);
    }

    #[test]
    fn test_pem_str_rejects_invalid_utf8() {
        assert!(pem_str(&[0xff, 0xfe], "tls.crt").is_err());
        assert_eq!(pem_str(b"abc", "tls.crt").unwrap(), "abc");
    }

    #[test]
    fn test_validity_window_is_backdated() {
        let now = ::time::OffsetDateTime::now_utc();
        let (not_before, not_after) = validity_window(1);
        assert!(not_before < now - ::time::Duration::minutes(59));
        assert!(not_after > now + ::time::Duration::days(364));
    }
}
