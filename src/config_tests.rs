// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::config::OperatorConfig;
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_flags_override_defaults() {
        let config = OperatorConfig::try_parse_from([
            "steward",
            "--metrics-bind-address",
            "127.0.0.1:9000",
            "--cert-expiration-threshold",
            "3600",
            "--csr-resync-interval",
            "0",
        ])
        .unwrap();

        assert_eq!(config.metrics_bind_address.port(), 9000);
        assert_eq!(config.expiration_threshold(), Duration::from_secs(3600));
        assert_eq!(config.csr_resync(), Duration::from_secs(1));
    }

    #[test]
    fn test_default_threshold_is_one_day() {
        let config = OperatorConfig::default();
        assert_eq!(config.expiration_threshold(), Duration::from_secs(86_400));
        assert_eq!(config.metrics_bind_address.port(), 8080);
    }

    #[test]
    fn test_rejects_invalid_bind_address() {
        assert!(OperatorConfig::try_parse_from(["steward", "--metrics-bind-address", "nope"]).is_err());
    }
}
