// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator configuration from command line flags and environment variables.

use crate::constants::{
    DEFAULT_CERT_EXPIRATION_THRESHOLD_SECS, DEFAULT_CSR_RESYNC_SECS, DEFAULT_METRICS_BIND_ADDRESS,
    DEFAULT_TCP_PROXY_IMAGE, TOKIO_WORKER_THREADS,
};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Steward tenant control plane operator
#[derive(Clone, Debug, Parser)]
#[command(name = "steward", version, about)]
pub struct OperatorConfig {
    /// Address serving `/metrics` and `/healthz`
    #[arg(long, env = "STEWARD_METRICS_BIND_ADDRESS", default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    pub metrics_bind_address: SocketAddr,

    /// Seconds before `NotAfter` at which a certificate is regenerated
    #[arg(long, env = "STEWARD_CERT_EXPIRATION_THRESHOLD", default_value_t = DEFAULT_CERT_EXPIRATION_THRESHOLD_SECS)]
    pub cert_expiration_threshold: u64,

    /// Image used for the tcp-proxy addon when the spec leaves it unset
    #[arg(long, env = "STEWARD_TCP_PROXY_IMAGE", default_value = DEFAULT_TCP_PROXY_IMAGE)]
    pub tcp_proxy_image: String,

    /// Resync interval of the CSR approval loop, in seconds
    #[arg(long, env = "STEWARD_CSR_RESYNC_INTERVAL", default_value_t = DEFAULT_CSR_RESYNC_SECS)]
    pub csr_resync_interval: u64,

    /// Number of Tokio worker threads
    #[arg(long, env = "STEWARD_WORKER_THREADS", default_value_t = TOKIO_WORKER_THREADS)]
    pub worker_threads: usize,
}

impl OperatorConfig {
    #[must_use]
    pub fn expiration_threshold(&self) -> Duration {
        Duration::from_secs(self.cert_expiration_threshold)
    }

    #[must_use]
    pub fn csr_resync(&self) -> Duration {
        Duration::from_secs(self.csr_resync_interval.max(1))
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cert_expiration_threshold: DEFAULT_CERT_EXPIRATION_THRESHOLD_SECS,
            tcp_proxy_image: DEFAULT_TCP_PROXY_IMAGE.to_string(),
            csr_resync_interval: DEFAULT_CSR_RESYNC_SECS,
            worker_threads: TOKIO_WORKER_THREADS,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
