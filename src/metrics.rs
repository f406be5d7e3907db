// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Steward operator.
//!
//! All metric families live on an explicitly constructed [`Metrics`] value that
//! owns its own [`Registry`]. The binary builds one at startup and shares it
//! (behind an `Arc`) with the orchestrator, every managed resource and the
//! `/metrics` endpoint. Tests build their own instance, so nothing leaks
//! between them.
//!
//! Metric names carry the namespace prefix `steward_butlerlabs_dev_`
//! (prometheus-safe version of "steward.butlerlabs.dev").
//!
//! # Example
//!
//! ```rust,no_run
//! use steward::metrics::Metrics;
//!
//! let metrics = Metrics::new().expect("metrics registration");
//! metrics.record_reconciliation_success("TenantControlPlane", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Namespace prefix for all Steward metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "steward_butlerlabs_dev";

const DURATION_BUCKETS: &[f64] = &[0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0];

/// Outcome label of a managed resource operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceOutcome {
    Unchanged,
    Created,
    Updated,
    Deleted,
    Error,
}

impl ResourceOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Error => "error",
        }
    }
}

pub struct Metrics {
    registry: Registry,

    /// Labels: `resource_type`, `status` (`success`, `error`)
    reconciliations_total: CounterVec,

    /// Labels: `resource_type`
    reconciliation_duration_seconds: HistogramVec,

    /// Labels: `resource`, `result`
    resource_operations_total: CounterVec,

    /// Labels: `resource`
    resource_duration_seconds: HistogramVec,

    /// Labels: `certificate`, `reason`
    certificate_regenerations_total: CounterVec,

    /// Labels: `decision`, `reason`
    csr_decisions_total: CounterVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

fn counter(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> prometheus::Result<CounterVec> {
    let counter = CounterVec::new(Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn histogram(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> prometheus::Result<HistogramVec> {
    let opts = HistogramOpts::new(format!("{METRICS_NAMESPACE}_{name}"), help)
        .buckets(DURATION_BUCKETS.to_vec());
    let histogram = HistogramVec::new(opts, labels)?;
    registry.register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

impl Metrics {
    /// Build a registry with every Steward metric family registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a family is malformed or registered twice.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        Ok(Self {
            reconciliations_total: counter(
                &registry,
                "reconciliations_total",
                "Total number of reconciliations by resource type and status",
                &["resource_type", "status"],
            )?,
            reconciliation_duration_seconds: histogram(
                &registry,
                "reconciliation_duration_seconds",
                "Duration of reconciliations in seconds by resource type",
                &["resource_type"],
            )?,
            resource_operations_total: counter(
                &registry,
                "resource_operations_total",
                "Total number of managed resource operations by resource and result",
                &["resource", "result"],
            )?,
            resource_duration_seconds: histogram(
                &registry,
                "resource_duration_seconds",
                "Duration of managed resource reconciliation in seconds",
                &["resource"],
            )?,
            certificate_regenerations_total: counter(
                &registry,
                "certificate_regenerations_total",
                "Total number of certificate regenerations by certificate and reason",
                &["certificate", "reason"],
            )?,
            csr_decisions_total: counter(
                &registry,
                "csr_decisions_total",
                "Total number of kubelet serving CSR decisions",
                &["decision", "reason"],
            )?,
            registry,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_reconciliation_success(&self, resource_type: &str, duration: Duration) {
        self.reconciliations_total
            .with_label_values(&[resource_type, "success"])
            .inc();
        self.reconciliation_duration_seconds
            .with_label_values(&[resource_type])
            .observe(duration.as_secs_f64());
    }

    pub fn record_reconciliation_error(&self, resource_type: &str, duration: Duration) {
        self.reconciliations_total
            .with_label_values(&[resource_type, "error"])
            .inc();
        self.reconciliation_duration_seconds
            .with_label_values(&[resource_type])
            .observe(duration.as_secs_f64());
    }

    /// Record one managed resource step.
    pub fn record_resource(&self, resource: &str, outcome: ResourceOutcome, duration: Duration) {
        self.resource_operations_total
            .with_label_values(&[resource, outcome.as_str()])
            .inc();
        self.resource_duration_seconds
            .with_label_values(&[resource])
            .observe(duration.as_secs_f64());
    }

    pub fn record_certificate_regeneration(&self, certificate: &str, reason: &str) {
        self.certificate_regenerations_total
            .with_label_values(&[certificate, reason])
            .inc();
    }

    pub fn record_csr_decision(&self, decision: &str, reason: &str) {
        self.csr_decisions_total
            .with_label_values(&[decision, reason])
            .inc();
    }

    /// Count of resource operations, for assertions.
    #[must_use]
    pub fn resource_operation_count(&self, resource: &str, outcome: ResourceOutcome) -> f64 {
        self.resource_operations_total
            .with_label_values(&[resource, outcome.as_str()])
            .get()
    }

    /// Gather and encode all metrics in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();

        a.record_resource("service", ResourceOutcome::Created, Duration::from_millis(5));

        assert!((a.resource_operation_count("service", ResourceOutcome::Created) - 1.0).abs() < f64::EPSILON);
        assert!(b.resource_operation_count("service", ResourceOutcome::Created).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_reconciliation_success() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconciliation_success("TenantControlPlane", Duration::from_millis(500));

        let counter = metrics
            .reconciliations_total
            .with_label_values(&["TenantControlPlane", "success"]);
        assert!(counter.get() > 0.0);

        let histogram = metrics
            .reconciliation_duration_seconds
            .with_label_values(&["TenantControlPlane"]);
        assert_eq!(histogram.get_sample_count(), 1);
    }

    #[test]
    fn test_gather_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconciliation_error("TenantControlPlane", Duration::from_millis(100));
        metrics.record_certificate_regeneration("api-server-certificate", "missing_sans");
        metrics.record_csr_decision("approve", "");

        let text = metrics.gather().unwrap();
        assert!(text.contains("steward_butlerlabs_dev_reconciliations_total"));
        assert!(text.contains("steward_butlerlabs_dev_certificate_regenerations_total"));
        assert!(text.contains("steward_butlerlabs_dev_csr_decisions_total"));
    }
}
