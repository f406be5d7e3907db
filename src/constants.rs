// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Steward operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

use std::time::Duration;

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `TenantControlPlane` CRD
pub const API_GROUP: &str = "steward.butlerlabs.dev";

/// API version for the `TenantControlPlane` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "steward.butlerlabs.dev/v1alpha1";

/// Kind name for `TenantControlPlane` resource
pub const KIND_TENANT_CONTROL_PLANE: &str = "TenantControlPlane";

/// Field manager used for server-side writes
pub const FIELD_MANAGER: &str = "steward-controller";

// ============================================================================
// Network Constants
// ============================================================================

/// Default port the tenant kube-apiserver listens on
pub const DEFAULT_API_SERVER_PORT: i32 = 6443;

/// Port used for Ingress and Gateway exposure (TLS passthrough)
pub const INGRESS_GATEWAY_PORT: i32 = 443;

/// Default port for the worker bootstrap trust daemon
pub const DEFAULT_TRUSTD_PORT: i32 = 50001;

/// Name of the primary Service port
pub const API_SERVER_PORT_NAME: &str = "kube-apiserver";

/// Name of the Service port carrying trust daemon traffic
pub const TRUSTD_PORT_NAME: &str = "steward-trustd";

/// Default cluster domain used when the spec omits it
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Default service CIDR used when the spec omits it
pub const DEFAULT_SERVICE_CIDR: &str = "10.96.0.0/16";

/// Default pod CIDR used when the spec omits it
pub const DEFAULT_POD_CIDR: &str = "10.244.0.0/16";

// ============================================================================
// Deployment Constants
// ============================================================================

/// Replica count assumed when the spec leaves it unset
pub const DEFAULT_CONTROL_PLANE_REPLICAS: i32 = 2;

/// Container registry for upstream control plane images
pub const KUBERNETES_IMAGE_REGISTRY: &str = "registry.k8s.io";

/// Default trust daemon image
pub const DEFAULT_TRUSTD_IMAGE: &str = "ghcr.io/butlerdotdev/steward-trustd";

// ============================================================================
// Tenant Cluster Addon Constants
// ============================================================================

/// Namespace inside the tenant cluster hosting Steward addons
pub const TENANT_ADDON_NAMESPACE: &str = "kube-system";

/// Name shared by the tcp-proxy Deployment, Service and ServiceAccount
pub const TCP_PROXY_NAME: &str = "steward-tcp-proxy";

/// Name shared by the tcp-proxy ClusterRole and ClusterRoleBinding
pub const TCP_PROXY_RBAC_NAME: &str = "steward:tcp-proxy";

/// Default tcp-proxy image
pub const DEFAULT_TCP_PROXY_IMAGE: &str =
    "ghcr.io/butlerdotdev/steward-tcp-proxy:tls-termination-20260208151640";

/// tcp-proxy listening port
pub const TCP_PROXY_PORT: i32 = 6443;

/// tcp-proxy health endpoint port
pub const TCP_PROXY_HEALTH_PORT: i32 = 8080;

/// tcp-proxy metrics port
pub const TCP_PROXY_METRICS_PORT: i32 = 9090;

/// tcp-proxy replica count
pub const TCP_PROXY_REPLICAS: i32 = 2;

/// Secret (in the TCP namespace) holding the tenant admin kubeconfig
pub const ADMIN_KUBECONFIG_SUFFIX: &str = "admin-kubeconfig";

/// Key of the admin kubeconfig inside its Secret
pub const ADMIN_KUBECONFIG_KEY: &str = "admin.conf";

// ============================================================================
// PKI Constants
// ============================================================================

/// CA validity period in years
pub const CA_VALIDITY_YEARS: i64 = 10;

/// Leaf certificate validity period in years
pub const LEAF_VALIDITY_YEARS: i64 = 1;

/// Backdating applied to `NotBefore` to tolerate clock skew
pub const CLOCK_SKEW_TOLERANCE: Duration = Duration::from_secs(60 * 60);

/// Default window before `NotAfter` in which a certificate counts as expiring
pub const DEFAULT_CERT_EXPIRATION_THRESHOLD_SECS: u64 = 24 * 60 * 60;

/// Prefix of worker bootstrap tokens
pub const TRUST_TOKEN_PREFIX: &str = "butler";

/// Number of random bytes in a worker bootstrap token
pub const TRUST_TOKEN_BYTES: usize = 16;

// ============================================================================
// Reconciliation Constants
// ============================================================================

/// Number of attempts for an upsert that keeps hitting version conflicts
pub const CONFLICT_RETRY_STEPS: u32 = 5;

/// Base sleep between conflict retries (milliseconds)
pub const CONFLICT_RETRY_BASE_MILLIS: u64 = 10;

/// Deadline for handing a TCP to a dependent controller
pub const TRIGGER_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffered capacity of the trigger channel
pub const TRIGGER_CHANNEL_CAPACITY: usize = 128;

/// Requeue interval when the tenant control plane is ready (5 minutes)
pub const REQUEUE_WHEN_READY_SECS: u64 = 300;

/// Requeue interval when the tenant control plane is not yet ready (30 seconds)
pub const REQUEUE_WHEN_NOT_READY_SECS: u64 = 30;

/// Requeue interval after a reconcile error (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Default resync interval of the CSR approval loop (seconds)
pub const DEFAULT_CSR_RESYNC_SECS: u64 = 30;

/// Deadline for processing one tenant cluster in the CSR approval loop
pub const CSR_TENANT_TIMEOUT: Duration = Duration::from_secs(20);

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of Tokio worker threads
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Default bind address of the metrics and health server
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";
