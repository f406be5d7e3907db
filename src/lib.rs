// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Steward - Tenant Control Plane Operator for Kubernetes
//!
//! Steward runs tenant Kubernetes control planes (kube-apiserver,
//! controller-manager, scheduler) as workloads of a management cluster. Each
//! control plane is described by a [`crd::TenantControlPlane`] custom resource.
//!
//! ## Overview
//!
//! This library provides the core of the operator:
//!
//! - the `TenantControlPlane` Custom Resource Definition
//! - the managed child resources and the orchestrator driving them
//! - the certificate and credential lifecycle (CAs, leaves, worker trust PKI)
//! - address resolution for ClusterIP, NodePort, LoadBalancer, Ingress and Gateway exposure
//! - the readiness state machine of the control plane version
//! - the kubelet serving CSR auto-approval policy
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`reconcilers`] - Reconciliation logic, orchestrator, CSR approval loop
//! - [`resources`] - Managed child resources
//! - [`pki`] - Certificate generation and validation
//! - [`address`] - Declared and external address resolution
//! - [`readiness`] - Version status state machine
//! - [`csr_approval`] - CSR auto-approval policy
//! - [`checksum`] - Content checksums for drift detection
//! - [`context`] - Shared context for controllers
//!
//! ## Example
//!
//! ```rust,no_run
//! use steward::crd::{KubernetesSpec, TenantControlPlane, TenantControlPlaneSpec};
//!
//! let tcp = TenantControlPlane::new(
//!     "tenant-a",
//!     TenantControlPlaneSpec {
//!         kubernetes: KubernetesSpec {
//!             version: "v1.31.2".to_string(),
//!         },
//!         ..Default::default()
//!     },
//! );
//! ```

pub mod address;
pub mod checksum;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod csr_approval;
pub mod errors;
pub mod labels;
pub mod metrics;
pub mod pki;
pub mod readiness;
pub mod reconcilers;
pub mod resources;
pub mod trigger;
pub mod validation;

#[cfg(test)]
pub(crate) mod test_support;
