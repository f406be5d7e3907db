// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for tenant control planes.
//!
//! # Reconciliation Architecture
//!
//! Steward follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - `kube::runtime::Controller` monitors `TenantControlPlane` changes
//! 2. **Reconcile** - [`reconcile_tenant_control_plane`] drives the managed
//!    resources through the [`orchestrator::Orchestrator`]
//! 3. **Status** - each resource projects what it observed into the status
//! 4. **Trigger** - the reconciled object is handed to the CSR approval loop
//!
//! # Building blocks
//!
//! - [`upsert`] - idempotent create-or-update with conflict retries
//! - [`retry`] - jittered backoff for 409 conflicts
//! - [`finalizers`] - finalizer helpers
//! - [`status`] - conditions and the status writer seam
//! - [`csr_approval`] - worker bootstrap loop (RBAC, kubelet serving CSRs)

pub mod csr_approval;
pub mod finalizers;
pub mod orchestrator;
pub mod retry;
pub mod status;
pub mod tenantcontrolplane;
pub mod upsert;

pub use csr_approval::run_csr_approval_loop;
pub use tenantcontrolplane::reconcile_tenant_control_plane;
