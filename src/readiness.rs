// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Projection of the control plane Deployment into a version status.
//!
//! The rules are evaluated in order and the first match wins:
//!
//! | # | Condition | Status |
//! |---|-----------|--------|
//! | 1 | desired replicas is 0 | `Sleeping` |
//! | 2 | no ready replicas | `NotReady` |
//! | 3 | any write permission blocked | `WriteLimited` |
//! | 4 | rollout converged | `Ready` |
//! | 5 | recorded version differs from spec | `Upgrading` |
//! | 6 | nothing recorded yet | `Provisioning` |
//! | 7 | otherwise | `Unknown` |

use crate::constants::DEFAULT_CONTROL_PLANE_REPLICAS;
use crate::crd::{KubernetesVersionStatus, TenantControlPlane};
use k8s_openapi::api::apps::v1::Deployment;

/// Whether the Deployment is still rolling out.
///
/// A rollout is complete when the controller observed the latest generation,
/// no replica is unavailable, and updated, ready and total replicas all equal
/// the desired count.
#[must_use]
pub fn is_progressing(deployment: &Deployment) -> bool {
    let Some(status) = deployment.status.as_ref() else {
        return true;
    };
    if deployment.metadata.generation != status.observed_generation {
        return true;
    }
    if status.unavailable_replicas.unwrap_or(0) > 0 {
        return true;
    }

    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(DEFAULT_CONTROL_PLANE_REPLICAS);

    status.updated_replicas.unwrap_or(0) != desired
        || status.ready_replicas.unwrap_or(0) != desired
        || status.replicas.unwrap_or(0) != desired
}

fn ready_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
}

/// Compute the version status of a tenant control plane from its Deployment.
#[must_use]
pub fn compute_version_status(
    tcp: &TenantControlPlane,
    deployment: &Deployment,
) -> KubernetesVersionStatus {
    let recorded = tcp
        .status
        .as_ref()
        .map(|s| s.kubernetes.version.version.as_str())
        .unwrap_or_default();

    if tcp.desired_replicas() == 0 {
        KubernetesVersionStatus::Sleeping
    } else if ready_replicas(deployment) == 0 {
        KubernetesVersionStatus::NotReady
    } else if tcp.spec.write_permissions.has_any_limitation() {
        KubernetesVersionStatus::WriteLimited
    } else if !is_progressing(deployment) {
        KubernetesVersionStatus::Ready
    } else if !recorded.is_empty() && recorded != tcp.spec.kubernetes.version {
        KubernetesVersionStatus::Upgrading
    } else if recorded.is_empty() {
        KubernetesVersionStatus::Provisioning
    } else {
        KubernetesVersionStatus::Unknown
    }
}

/// Whether a status allows the recorded version to catch up with the spec.
#[must_use]
pub fn advances_version(status: KubernetesVersionStatus) -> bool {
    matches!(
        status,
        KubernetesVersionStatus::Ready | KubernetesVersionStatus::Sleeping
    )
}

/// Write the computed status into `tcp`, advancing the recorded version when allowed.
pub fn apply_version_status(tcp: &mut TenantControlPlane, status: KubernetesVersionStatus) {
    let spec_version = tcp.spec.kubernetes.version.clone();
    let version = &mut tcp.status_mut().kubernetes.version;
    version.status = Some(status);
    if advances_version(status) {
        version.version = spec_version;
    }
}

#[cfg(test)]
#[path = "readiness_tests.rs"]
mod readiness_tests;
