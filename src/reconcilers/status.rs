// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers and the status persistence seam.
//!
//! Kubernetes conditions follow a standard format:
//! - `type`: The aspect of the resource being reported (e.g., "Ready")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the condition changed
//!
//! Managed resources only mutate the in-memory status. Persisting it goes
//! through [`StatusWriter`], implemented against the status subresource by
//! [`KubeStatusWriter`].
//!
//! The status is written with server-side apply and always carries the full
//! projection. Fields the operator stops reporting, for example after an addon
//! is disabled, are removed by the API server.

use crate::constants::{API_GROUP_VERSION, FIELD_MANAGER, KIND_TENANT_CONTROL_PLANE};
use crate::crd::{Condition, KubernetesVersionStatus, TenantControlPlane};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Condition type summarizing overall readiness.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Create a new Kubernetes condition with the current timestamp.
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a mutable conditions list (in-memory, no API call).
///
/// The `lastTransitionTime` is preserved when the status value is unchanged.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Compare two condition lists ignoring `lastTransitionTime`.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        current.iter().any(|c| {
            c.r#type == new_cond.r#type
                && c.status == new_cond.status
                && c.reason == new_cond.reason
                && c.message == new_cond.message
        })
    })
}

/// Map the version status onto the `Ready` condition `(status, reason, message)`.
#[must_use]
pub fn ready_condition_for(
    version_status: KubernetesVersionStatus,
) -> (&'static str, &'static str, &'static str) {
    match version_status {
        KubernetesVersionStatus::Ready => (
            "True",
            "ControlPlaneReady",
            "All control plane replicas are up to date and ready",
        ),
        KubernetesVersionStatus::Sleeping => (
            "True",
            "ControlPlaneSleeping",
            "Control plane is scaled to zero replicas",
        ),
        KubernetesVersionStatus::Provisioning => {
            ("False", "Provisioning", "Control plane is being provisioned")
        }
        KubernetesVersionStatus::Upgrading => (
            "False",
            "Upgrading",
            "Control plane is rolling out a new version",
        ),
        KubernetesVersionStatus::NotReady => {
            ("False", "NotReady", "No control plane replica is ready")
        }
        KubernetesVersionStatus::WriteLimited => (
            "False",
            "WriteLimited",
            "Write operations are blocked on the tenant API server",
        ),
        KubernetesVersionStatus::Unknown => (
            "Unknown",
            "Unknown",
            "Control plane state could not be determined",
        ),
    }
}

/// Refresh the `Ready` condition and `observedGeneration` from the recorded version status.
pub fn refresh_ready_condition(tcp: &mut TenantControlPlane) {
    let generation = tcp.metadata.generation;
    let status = tcp.status_mut();
    let (value, reason, message) = ready_condition_for(status.kubernetes.version.status.unwrap_or_default());
    update_condition_in_memory(
        &mut status.conditions,
        CONDITION_TYPE_READY,
        value,
        reason,
        message,
    );
    status.observed_generation = generation;
}

/// Whether the `Ready` condition is currently true.
#[must_use]
pub fn is_ready(tcp: &TenantControlPlane) -> bool {
    tcp.status
        .as_ref()
        .and_then(|s| find_condition(&s.conditions, CONDITION_TYPE_READY))
        .is_some_and(|c| c.status == "True")
}

/// Persists the in-memory status of a tenant control plane.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Write `tcp.status` to the API server.
    async fn write_status(&self, tcp: &TenantControlPlane) -> Result<()>;
}

/// Server-side apply configuration of the status subresource.
#[must_use]
pub fn status_apply_patch(tcp: &TenantControlPlane) -> serde_json::Value {
    json!({
        "apiVersion": API_GROUP_VERSION,
        "kind": KIND_TENANT_CONTROL_PLANE,
        "status": tcp.status,
    })
}

/// [`StatusWriter`] applying the status subresource.
#[derive(Clone)]
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn write_status(&self, tcp: &TenantControlPlane) -> Result<()> {
        let namespace = tcp.namespace().unwrap_or_default();
        let name = tcp.name_any();
        let api: Api<TenantControlPlane> = Api::namespaced(self.client.clone(), &namespace);

        let patch = status_apply_patch(tcp);
        api.patch_status(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&patch),
        )
        .await
        .with_context(|| format!("failed to patch status of {namespace}/{name}"))?;

        debug!(tcp = %name, namespace = %namespace, "Updated TenantControlPlane status");
        Ok(())
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
