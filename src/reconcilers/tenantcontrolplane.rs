// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `TenantControlPlane` reconciliation.
//!
//! One run per tenant control plane key:
//!
//! 1. the paused annotation short-circuits everything;
//! 2. an invalid spec is reported on the `Ready` condition, nothing is touched;
//! 3. on deletion the tenant cluster addons are removed and the finalizer dropped;
//! 4. the management cluster resources, then the tenant cluster resources, are
//!    driven by the [`Orchestrator`];
//! 5. the `Ready` condition is refreshed and the object handed to the trigger.

use super::finalizers::{ensure_finalizer, has_finalizer, is_being_deleted, remove_finalizer};
use super::orchestrator::Orchestrator;
use super::status::{refresh_ready_condition, update_condition_in_memory, CONDITION_TYPE_READY};
use crate::context::Context;
use crate::crd::TenantControlPlane;
use crate::labels::{FINALIZER_SOOT, PAUSED_RECONCILIATION_ANNOTATION};
use crate::resources::{management_resources, tenant_resources, CachedClientFactory};
use crate::validation::validate;
use anyhow::Result;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reason of the `Ready` condition when the spec is rejected.
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

/// Whether reconciliation is paused by annotation.
#[must_use]
pub fn is_paused(tcp: &TenantControlPlane) -> bool {
    tcp.annotations().contains_key(PAUSED_RECONCILIATION_ANNOTATION)
}

/// Copy of `tcp` with every tenant cluster addon switched off, so that the
/// tenant resources clean up after themselves.
#[must_use]
pub fn without_tenant_addons(tcp: &TenantControlPlane) -> TenantControlPlane {
    let mut tcp = tcp.clone();
    tcp.spec.addons.tcp_proxy = None;
    tcp
}

fn orchestrator(ctx: &Context) -> Orchestrator {
    let tenants = Arc::new(CachedClientFactory::new(ctx.tenants.clone()));
    Orchestrator::new(tenants, ctx.status.clone(), ctx.metrics.clone())
}

/// Reconcile a `TenantControlPlane`.
///
/// Returns the object with its updated status, used by the caller to pick the
/// requeue interval.
///
/// # Errors
///
/// Returns an error when a child resource or a status write fails.
pub async fn reconcile_tenant_control_plane(
    ctx: Arc<Context>,
    mut tcp: TenantControlPlane,
) -> Result<TenantControlPlane> {
    let name = tcp.name_any();
    let namespace = tcp.namespace().unwrap_or_default();

    if is_paused(&tcp) {
        info!(tcp = %name, namespace = %namespace, "Reconciliation paused by annotation, skipping");
        return Ok(tcp);
    }

    if is_being_deleted(&tcp) {
        delete_tenant_control_plane(&ctx, &tcp).await?;
        return Ok(tcp);
    }

    if let Err(e) = validate(&tcp) {
        warn!(tcp = %name, namespace = %namespace, error = %e, "Invalid TenantControlPlane spec");
        let before = tcp.status.clone();
        let message = e.to_string();
        update_condition_in_memory(
            &mut tcp.status_mut().conditions,
            CONDITION_TYPE_READY,
            "False",
            REASON_INVALID_SPEC,
            &message,
        );
        if tcp.status != before {
            ctx.status.write_status(&tcp).await?;
        }
        return Ok(tcp);
    }

    ensure_finalizer(&ctx.client, &tcp, FINALIZER_SOOT).await?;

    let orchestrator = orchestrator(&ctx);
    let before = tcp.status.clone();

    let mut management = management_resources(&ctx.client, &ctx.config, &ctx.metrics);
    orchestrator.run(&mut tcp, &mut management).await?;
    debug!(tcp = %name, namespace = %namespace, "Management cluster resources reconciled");

    let mut tenant = tenant_resources(&ctx.config);
    orchestrator.run(&mut tcp, &mut tenant).await?;
    debug!(tcp = %name, namespace = %namespace, "Tenant cluster resources reconciled");

    refresh_ready_condition(&mut tcp);
    if tcp.status != before {
        ctx.status.write_status(&tcp).await?;
    }

    ctx.trigger.send(tcp.clone()).await;
    Ok(tcp)
}

/// Remove tenant cluster addons and release the finalizer.
///
/// The tenant cluster goes away with its control plane, so an unreachable
/// tenant API server does not block deletion.
async fn delete_tenant_control_plane(ctx: &Context, tcp: &TenantControlPlane) -> Result<()> {
    if !has_finalizer(tcp, FINALIZER_SOOT) {
        return Ok(());
    }
    let name = tcp.name_any();
    info!(tcp = %name, "Deleting TenantControlPlane, removing tenant cluster addons");

    let mut stripped = without_tenant_addons(tcp);
    let mut tenant = tenant_resources(&ctx.config);
    if let Err(e) = orchestrator(ctx).run(&mut stripped, &mut tenant).await {
        warn!(tcp = %name, error = format!("{e:#}"), "Tenant cluster addon cleanup failed, releasing finalizer anyway");
    }

    remove_finalizer(&ctx.client, tcp, FINALIZER_SOOT).await
}

#[cfg(test)]
#[path = "tenantcontrolplane_tests.rs"]
mod tenantcontrolplane_tests;
