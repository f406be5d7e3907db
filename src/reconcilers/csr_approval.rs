// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Worker bootstrap loop running against tenant clusters.
//!
//! For every tenant control plane with the worker bootstrap addon, the loop:
//!
//! - ensures the RBAC worker nodes need (EndpointSlice read access, kubelet
//!   serving CSR self-approval binding);
//! - when auto-approval is on, approves the pending kubelet serving CSRs
//!   accepted by [`crate::csr_approval::evaluate`].
//!
//! Pending requests are approved once per pass, then a watcher on the tenant
//! `CertificateSigningRequest` objects approves new requests as they arrive.
//! One watcher task runs per tenant control plane, started and stopped by the
//! loop as auto-approval is switched on and off.
//!
//! The loop is woken up by the [`Trigger`](crate::trigger::Trigger) after each
//! `TenantControlPlane` reconcile and by a periodic resync. Tenants are
//! processed concurrently, each under [`CSR_TENANT_TIMEOUT`], so that an
//! unreachable tenant API server never delays the others.

use super::tenantcontrolplane::is_paused;
use super::upsert::upsert;
use crate::constants::CSR_TENANT_TIMEOUT;
use crate::context::Context;
use crate::crd::TenantControlPlane;
use crate::csr_approval::{
    auto_approve_enabled, evaluate, is_candidate, CsrDecision, APPROVAL_MESSAGE, APPROVAL_REASON,
    NODES_GROUP,
};
use crate::metrics::Metrics;
use anyhow::{bail, Context as _, Result};
use futures::StreamExt;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition, CertificateSigningRequestStatus,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{ListParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const ENDPOINT_SLICE_READER_NAME: &str = "steward:node-endpointslice-reader";
pub const KUBELET_SERVING_AUTO_APPROVE_BINDING: &str = "kubeadm:node-autoapprove-kubelet-serving";
pub const SELF_NODE_CLIENT_ROLE: &str =
    "system:certificates.k8s.io:certificatesigningrequests:selfnodeclient";

fn named<K: kube::Resource + Default>(name: &str) -> K {
    let mut obj = K::default();
    *obj.meta_mut() = ObjectMeta {
        name: Some(name.to_string()),
        ..Default::default()
    };
    obj
}

pub fn mutate_endpoint_slice_reader_role(role: &mut ClusterRole) {
    role.rules = Some(vec![PolicyRule {
        api_groups: Some(vec!["discovery.k8s.io".to_string()]),
        resources: Some(vec!["endpointslices".to_string()]),
        verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
        ..Default::default()
    }]);
}

/// Bind the `system:nodes` group to `cluster_role`.
pub fn mutate_nodes_binding(binding: &mut ClusterRoleBinding, cluster_role: &str) {
    binding.role_ref = RoleRef {
        api_group: "rbac.authorization.k8s.io".to_string(),
        kind: "ClusterRole".to_string(),
        name: cluster_role.to_string(),
    };
    binding.subjects = Some(vec![Subject {
        api_group: Some("rbac.authorization.k8s.io".to_string()),
        kind: "Group".to_string(),
        name: NODES_GROUP.to_string(),
        ..Default::default()
    }]);
}

/// Append the approval condition to a request.
pub fn approve(csr: &mut CertificateSigningRequest) {
    let status = csr
        .status
        .get_or_insert_with(CertificateSigningRequestStatus::default);
    status
        .conditions
        .get_or_insert_with(Vec::new)
        .push(CertificateSigningRequestCondition {
            type_: "Approved".to_string(),
            status: "True".to_string(),
            reason: Some(APPROVAL_REASON.to_string()),
            message: Some(APPROVAL_MESSAGE.to_string()),
            last_update_time: Some(Time(jiff::Timestamp::now())),
            ..Default::default()
        });
}

/// Ensure the worker bootstrap RBAC in the tenant cluster.
///
/// # Errors
///
/// Returns an error when an object cannot be written.
pub async fn ensure_worker_bootstrap_rbac(tenant: &Client) -> Result<()> {
    let roles: Api<ClusterRole> = Api::all(tenant.clone());
    upsert(&roles, named(ENDPOINT_SLICE_READER_NAME), |role| {
        mutate_endpoint_slice_reader_role(role);
        Ok(())
    })
    .await
    .context("failed to ensure EndpointSlice reader ClusterRole")?;

    let bindings: Api<ClusterRoleBinding> = Api::all(tenant.clone());
    for (binding, role) in [
        (ENDPOINT_SLICE_READER_NAME, ENDPOINT_SLICE_READER_NAME),
        (KUBELET_SERVING_AUTO_APPROVE_BINDING, SELF_NODE_CLIENT_ROLE),
    ] {
        upsert(&bindings, named(binding), |b| {
            mutate_nodes_binding(b, role);
            Ok(())
        })
        .await
        .with_context(|| format!("failed to ensure ClusterRoleBinding {binding}"))?;
    }
    Ok(())
}

/// Evaluate one request and approve it when the policy accepts it.
///
/// Approval failures are logged and recorded, not returned.
///
/// # Returns
///
/// Whether the request was approved.
pub async fn approve_one(
    api: &Api<CertificateSigningRequest>,
    tcp: &TenantControlPlane,
    mut csr: CertificateSigningRequest,
    metrics: &Metrics,
) -> bool {
    let name = csr.name_any();
    if let CsrDecision::Skip(reason) = evaluate(tcp, &csr) {
        debug!(tcp = %tcp.name_any(), csr = %name, reason = reason.as_str(), "Skipping CSR");
        metrics.record_csr_decision("skip", reason.as_str());
        return false;
    }

    approve(&mut csr);
    match api
        .replace_subresource("approval", &name, &PostParams::default(), &csr)
        .await
    {
        Ok(_) => {
            info!(
                tcp = %tcp.name_any(),
                csr = %name,
                username = csr.spec.username.as_deref().unwrap_or_default(),
                "Approved CSR"
            );
            metrics.record_csr_decision("approve", "");
            true
        }
        Err(e) => {
            error!(tcp = %tcp.name_any(), csr = %name, error = %e, "Failed to approve CSR");
            metrics.record_csr_decision("error", "approval_failed");
            false
        }
    }
}

/// Approve the pending kubelet serving requests accepted by the policy.
///
/// A request failing to be approved is logged and does not stop the others.
///
/// # Returns
///
/// The number of approved requests.
///
/// # Errors
///
/// Returns an error when requests cannot be listed.
pub async fn approve_pending(tenant: &Client, tcp: &TenantControlPlane, metrics: &Metrics) -> Result<usize> {
    let api: Api<CertificateSigningRequest> = Api::all(tenant.clone());
    let list = api
        .list(&ListParams::default())
        .await
        .context("failed to list CertificateSigningRequests")?;

    let mut approved = 0;
    for csr in list.items.into_iter().filter(is_candidate) {
        if approve_one(&api, tcp, csr, metrics).await {
            approved += 1;
        }
    }
    Ok(approved)
}

/// Approve kubelet serving requests of one tenant as they are created or updated.
///
/// The current spec of the tenant control plane is read from the reflector
/// store for every request. Returns once the tenant control plane is gone.
pub async fn watch_tenant_csrs(ctx: Arc<Context>, namespace: String, name: String, tenant: Client) {
    let api: Api<CertificateSigningRequest> = Api::all(tenant);
    let mut csrs = std::pin::pin!(watcher(api.clone(), watcher::Config::default())
        .default_backoff()
        .applied_objects());

    debug!(tcp = %name, namespace = %namespace, "Watching tenant CertificateSigningRequests");
    while let Some(event) = csrs.next().await {
        let csr = match event {
            Ok(csr) => csr,
            Err(e) => {
                warn!(tcp = %name, namespace = %namespace, error = %e, "CertificateSigningRequest watch failed");
                continue;
            }
        };
        if !is_candidate(&csr) {
            continue;
        }
        let Some(tcp) = ctx.stores.get_tenant_control_plane(&name, &namespace) else {
            debug!(tcp = %name, namespace = %namespace, "TenantControlPlane gone, stopping CSR watch");
            return;
        };
        if is_paused(&tcp) || !auto_approve_enabled(&tcp) {
            continue;
        }
        approve_one(&api, &tcp, csr, &ctx.metrics).await;
    }
}

/// What the loop should do with the CSR watcher of a tenant.
pub enum CsrWatch {
    /// Auto-approval is on: keep a watcher running with this tenant client.
    Watch(Client),
    /// Nothing to approve for this tenant.
    Idle,
}

/// Run the worker bootstrap duties for one tenant control plane.
///
/// # Errors
///
/// Returns an error when the tenant cluster is unreachable or a write fails.
pub async fn process_tenant_control_plane(ctx: &Context, tcp: &TenantControlPlane) -> Result<CsrWatch> {
    if is_paused(tcp) || tcp.spec.addons.worker_bootstrap.is_none() {
        return Ok(CsrWatch::Idle);
    }

    let tenant = ctx.tenants.tenant_client(tcp).await?;
    ensure_worker_bootstrap_rbac(&tenant).await?;

    if !auto_approve_enabled(tcp) {
        return Ok(CsrWatch::Idle);
    }
    let approved = approve_pending(&tenant, tcp, &ctx.metrics).await?;
    if approved > 0 {
        info!(tcp = %tcp.name_any(), approved, "Auto-approved kubelet serving CSRs");
    }
    Ok(CsrWatch::Watch(tenant))
}

/// Process one tenant under `deadline`. `None` when it failed or timed out.
pub async fn process_with_timeout(ctx: &Context, tcp: &TenantControlPlane, deadline: Duration) -> Option<CsrWatch> {
    let namespace = tcp.namespace().unwrap_or_default();
    match tokio::time::timeout(deadline, process_tenant_control_plane(ctx, tcp)).await {
        Ok(Ok(watch)) => Some(watch),
        Ok(Err(e)) => {
            error!(
                tcp = %tcp.name_any(),
                namespace = %namespace,
                error = format!("{e:#}"),
                "Worker bootstrap processing failed"
            );
            None
        }
        Err(_) => {
            error!(
                tcp = %tcp.name_any(),
                namespace = %namespace,
                timeout = ?deadline,
                "Timed out processing tenant cluster"
            );
            None
        }
    }
}

/// Key of a tenant control plane in [`CsrWatchers`].
#[must_use]
pub fn tenant_key(tcp: &TenantControlPlane) -> String {
    format!("{}/{}", tcp.namespace().unwrap_or_default(), tcp.name_any())
}

/// Running CSR watcher tasks, one per tenant control plane.
#[derive(Default)]
pub struct CsrWatchers {
    tasks: HashMap<String, JoinHandle<()>>,
}

impl CsrWatchers {
    /// Whether a live watcher runs for `key`.
    #[must_use]
    pub fn is_watching(&self, key: &str) -> bool {
        self.tasks.get(key).is_some_and(|task| !task.is_finished())
    }

    /// Start a watcher for `key` unless a live one already runs.
    ///
    /// # Returns
    ///
    /// `true` when a new task was spawned.
    pub fn ensure(&mut self, key: &str, spawn: impl FnOnce() -> JoinHandle<()>) -> bool {
        if self.is_watching(key) {
            return false;
        }
        debug!(tcp = %key, "Starting CSR watcher");
        self.tasks.insert(key.to_string(), spawn());
        true
    }

    pub fn stop(&mut self, key: &str) {
        if let Some(task) = self.tasks.remove(key) {
            debug!(tcp = %key, "Stopping CSR watcher");
            task.abort();
        }
    }

    /// Stop every watcher whose key is not in `keep`.
    pub fn retain(&mut self, keep: &HashSet<String>) {
        let stale: Vec<String> = self
            .tasks
            .keys()
            .filter(|key| !keep.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            self.stop(&key);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for CsrWatchers {
    fn drop(&mut self) {
        for task in self.tasks.values() {
            task.abort();
        }
    }
}

/// Process `targets` concurrently and start or stop their CSR watchers.
///
/// A tenant that failed or timed out keeps its current watcher: the watcher
/// retries on its own and the next pass reconciles it again.
pub async fn sync_tenants(
    ctx: &Arc<Context>,
    watchers: &mut CsrWatchers,
    targets: &[Arc<TenantControlPlane>],
    deadline: Duration,
) {
    let results = futures::future::join_all(
        targets
            .iter()
            .map(|tcp| process_with_timeout(ctx, tcp.as_ref(), deadline)),
    )
    .await;

    for (tcp, result) in targets.iter().zip(results) {
        let key = tenant_key(tcp);
        match result {
            Some(CsrWatch::Watch(tenant)) => {
                let namespace = tcp.namespace().unwrap_or_default();
                let name = tcp.name_any();
                let ctx = ctx.clone();
                watchers.ensure(&key, move || {
                    tokio::spawn(watch_tenant_csrs(ctx, namespace, name, tenant))
                });
            }
            Some(CsrWatch::Idle) => watchers.stop(&key),
            None => {}
        }
    }
}

/// Worker bootstrap loop. Only returns when the trigger channel is closed.
///
/// # Errors
///
/// Returns an error once every trigger sender is dropped.
pub async fn run_csr_approval_loop(
    ctx: Arc<Context>,
    mut triggers: mpsc::Receiver<TenantControlPlane>,
) -> Result<()> {
    info!(resync = ?ctx.config.csr_resync(), "Starting CSR approval loop");
    let mut resync = tokio::time::interval(ctx.config.csr_resync());
    resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut watchers = CsrWatchers::default();

    loop {
        tokio::select! {
            received = triggers.recv() => match received {
                Some(tcp) => {
                    sync_tenants(&ctx, &mut watchers, &[Arc::new(tcp)], CSR_TENANT_TIMEOUT).await;
                }
                None => bail!("trigger channel closed"),
            },
            _ = resync.tick() => {
                let targets = ctx.stores.worker_bootstrap_targets();
                let keep: HashSet<String> = targets.iter().map(|tcp| tenant_key(tcp)).collect();
                watchers.retain(&keep);
                sync_tenants(&ctx, &mut watchers, &targets, CSR_TENANT_TIMEOUT).await;
                debug!(watchers = watchers.len(), "CSR approval resync finished");
            }
        }
    }
}

#[cfg(test)]
#[path = "csr_approval_tests.rs"]
mod csr_approval_tests;
