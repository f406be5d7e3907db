// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the controllers.
//!
//! Every controller receives an `Arc<Context>` holding:
//! - the management cluster client
//! - the operator configuration
//! - the metrics registry
//! - the seams used by the orchestrator (tenant clients, status writer)
//! - the trigger feeding the CSR approval loop
//! - a reflector store of tenant control planes

use crate::config::OperatorConfig;
use crate::crd::TenantControlPlane;
use crate::metrics::Metrics;
use crate::reconcilers::finalizers::is_being_deleted;
use crate::reconcilers::status::{KubeStatusWriter, StatusWriter};
use crate::resources::{KubeconfigClientFactory, TenantClientFactory};
use crate::trigger::Trigger;
use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use std::sync::Arc;

#[derive(Clone)]
pub struct Context {
    /// Management cluster client
    pub client: Client,

    pub config: Arc<OperatorConfig>,

    pub metrics: Arc<Metrics>,

    /// Source of tenant cluster clients
    pub tenants: Arc<dyn TenantClientFactory>,

    /// Persists `TenantControlPlane` status
    pub status: Arc<dyn StatusWriter>,

    /// Hand-off to the CSR approval loop
    pub trigger: Trigger,

    pub stores: Stores,
}

impl Context {
    /// Context wired against the management cluster.
    #[must_use]
    pub fn new(
        client: Client,
        config: Arc<OperatorConfig>,
        metrics: Arc<Metrics>,
        trigger: Trigger,
        stores: Stores,
    ) -> Self {
        Self {
            tenants: Arc::new(KubeconfigClientFactory::new(client.clone())),
            status: Arc::new(KubeStatusWriter::new(client.clone())),
            client,
            config,
            metrics,
            trigger,
            stores,
        }
    }
}

/// Reflector stores shared between controllers.
#[derive(Clone)]
pub struct Stores {
    pub tenant_control_planes: Store<TenantControlPlane>,
}

impl Stores {
    /// Tenant control planes with the worker bootstrap addon enabled.
    ///
    /// Terminating objects are left out: their tenant cluster is going away.
    #[must_use]
    pub fn worker_bootstrap_targets(&self) -> Vec<Arc<TenantControlPlane>> {
        let mut targets: Vec<_> = self
            .tenant_control_planes
            .state()
            .into_iter()
            .filter(|tcp| tcp.spec.addons.worker_bootstrap.is_some() && !is_being_deleted(tcp.as_ref()))
            .collect();
        targets.sort_by_key(|tcp| (tcp.namespace(), tcp.name_any()));
        targets
    }

    /// Get a tenant control plane by name and namespace from the store.
    #[must_use]
    pub fn get_tenant_control_plane(&self, name: &str, namespace: &str) -> Option<Arc<TenantControlPlane>> {
        self.tenant_control_planes
            .state()
            .into_iter()
            .find(|tcp| tcp.name_any() == name && tcp.namespace().as_deref() == Some(namespace))
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
