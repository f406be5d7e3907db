// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Sequential driver of [`ManagedResource`] lists.
//!
//! For every resource, in order:
//!
//! 1. `define` binds the target object (and the tenant client when needed);
//! 2. `cleanup` when the governing feature was removed, `create_or_update`
//!    otherwise;
//! 3. when something was written or the recorded status is stale, the status
//!    is projected and persisted through the [`StatusWriter`].
//!
//! The first error aborts the run. Resources processed before it keep their
//! persisted status, so the next reconcile resumes where this one stopped.

use super::status::StatusWriter;
use super::upsert::UpsertResult;
use crate::crd::TenantControlPlane;
use crate::metrics::{Metrics, ResourceOutcome};
use crate::resources::{ManagedResource, TenantClientFactory};
use anyhow::{Context as _, Result};
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

pub struct Orchestrator {
    tenants: Arc<dyn TenantClientFactory>,
    status: Arc<dyn StatusWriter>,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        tenants: Arc<dyn TenantClientFactory>,
        status: Arc<dyn StatusWriter>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tenants,
            status,
            metrics,
        }
    }

    /// Run every resource against `tcp`, updating its in-memory status.
    ///
    /// # Errors
    ///
    /// Returns the first resource error, with the resource name as context.
    pub async fn run(
        &self,
        tcp: &mut TenantControlPlane,
        resources: &mut [Box<dyn ManagedResource>],
    ) -> Result<()> {
        for resource in resources.iter_mut() {
            let name = resource.name();
            let start = Instant::now();
            match self.step(resource.as_mut(), tcp).await {
                Ok(outcome) => {
                    self.metrics.record_resource(name, outcome, start.elapsed());
                }
                Err(e) => {
                    self.metrics
                        .record_resource(name, ResourceOutcome::Error, start.elapsed());
                    error!(tcp = %tcp.name_any(), resource = name, error = %e, "Resource reconciliation failed");
                    return Err(e).with_context(|| format!("resource {name}"));
                }
            }
        }
        Ok(())
    }

    async fn step(
        &self,
        resource: &mut dyn ManagedResource,
        tcp: &mut TenantControlPlane,
    ) -> Result<ResourceOutcome> {
        let name = resource.name();
        resource
            .define(tcp, self.tenants.as_ref())
            .await
            .context("cannot define resource")?;

        let outcome = if resource.should_cleanup(tcp) {
            let deleted = resource
                .cleanup(tcp)
                .await
                .context("cannot cleanup resource")?;
            if deleted {
                ResourceOutcome::Deleted
            } else {
                ResourceOutcome::Unchanged
            }
        } else {
            match resource
                .create_or_update(tcp)
                .await
                .context("cannot create or update resource")?
            {
                UpsertResult::None => ResourceOutcome::Unchanged,
                UpsertResult::Created => ResourceOutcome::Created,
                UpsertResult::Updated => ResourceOutcome::Updated,
                UpsertResult::Deleted => ResourceOutcome::Deleted,
            }
        };

        if outcome != ResourceOutcome::Unchanged {
            info!(tcp = %tcp.name_any(), resource = name, result = outcome.as_str(), "Resource reconciled");
        }

        if outcome == ResourceOutcome::Unchanged && !resource.should_status_be_updated(tcp) {
            debug!(tcp = %tcp.name_any(), resource = name, "Resource up to date");
            return Ok(outcome);
        }

        resource
            .update_status(tcp)
            .await
            .context("cannot update status")?;
        self.status
            .write_status(tcp)
            .await
            .context("cannot persist status")?;
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod orchestrator_tests;
