// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hand-off of reconciled tenant control planes to dependent controllers.
//!
//! After a successful reconcile the tenant control plane is pushed onto a
//! bounded channel so that tenant-side loops (CSR approval, worker bootstrap
//! RBAC) react to spec changes without waiting for their resync interval.
//! A full channel never blocks the reconciler for longer than the send deadline.

use crate::constants::{TRIGGER_CHANNEL_CAPACITY, TRIGGER_SEND_TIMEOUT};
use crate::crd::TenantControlPlane;
use kube::ResourceExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Result of a trigger send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    Sent,
    TimedOut,
    Closed,
}

#[derive(Clone, Debug)]
pub struct Trigger {
    tx: mpsc::Sender<TenantControlPlane>,
    timeout: Duration,
}

impl Trigger {
    /// Channel with the default capacity and send deadline.
    #[must_use]
    pub fn channel() -> (Self, mpsc::Receiver<TenantControlPlane>) {
        Self::with_capacity(TRIGGER_CHANNEL_CAPACITY, TRIGGER_SEND_TIMEOUT)
    }

    #[must_use]
    pub fn with_capacity(
        capacity: usize,
        timeout: Duration,
    ) -> (Self, mpsc::Receiver<TenantControlPlane>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, timeout }, rx)
    }

    /// Send a tenant control plane, giving up after the deadline.
    ///
    /// Failures are logged and otherwise ignored: the dependent controller
    /// catches up on its next resync.
    pub async fn send(&self, tcp: TenantControlPlane) -> TriggerOutcome {
        let name = tcp.name_any();
        let namespace = tcp.namespace().unwrap_or_default();

        match tokio::time::timeout(self.timeout, self.tx.send(tcp)).await {
            Ok(Ok(())) => {
                debug!(tcp = %name, namespace = %namespace, "Triggered dependent controllers");
                TriggerOutcome::Sent
            }
            Ok(Err(_)) => {
                error!(tcp = %name, namespace = %namespace, "Trigger channel closed");
                TriggerOutcome::Closed
            }
            Err(_) => {
                error!(
                    tcp = %name,
                    namespace = %namespace,
                    timeout = ?self.timeout,
                    "Timed out handing tenant control plane to dependent controllers"
                );
                TriggerOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod trigger_tests;
