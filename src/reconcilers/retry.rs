// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Conflict backoff and Kubernetes error classification.
//!
//! Optimistic concurrency conflicts (HTTP 409, including a create racing with
//! another writer) are the only errors retried inside a reconcile. Everything else is surfaced to the controller, whose
//! error policy requeues the object.

use crate::constants::{CONFLICT_RETRY_BASE_MILLIS, CONFLICT_RETRY_STEPS};
use std::time::Duration;

/// Multiplier between conflict retries (constant interval)
const CONFLICT_BACKOFF_FACTOR: f64 = 1.0;

/// Randomization factor to prevent lockstep retries (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Backoff with a bounded number of steps and randomized intervals.
#[derive(Clone, Debug)]
pub struct Backoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Backoff multiplier (1.0 keeps the interval constant)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    /// Attempts allowed in total, including the first
    pub steps: u32,
    attempts: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(initial: Duration, multiplier: f64, randomization_factor: f64, steps: u32) -> Self {
        Self {
            current_interval: initial,
            multiplier,
            randomization_factor,
            steps,
            attempts: 1,
        }
    }

    /// Get the next sleep interval, or `None` once every step is used.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempts >= self.steps {
            return None;
        }
        self.attempts += 1;

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);
        self.current_interval = Duration::from_secs_f64(interval.as_secs_f64() * self.multiplier);
        Some(jittered)
    }

    /// Attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }
        let spread = 2.0 * rand::random::<f64>() - 1.0;
        let secs = interval.as_secs_f64() * (1.0 + self.randomization_factor * spread);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Backoff used between optimistic concurrency retries.
///
/// # Configuration
///
/// - **Steps**: 5 attempts in total
/// - **Interval**: 10ms
/// - **Multiplier**: 1.0 (constant)
/// - **Randomization**: ±10%
#[must_use]
pub fn conflict_backoff() -> Backoff {
    Backoff::new(
        Duration::from_millis(CONFLICT_RETRY_BASE_MILLIS),
        CONFLICT_BACKOFF_FACTOR,
        RANDOMIZATION_FACTOR,
        CONFLICT_RETRY_STEPS,
    )
}

fn api_error(err: &kube::Error) -> Option<&kube::core::Status> {
    match err {
        kube::Error::Api(status) => Some(status.as_ref()),
        _ => None,
    }
}

/// HTTP 409, either a stale `resourceVersion` or a name already taken.
#[must_use]
pub fn is_conflict(err: &kube::Error) -> bool {
    api_error(err).is_some_and(|e| e.code == 409)
}

/// HTTP 409 with reason `AlreadyExists`: a concurrent writer created the object first.
#[must_use]
pub fn is_already_exists(err: &kube::Error) -> bool {
    api_error(err).is_some_and(|e| e.code == 409 && e.is_already_exists())
}

/// HTTP 404.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    api_error(err).is_some_and(|e| e.code == 404)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
