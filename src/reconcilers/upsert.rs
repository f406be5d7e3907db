// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Idempotent create-or-update with optimistic concurrency retries.
//!
//! [`upsert`] fetches the object by name, applies a deterministic `mutate`
//! closure and writes only when the serialized form changed. A 409 on create or
//! replace refetches the live object and reapplies `mutate`, a bounded number
//! of times.
//!
//! The API surface is abstracted behind [`ObjectStore`] so that the same code
//! drives typed objects, dynamic objects and in-memory test doubles.

use super::retry::{conflict_backoff, is_already_exists, is_conflict, is_not_found};
use crate::constants::FIELD_MANAGER;
use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, warn};

/// Outcome of a managed resource write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertResult {
    /// Nothing was written.
    None,
    Created,
    Updated,
    Deleted,
}

impl UpsertResult {
    #[must_use]
    pub fn is_noop(self) -> bool {
        self == Self::None
    }
}

/// Minimal API surface needed by [`upsert`] and cleanup.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync,
{
    async fn get_opt(&self, name: &str) -> Result<Option<K>, kube::Error>;
    async fn create(&self, obj: &K) -> Result<K, kube::Error>;
    async fn replace(&self, name: &str, obj: &K) -> Result<K, kube::Error>;
    /// Delete by name; `false` when it was already gone.
    async fn delete(&self, name: &str) -> Result<bool, kube::Error>;
}

fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl<K> ObjectStore<K> for Api<K>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn get_opt(&self, name: &str) -> Result<Option<K>, kube::Error> {
        Api::get_opt(self, name).await
    }

    async fn create(&self, obj: &K) -> Result<K, kube::Error> {
        Api::create(self, &post_params(), obj).await
    }

    async fn replace(&self, name: &str, obj: &K) -> Result<K, kube::Error> {
        Api::replace(self, name, &post_params(), obj).await
    }

    async fn delete(&self, name: &str) -> Result<bool, kube::Error> {
        match Api::delete(self, name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

enum Attempt<K> {
    Done(UpsertResult, K),
    Conflict(kube::Error),
}

async fn attempt<K, S, F>(store: &S, template: &K, name: &str, mutate: &mut F) -> Result<Attempt<K>>
where
    K: Resource + Clone + Serialize + Send + Sync,
    S: ObjectStore<K> + ?Sized,
    F: FnMut(&mut K) -> Result<()> + Send,
{
    let current = store
        .get_opt(name)
        .await
        .with_context(|| format!("failed to get {name}"))?;

    match current {
        None => {
            let mut desired = template.clone();
            mutate(&mut desired)?;
            match store.create(&desired).await {
                Ok(created) => Ok(Attempt::Done(UpsertResult::Created, created)),
                Err(e) if is_already_exists(&e) => {
                    debug!(object = %name, "Object created concurrently, refetching");
                    Ok(Attempt::Conflict(e))
                }
                Err(e) if is_conflict(&e) => Ok(Attempt::Conflict(e)),
                Err(e) => Err(anyhow!(e).context(format!("failed to create {name}"))),
            }
        }
        Some(current) => {
            let mut desired = current.clone();
            mutate(&mut desired)?;
            if serde_json::to_value(&desired)? == serde_json::to_value(&current)? {
                return Ok(Attempt::Done(UpsertResult::None, current));
            }
            match store.replace(name, &desired).await {
                Ok(updated) => Ok(Attempt::Done(UpsertResult::Updated, updated)),
                Err(e) if is_conflict(&e) => Ok(Attempt::Conflict(e)),
                Err(e) => Err(anyhow!(e).context(format!("failed to update {name}"))),
            }
        }
    }
}

/// Create or update `template.metadata.name`, writing only on change.
///
/// `mutate` receives either the template (on create) or a copy of the live
/// object and must be deterministic for the same inputs, otherwise every call
/// reports an update.
///
/// # Returns
///
/// The outcome and the object as persisted (or as read, for a no-op).
///
/// # Errors
///
/// Returns an error when the template has no name, `mutate` fails, a
/// non-conflict API error occurs, or conflicts persist past the retry budget.
pub async fn upsert<K, S, F>(store: &S, template: K, mut mutate: F) -> Result<(UpsertResult, K)>
where
    K: Resource + Clone + Serialize + Send + Sync,
    S: ObjectStore<K> + ?Sized,
    F: FnMut(&mut K) -> Result<()> + Send,
{
    let name = template
        .meta()
        .name
        .clone()
        .context("object template has no name")?;
    let mut backoff = conflict_backoff();

    loop {
        match attempt(store, &template, &name, &mut mutate).await? {
            Attempt::Done(result, obj) => {
                debug!(object = %name, result = ?result, attempts = backoff.attempts(), "Upsert finished");
                return Ok((result, obj));
            }
            Attempt::Conflict(e) => match backoff.next_backoff() {
                Some(interval) => {
                    warn!(object = %name, attempt = backoff.attempts(), error = %e, "Conflict during upsert, retrying");
                    tokio::time::sleep(interval).await;
                }
                None => {
                    return Err(anyhow!(e).context(format!(
                        "giving up on {name} after {} conflicting attempts",
                        backoff.attempts()
                    )));
                }
            },
        }
    }
}

/// Delete `name` when `is_owned` accepts the live object.
///
/// # Returns
///
/// `true` when a delete was issued, `false` when the object is absent or not ours.
///
/// # Errors
///
/// Returns an error on API failures other than not-found.
pub async fn delete_if_owned<K, S>(store: &S, name: &str, is_owned: impl Fn(&K) -> bool + Send) -> Result<bool>
where
    K: Send + Sync,
    S: ObjectStore<K> + ?Sized,
{
    let Some(current) = store
        .get_opt(name)
        .await
        .with_context(|| format!("failed to get {name}"))?
    else {
        return Ok(false);
    };
    if !is_owned(&current) {
        debug!(object = %name, "Skipping cleanup of object not owned by Steward");
        return Ok(false);
    }
    store
        .delete(name)
        .await
        .with_context(|| format!("failed to delete {name}"))
}

#[cfg(test)]
#[path = "upsert_tests.rs"]
mod upsert_tests;
