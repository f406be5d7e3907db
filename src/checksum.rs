// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Content checksums and rotation markers for generated objects.
//!
//! Every generated Secret or ConfigMap carries the SHA-256 of its payload in the
//! [`CHECKSUM_ANNOTATION`]. The same value is mirrored into the tenant control
//! plane status; when both agree the generator can skip regeneration entirely.
//!
//! A [`ROTATE_ANNOTATION`] on the object bypasses that shortcut once. After the
//! material is regenerated the marker is removed and [`LAST_ROTATION_ANNOTATION`]
//! records when it happened.

use crate::labels::{CHECKSUM_ANNOTATION, LAST_ROTATION_ANNOTATION, ROTATE_ANNOTATION};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hex encoded SHA-256 over the key/value pairs in key order.
///
/// Keys and values are separated so that `{"ab": "c"}` and `{"a": "bc"}` hash
/// differently.
#[must_use]
pub fn calculate_map_checksum<V: AsRef<[u8]>>(data: &BTreeMap<String, V>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in data {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_ref());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// [`calculate_map_checksum`] over a Secret payload.
#[must_use]
pub fn calculate_secret_checksum(data: Option<&BTreeMap<String, ByteString>>) -> String {
    let raw: BTreeMap<String, &[u8]> = data
        .into_iter()
        .flatten()
        .map(|(key, value)| (key.clone(), value.0.as_slice()))
        .collect();
    calculate_map_checksum(&raw)
}

/// Checksum recorded on an object, if any.
#[must_use]
pub fn get_object_checksum(meta: &ObjectMeta) -> Option<&str> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(CHECKSUM_ANNOTATION))
        .map(String::as_str)
}

pub fn set_object_checksum(meta: &mut ObjectMeta, checksum: &str) {
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(CHECKSUM_ANNOTATION.to_string(), checksum.to_string());
}

/// Whether the object carries the rotation marker.
#[must_use]
pub fn is_rotation_requested(meta: &ObjectMeta) -> bool {
    meta.annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(ROTATE_ANNOTATION))
}

/// Clear the rotation marker and stamp the rotation time.
pub fn mark_rotated(meta: &mut ObjectMeta, now: chrono::DateTime<chrono::Utc>) {
    let annotations = meta.annotations.get_or_insert_with(BTreeMap::new);
    annotations.remove(ROTATE_ANNOTATION);
    annotations.insert(LAST_ROTATION_ANNOTATION.to_string(), now.to_rfc3339());
}

/// Whether the object payload is unchanged since `recorded` was computed.
///
/// Both the object annotation and the `checksum` freshly computed over its
/// payload must match the value recorded in status.
#[must_use]
pub fn is_unchanged(meta: &ObjectMeta, checksum: &str, recorded: &str) -> bool {
    !recorded.is_empty() && get_object_checksum(meta) == Some(recorded) && checksum == recorded
}

#[cfg(test)]
#[path = "checksum_tests.rs"]
mod checksum_tests;
