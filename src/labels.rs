// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines the Steward-specific labels, annotations and finalizers
//! to ensure consistency across all resources created by the controller.

use std::collections::BTreeMap;

// ============================================================================
// Steward Labels
// ============================================================================

/// Label identifying objects owned by Steward, used for cleanup ownership checks
pub const PROJECT_NAME_LABEL: &str = "steward.butlerlabs.dev/project";

/// Value of [`PROJECT_NAME_LABEL`]
pub const PROJECT_NAME_VALUE: &str = "steward";

/// Label carrying the owning tenant control plane name (also the pod selector)
pub const CONTROL_PLANE_LABEL: &str = "steward.butlerlabs.dev/name";

/// Label carrying the managed resource name
pub const COMPONENT_LABEL: &str = "steward.butlerlabs.dev/component";

/// Label marking certificates tracked by the lifecycle controller
pub const CERTIFICATE_LIFECYCLE_LABEL: &str =
    "steward.butlerlabs.dev/certificate_lifecycle_controller";

/// Value of [`CERTIFICATE_LIFECYCLE_LABEL`] for X.509 material
pub const CERTIFICATE_X509_VALUE: &str = "x509";

/// App label used by the tcp-proxy pods
pub const APP_LABEL: &str = "app";

// ============================================================================
// Steward Annotations
// ============================================================================

/// Annotation storing the checksum of generated payloads
pub const CHECKSUM_ANNOTATION: &str = "steward.butlerlabs.dev/checksum";

/// Annotation requesting a one-shot regeneration of the annotated material
pub const ROTATE_ANNOTATION: &str = "steward.butlerlabs.dev/rotate";

/// Annotation recording when the material was last rotated on request
pub const LAST_ROTATION_ANNOTATION: &str = "steward.butlerlabs.dev/last-rotation";

/// Annotation pausing reconciliation of a tenant control plane
pub const PAUSED_RECONCILIATION_ANNOTATION: &str = "steward.butlerlabs.dev/paused";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer guarding tenant cluster addon cleanup
pub const FINALIZER_SOOT: &str = "finalizer.steward.butlerlabs.dev/soot";

/// Build the label set every managed child carries.
///
/// # Arguments
///
/// * `tcp_name` - Name of the owning tenant control plane
/// * `component` - Name of the managed resource producing the object
#[must_use]
pub fn steward_labels(tcp_name: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (PROJECT_NAME_LABEL.to_string(), PROJECT_NAME_VALUE.to_string()),
        (CONTROL_PLANE_LABEL.to_string(), tcp_name.to_string()),
        (COMPONENT_LABEL.to_string(), component.to_string()),
    ])
}

/// Merge label or annotation maps, later maps winning on key collisions.
#[must_use]
pub fn merge_maps(maps: &[&BTreeMap<String, String>]) -> BTreeMap<String, String> {
    let mut merged = BTreeMap::new();
    for map in maps {
        merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

/// Whether a label set marks the object as owned by Steward.
#[must_use]
pub fn is_project_owned(labels: Option<&BTreeMap<String, String>>) -> bool {
    labels
        .and_then(|l| l.get(PROJECT_NAME_LABEL))
        .is_some_and(|v| v == PROJECT_NAME_VALUE)
}
