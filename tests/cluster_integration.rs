// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Integration tests against a live cluster running the operator.
//!
//! Requires the CRD installed (`cargo run --bin crdgen && kubectl apply -f deploy/crds/`)
//! and the operator running.
//!
//! Run with: cargo test --test cluster_integration -- --ignored

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, PostParams};
use kube::client::Client;
use kube::ResourceExt;
use std::time::Duration;
use steward::crd::TenantControlPlane;
use steward::labels::FINALIZER_SOOT;

const TEST_NAMESPACE: &str = "steward-integration";

/// Test helper to check if running in a Kubernetes cluster
async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => {
            println!("✓ Successfully connected to Kubernetes cluster");
            Some(client)
        }
        Err(e) => {
            eprintln!("⊘ Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

async fn create_test_namespace(client: &Client, name: &str) -> Result<(), kube::Error> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns: Namespace = serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name, "labels": {"test": "integration"}}
    }))
    .map_err(kube::Error::SerdeError)?;

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(e),
    }
}

#[tokio::test]
#[ignore = "requires a Kubernetes cluster"]
async fn test_crd_is_installed() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };

    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let crd = crds
        .get("tenantcontrolplanes.steward.butlerlabs.dev")
        .await
        .expect("TenantControlPlane CRD should be installed");
    assert_eq!(crd.spec.names.kind, "TenantControlPlane");
}

#[tokio::test]
#[ignore = "requires a Kubernetes cluster with the operator running"]
async fn test_tenant_control_plane_gets_finalizer_and_status() {
    let Some(client) = get_kube_client_or_skip().await else {
        return;
    };
    create_test_namespace(&client, TEST_NAMESPACE)
        .await
        .expect("namespace should be created");

    let api: Api<TenantControlPlane> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let tcp: TenantControlPlane = serde_yaml::from_str(&format!(
        "apiVersion: steward.butlerlabs.dev/v1alpha1\n\
         kind: TenantControlPlane\n\
         metadata:\n  name: smoke\n  namespace: {TEST_NAMESPACE}\n\
         spec:\n  kubernetes:\n    version: v1.31.2\n"
    ))
    .expect("valid manifest");

    match api.create(&PostParams::default(), &tcp).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 409 => {}
        Err(e) => panic!("failed to create TenantControlPlane: {e}"),
    }

    let mut observed = None;
    for _ in 0..30 {
        let current = api.get("smoke").await.expect("TenantControlPlane should exist");
        if current.finalizers().iter().any(|f| f == FINALIZER_SOOT) && current.status.is_some() {
            observed = Some(current);
            break;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    let observed = observed.expect("operator should add its finalizer and a status");
    assert!(observed
        .status
        .as_ref()
        .is_some_and(|s| !s.conditions.is_empty()));

    api.delete("smoke", &DeleteParams::default())
        .await
        .expect("TenantControlPlane should be deleted");
}
