// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use steward::{
    config::OperatorConfig,
    constants::{
        ERROR_REQUEUE_DURATION_SECS, KIND_TENANT_CONTROL_PLANE, REQUEUE_WHEN_NOT_READY_SECS,
        REQUEUE_WHEN_READY_SECS,
    },
    context::{Context, Stores},
    crd::TenantControlPlane,
    metrics::Metrics,
    reconcilers::{reconcile_tenant_control_plane, run_csr_approval_loop, status::is_ready},
    trigger::Trigger,
};
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    let config = OperatorConfig::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("steward-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: OperatorConfig) -> Result<()> {
    // Initialize logging with custom format
    // Format: timestamp file:line LEVEL message
    //
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Example: RUST_LOG=debug cargo run
    //
    // Respects RUST_LOG_FORMAT environment variable for output format
    // Example: RUST_LOG_FORMAT=json cargo run
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting Steward tenant control plane operator");
    debug!(?config, "Loaded configuration");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
    let (trigger, triggers) = Trigger::channel();

    let controller = Controller::new(
        Api::<TenantControlPlane>::all(client.clone()),
        Config::default(),
    )
    .owns(Api::<Deployment>::all(client.clone()), Config::default())
    .owns(Api::<Service>::all(client.clone()), Config::default())
    .owns(Api::<Secret>::all(client.clone()), Config::default());

    let stores = Stores {
        tenant_control_planes: controller.store(),
    };
    let ctx = Arc::new(Context::new(
        client,
        config.clone(),
        metrics.clone(),
        trigger,
        stores,
    ));

    info!("Starting all controllers");

    // Controllers should never exit - if one fails, we log it and exit the main process
    tokio::select! {
        result = run_tenant_control_plane_controller(controller, ctx.clone()) => {
            error!("CRITICAL: TenantControlPlane controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("TenantControlPlane controller exited unexpectedly without error")
        }
        result = run_csr_approval_loop(ctx.clone(), triggers) => {
            error!("CRITICAL: CSR approval loop exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("CSR approval loop exited unexpectedly without error")
        }
        result = run_metrics_server(config, metrics) => {
            error!("CRITICAL: metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("metrics server exited unexpectedly without error")
        }
    }
}

/// Run the `TenantControlPlane` controller
async fn run_tenant_control_plane_controller(
    controller: Controller<TenantControlPlane>,
    ctx: Arc<Context>,
) -> Result<()> {
    info!("Starting TenantControlPlane controller");

    controller
        .run(reconcile_tenant_control_plane_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `TenantControlPlane`
async fn reconcile_tenant_control_plane_wrapper(
    tcp: Arc<TenantControlPlane>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    debug!(
        tcp = %tcp.name_any(),
        namespace = ?tcp.namespace(),
        "Reconcile wrapper called for TenantControlPlane"
    );

    let start = Instant::now();
    match reconcile_tenant_control_plane(ctx.clone(), (*tcp).clone()).await {
        Ok(updated) => {
            ctx.metrics
                .record_reconciliation_success(KIND_TENANT_CONTROL_PLANE, start.elapsed());
            info!(
                "Successfully reconciled TenantControlPlane: {}",
                tcp.name_any()
            );

            if is_ready(&updated) {
                debug!("TenantControlPlane ready, requeueing in 5 minutes");
                Ok(Action::requeue(Duration::from_secs(REQUEUE_WHEN_READY_SECS)))
            } else {
                debug!("TenantControlPlane not ready, requeueing in 30 seconds");
                Ok(Action::requeue(Duration::from_secs(
                    REQUEUE_WHEN_NOT_READY_SECS,
                )))
            }
        }
        Err(e) => {
            ctx.metrics
                .record_reconciliation_error(KIND_TENANT_CONTROL_PLANE, start.elapsed());
            error!("Failed to reconcile TenantControlPlane {}: {:#}", tcp.name_any(), e);
            Err(e.into())
        }
    }
}

/// Error policy for controller
fn error_policy(
    _resource: Arc<TenantControlPlane>,
    _err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

/// Serve `/metrics` and `/healthz`
async fn run_metrics_server(config: Arc<OperatorConfig>, metrics: Arc<Metrics>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(config.metrics_bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.metrics_bind_address))?;
    info!(address = %config.metrics_bind_address, "Serving metrics");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.gather() {
        Ok(body) => body.into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
