//! # HTTP Server
//!
//! HTTP trigger for rotation steps plus metrics and probes.
//!
//! Provides endpoints:
//! - `POST /rotate` - dispatch one rotation step (JSON [`RotationRequest`])
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 once the rotator is ready)
//!
//! The server runs on port 5000 by default (configurable via `METRICS_PORT`).

use crate::controller::RotationController;
use crate::error::RotationError;
use crate::model::{RotationRequest, StepOutcome};
use crate::observability::metrics::REGISTRY;
use crate::store::SecretStore;
use crate::target::CredentialTarget;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub struct ServerState<S, T> {
    pub controller: RotationController<S, T>,
    pub is_ready: AtomicBool,
}

impl<S, T> std::fmt::Debug for ServerState<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("is_ready", &self.is_ready)
            .finish_non_exhaustive()
    }
}

impl<S, T> ServerState<S, T> {
    pub fn new(controller: RotationController<S, T>) -> Self {
        Self {
            controller,
            is_ready: AtomicBool::new(false),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepResponse<'a> {
    secret_id: &'a str,
    request_token: &'a str,
    step: &'a str,
    outcome: StepOutcome,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    retriable: bool,
}

/// HTTP status for a failed step
#[must_use]
pub fn status_for(err: &RotationError) -> StatusCode {
    match err {
        RotationError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
        RotationError::Conflict { .. } => StatusCode::CONFLICT,
        RotationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RotationError::TargetUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for RotationError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
            retriable: self.is_retriable(),
        };
        (status_for(&self), Json(body)).into_response()
    }
}

pub fn router<S, T>(state: Arc<ServerState<S, T>>) -> Router
where
    S: SecretStore + 'static,
    T: CredentialTarget + 'static,
{
    Router::new()
        .route("/rotate", post(rotate_handler::<S, T>))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler::<S, T>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server<S, T>(port: u16, state: Arc<ServerState<S, T>>) -> Result<(), anyhow::Error>
where
    S: SecretStore + 'static,
    T: CredentialTarget + 'static,
{
    let app = router(Arc::clone(&state));

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    state.is_ready.store(true, Ordering::Relaxed);

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn rotate_handler<S, T>(
    State(state): State<Arc<ServerState<S, T>>>,
    Json(request): Json<RotationRequest>,
) -> Result<Response, RotationError>
where
    S: SecretStore + 'static,
    T: CredentialTarget + 'static,
{
    let outcome = state.controller.dispatch(&request).await?;
    let body = StepResponse {
        secret_id: &request.secret_id,
        request_token: &request.request_token,
        step: request.step.as_str(),
        outcome,
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler<S, T>(State(state): State<Arc<ServerState<S, T>>>) -> impl IntoResponse
where
    S: SecretStore + 'static,
    T: CredentialTarget + 'static,
{
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
