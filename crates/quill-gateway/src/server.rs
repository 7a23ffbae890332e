// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    routing::{get, post},
};
use quill_config::GatewayConfig;
use quill_core::QuillError;
use quill_dispatch::Dispatcher;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{handlers, stream};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Queue access, cancellation and the live frame hub.
    pub dispatcher: Arc<Dispatcher>,
    /// Process start time for uptime calculation.
    pub start_time: Instant,
}

impl GatewayState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            start_time: Instant::now(),
        }
    }
}

/// Builds the gateway routes:
/// - GET /health
/// - POST /v1/jobs, GET /v1/jobs
/// - GET /v1/jobs/{id}
/// - POST /v1/jobs/{id}/cancel
/// - GET /v1/jobs/{id}/stream
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route(
            "/v1/jobs",
            post(handlers::post_job).get(handlers::list_jobs),
        )
        .route("/v1/jobs/{id}", get(handlers::get_job))
        .route("/v1/jobs/{id}/cancel", post(handlers::cancel_job))
        .route("/v1/jobs/{id}/stream", get(stream::stream_job))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds to the configured host:port and serves until `shutdown` fires.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), QuillError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| QuillError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| QuillError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
