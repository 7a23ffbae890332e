// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the job API.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use quill_core::{Job, JobId, JobStatus, NewJob, OwnerId, QuillError};

use crate::server::GatewayState;

/// Response body for POST /v1/jobs.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub job_id: JobId,
}

/// Query string of GET /v1/jobs.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: String,
    #[serde(default)]
    pub status: Option<JobStatus>,
}

/// A job record as returned by the API. The payload is not echoed back.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub priority: i64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id.0,
            message_id: job.message_id.0,
            conversation_id: job.conversation_id.0,
            owner_id: job.owner_id.0,
            status: job.status,
            priority: job.priority,
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Response body for GET /v1/jobs.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobView>,
}

/// Response body for POST /v1/jobs/{id}/cancel.
#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Response body for GET /health.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_jobs: Option<usize>,
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn internal_error(e: QuillError) -> Response {
    error!(error = %e, "request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn validate(job: &NewJob) -> Result<(), String> {
    let mut missing = Vec::new();
    if job.message_id.as_str().is_empty() {
        missing.push("message_id");
    }
    if job.conversation_id.as_str().is_empty() {
        missing.push("conversation_id");
    }
    if job.owner_id.as_str().is_empty() {
        missing.push("owner_id");
    }
    if job.payload.model.is_empty() {
        missing.push("payload.model");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(format!("missing required fields: {}", missing.join(", ")))
    }
}

/// POST /v1/jobs
pub async fn post_job(State(state): State<GatewayState>, Json(body): Json<NewJob>) -> Response {
    if let Err(message) = validate(&body) {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, message);
    }

    match state.dispatcher.queue().enqueue(body).await {
        Ok(job_id) => {
            info!(job_id = %job_id, "job enqueued");
            (StatusCode::CREATED, Json(EnqueueResponse { job_id })).into_response()
        }
        Err(e) => internal_error(e),
    }
}

/// GET /v1/jobs?owner_id=…&status=…
pub async fn list_jobs(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let owner = OwnerId::from(query.owner_id);
    match state.dispatcher.queue().list_by_owner(&owner, query.status).await {
        Ok(jobs) => Json(JobListResponse {
            jobs: jobs.into_iter().map(JobView::from).collect(),
        })
        .into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /v1/jobs/{id}
pub async fn get_job(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    match state.dispatcher.queue().get(&JobId::from(id.clone())).await {
        Ok(Some(job)) => Json(JobView::from(job)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("job not found: {id}")),
        Err(e) => internal_error(e),
    }
}

/// POST /v1/jobs/{id}/cancel
pub async fn cancel_job(State(state): State<GatewayState>, Path(id): Path<String>) -> Response {
    match state.dispatcher.cancel(&JobId::from(id)).await {
        Ok(cancelled) => Json(CancelResponse { cancelled }).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let active_jobs = state.dispatcher.queue().active_count().await.ok();
    Json(HealthResponse {
        status: if active_jobs.is_some() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_jobs,
    })
}
