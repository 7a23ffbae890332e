// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live NDJSON frame stream for GET /v1/jobs/{id}/stream.
//!
//! The body replays the job's frame log from `from`, follows live frames,
//! and ends cleanly only when the job completes. Any other ending aborts
//! the body, so a client never mistakes a failed job for a finished one.
//!
//! Offsets count frames of one attempt. A client passes the attempt its
//! offset belongs to; the response headers name the attempt served and the
//! offset the body actually starts at, which is 0 when the job has been
//! retried since.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use quill_core::JobId;
use quill_protocol::encode_frame;
use serde::Deserialize;
use tracing::debug;

use crate::handlers::error_response;
use crate::server::GatewayState;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
/// Attempt the streamed frames belong to.
pub const ATTEMPT_HEADER: &str = "x-quill-attempt";
/// Frame offset of the first frame in the body.
pub const OFFSET_HEADER: &str = "x-quill-offset";

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Number of frames the client already has.
    #[serde(default)]
    pub from: u64,
    /// Attempt `from` was counted in.
    #[serde(default)]
    pub attempt: Option<u32>,
}

pub async fn stream_job(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let job_id = JobId::from(id);
    let Some(subscription) = state
        .dispatcher
        .hub()
        .subscribe(&job_id, query.from, query.attempt)
    else {
        return error_response(
            StatusCode::GONE,
            format!("no live stream for job {job_id}"),
        );
    };
    debug!(
        job_id = %job_id,
        from = subscription.from,
        attempt = subscription.attempt,
        "stream subscriber attached"
    );

    let body = subscription
        .frames
        .map(|frame| frame.and_then(|frame| encode_frame(&frame)));
    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE.to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        [
            (ATTEMPT_HEADER, subscription.attempt.to_string()),
            (OFFSET_HEADER, subscription.from.to_string()),
        ],
        Body::from_stream(body),
    )
        .into_response()
}
