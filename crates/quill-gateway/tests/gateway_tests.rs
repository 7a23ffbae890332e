// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway routes exercised in-process against a real queue.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use quill_core::{Frame, GenerationStatus, JobStatus};
use quill_gateway::handlers::{CancelResponse, EnqueueResponse, HealthResponse, JobListResponse, JobView};
use quill_gateway::{GatewayState, router};
use quill_protocol::decode_lines;
use quill_test_utils::{Script, TestHarness};
use tower::ServiceExt;

fn app(harness: &TestHarness) -> axum::Router {
    router(GatewayState::new(harness.dispatcher.clone()))
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, json: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn enqueue_body(message_id: &str) -> serde_json::Value {
    serde_json::json!({
        "message_id": message_id,
        "conversation_id": "conv-1",
        "owner_id": "owner-1",
        "priority": 0,
        "payload": {
            "model": "m-1",
            "messages": [{"role": "user", "content": "hello"}]
        }
    })
}

#[tokio::test]
async fn enqueue_then_get_and_list() {
    let harness = TestHarness::builder().build().await.unwrap();

    let (status, body) = send(app(&harness), post_json("/v1/jobs", enqueue_body("msg-1"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let created: EnqueueResponse = serde_json::from_slice(&body).unwrap();

    let (status, body) = send(app(&harness), get(&format!("/v1/jobs/{}", created.job_id))).await;
    assert_eq!(status, StatusCode::OK);
    let job: JobView = serde_json::from_slice(&body).unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.message_id, "msg-1");

    let (status, body) = send(app(&harness), get("/v1/jobs?owner_id=owner-1&status=queued")).await;
    assert_eq!(status, StatusCode::OK);
    let list: JobListResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(list.jobs.len(), 1);

    let (_, body) = send(app(&harness), get("/v1/jobs?owner_id=owner-1&status=completed")).await;
    let list: JobListResponse = serde_json::from_slice(&body).unwrap();
    assert!(list.jobs.is_empty());
}

#[tokio::test]
async fn enqueue_rejects_missing_fields() {
    let harness = TestHarness::builder().build().await.unwrap();
    let mut body = enqueue_body("msg-1");
    body["owner_id"] = serde_json::json!("");

    let (status, body) = send(app(&harness), post_json("/v1/jobs", body)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(String::from_utf8_lossy(&body).contains("owner_id"));
}

#[tokio::test]
async fn unknown_job_is_404() {
    let harness = TestHarness::builder().build().await.unwrap();
    let (status, _) = send(app(&harness), get("/v1/jobs/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_is_applied_once() {
    let harness = TestHarness::builder().build().await.unwrap();
    let id = harness.enqueue("msg-1", 0).await.unwrap();
    let uri = format!("/v1/jobs/{id}/cancel");

    let (status, body) = send(app(&harness), post_json(&uri, serde_json::json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let first: CancelResponse = serde_json::from_slice(&body).unwrap();
    assert!(first.cancelled);

    let (_, body) = send(app(&harness), post_json(&uri, serde_json::json!({}))).await;
    let second: CancelResponse = serde_json::from_slice(&body).unwrap();
    assert!(!second.cancelled);
    assert_eq!(harness.job(&id).await.unwrap().status, JobStatus::Cancelled);
}

#[tokio::test]
async fn stream_replays_completed_job_from_offset() {
    let harness = TestHarness::builder()
        .with_scripts(vec![Script::Frames(vec![
            Frame::Status(GenerationStatus::Generating),
            Frame::text("Hel"),
            Frame::text("lo"),
        ])])
        .build()
        .await
        .unwrap();
    let id = harness.enqueue("msg-1", 0).await.unwrap();
    harness.run_until_idle().await.unwrap();

    let response = app(&harness)
        .oneshot(get(&format!("/v1/jobs/{id}/stream?from=1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/x-ndjson"
    );
    assert_eq!(response.headers()["x-quill-attempt"], "0");
    assert_eq!(response.headers()["x-quill-offset"], "1");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let frames = decode_lines(&String::from_utf8(body.to_vec()).unwrap());
    assert_eq!(frames, vec![Frame::text("Hel"), Frame::text("lo")]);
}

#[tokio::test]
async fn stream_with_stale_attempt_restarts_at_zero() {
    let harness = TestHarness::builder()
        .with_max_retries(2)
        .with_scripts(vec![
            Script::BreakAfter(vec![Frame::text("Hel")], "upstream reset".into()),
            Script::Frames(vec![Frame::text("Good"), Frame::text("bye")]),
        ])
        .build()
        .await
        .unwrap();
    let id = harness.enqueue("msg-1", 0).await.unwrap();
    harness.run_until_idle().await.unwrap();

    let response = app(&harness)
        .oneshot(get(&format!("/v1/jobs/{id}/stream?from=1&attempt=0")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-quill-attempt"], "1");
    assert_eq!(response.headers()["x-quill-offset"], "0");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let frames = decode_lines(&String::from_utf8(body.to_vec()).unwrap());
    assert_eq!(frames, vec![Frame::text("Good"), Frame::text("bye")]);

    let response = app(&harness)
        .oneshot(get(&format!("/v1/jobs/{id}/stream?from=1&attempt=1")))
        .await
        .unwrap();
    assert_eq!(response.headers()["x-quill-offset"], "1");
}

#[tokio::test]
async fn stream_without_log_is_gone() {
    let harness = TestHarness::builder().build().await.unwrap();
    let id = harness.enqueue("msg-1", 0).await.unwrap();

    let (status, _) = send(app(&harness), get(&format!("/v1/jobs/{id}/stream"))).await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn failed_job_stream_aborts_body() {
    let harness = TestHarness::builder()
        .with_max_retries(0)
        .with_scripts(vec![Script::BreakAfter(
            vec![Frame::text("par")],
            "upstream reset".into(),
        )])
        .build()
        .await
        .unwrap();
    let id = harness.enqueue("msg-1", 0).await.unwrap();
    harness.run_until_idle().await.unwrap();

    let response = app(&harness)
        .oneshot(get(&format!("/v1/jobs/{id}/stream")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
}

#[tokio::test]
async fn health_reports_version_and_queue() {
    let harness = TestHarness::builder().build().await.unwrap();
    let (status, body) = send(app(&harness), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(health.active_jobs, Some(0));
}
