// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Frame source that reads a job's live stream from a Quill gateway.

use async_trait::async_trait;
use quill_checkpoint::{FrameSource, OpenedStream};
use quill_core::{JobId, QuillError};
use quill_protocol::decode_stream;
use reqwest::StatusCode;
use tracing::debug;

use crate::client::{build_client, error_body, join_url, transport_error};

/// Attempt the gateway served, from the `x-quill-attempt` header.
const ATTEMPT_HEADER: &str = "x-quill-attempt";
/// Offset the body starts at, from the `x-quill-offset` header.
const OFFSET_HEADER: &str = "x-quill-offset";

/// Opens `GET /v1/jobs/{id}/stream?from={offset}&attempt={attempt}` on a
/// gateway.
///
/// A 404 or 410 means the gateway no longer holds the stream, which the
/// reader treats as gone rather than as an error. A gateway that sends no
/// position headers is taken to have honoured the requested offset.
#[derive(Debug, Clone)]
pub struct HttpFrameSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFrameSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, QuillError> {
        Ok(Self {
            client: build_client(None, None)?,
            base_url: base_url.into(),
        })
    }

    fn stream_url(&self, job_id: &JobId, offset: u64, attempt: Option<u32>) -> String {
        let mut path = format!("v1/jobs/{job_id}/stream?from={offset}");
        if let Some(attempt) = attempt {
            path.push_str(&format!("&attempt={attempt}"));
        }
        join_url(&self.base_url, &path)
    }
}

fn header_number<T: std::str::FromStr>(response: &reqwest::Response, name: &str) -> Option<T> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn open(
        &self,
        job_id: &JobId,
        offset: u64,
        attempt: Option<u32>,
    ) -> Result<Option<OpenedStream>, QuillError> {
        let response = self
            .client
            .get(self.stream_url(job_id, offset, attempt))
            .send()
            .await
            .map_err(|e| transport_error(e, None))?;

        let status = response.status();
        debug!(job_id = %job_id, offset, status = %status, "stream opened");
        match status {
            s if s.is_success() => {
                let from = header_number(&response, OFFSET_HEADER).unwrap_or(offset);
                let served = header_number(&response, ATTEMPT_HEADER);
                Ok(Some(OpenedStream {
                    frames: decode_stream(response.bytes_stream()),
                    from,
                    attempt: served,
                }))
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            _ => {
                let body = error_body(response).await;
                Err(QuillError::generation(format!(
                    "gateway returned {status}: {body}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use quill_core::Frame;
    use quill_protocol::encode_frames;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn opens_at_offset() {
        let server = MockServer::start().await;
        let frames = vec![Frame::text("c"), Frame::text("d")];
        Mock::given(method("GET"))
            .and(path("/v1/jobs/job-1/stream"))
            .and(query_param("from", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(encode_frames(&frames).unwrap()))
            .mount(&server)
            .await;

        let source = HttpFrameSource::new(server.uri()).unwrap();
        let opened = source.open(&"job-1".into(), 2, None).await.unwrap().unwrap();
        assert_eq!(opened.from, 2);
        assert_eq!(opened.attempt, None);
        let got: Vec<Frame> = opened.frames.map(|f| f.unwrap()).collect().await;
        assert_eq!(got, frames);
    }

    #[tokio::test]
    async fn reports_position_the_gateway_served() {
        let server = MockServer::start().await;
        let frames = vec![Frame::text("Good"), Frame::text("bye")];
        Mock::given(method("GET"))
            .and(path("/v1/jobs/job-1/stream"))
            .and(query_param("from", "1"))
            .and(query_param("attempt", "0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-quill-attempt", "1")
                    .insert_header("x-quill-offset", "0")
                    .set_body_string(encode_frames(&frames).unwrap()),
            )
            .mount(&server)
            .await;

        let source = HttpFrameSource::new(server.uri()).unwrap();
        let opened = source.open(&"job-1".into(), 1, Some(0)).await.unwrap().unwrap();
        assert_eq!(opened.from, 0);
        assert_eq!(opened.attempt, Some(1));
        let got: Vec<Frame> = opened.frames.map(|f| f.unwrap()).collect().await;
        assert_eq!(got, frames);
    }

    #[tokio::test]
    async fn gone_stream_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let source = HttpFrameSource::new(server.uri()).unwrap();
        assert!(source.open(&"job-1".into(), 0, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_error_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let source = HttpFrameSource::new(server.uri()).unwrap();
        let err = source.open(&"job-1".into(), 0, None).await.err().unwrap();
        assert!(err.to_string().contains("boom"), "got: {err}");
    }
}
