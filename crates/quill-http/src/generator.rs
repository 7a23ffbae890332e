// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation provider backed by an HTTP endpoint.
//!
//! The job is posted as JSON; the endpoint answers with an NDJSON frame
//! stream that is decoded incrementally as chunks arrive.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use quill_config::GeneratorConfig;
use quill_core::{
    AdapterType, ConversationId, FrameStream, GenerationProvider, HealthStatus, Job, JobId,
    JobPayload, MessageId, PluginAdapter, QuillError,
};
use quill_protocol::decode_stream;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{build_client, error_body, is_transient_status, transport_error};

/// Body posted to the generation endpoint.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    job_id: &'a JobId,
    message_id: &'a MessageId,
    conversation_id: &'a ConversationId,
    attempt: u32,
    #[serde(flatten)]
    payload: &'a JobPayload,
}

/// Calls an external generation service over HTTP.
///
/// Transient statuses (429, 5xx gateway errors) are retried once in place
/// before the failure is handed back to the dispatcher's own retry budget.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl HttpGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, QuillError> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            QuillError::Config("generator.endpoint is required for the HTTP generator".into())
        })?;
        let timeout = config.timeout();
        Ok(Self {
            client: build_client(config.api_key.as_deref(), Some(timeout))?,
            endpoint,
            timeout,
            max_retries: 1,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Overrides the pause before the in-place retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn open(&self, job: &Job) -> Result<FrameStream, QuillError> {
        let request = GenerateRequest {
            job_id: &job.id,
            message_id: &job.message_id,
            conversation_id: &job.conversation_id,
            attempt: job.retry_count + 1,
            payload: &job.payload,
        };

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(job_id = %job.id, attempt, "retrying generation request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let response = self
                .client
                .post(&self.endpoint)
                .json(&request)
                .send()
                .await
                .map_err(|e| transport_error(e, Some(self.timeout)))?;

            let status = response.status();
            debug!(job_id = %job.id, status = %status, attempt, "generation response received");

            if status.is_success() {
                return Ok(decode_stream(response.bytes_stream()));
            }

            let body = error_body(response).await;
            let error = QuillError::generation(format!("generator returned {status}: {body}"));
            if is_transient_status(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(error);
                continue;
            }
            return Err(error);
        }

        Err(last_error
            .unwrap_or_else(|| QuillError::generation("generation request failed after retries")))
    }
}

#[async_trait]
impl PluginAdapter for HttpGenerator {
    fn name(&self) -> &str {
        "http-generator"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generator
    }

    async fn health_check(&self) -> Result<HealthStatus, QuillError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), QuillError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerator {
    async fn generate(
        &self,
        job: &Job,
        cancel: CancellationToken,
    ) -> Result<FrameStream, QuillError> {
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QuillError::Cancelled),
            opened = self.open(job) => opened?,
        };
        Ok(stream.take_until(cancel.cancelled_owned()).boxed())
    }
}
