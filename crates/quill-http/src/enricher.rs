// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Context lookup over HTTP.

use async_trait::async_trait;
use quill_core::{ContextEnricher, JobPayload, QuillError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{build_client, error_body};

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    context_refs: &'a [String],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    context: Option<serde_json::Value>,
}

/// Posts `context_refs` to a lookup service and returns its `context`.
///
/// Payloads without refs never reach the network.
#[derive(Debug, Clone)]
pub struct HttpEnricher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEnricher {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, QuillError> {
        Ok(Self {
            client: build_client(None, Some(std::time::Duration::from_secs(10)))?,
            endpoint: endpoint.into(),
        })
    }
}

fn enrichment_error(message: String) -> QuillError {
    QuillError::Enrichment { message }
}

#[async_trait]
impl ContextEnricher for HttpEnricher {
    async fn enrich(&self, payload: &JobPayload) -> Result<Option<serde_json::Value>, QuillError> {
        if payload.context_refs.is_empty() {
            return Ok(None);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&LookupRequest {
                context_refs: &payload.context_refs,
            })
            .send()
            .await
            .map_err(|e| enrichment_error(format!("lookup request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(enrichment_error(format!("lookup returned {status}: {body}")));
        }

        let parsed: LookupResponse = response
            .json()
            .await
            .map_err(|e| enrichment_error(format!("failed to parse lookup response: {e}")))?;
        debug!(refs = payload.context_refs.len(), found = parsed.context.is_some(), "context resolved");
        Ok(parsed.context)
    }
}
