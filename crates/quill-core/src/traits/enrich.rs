// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optional context enrichment applied before generation.

use async_trait::async_trait;

use crate::error::QuillError;
use crate::types::JobPayload;

/// Resolves `context_refs` into payload context.
///
/// Errors are reported to the caller but are never fatal to the job.
#[async_trait]
pub trait ContextEnricher: Send + Sync {
    async fn enrich(&self, payload: &JobPayload) -> Result<Option<serde_json::Value>, QuillError>;

    /// Drops cached results past their lifetime. Returns how many went.
    fn evict_expired(&self) -> usize {
        0
    }
}

/// Enricher that resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEnricher;

#[async_trait]
impl ContextEnricher for NoopEnricher {
    async fn enrich(&self, _payload: &JobPayload) -> Result<Option<serde_json::Value>, QuillError> {
        Ok(None)
    }
}
