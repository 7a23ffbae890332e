// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation call trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::QuillError;
use crate::types::{Frame, Job};

/// Ordered stream of frames produced by one generation call.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, QuillError>> + Send>>;

/// Invokes the underlying model for a job.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Opens a generation stream for `job`.
    ///
    /// Implementations should stop producing frames once `cancel` fires.
    async fn generate(&self, job: &Job, cancel: CancellationToken)
    -> Result<FrameStream, QuillError>;
}
