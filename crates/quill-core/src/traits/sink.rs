// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Side-effect sinks written by the dispatcher on terminal outcomes.

use async_trait::async_trait;

use crate::error::QuillError;
use crate::types::{Notification, PersistedMessage};

/// Persists final generated content as a conversation message.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Writes the message. Writing the same message id twice is a no-op.
    async fn persist_message(&self, message: &PersistedMessage) -> Result<(), QuillError>;
}

/// Fire-and-forget owner notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the notification at most once per (job id, kind).
    ///
    /// Returns `true` if this call delivered it.
    async fn notify(&self, notification: &Notification) -> Result<bool, QuillError>;
}
