// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-local key-value storage for checkpoints.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QuillError;
use crate::types::{Checkpoint, MessageId};

/// Pluggable checkpoint storage.
///
/// A store holds at most one checkpoint per message id. It is owned by a
/// single client session and never shared between concurrent writers for
/// the same message.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn get(&self, message_id: &MessageId) -> Result<Option<Checkpoint>, QuillError>;

    /// Overwrites the checkpoint for `checkpoint.message_id`.
    async fn set(&self, checkpoint: &Checkpoint) -> Result<(), QuillError>;

    async fn delete(&self, message_id: &MessageId) -> Result<(), QuillError>;

    /// Deletes every checkpoint older than `max_age`. Returns how many were removed.
    async fn sweep_expired(&self, max_age: Duration) -> Result<usize, QuillError>;
}

/// Storage key for a message's checkpoint.
pub fn checkpoint_key(message_id: &MessageId) -> String {
    format!("checkpoint:{message_id}")
}
