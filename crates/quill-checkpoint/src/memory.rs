// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process checkpoint store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use quill_core::traits::checkpoint::checkpoint_key;
use quill_core::{Checkpoint, CheckpointStore, MessageId, QuillError};

/// Checkpoints held in a concurrent map, lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: DashMap<String, Checkpoint>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, message_id: &MessageId) -> Result<Option<Checkpoint>, QuillError> {
        Ok(self
            .entries
            .get(&checkpoint_key(message_id))
            .map(|entry| entry.value().clone()))
    }

    async fn set(&self, checkpoint: &Checkpoint) -> Result<(), QuillError> {
        self.entries
            .insert(checkpoint_key(&checkpoint.message_id), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, message_id: &MessageId) -> Result<(), QuillError> {
        self.entries.remove(&checkpoint_key(message_id));
        Ok(())
    }

    async fn sweep_expired(&self, max_age: Duration) -> Result<usize, QuillError> {
        let now = chrono::Utc::now().timestamp_millis();
        let before = self.entries.len();
        self.entries.retain(|_, cp| !cp.is_expired(max_age, now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}
