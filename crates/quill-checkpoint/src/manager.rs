// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checkpoint lifecycle: save, expiring load, clear, sweep and recovery.

use std::sync::Arc;
use std::time::Duration;

use quill_core::{Checkpoint, CheckpointStore, ConversationId, MessageId, QuillError};
use quill_protocol::{FrameAccumulator, decode_lines};
use tracing::{debug, info};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_FLUSH_EVERY: u64 = 100;

/// Visible state reconstructed from a checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredState {
    pub content: String,
    pub thinking: Option<String>,
    /// Frames already reflected in `content`/`thinking`. Zero when the
    /// offset is unknown, in which case the stream has to be replayed from
    /// the start and the restored state rebuilt.
    pub frame_offset: u64,
    /// Attempt `frame_offset` belongs to, if recorded.
    pub attempt: Option<u32>,
    pub is_complete: bool,
    /// Whether the state was rebuilt by decoding a raw protocol blob.
    pub from_raw: bool,
}

impl RecoveredState {
    pub fn into_accumulator(self) -> FrameAccumulator {
        FrameAccumulator::resume_from(self.content, self.thinking, self.frame_offset)
    }
}

/// Wraps a [`CheckpointStore`] with expiry and flush-interval policy.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    ttl: Duration,
    flush_every: u64,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            store,
            ttl: DEFAULT_TTL,
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Frames between saves. Zero is treated as one.
    pub fn with_flush_every(mut self, frames: u64) -> Self {
        self.flush_every = frames.max(1);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn flush_every(&self) -> u64 {
        self.flush_every
    }

    /// Overwrites the checkpoint for `message_id`, stamped with the current time.
    pub async fn save_checkpoint(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        state: &FrameAccumulator,
        attempt: Option<u32>,
        is_complete: bool,
    ) -> Result<Checkpoint, QuillError> {
        let checkpoint = Checkpoint {
            conversation_id: conversation_id.clone(),
            message_id: message_id.clone(),
            content: state.content().to_string(),
            thinking: state.thinking().map(str::to_string),
            timestamp: now_ms(),
            is_complete,
            frame_offset: state.frames_applied(),
            raw: None,
            attempt,
        };
        self.store.set(&checkpoint).await?;
        debug!(
            message_id = %message_id,
            frame_offset = checkpoint.frame_offset,
            is_complete,
            "checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// Returns the checkpoint unless it has expired, in which case it is
    /// deleted and `None` is returned.
    pub async fn load_checkpoint(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Checkpoint>, QuillError> {
        let Some(checkpoint) = self.store.get(message_id).await? else {
            return Ok(None);
        };
        if checkpoint.is_expired(self.ttl, now_ms()) {
            info!(message_id = %message_id, "discarding expired checkpoint");
            self.store.delete(message_id).await?;
            return Ok(None);
        }
        Ok(Some(checkpoint))
    }

    pub async fn clear_checkpoint(&self, message_id: &MessageId) -> Result<(), QuillError> {
        self.store.delete(message_id).await?;
        debug!(message_id = %message_id, "checkpoint cleared");
        Ok(())
    }

    /// Removes every checkpoint past the TTL.
    pub async fn sweep(&self) -> Result<usize, QuillError> {
        self.store.sweep_expired(self.ttl).await
    }

    /// Loads a checkpoint and rebuilds visible state from it.
    ///
    /// Structured `content`/`thinking` win; a checkpoint carrying only a raw
    /// blob of protocol lines is decoded through the frame codec instead.
    /// Corrupt lines in a blob are dropped, so its frame count says nothing
    /// reliable about the server's log and the offset is left unknown.
    pub async fn recover(&self, message_id: &MessageId) -> Result<Option<RecoveredState>, QuillError> {
        let Some(checkpoint) = self.load_checkpoint(message_id).await? else {
            return Ok(None);
        };

        let raw = match checkpoint.raw {
            Some(raw) if !checkpoint.has_structured_state() => raw,
            _ => {
                return Ok(Some(RecoveredState {
                    content: checkpoint.content,
                    thinking: checkpoint.thinking.filter(|t| !t.is_empty()),
                    frame_offset: checkpoint.frame_offset,
                    attempt: checkpoint.attempt,
                    is_complete: checkpoint.is_complete,
                    from_raw: false,
                }));
            }
        };

        let frames = decode_lines(&raw);
        let mut acc = FrameAccumulator::new();
        acc.apply_all(&frames);
        debug!(message_id = %message_id, frames = frames.len(), "recovered checkpoint from raw blob");
        Ok(Some(RecoveredState {
            content: acc.content().to_string(),
            thinking: acc.thinking().map(str::to_string),
            frame_offset: 0,
            attempt: None,
            is_complete: checkpoint.is_complete,
            from_raw: true,
        }))
    }

    /// Whether a save is due after `frames_applied` frames.
    pub fn should_flush(&self, frames_applied: u64) -> bool {
        frames_applied > 0 && frames_applied % self.flush_every == 0
    }
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCheckpointStore;
    use quill_core::Frame;

    fn manager() -> (CheckpointManager, Arc<MemoryCheckpointStore>) {
        let store = Arc::new(MemoryCheckpointStore::new());
        (CheckpointManager::new(store.clone()), store)
    }

    fn accumulated(texts: &[&str]) -> FrameAccumulator {
        let mut acc = FrameAccumulator::new();
        for t in texts {
            acc.apply(&Frame::text(*t));
        }
        acc
    }

    #[tokio::test]
    async fn save_then_load() {
        let (manager, _) = manager();
        let acc = accumulated(&["a", "b"]);
        manager
            .save_checkpoint(&"c".into(), &"m".into(), &acc, Some(2), false)
            .await
            .unwrap();

        let cp = manager.load_checkpoint(&"m".into()).await.unwrap().unwrap();
        assert_eq!(cp.content, "ab");
        assert_eq!(cp.frame_offset, 2);
        assert_eq!(cp.attempt, Some(2));
        assert!(!cp.is_complete);
        assert!(cp.thinking.is_none());
    }

    #[tokio::test]
    async fn expired_checkpoint_is_deleted_on_load() {
        let (manager, store) = manager();
        store
            .set(&Checkpoint {
                conversation_id: "c".into(),
                message_id: "m".into(),
                content: "stale".into(),
                thinking: None,
                timestamp: now_ms() - DEFAULT_TTL.as_millis() as i64 - 1_000,
                is_complete: false,
                frame_offset: 1,
                raw: None,
                attempt: None,
            })
            .await
            .unwrap();

        assert!(manager.load_checkpoint(&"m".into()).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn checkpoint_within_custom_ttl_is_returned() {
        let (manager, store) = manager();
        let ttl = Duration::from_secs(60);
        let manager = manager.with_ttl(ttl);
        store
            .set(&Checkpoint {
                conversation_id: "c".into(),
                message_id: "m".into(),
                content: "edge".into(),
                thinking: None,
                timestamp: now_ms() - 30_000,
                is_complete: false,
                frame_offset: 1,
                raw: None,
                attempt: None,
            })
            .await
            .unwrap();
        assert!(manager.load_checkpoint(&"m".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn recover_prefers_structured_fields() {
        let (manager, store) = manager();
        store
            .set(&Checkpoint {
                conversation_id: "c".into(),
                message_id: "m".into(),
                content: "structured".into(),
                thinking: Some("t".into()),
                timestamp: now_ms(),
                is_complete: false,
                frame_offset: 4,
                raw: Some("{\"type\":\"text\",\"content\":\"raw\"}\n".into()),
                attempt: None,
            })
            .await
            .unwrap();

        let state = manager.recover(&"m".into()).await.unwrap().unwrap();
        assert_eq!(state.content, "structured");
        assert_eq!(state.thinking.as_deref(), Some("t"));
        assert_eq!(state.frame_offset, 4);
        assert!(!state.from_raw);
    }

    #[tokio::test]
    async fn recover_falls_back_to_raw_blob() {
        let (manager, store) = manager();
        let raw = concat!(
            "{\"type\":\"thinking\",\"content\":\"plan \"}\n",
            "{\"type\":\"text\",\"content\":\"Hel\"}\n",
            "garbage line\n",
            "{\"type\":\"text\",\"content\":\"lo\"}\n",
        );
        store
            .set(&Checkpoint {
                conversation_id: "c".into(),
                message_id: "m".into(),
                content: String::new(),
                thinking: None,
                timestamp: now_ms(),
                is_complete: false,
                frame_offset: 0,
                raw: Some(raw.into()),
                attempt: None,
            })
            .await
            .unwrap();

        let state = manager.recover(&"m".into()).await.unwrap().unwrap();
        assert!(state.from_raw);
        assert_eq!(state.content, "Hello");
        assert_eq!(state.thinking.as_deref(), Some("plan "));
        // Three of four lines decoded; the server's offset is not knowable.
        assert_eq!(state.frame_offset, 0);
        assert_eq!(state.attempt, None);
    }

    #[test]
    fn flush_cadence() {
        let (manager, _) = manager();
        let manager = manager.with_flush_every(100);
        assert!(!manager.should_flush(0));
        assert!(!manager.should_flush(99));
        assert!(manager.should_flush(100));
        assert!(!manager.should_flush(150));
        assert!(manager.should_flush(200));
    }

    #[tokio::test]
    async fn sweep_delegates_with_ttl() {
        let (manager, store) = manager();
        store
            .set(&Checkpoint {
                conversation_id: "c".into(),
                message_id: "orphan".into(),
                content: "x".into(),
                thinking: None,
                timestamp: 0,
                is_complete: false,
                frame_offset: 1,
                raw: None,
                attempt: None,
            })
            .await
            .unwrap();
        assert_eq!(manager.sweep().await.unwrap(), 1);
    }
}
