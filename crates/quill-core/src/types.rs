// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the queue, dispatcher, codec, and checkpoint layers.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Globally unique job identifier (UUID v4).
    JobId
);
string_id!(
    /// Identifier of the assistant message a job generates.
    MessageId
);
string_id!(
    /// Identifier of the conversation a message belongs to.
    ConversationId
);
string_id!(
    /// Identity of the caller that owns a job.
    OwnerId
);

impl JobId {
    /// Generates a fresh random job id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Current UTC time in the millisecond ISO 8601 format used by storage.
///
/// Matches SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`, so timestamps
/// written from Rust and from SQL compare correctly as strings.
pub fn now_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

/// Formats a UTC instant in the storage timestamp format.
pub fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the role of an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Generator,
    CheckpointStore,
    Enricher,
}

// --- Jobs ---

/// Lifecycle state of a [`Job`].
///
/// `queued → processing → streaming → completed`, with `failed` and
/// `cancelled` as the other terminal states.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States that count against the concurrency ceiling.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Processing | Self::Streaming)
    }

    /// Source states from which a transition into `self` is accepted.
    ///
    /// `Queued` has no public sources: requeueing happens only through the
    /// retry path.
    pub fn allowed_sources(self) -> &'static [JobStatus] {
        match self {
            Self::Queued => &[],
            Self::Processing => &[Self::Queued],
            Self::Streaming => &[Self::Processing],
            Self::Completed | Self::Failed => &[Self::Processing, Self::Streaming],
            Self::Cancelled => &[Self::Queued, Self::Processing, Self::Streaming],
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        next.allowed_sources().contains(&self)
    }
}

/// A single entry of the conversation history sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMessage {
    pub role: String,
    pub content: String,
}

/// Opaque generation input carried by a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    /// Model identifier to generate with.
    pub model: String,
    /// Conversation history, oldest first.
    #[serde(default)]
    pub messages: Vec<PayloadMessage>,
    /// References to external context (brands, documents) resolved by enrichment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_refs: Vec<String>,
    /// Resolved context, filled in by a [`ContextEnricher`](crate::ContextEnricher).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    /// Anything else the caller wants passed through to the generator.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Default retry budget for a job.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// An enqueue request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub owner_id: OwnerId,
    /// Lower value = more urgent.
    #[serde(default)]
    pub priority: i64,
    pub payload: JobPayload,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// One unit of generation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub owner_id: OwnerId,
    pub priority: i64,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
    /// Earliest time a queued job may be claimed (retry backoff).
    pub available_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
}

/// A requested status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn to(status: JobStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// Result of reporting a generation failure to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The job went back to `queued` with one more retry consumed.
    Requeued { retry_count: u32, available_at: String },
    /// The retry budget was exhausted; the job is permanently `failed`.
    Failed { retry_count: u32 },
    /// The job was not active (terminal or cancelled); nothing changed.
    Ignored,
}

// --- Frames ---

/// Discriminator of a [`Frame`] on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum FrameKind {
    Status,
    Thinking,
    Text,
    Products,
}

/// Coarse progress indicator carried by status frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GenerationStatus {
    Queued,
    Analyzing,
    Thinking,
    Searching,
    Generating,
    Complete,
    /// A status value this build does not know about.
    #[serde(other)]
    Unknown,
}

/// A structured entity extracted during generation.
///
/// Only `id` is used for identity, and it may be absent. Fields this build
/// does not model are kept in `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// One ordered unit of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum Frame {
    Status(GenerationStatus),
    Thinking(String),
    Text(String),
    Products(Vec<Product>),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Self::Status(_) => FrameKind::Status,
            Self::Thinking(_) => FrameKind::Thinking,
            Self::Text(_) => FrameKind::Text,
            Self::Products(_) => FrameKind::Products,
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn thinking(s: impl Into<String>) -> Self {
        Self::Thinking(s.into())
    }
}

// --- Checkpoints ---

/// Client-local resumable snapshot of one in-flight message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    /// Accumulated answer text.
    #[serde(default)]
    pub content: String,
    /// Accumulated reasoning text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Save time, Unix milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub is_complete: bool,
    /// Frames applied when this checkpoint was saved.
    #[serde(default)]
    pub frame_offset: u64,
    /// Undifferentiated protocol lines written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Job attempt `frame_offset` was counted in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
}

impl Checkpoint {
    /// Whether the checkpoint is older than `ttl` at `now_ms`.
    pub fn is_expired(&self, ttl: std::time::Duration, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) > ttl.as_millis() as i64
    }

    /// True when neither structured fields nor frame progress are present.
    pub fn has_structured_state(&self) -> bool {
        !self.content.is_empty()
            || self.thinking.as_deref().is_some_and(|t| !t.is_empty())
            || self.frame_offset > 0
    }
}

// --- Outputs ---

/// Terminal notification kinds delivered to the job owner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
    JobCompleted,
    JobFailed,
}

/// A write-once terminal notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub kind: NotificationKind,
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub error: Option<String>,
    pub created_at: String,
}

impl Notification {
    pub fn completed(job: &Job) -> Self {
        Self::for_job(job, NotificationKind::JobCompleted, None)
    }

    pub fn failed(job: &Job, error: impl Into<String>) -> Self {
        Self::for_job(job, NotificationKind::JobFailed, Some(error.into()))
    }

    fn for_job(job: &Job, kind: NotificationKind, error: Option<String>) -> Self {
        Self {
            job_id: job.id.clone(),
            owner_id: job.owner_id.clone(),
            kind,
            conversation_id: job.conversation_id.clone(),
            message_id: job.message_id.clone(),
            error,
            created_at: now_timestamp(),
        }
    }
}

/// Final assistant message written when a job completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: String,
    pub content: String,
    pub thinking: Option<String>,
    pub products: Vec<Product>,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn terminal_states_accept_no_transitions() {
        let all = [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Streaming,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in &all {
                assert!(
                    !from.can_transition_to(*to),
                    "{from} -> {to} must be rejected"
                );
            }
        }
    }

    #[test]
    fn happy_path_transitions_are_allowed() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Streaming));
        assert!(JobStatus::Streaming.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Streaming.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Streaming.can_transition_to(JobStatus::Streaming));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn job_status_string_round_trip() {
        assert_eq!(JobStatus::Streaming.to_string(), "streaming");
        assert_eq!(
            JobStatus::from_str("cancelled").unwrap(),
            JobStatus::Cancelled
        );
        assert!(JobStatus::from_str("paused").is_err());
    }

    #[test]
    fn frame_serializes_with_type_and_content() {
        let json = serde_json::to_string(&Frame::text("Hel")).unwrap();
        assert_eq!(json, r#"{"type":"text","content":"Hel"}"#);

        let json = serde_json::to_string(&Frame::Status(GenerationStatus::Analyzing)).unwrap();
        assert_eq!(json, r#"{"type":"status","content":"analyzing"}"#);
    }

    #[test]
    fn unknown_generation_status_maps_to_unknown() {
        let status: GenerationStatus = serde_json::from_str(r#""rerouting""#).unwrap();
        assert_eq!(status, GenerationStatus::Unknown);
    }

    #[test]
    fn checkpoint_expiry_uses_strict_age() {
        let cp = Checkpoint {
            conversation_id: "c".into(),
            message_id: "m".into(),
            content: String::new(),
            thinking: None,
            timestamp: 1_000,
            is_complete: false,
            frame_offset: 0,
            raw: None,
            attempt: None,
        };
        let ttl = std::time::Duration::from_millis(500);
        assert!(!cp.is_expired(ttl, 1_500));
        assert!(cp.is_expired(ttl, 1_501));
    }

    #[test]
    fn payload_keeps_unknown_fields() {
        let payload: JobPayload = serde_json::from_str(
            r#"{"model":"m-1","messages":[],"brand_id":"b-9","temperature":0.2}"#,
        )
        .unwrap();
        assert_eq!(payload.extra.get("brand_id").unwrap(), "b-9");
        let back = serde_json::to_value(&payload).unwrap();
        assert_eq!(back["temperature"], 0.2);
    }

    #[test]
    fn notification_kind_is_snake_case() {
        assert_eq!(NotificationKind::JobFailed.to_string(), "job_failed");
        assert_eq!(
            NotificationKind::from_str("job_completed").unwrap(),
            NotificationKind::JobCompleted
        );
    }
}
