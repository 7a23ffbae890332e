// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Quill generation pipeline.
//!
//! This crate provides the error type, domain types (jobs, frames,
//! checkpoints, notifications) and the adapter traits that the queue,
//! dispatcher, codec and checkpoint crates are built around.

pub mod error;
pub mod traits;
pub mod types;

pub use error::QuillError;
pub use types::{
    AdapterType, Checkpoint, ConversationId, Frame, FrameKind, GenerationStatus, HealthStatus,
    Job, JobId, JobPayload, JobStatus, MessageId, NewJob, Notification, NotificationKind,
    OwnerId, PersistedMessage, Product, RetryOutcome, StatusUpdate,
};

pub use traits::{
    CheckpointStore, ContextEnricher, FrameStream, GenerationProvider, JobQueue, MessageSink,
    Notifier, PluginAdapter,
};
