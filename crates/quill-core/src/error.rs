// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Quill generation pipeline.

use thiserror::Error;

use crate::types::JobStatus;

/// The primary error type used across all Quill adapter traits and core operations.
#[derive(Debug, Error)]
pub enum QuillError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Generation call errors (upstream failure, transport error, bad status).
    #[error("generation error: {message}")]
    Generation {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Frame protocol errors that cannot be skipped (e.g. encoding failure).
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Optional context lookups failed. Never fatal to a job.
    #[error("enrichment error: {message}")]
    Enrichment { message: String },

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A status transition that the job state machine does not allow.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// The operation was abandoned because the job was cancelled.
    #[error("job cancelled")]
    Cancelled,

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuillError {
    /// Shorthand for a generation error without an underlying source.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the dispatcher should count this failure against the retry budget
    /// and requeue, rather than treat it as a non-retryable outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Generation { .. } | Self::Timeout { .. } | Self::Storage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_timeout_and_storage_are_transient() {
        assert!(QuillError::generation("upstream 503").is_transient());
        assert!(
            QuillError::Timeout {
                duration: std::time::Duration::from_secs(5)
            }
            .is_transient()
        );
        assert!(
            QuillError::Storage {
                source: Box::new(std::io::Error::other("database is locked"))
            }
            .is_transient()
        );
        assert!(!QuillError::Cancelled.is_transient());
        assert!(!QuillError::Internal("bug".into()).is_transient());
    }

    #[test]
    fn invalid_transition_message_names_both_states() {
        let err = QuillError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Queued,
        };
        assert_eq!(err.to_string(), "invalid transition from completed to queued");
    }
}
