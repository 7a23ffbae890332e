// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable job queue trait.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QuillError;
use crate::types::{Job, JobId, JobStatus, NewJob, OwnerId, RetryOutcome, StatusUpdate};

/// Durable record of generation requests with priority and concurrency control.
///
/// The queue is the single source of truth for concurrency accounting. Every
/// mutating method is a single atomic step against the backing store; callers
/// never read-then-write.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Inserts a new job in `queued` state and returns its id.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QuillError>;

    /// Claims the most urgent claimable job and moves it to `processing`,
    /// but only while fewer than `max_concurrent` jobs are active.
    async fn dequeue(&self, max_concurrent: usize) -> Result<Option<Job>, QuillError>;

    /// Fetches a job by id.
    async fn get(&self, id: &JobId) -> Result<Option<Job>, QuillError>;

    /// Applies a guarded transition. Returns `false` when the transition was
    /// ignored (terminal job or already applied).
    async fn update_status(&self, id: &JobId, update: StatusUpdate) -> Result<bool, QuillError>;

    /// Records a generation failure: requeues with backoff while retries
    /// remain, otherwise marks the job permanently `failed`.
    async fn retry_or_fail(
        &self,
        id: &JobId,
        error: &str,
        backoff: Duration,
    ) -> Result<RetryOutcome, QuillError>;

    /// Cancels a non-terminal job. Returns whether the cancel was applied.
    async fn cancel(&self, id: &JobId) -> Result<bool, QuillError>;

    /// Lists an owner's jobs, oldest first, optionally filtered by status.
    async fn list_by_owner(
        &self,
        owner: &OwnerId,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, QuillError>;

    /// Refreshes an active job's `updated_at` lease and returns its current
    /// status, or `None` if the job does not exist.
    async fn heartbeat(&self, id: &JobId) -> Result<Option<JobStatus>, QuillError>;

    /// Number of jobs currently in `processing` or `streaming`.
    async fn active_count(&self) -> Result<usize, QuillError>;

    /// Returns jobs abandoned in an active state for longer than `lease` to
    /// the retry path. Returns how many jobs were recovered.
    async fn recover_stale(&self, lease: Duration) -> Result<usize, QuillError>;
}
