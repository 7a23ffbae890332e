// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drives one claimed job from generation call to terminal state.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use quill_core::types::now_timestamp;
use quill_core::{
    ContextEnricher, GenerationProvider, Job, JobId, JobQueue, JobStatus, MessageSink,
    Notification, Notifier, PersistedMessage, QuillError, RetryOutcome, StatusUpdate,
};
use quill_protocol::FrameAccumulator;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::hub::{FrameHub, HubOutcome};
use crate::retry::RetryPolicy;

/// Terminal result of one attempt, as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Requeued with backoff; another attempt will follow.
    Retried,
    Failed,
    Cancelled,
    /// Bookkeeping failed mid-way; the stale-lease sweep will pick it up.
    Abandoned,
}

#[derive(Clone)]
pub(crate) struct JobRunner {
    pub(crate) queue: Arc<dyn JobQueue>,
    pub(crate) generator: Arc<dyn GenerationProvider>,
    pub(crate) sink: Arc<dyn MessageSink>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) enricher: Arc<dyn ContextEnricher>,
    pub(crate) hub: Arc<FrameHub>,
    pub(crate) retry: RetryPolicy,
    pub(crate) cancel_poll_interval: Duration,
}

impl JobRunner {
    pub(crate) async fn run(&self, mut job: Job, cancel: CancellationToken) -> JobOutcome {
        self.hub.begin(&job.id, job.retry_count);
        debug!(job_id = %job.id, retry_count = job.retry_count, "job started");

        let result = match self.drive(&mut job, &cancel).await {
            Ok(Some(state)) => match self.complete(&job, &state, &cancel).await {
                Ok(outcome) => Ok(outcome),
                Err(e) => self.fail(&job, e, &cancel).await,
            },
            Ok(None) => Ok(self.cancelled(&job)),
            Err(e) => self.fail(&job, e, &cancel).await,
        };

        result.unwrap_or_else(|e| {
            error!(job_id = %job.id, error = %e, "job bookkeeping failed, leaving it to lease recovery");
            self.hub.finish(&job.id, HubOutcome::Failed(e.to_string()));
            JobOutcome::Abandoned
        })
    }

    /// Runs the generation call to the end of its stream.
    ///
    /// Returns `None` when the job was cancelled along the way.
    async fn drive(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<Option<FrameAccumulator>, QuillError> {
        self.enrich(job).await;
        let _watcher = self.watch_for_cancel(job.id.clone(), cancel.clone());

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            stream = self.generator.generate(job, cancel.clone()) => stream?,
        };

        let mut state = FrameAccumulator::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(frame)) => {
                    if state.frames_applied() == 0 {
                        let moved = self
                            .queue
                            .update_status(&job.id, StatusUpdate::to(JobStatus::Streaming))
                            .await?;
                        if !moved {
                            return Ok(None);
                        }
                        debug!(job_id = %job.id, "job streaming");
                    }
                    state.apply(&frame);
                    self.hub.publish(&job.id, frame);
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(Some(state)),
            }
        }
    }

    async fn enrich(&self, job: &mut Job) {
        match self.enricher.enrich(&job.payload).await {
            Ok(Some(context)) => job.payload.context = Some(context),
            Ok(None) => {}
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "context enrichment failed, continuing without it");
            }
        }
    }

    /// Polls the queue so a cancel issued by another process reaches this
    /// run. Doubles as the lease heartbeat. Stops when the guard drops.
    fn watch_for_cancel(&self, job_id: JobId, cancel: CancellationToken) -> DropGuard {
        let stop = CancellationToken::new();
        let guard = stop.clone().drop_guard();
        let queue = Arc::clone(&self.queue);
        let period = self.cancel_poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match queue.heartbeat(&job_id).await {
                    Ok(Some(status)) if status.is_active() => {}
                    Ok(status) => {
                        info!(job_id = %job_id, status = ?status, "job no longer active, stopping generation");
                        cancel.cancel();
                        break;
                    }
                    Err(e) => debug!(job_id = %job_id, error = %e, "heartbeat failed"),
                }
            }
        });

        guard
    }

    /// Whether side effects for `job` may still be written.
    async fn still_active(&self, job: &Job, cancel: &CancellationToken) -> Result<bool, QuillError> {
        if cancel.is_cancelled() {
            return Ok(false);
        }
        let status = self.queue.heartbeat(&job.id).await?;
        Ok(status.is_some_and(JobStatus::is_active))
    }

    async fn complete(
        &self,
        job: &Job,
        state: &FrameAccumulator,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, QuillError> {
        if !self.still_active(job, cancel).await? {
            return Ok(self.cancelled(job));
        }
        let message = PersistedMessage {
            id: job.message_id.clone(),
            conversation_id: job.conversation_id.clone(),
            role: "assistant".to_string(),
            content: state.content().to_string(),
            thinking: state.thinking().map(str::to_string),
            products: state.products().to_vec(),
            created_at: now_timestamp(),
        };
        self.sink.persist_message(&message).await?;

        if !self.still_active(job, cancel).await? {
            return Ok(self.cancelled(job));
        }
        let applied = self
            .queue
            .update_status(&job.id, StatusUpdate::to(JobStatus::Completed))
            .await?;
        if !applied {
            return Ok(self.cancelled(job));
        }
        self.hub.finish(&job.id, HubOutcome::Completed);

        self.notify(&Notification::completed(job)).await;
        info!(
            job_id = %job.id,
            frames = state.frames_applied(),
            chars = state.content().len(),
            "job completed"
        );
        Ok(JobOutcome::Completed)
    }

    async fn fail(
        &self,
        job: &Job,
        err: QuillError,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, QuillError> {
        if !self.still_active(job, cancel).await? {
            return Ok(self.cancelled(job));
        }
        let message = err.to_string();

        if !err.is_transient() {
            let applied = self
                .queue
                .update_status(&job.id, StatusUpdate::failed(&message))
                .await?;
            if !applied {
                return Ok(self.cancelled(job));
            }
            self.hub.finish(&job.id, HubOutcome::Failed(message.clone()));
            self.notify(&Notification::failed(job, &message)).await;
            error!(job_id = %job.id, error = %message, "job failed permanently");
            return Ok(JobOutcome::Failed);
        }

        let backoff = self.retry.delay_for(job.retry_count);
        match self.queue.retry_or_fail(&job.id, &message, backoff).await? {
            RetryOutcome::Requeued {
                retry_count,
                available_at,
            } => {
                self.hub.finish(&job.id, HubOutcome::Failed(message.clone()));
                warn!(
                    job_id = %job.id,
                    retry_count,
                    available_at = %available_at,
                    error = %message,
                    "generation failed, job requeued"
                );
                Ok(JobOutcome::Retried)
            }
            RetryOutcome::Failed { retry_count } => {
                self.hub.finish(&job.id, HubOutcome::Failed(message.clone()));
                self.notify(&Notification::failed(job, &message)).await;
                error!(
                    job_id = %job.id,
                    retry_count,
                    error = %message,
                    "generation failed, retries exhausted"
                );
                Ok(JobOutcome::Failed)
            }
            RetryOutcome::Ignored => Ok(self.cancelled(job)),
        }
    }

    fn cancelled(&self, job: &Job) -> JobOutcome {
        self.hub.finish(&job.id, HubOutcome::Cancelled);
        info!(job_id = %job.id, "job cancelled");
        JobOutcome::Cancelled
    }

    async fn notify(&self, notification: &Notification) {
        match self.notifier.notify(notification).await {
            Ok(true) => {
                debug!(job_id = %notification.job_id, kind = %notification.kind, "notification sent");
            }
            Ok(false) => {
                debug!(job_id = %notification.job_id, kind = %notification.kind, "notification already sent");
            }
            Err(e) => {
                warn!(job_id = %notification.job_id, error = %e, "failed to deliver notification");
            }
        }
    }
}
