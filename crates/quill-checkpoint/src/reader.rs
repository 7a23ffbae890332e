// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side consumer that applies a live frame stream to visible state
//! and can pick up from its last checkpoint after an interruption.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use quill_core::{
    ConversationId, Frame, FrameStream, GenerationStatus, JobId, MessageId, QuillError,
};
use quill_protocol::FrameAccumulator;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::manager::CheckpointManager;

pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(50);

/// A live stream as opened by a [`FrameSource`].
pub struct OpenedStream {
    pub frames: FrameStream,
    /// Offset of the first frame. Lower than requested when the server
    /// restarted the job's log since the offset was taken.
    pub from: u64,
    /// Attempt the frames belong to, if the source reports it.
    pub attempt: Option<u32>,
}

impl OpenedStream {
    /// A stream positioned exactly where it was asked to be, with no
    /// attempt information.
    pub fn at(offset: u64, frames: FrameStream) -> Self {
        Self {
            frames,
            from: offset,
            attempt: None,
        }
    }
}

/// Opens the live frame stream of a job.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Opens the stream positioned at frame `offset` of `attempt`.
    ///
    /// `Ok(None)` means the stream no longer exists (job finished and its
    /// frame log expired, or it never started on this server).
    async fn open(
        &self,
        job_id: &JobId,
        offset: u64,
        attempt: Option<u32>,
    ) -> Result<Option<OpenedStream>, QuillError>;
}

/// UI callbacks driven by [`ResumableReader`].
pub trait ReaderObserver: Send {
    /// State restored from a checkpoint, rendered before any live frame.
    fn on_restore(&mut self, state: &FrameAccumulator) {
        self.on_update(state);
    }

    /// Accumulated state changed. Throttled to the render cadence.
    fn on_update(&mut self, state: &FrameAccumulator);

    /// A status frame arrived. Not throttled.
    fn on_status(&mut self, _status: GenerationStatus) {}
}

/// How a read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderOutcome {
    /// The stream ended cleanly; the checkpoint has been removed.
    Completed,
    /// The stream is unavailable or broke off. Any checkpoint is kept so a
    /// later read can resume.
    StreamGone,
    /// The job was cancelled; the checkpoint has been removed.
    Cancelled,
    /// The reader was interrupted. Progress is checkpointed so a later read
    /// resumes from here.
    Interrupted,
}

/// Identifies the message being read.
#[derive(Debug, Clone)]
pub struct ReaderTarget {
    pub job_id: JobId,
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

#[derive(Debug)]
pub struct ReaderReport {
    pub outcome: ReaderOutcome,
    pub state: FrameAccumulator,
    /// Frame offset the read resumed from, if a checkpoint was used.
    pub resumed_from: Option<u64>,
    /// Whether restored state was discarded and rebuilt from the start of
    /// the stream.
    pub rebuilt: bool,
}

pub struct ResumableReader {
    manager: CheckpointManager,
    source: Arc<dyn FrameSource>,
    render_interval: Duration,
    interrupt: CancellationToken,
}

impl ResumableReader {
    pub fn new(manager: CheckpointManager, source: Arc<dyn FrameSource>) -> Self {
        Self {
            manager,
            source,
            render_interval: DEFAULT_RENDER_INTERVAL,
            interrupt: CancellationToken::new(),
        }
    }

    pub fn with_render_interval(mut self, interval: Duration) -> Self {
        self.render_interval = interval;
        self
    }

    /// Token that stops a read without treating the job as cancelled, such
    /// as the user pressing Ctrl-C.
    pub fn with_interrupt(mut self, interrupt: CancellationToken) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Reads `target` to an outcome, rendering through `observer`.
    ///
    /// Frames are applied and checkpointed in stream order; only
    /// `on_update` calls are throttled, and the final state is always
    /// rendered. `cancel` means the job itself was cancelled and drops the
    /// checkpoint; the reader's interrupt token keeps it.
    ///
    /// Restored state is replaced rather than extended when the stream
    /// starts before the checkpoint offset (the job was retried) or when
    /// the checkpoint has content but no usable offset. The restored state
    /// stays on screen until the first live frame arrives.
    pub async fn read<O: ReaderObserver>(
        &self,
        target: &ReaderTarget,
        observer: &mut O,
        cancel: CancellationToken,
    ) -> Result<ReaderReport, QuillError> {
        // Orphans from other messages are cleaned up opportunistically.
        if let Err(e) = self.manager.sweep().await {
            debug!(error = %e, "checkpoint sweep failed");
        }

        let recovered = self.manager.recover(&target.message_id).await?;
        let resumed_from = recovered.as_ref().map(|r| r.frame_offset);
        let was_complete = recovered.as_ref().is_some_and(|r| r.is_complete);
        let saved_attempt = recovered.as_ref().and_then(|r| r.attempt);
        let mut state = match recovered {
            Some(r) => {
                let state = r.into_accumulator();
                observer.on_restore(&state);
                state
            }
            None => FrameAccumulator::new(),
        };

        if was_complete {
            // Finished earlier but the checkpoint outlived the stream.
            self.manager.clear_checkpoint(&target.message_id).await?;
            return Ok(ReaderReport {
                outcome: ReaderOutcome::Completed,
                state,
                resumed_from,
                rebuilt: false,
            });
        }

        let offset = state.frames_applied();
        if let Some(from) = resumed_from {
            info!(job_id = %target.job_id, offset = from, attempt = ?saved_attempt, "resuming from checkpoint");
        }

        let opened = match self.source.open(&target.job_id, offset, saved_attempt).await {
            Ok(Some(opened)) => opened,
            Ok(None) => {
                info!(job_id = %target.job_id, "live stream is gone");
                return Ok(gone(state, resumed_from));
            }
            Err(e) => {
                warn!(job_id = %target.job_id, error = %e, "failed to open live stream");
                return Ok(gone(state, resumed_from));
            }
        };
        let attempt = opened.attempt.or(saved_attempt);
        let mut stream = opened.frames;
        let mut rebuild = opened.from < offset || (opened.from == 0 && !state.is_empty());
        let mut rebuilt = false;
        if rebuild {
            info!(
                job_id = %target.job_id,
                offset,
                from = opened.from,
                "checkpoint does not line up with the stream, rebuilding"
            );
        }

        let mut applied = 0u64;
        let mut last_render: Option<Instant> = None;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.manager.clear_checkpoint(&target.message_id).await?;
                    observer.on_update(&state);
                    return Ok(ReaderReport {
                        outcome: ReaderOutcome::Cancelled,
                        state,
                        resumed_from,
                        rebuilt,
                    });
                }
                _ = self.interrupt.cancelled() => {
                    if applied > 0 {
                        self.manager
                            .save_checkpoint(&target.conversation_id, &target.message_id, &state, attempt, false)
                            .await?;
                    }
                    observer.on_update(&state);
                    info!(job_id = %target.job_id, frames = state.frames_applied(), "read interrupted");
                    return Ok(ReaderReport {
                        outcome: ReaderOutcome::Interrupted,
                        state,
                        resumed_from,
                        rebuilt,
                    });
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(frame)) => {
                    if rebuild {
                        state = FrameAccumulator::new();
                        rebuild = false;
                        rebuilt = true;
                    }
                    state.apply(&frame);
                    applied += 1;
                    if let Frame::Status(status) = frame {
                        observer.on_status(status);
                    }
                    if self.manager.should_flush(state.frames_applied()) {
                        self.manager
                            .save_checkpoint(&target.conversation_id, &target.message_id, &state, attempt, false)
                            .await?;
                    }
                    if last_render.is_none_or(|at| at.elapsed() >= self.render_interval) {
                        observer.on_update(&state);
                        last_render = Some(Instant::now());
                    }
                }
                Some(Err(e)) => {
                    warn!(
                        job_id = %target.job_id,
                        frames = state.frames_applied(),
                        error = %e,
                        "live stream broke off"
                    );
                    // Keep everything applied so far for the next attempt.
                    if applied > 0 {
                        self.manager
                            .save_checkpoint(&target.conversation_id, &target.message_id, &state, attempt, false)
                            .await?;
                    }
                    observer.on_update(&state);
                    let mut report = gone(state, resumed_from);
                    report.rebuilt = rebuilt;
                    return Ok(report);
                }
                None => {
                    if rebuild {
                        // The restarted stream completed without frames.
                        state = FrameAccumulator::new();
                        rebuilt = true;
                    }
                    self.manager
                        .save_checkpoint(&target.conversation_id, &target.message_id, &state, attempt, true)
                        .await?;
                    self.manager.clear_checkpoint(&target.message_id).await?;
                    observer.on_update(&state);
                    debug!(job_id = %target.job_id, frames = state.frames_applied(), "stream completed");
                    return Ok(ReaderReport {
                        outcome: ReaderOutcome::Completed,
                        state,
                        resumed_from,
                        rebuilt,
                    });
                }
            }
        }
    }
}

fn gone(state: FrameAccumulator, resumed_from: Option<u64>) -> ReaderReport {
    ReaderReport {
        outcome: ReaderOutcome::StreamGone,
        state,
        resumed_from,
        rebuilt: false,
    }
}
