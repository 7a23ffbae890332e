// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live frame fan-out for jobs running in this process.
//!
//! Every running job gets an append-only frame log. Subscribers read the log
//! from any offset and then follow new frames as they are published, so a
//! client that reconnects with its checkpoint offset sees each frame exactly
//! once. Offsets are only meaningful within one attempt: a subscriber that
//! names a different attempt than the current log is replayed from frame 0.
//! Logs of finished jobs are kept for a grace period before eviction.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use quill_core::{Frame, FrameStream, JobId, QuillError};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_STREAM_GRACE: Duration = Duration::from_secs(300);

/// How a job's frame log ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl std::fmt::Display for HubOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed(error) => write!(f, "failed: {error}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Default)]
struct LogState {
    frames: Vec<Frame>,
    outcome: Option<HubOutcome>,
    finished_at: Option<Instant>,
}

struct JobLog {
    attempt: u32,
    state: Mutex<LogState>,
    /// Bumped on every append and on finish.
    version: watch::Sender<u64>,
}

impl JobLog {
    fn new(attempt: u32) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            attempt,
            state: Mutex::new(LogState::default()),
            version,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    fn finish(&self, outcome: HubOutcome) -> bool {
        {
            let mut state = self.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome);
            state.finished_at = Some(Instant::now());
        }
        self.bump();
        true
    }

    /// Frames at `from..` and the outcome, read under one lock.
    fn read_from(&self, from: usize) -> (Vec<Frame>, Option<HubOutcome>) {
        let state = self.lock();
        let frames = state.frames.get(from..).map(<[Frame]>::to_vec).unwrap_or_default();
        (frames, state.outcome.clone())
    }
}

/// A subscriber's view of one attempt's frame log.
pub struct Subscription {
    /// Attempt the frames belong to.
    pub attempt: u32,
    /// Offset of the first frame yielded.
    pub from: u64,
    pub frames: FrameStream,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attempt", &self.attempt)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

/// Per-job frame logs shared by the dispatcher and stream subscribers.
pub struct FrameHub {
    logs: DashMap<JobId, Arc<JobLog>>,
    grace: Duration,
}

impl FrameHub {
    pub fn new(grace: Duration) -> Self {
        Self {
            logs: DashMap::new(),
            grace,
        }
    }

    /// Starts a fresh log for attempt `attempt` of `job_id`.
    ///
    /// An unfinished log from an earlier attempt is closed first so its
    /// subscribers do not wait forever.
    pub fn begin(&self, job_id: &JobId, attempt: u32) {
        if let Some(previous) = self
            .logs
            .insert(job_id.clone(), Arc::new(JobLog::new(attempt)))
        {
            previous.finish(HubOutcome::Failed("attempt restarted".into()));
        }
    }

    /// Appends a frame and wakes subscribers. Returns the frame's offset, or
    /// `None` when the job has no open log.
    pub fn publish(&self, job_id: &JobId, frame: Frame) -> Option<u64> {
        let log = self.logs.get(job_id).map(|entry| Arc::clone(entry.value()))?;
        let offset = {
            let mut state = log.lock();
            if state.outcome.is_some() {
                return None;
            }
            state.frames.push(frame);
            state.frames.len() as u64 - 1
        };
        log.bump();
        Some(offset)
    }

    /// Closes the log. Subscribers drain what is left and then end.
    pub fn finish(&self, job_id: &JobId, outcome: HubOutcome) {
        if let Some(log) = self.logs.get(job_id).map(|entry| Arc::clone(entry.value()))
            && log.finish(outcome.clone())
        {
            debug!(job_id = %job_id, outcome = %outcome, "frame log closed");
        }
    }

    /// Follows the log of `job_id` starting at frame `from`.
    ///
    /// `from` counts frames of `attempt`. When `attempt` is given and is not
    /// the current one, the subscription starts at frame 0 instead and
    /// [`Subscription::from`] says so.
    ///
    /// Returns `None` when no log exists (never started here, or evicted).
    /// The stream ends cleanly after a completed job's last frame; any other
    /// outcome ends it with an error once the backlog is drained.
    pub fn subscribe(&self, job_id: &JobId, from: u64, attempt: Option<u32>) -> Option<Subscription> {
        let log = self.logs.get(job_id).map(|entry| Arc::clone(entry.value()))?;
        let current = log.attempt;
        let from = match attempt {
            Some(requested) if requested != current => {
                debug!(job_id = %job_id, requested, current, "stale attempt, replaying from start");
                0
            }
            _ => from,
        };
        let rx = log.version.subscribe();
        let cursor = Cursor {
            log,
            rx,
            next: usize::try_from(from).unwrap_or(usize::MAX),
            pending: std::collections::VecDeque::new(),
            done: false,
        };
        Some(Subscription {
            attempt: current,
            from,
            frames: Box::pin(futures::stream::unfold(cursor, Cursor::step)),
        })
    }

    /// Attempt number of the current log.
    pub fn attempt(&self, job_id: &JobId) -> Option<u32> {
        self.logs.get(job_id).map(|entry| entry.value().attempt)
    }

    /// Number of frames published for the current attempt.
    pub fn frame_count(&self, job_id: &JobId) -> Option<u64> {
        self.logs
            .get(job_id)
            .map(|entry| entry.value().lock().frames.len() as u64)
    }

    pub fn outcome(&self, job_id: &JobId) -> Option<HubOutcome> {
        self.logs
            .get(job_id)
            .and_then(|entry| entry.value().lock().outcome.clone())
    }

    /// Evicts logs finished longer than the grace period ago.
    pub fn sweep(&self) -> usize {
        let before = self.logs.len();
        let grace = self.grace;
        self.logs.retain(|_, log| {
            !log
                .lock()
                .finished_at
                .is_some_and(|at| at.elapsed() >= grace)
        });
        let evicted = before.saturating_sub(self.logs.len());
        if evicted > 0 {
            debug!(evicted, "evicted finished frame logs");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

impl Default for FrameHub {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_GRACE)
    }
}

struct Cursor {
    log: Arc<JobLog>,
    rx: watch::Receiver<u64>,
    next: usize,
    pending: std::collections::VecDeque<Frame>,
    done: bool,
}

impl Cursor {
    async fn step(mut self) -> Option<(Result<Frame, QuillError>, Self)> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some((Ok(frame), self));
            }
            if self.done {
                return None;
            }

            // Mark the version seen before reading so a publish racing
            // with the read still wakes the wait below.
            self.rx.borrow_and_update();
            let (frames, outcome) = self.log.read_from(self.next);
            if !frames.is_empty() {
                self.next += frames.len();
                self.pending.extend(frames);
                continue;
            }

            match outcome {
                Some(HubOutcome::Completed) => return None,
                Some(other) => {
                    self.done = true;
                    let err = QuillError::Protocol {
                        message: format!("stream ended without completion: {other}"),
                    };
                    return Some((Err(err), self));
                }
                None => {
                    if self.rx.changed().await.is_err() {
                        return None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn job() -> JobId {
        "job-1".into()
    }

    #[tokio::test]
    async fn subscriber_sees_backlog_then_live_frames() {
        let hub = Arc::new(FrameHub::default());
        hub.begin(&job(), 0);
        hub.publish(&job(), Frame::text("a"));
        hub.publish(&job(), Frame::text("b"));

        let mut stream = hub.subscribe(&job(), 0, None).unwrap().frames;
        assert_eq!(stream.next().await.unwrap().unwrap(), Frame::text("a"));
        assert_eq!(stream.next().await.unwrap().unwrap(), Frame::text("b"));

        let publisher = Arc::clone(&hub);
        let handle = tokio::spawn(async move {
            publisher.publish(&job(), Frame::text("c"));
            publisher.finish(&job(), HubOutcome::Completed);
        });

        assert_eq!(stream.next().await.unwrap().unwrap(), Frame::text("c"));
        assert!(stream.next().await.is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn subscribe_from_offset_skips_applied_frames() {
        let hub = FrameHub::default();
        hub.begin(&job(), 0);
        for text in ["a", "b", "c", "d"] {
            hub.publish(&job(), Frame::text(text));
        }
        hub.finish(&job(), HubOutcome::Completed);

        let frames: Vec<_> = hub
            .subscribe(&job(), 2, Some(0))
            .unwrap()
            .frames
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(frames, vec![Frame::text("c"), Frame::text("d")]);
    }

    #[tokio::test]
    async fn failed_job_ends_stream_with_error() {
        let hub = FrameHub::default();
        hub.begin(&job(), 0);
        hub.publish(&job(), Frame::text("partial"));
        hub.finish(&job(), HubOutcome::Failed("upstream 500".into()));

        let items: Vec<_> = hub.subscribe(&job(), 0, None).unwrap().frames.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].as_ref().unwrap_err().to_string().contains("upstream 500"));
    }

    #[test]
    fn unknown_job_has_no_stream() {
        let hub = FrameHub::default();
        assert!(hub.subscribe(&job(), 0, None).is_none());
        assert!(hub.publish(&job(), Frame::text("x")).is_none());
    }

    #[test]
    fn frames_after_finish_are_rejected() {
        let hub = FrameHub::default();
        hub.begin(&job(), 0);
        assert_eq!(hub.publish(&job(), Frame::text("a")), Some(0));
        hub.finish(&job(), HubOutcome::Cancelled);
        assert_eq!(hub.publish(&job(), Frame::text("b")), None);
        assert_eq!(hub.frame_count(&job()), Some(1));
        assert_eq!(hub.outcome(&job()), Some(HubOutcome::Cancelled));
    }

    #[tokio::test]
    async fn restarting_attempt_closes_previous_log() {
        let hub = FrameHub::default();
        hub.begin(&job(), 0);
        hub.publish(&job(), Frame::text("first try"));
        let old = hub.subscribe(&job(), 0, None).unwrap().frames;

        hub.begin(&job(), 1);
        let items: Vec<_> = old.collect().await;
        assert!(items.last().unwrap().is_err());
        assert_eq!(hub.frame_count(&job()), Some(0));
    }

    #[tokio::test]
    async fn offset_from_earlier_attempt_replays_new_attempt_from_start() {
        let hub = FrameHub::default();
        hub.begin(&job(), 0);
        hub.publish(&job(), Frame::text("Hel"));
        hub.finish(&job(), HubOutcome::Failed("upstream 503".into()));

        hub.begin(&job(), 1);
        hub.publish(&job(), Frame::text("Good"));
        hub.publish(&job(), Frame::text("bye"));
        hub.finish(&job(), HubOutcome::Completed);

        let stale = hub.subscribe(&job(), 1, Some(0)).unwrap();
        assert_eq!(stale.attempt, 1);
        assert_eq!(stale.from, 0);
        let frames: Vec<_> = stale.frames.map(|f| f.unwrap()).collect().await;
        assert_eq!(frames, vec![Frame::text("Good"), Frame::text("bye")]);

        let current = hub.subscribe(&job(), 1, Some(1)).unwrap();
        assert_eq!(current.from, 1);
        let frames: Vec<_> = current.frames.map(|f| f.unwrap()).collect().await;
        assert_eq!(frames, vec![Frame::text("bye")]);
        assert_eq!(hub.attempt(&job()), Some(1));
    }

    #[test]
    fn sweep_evicts_only_finished_logs_past_grace() {
        let hub = FrameHub::new(Duration::ZERO);
        hub.begin(&"running".into(), 0);
        hub.begin(&"done".into(), 0);
        hub.finish(&"done".into(), HubOutcome::Completed);

        assert_eq!(hub.sweep(), 1);
        assert_eq!(hub.len(), 1);
        assert!(hub.subscribe(&"done".into(), 0, None).is_none());
    }

    #[test]
    fn sweep_keeps_logs_within_grace() {
        let hub = FrameHub::new(Duration::from_secs(60));
        hub.begin(&job(), 0);
        hub.finish(&job(), HubOutcome::Completed);
        assert_eq!(hub.sweep(), 0);
        assert!(hub.subscribe(&job(), 0, None).is_some());
    }
}
