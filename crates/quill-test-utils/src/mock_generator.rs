// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted generation provider.
//!
//! `MockGenerator` pops one [`Script`] per `generate` call, so a test can
//! lay out the whole life of a job (fail, fail, succeed) up front.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use quill_core::{
    AdapterType, Frame, FrameStream, GenerationProvider, HealthStatus, Job, JobId, PluginAdapter,
    QuillError,
};

/// Behavior of one generation call.
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these frames, then end cleanly.
    Frames(Vec<Frame>),
    /// Fail before any frame is produced.
    Refuse(String),
    /// Stream these frames, then fail mid-stream.
    BreakAfter(Vec<Frame>, String),
    /// Stream these frames, then stall until cancelled.
    Stall(Vec<Frame>),
}

/// A generation provider that replays scripted responses.
///
/// When the script queue is empty, a single "mock response" text frame is
/// produced.
pub struct MockGenerator {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    calls: Arc<Mutex<Vec<Job>>>,
    frame_delay: Duration,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::with_scripts(Vec::new())
    }

    pub fn with_scripts(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::from(scripts))),
            calls: Arc::new(Mutex::new(Vec::new())),
            frame_delay: Duration::ZERO,
        }
    }

    /// Sleeps this long before each frame.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub async fn push_script(&self, script: Script) {
        self.scripts.lock().await.push_back(script);
    }

    /// Jobs passed to `generate`, in call order.
    pub async fn calls(&self) -> Vec<Job> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self, job_id: &JobId) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|job| &job.id == job_id)
            .count()
    }

    async fn next_script(&self) -> Script {
        self.scripts
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Script::Frames(vec![Frame::text("mock response")]))
    }

    fn paced(&self, frames: Vec<Frame>) -> FrameStream {
        let delay = self.frame_delay;
        futures::stream::iter(frames)
            .then(move |frame| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, QuillError>(frame)
            })
            .boxed()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generator
    }

    async fn health_check(&self) -> Result<HealthStatus, QuillError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), QuillError> {
        Ok(())
    }
}

#[async_trait]
impl GenerationProvider for MockGenerator {
    async fn generate(
        &self,
        job: &Job,
        cancel: CancellationToken,
    ) -> Result<FrameStream, QuillError> {
        self.calls.lock().await.push(job.clone());

        let stream = match self.next_script().await {
            Script::Frames(frames) => self.paced(frames),
            Script::Refuse(message) => return Err(QuillError::generation(message)),
            Script::BreakAfter(frames, message) => self
                .paced(frames)
                .chain(futures::stream::once(async move {
                    Err(QuillError::generation(message))
                }))
                .boxed(),
            Script::Stall(frames) => self
                .paced(frames)
                .chain(futures::stream::pending())
                .boxed(),
        };
        Ok(stream.take_until(cancel.cancelled_owned()).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{JobPayload, JobStatus};

    fn job() -> Job {
        Job {
            id: "j-1".into(),
            message_id: "m-1".into(),
            conversation_id: "c-1".into(),
            owner_id: "o-1".into(),
            priority: 0,
            payload: JobPayload::default(),
            status: JobStatus::Processing,
            created_at: String::new(),
            updated_at: String::new(),
            available_at: String::new(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            error: None,
        }
    }

    #[tokio::test]
    async fn scripts_are_consumed_in_order() {
        let generator = MockGenerator::with_scripts(vec![
            Script::Refuse("down".into()),
            Script::Frames(vec![Frame::text("ok")]),
        ]);

        assert!(generator.generate(&job(), CancellationToken::new()).await.is_err());
        let frames: Vec<_> = generator
            .generate(&job(), CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(frames.len(), 1);
        assert_eq!(generator.call_count(&"j-1".into()).await, 2);
    }

    #[tokio::test]
    async fn stalled_stream_ends_on_cancel() {
        let generator = MockGenerator::with_scripts(vec![Script::Stall(vec![Frame::text("a")])]);
        let cancel = CancellationToken::new();
        let mut stream = generator.generate(&job(), cancel.clone()).await.unwrap();

        assert!(stream.next().await.unwrap().is_ok());
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
