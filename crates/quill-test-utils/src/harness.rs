// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end dispatch tests.
//!
//! `TestHarness` wires a temp-dir SQLite queue, a [`MockGenerator`] and a
//! [`RecordingNotifier`] into a real [`Dispatcher`].

use std::sync::Arc;
use std::time::Duration;

use quill_config::StorageConfig;
use quill_core::types::PayloadMessage;
use quill_core::{ContextEnricher, Job, JobId, JobPayload, JobQueue, NewJob, QuillError};
use quill_dispatch::{BatchReport, DispatchSettings, Dispatcher, FrameHub, RetryPolicy};
use quill_storage::SqliteStorage;

use crate::mock_generator::{MockGenerator, Script};
use crate::recording_notifier::RecordingNotifier;

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    scripts: Vec<Script>,
    max_concurrent: usize,
    max_retries: u32,
    frame_delay: Duration,
    enricher: Option<Arc<dyn ContextEnricher>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            scripts: Vec::new(),
            max_concurrent: 5,
            max_retries: 3,
            frame_delay: Duration::ZERO,
            enricher: None,
        }
    }

    /// Generation behaviors, one per call, in order.
    pub fn with_scripts(mut self, scripts: Vec<Script>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Retry budget for jobs enqueued through the harness.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn ContextEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub async fn build(self) -> Result<TestHarness, QuillError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| QuillError::Storage {
            source: Box::new(e),
        })?;
        let db_path = temp_dir.path().join("quill.db");

        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            ..StorageConfig::default()
        })
        .with_default_max_retries(self.max_retries);
        storage.initialize().await?;
        let storage = Arc::new(storage);

        let generator =
            Arc::new(MockGenerator::with_scripts(self.scripts).with_frame_delay(self.frame_delay));
        let notifier = Arc::new(RecordingNotifier::new());
        let hub = Arc::new(FrameHub::new(Duration::from_secs(60)));

        let settings = DispatchSettings {
            max_concurrent: self.max_concurrent,
            poll_interval: Duration::from_millis(10),
            cancel_poll_interval: Duration::from_millis(20),
            retry: RetryPolicy::immediate(),
            stale_lease: Duration::from_secs(900),
        };
        let mut dispatcher = Dispatcher::new(
            storage.clone(),
            generator.clone(),
            storage.clone(),
            notifier.clone(),
            settings,
        )
        .with_hub(hub.clone());
        if let Some(enricher) = self.enricher {
            dispatcher = dispatcher.with_enricher(enricher);
        }

        Ok(TestHarness {
            storage,
            generator,
            notifier,
            hub,
            dispatcher: Arc::new(dispatcher),
            _temp_dir: temp_dir,
        })
    }
}

/// A dispatcher over a temp database with scripted generation.
pub struct TestHarness {
    pub storage: Arc<SqliteStorage>,
    pub generator: Arc<MockGenerator>,
    pub notifier: Arc<RecordingNotifier>,
    pub hub: Arc<FrameHub>,
    pub dispatcher: Arc<Dispatcher>,
    /// Keeps the database directory alive until the harness drops.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Enqueues a job for `message_id` with the given priority.
    pub async fn enqueue(&self, message_id: &str, priority: i64) -> Result<JobId, QuillError> {
        self.storage
            .enqueue(NewJob {
                message_id: message_id.into(),
                conversation_id: "conv-1".into(),
                owner_id: "owner-1".into(),
                priority,
                payload: JobPayload {
                    model: "mock-model".into(),
                    messages: vec![PayloadMessage {
                        role: "user".into(),
                        content: format!("prompt for {message_id}"),
                    }],
                    ..JobPayload::default()
                },
                max_retries: None,
            })
            .await
    }

    pub async fn job(&self, id: &JobId) -> Result<Job, QuillError> {
        self.storage
            .get(id)
            .await?
            .ok_or_else(|| QuillError::NotFound {
                kind: "job",
                id: id.to_string(),
            })
    }

    /// Runs batches until one claims nothing, returning the summed report.
    pub async fn run_until_idle(&self) -> Result<BatchReport, QuillError> {
        let mut total = BatchReport::default();
        loop {
            let report = self.dispatcher.run_once().await?;
            if report.claimed == 0 {
                return Ok(total);
            }
            total.claimed += report.claimed;
            total.completed += report.completed;
            total.retried += report.retried;
            total.failed += report.failed;
            total.cancelled += report.cancelled;
            total.abandoned += report.abandoned;
        }
    }
}
