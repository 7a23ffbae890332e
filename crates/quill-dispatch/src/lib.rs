// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job dispatcher for the Quill generation pipeline.
//!
//! The [`Dispatcher`] claims jobs from a [`JobQueue`] under the global
//! concurrency ceiling, runs each generation call to completion, publishes
//! live frames to the [`FrameHub`], and writes the terminal side effects
//! (message, status, notification) exactly once per job.

pub mod cache;
pub mod cancel;
pub mod enrich;
pub mod hub;
pub mod retry;
pub mod shutdown;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use quill_config::DispatchConfig;
use quill_core::traits::enrich::NoopEnricher;
use quill_core::{
    ContextEnricher, GenerationProvider, JobId, JobQueue, MessageSink, Notifier, QuillError,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use cache::TtlCache;
pub use cancel::CancelRegistry;
pub use enrich::CachingEnricher;
pub use hub::{FrameHub, HubOutcome, Subscription};
pub use retry::RetryPolicy;
pub use shutdown::install_signal_handler;
pub use worker::JobOutcome;

use crate::worker::JobRunner;

/// Tunables of the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub max_concurrent: usize,
    pub poll_interval: Duration,
    pub cancel_poll_interval: Duration,
    pub retry: RetryPolicy,
    pub stale_lease: Duration,
}

impl DispatchSettings {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            poll_interval: config.poll_interval(),
            cancel_poll_interval: config.cancel_poll_interval(),
            retry: RetryPolicy::from_config(config),
            stale_lease: config.stale_lease(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&DispatchConfig::default())
    }
}

/// Tally of one [`Dispatcher::run_once`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub claimed: usize,
    pub completed: usize,
    pub retried: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub abandoned: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Completed => self.completed += 1,
            JobOutcome::Retried => self.retried += 1,
            JobOutcome::Failed => self.failed += 1,
            JobOutcome::Cancelled => self.cancelled += 1,
            JobOutcome::Abandoned => self.abandoned += 1,
        }
    }
}

/// Claims queued jobs and drives them to a terminal state.
pub struct Dispatcher {
    runner: JobRunner,
    registry: Arc<CancelRegistry>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        generator: Arc<dyn GenerationProvider>,
        sink: Arc<dyn MessageSink>,
        notifier: Arc<dyn Notifier>,
        settings: DispatchSettings,
    ) -> Self {
        info!(
            max_concurrent = settings.max_concurrent,
            poll_interval_ms = settings.poll_interval.as_millis() as u64,
            "dispatcher initialized"
        );
        Self {
            runner: JobRunner {
                queue,
                generator,
                sink,
                notifier,
                enricher: Arc::new(NoopEnricher),
                hub: Arc::new(FrameHub::default()),
                retry: settings.retry,
                cancel_poll_interval: settings.cancel_poll_interval,
            },
            registry: Arc::new(CancelRegistry::new()),
            settings,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn ContextEnricher>) -> Self {
        self.runner.enricher = enricher;
        self
    }

    pub fn with_hub(mut self, hub: Arc<FrameHub>) -> Self {
        self.runner.hub = hub;
        self
    }

    pub fn hub(&self) -> Arc<FrameHub> {
        Arc::clone(&self.runner.hub)
    }

    pub fn queue(&self) -> Arc<dyn JobQueue> {
        Arc::clone(&self.runner.queue)
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Claims up to the concurrency ceiling, runs the batch in parallel and
    /// waits for every job in it to settle.
    pub async fn run_once(&self) -> Result<BatchReport, QuillError> {
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut report = BatchReport::default();

        while let Ok(permit) = Arc::clone(&permits).try_acquire_owned() {
            let job = match self.runner.queue.dequeue(self.settings.max_concurrent).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) if report.claimed == 0 => return Err(e),
                Err(e) => {
                    // Jobs already claimed still have to settle.
                    error!(error = %e, "dequeue failed mid-batch");
                    break;
                }
            };
            report.claimed += 1;
            debug!(job_id = %job.id, priority = job.priority, "job claimed");

            let token = self.registry.register(&job.id);
            let runner = self.runner.clone();
            let registry = Arc::clone(&self.registry);
            tasks.spawn(async move {
                let _permit = permit;
                let job_id = job.id.clone();
                let outcome = runner.run(job, token).await;
                registry.remove(&job_id);
                outcome
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(error = %e, "job task panicked");
                    report.abandoned += 1;
                }
            }
        }

        Ok(report)
    }

    /// Dispatches until `shutdown` fires, then lets the current batch finish.
    ///
    /// Jobs abandoned by a crashed dispatcher are returned to the queue
    /// first. The next poll happens at once when the last batch claimed work.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), QuillError> {
        match self
            .runner
            .queue
            .recover_stale(self.settings.stale_lease)
            .await
        {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "recovered jobs with expired leases"),
            Err(e) => warn!(error = %e, "stale job recovery failed"),
        }

        info!("dispatcher running");
        while !shutdown.is_cancelled() {
            let claimed = match self.run_once().await {
                Ok(report) => {
                    if report.claimed > 0 {
                        info!(
                            claimed = report.claimed,
                            completed = report.completed,
                            retried = report.retried,
                            failed = report.failed,
                            cancelled = report.cancelled,
                            "batch finished"
                        );
                    }
                    report.claimed
                }
                Err(e) => {
                    error!(error = %e, "dispatch batch failed");
                    0
                }
            };
            self.runner.hub.sweep();
            self.runner.enricher.evict_expired();

            if claimed > 0 {
                continue;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!("dispatcher stopped");
        Ok(())
    }

    /// Cancels a job in storage and stops it if it runs in this process.
    ///
    /// Returns whether the stored job was moved to `cancelled`.
    pub async fn cancel(&self, job_id: &JobId) -> Result<bool, QuillError> {
        let applied = self.runner.queue.cancel(job_id).await?;
        if self.registry.cancel(job_id) {
            debug!(job_id = %job_id, "tripped local cancellation token");
        }
        if applied {
            info!(job_id = %job_id, "job cancel requested");
        }
        Ok(applied)
    }
}
