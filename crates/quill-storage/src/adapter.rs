// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the queue, message sink and notifier traits.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use quill_config::model::StorageConfig;
use quill_core::types::DEFAULT_MAX_RETRIES;
use quill_core::{
    AdapterType, ConversationId, HealthStatus, Job, JobId, JobQueue, JobStatus, MessageId,
    MessageSink, NewJob, Notification, Notifier, OwnerId, PersistedMessage, PluginAdapter,
    QuillError, RetryOutcome, StatusUpdate,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened lazily by [`SqliteStorage::initialize`]; every
/// other method fails with [`QuillError::Storage`] until then.
pub struct SqliteStorage {
    config: StorageConfig,
    default_max_retries: u32,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The connection is not opened until [`initialize`](Self::initialize) is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            default_max_retries: DEFAULT_MAX_RETRIES,
            db: OnceCell::new(),
        }
    }

    /// Retry budget given to jobs enqueued without one.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub async fn initialize(&self) -> Result<(), QuillError> {
        let db =
            Database::open_with_timeout(&self.config.database_path, self.config.busy_timeout())
                .await?;
        self.db.set(db).map_err(|_| QuillError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    fn db(&self) -> Result<&Database, QuillError> {
        self.db.get().ok_or_else(|| QuillError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    pub async fn get_message(&self, id: &MessageId) -> Result<Option<PersistedMessage>, QuillError> {
        queries::messages::get_message(self.db()?, id).await
    }

    pub async fn list_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<PersistedMessage>, QuillError> {
        queries::messages::list_messages(self.db()?, conversation_id).await
    }

    pub async fn list_notifications(&self, owner: &OwnerId) -> Result<Vec<Notification>, QuillError> {
        queries::notifications::list_notifications(self.db()?, owner).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, QuillError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), QuillError> {
        if let Some(db) = self.db.get() {
            db.checkpoint_wal().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for SqliteStorage {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QuillError> {
        queries::jobs::enqueue(self.db()?, job, self.default_max_retries).await
    }

    async fn dequeue(&self, max_concurrent: usize) -> Result<Option<Job>, QuillError> {
        queries::jobs::dequeue(self.db()?, max_concurrent).await
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>, QuillError> {
        queries::jobs::get(self.db()?, id).await
    }

    async fn update_status(&self, id: &JobId, update: StatusUpdate) -> Result<bool, QuillError> {
        queries::jobs::update_status(self.db()?, id, update).await
    }

    async fn retry_or_fail(
        &self,
        id: &JobId,
        error: &str,
        backoff: Duration,
    ) -> Result<RetryOutcome, QuillError> {
        queries::jobs::retry_or_fail(self.db()?, id, error, backoff).await
    }

    async fn cancel(&self, id: &JobId) -> Result<bool, QuillError> {
        queries::jobs::cancel(self.db()?, id).await
    }

    async fn list_by_owner(
        &self,
        owner: &OwnerId,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, QuillError> {
        queries::jobs::list_by_owner(self.db()?, owner, status).await
    }

    async fn heartbeat(&self, id: &JobId) -> Result<Option<JobStatus>, QuillError> {
        queries::jobs::heartbeat(self.db()?, id).await
    }

    async fn active_count(&self) -> Result<usize, QuillError> {
        queries::jobs::active_count(self.db()?).await
    }

    async fn recover_stale(&self, lease: Duration) -> Result<usize, QuillError> {
        queries::jobs::recover_stale(self.db()?, lease).await
    }
}

#[async_trait]
impl MessageSink for SqliteStorage {
    async fn persist_message(&self, message: &PersistedMessage) -> Result<(), QuillError> {
        let inserted = queries::messages::insert_message(self.db()?, message).await?;
        if !inserted {
            debug!(message_id = %message.id, "message already persisted");
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for SqliteStorage {
    async fn notify(&self, notification: &Notification) -> Result<bool, QuillError> {
        let delivered = queries::notifications::insert_notification(self.db()?, notification).await?;
        debug!(
            job_id = %notification.job_id,
            kind = %notification.kind,
            delivered,
            "notification recorded"
        );
        Ok(delivered)
    }
}
