// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Checkpoint store in a client-local SQLite file.
//!
//! Values are the JSON-serialized [`Checkpoint`] under the namespaced
//! `checkpoint:{message_id}` key, so the file reads like any key-value store.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use quill_core::traits::checkpoint::checkpoint_key;
use quill_core::{
    AdapterType, Checkpoint, CheckpointStore, HealthStatus, MessageId, PluginAdapter, QuillError,
};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, warn};

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> QuillError {
    QuillError::Storage {
        source: Box::new(e),
    }
}

pub struct SqliteCheckpointStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteCheckpointStore {
    pub async fn open(path: &str) -> Result<Self, QuillError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| QuillError::Storage {
                source: Box::new(e),
            })?;
        }
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| QuillError::Storage {
                source: Box::new(e),
            })?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, QuillError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| QuillError::Storage {
                source: Box::new(e),
            })?;
        Self::init(conn).await
    }

    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self, QuillError> {
        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(Duration::from_secs(2))?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS checkpoints (
                     key TEXT PRIMARY KEY NOT NULL,
                     value TEXT NOT NULL,
                     saved_at INTEGER NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_checkpoints_saved_at ON checkpoints(saved_at);",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, message_id: &MessageId) -> Result<Option<Checkpoint>, QuillError> {
        let key = checkpoint_key(message_id);
        let lookup = key.clone();
        let value = self
            .conn
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT value FROM checkpoints WHERE key = ?1",
                    params![lookup],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        let Some(value) = value else {
            return Ok(None);
        };
        match serde_json::from_str(&value) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                // An unreadable value cannot be resumed from; drop it.
                warn!(key = %key, error = %e, "discarding corrupt checkpoint");
                self.delete(message_id).await?;
                Ok(None)
            }
        }
    }

    async fn set(&self, checkpoint: &Checkpoint) -> Result<(), QuillError> {
        let key = checkpoint_key(&checkpoint.message_id);
        let value = serde_json::to_string(checkpoint).map_err(|e| QuillError::Storage {
            source: Box::new(e),
        })?;
        let saved_at = checkpoint.timestamp;
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO checkpoints (key, value, saved_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, saved_at = excluded.saved_at",
                    params![key, value, saved_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete(&self, message_id: &MessageId) -> Result<(), QuillError> {
        let key = checkpoint_key(message_id);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute("DELETE FROM checkpoints WHERE key = ?1", params![key])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn sweep_expired(&self, max_age: Duration) -> Result<usize, QuillError> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = chrono::Utc::now()
            .timestamp_millis()
            .saturating_sub(max_age_ms);
        let removed = self
            .conn
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM checkpoints WHERE saved_at < ?1",
                    params![cutoff],
                )
            })
            .await
            .map_err(map_tr_err)?;
        if removed > 0 {
            debug!(removed, "swept expired checkpoints");
        }
        Ok(removed)
    }
}

#[async_trait]
impl PluginAdapter for SqliteCheckpointStore {
    fn name(&self) -> &str {
        "sqlite-checkpoints"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::CheckpointStore
    }

    async fn health_check(&self) -> Result<HealthStatus, QuillError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), QuillError> {
        Ok(())
    }
}
