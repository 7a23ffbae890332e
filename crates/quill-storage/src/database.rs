// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! Within one process all statements are serialized through tokio-rusqlite's
//! single background thread. Several processes may open the same file; they
//! coordinate through SQLite locking and `busy_timeout`.

use std::path::Path;
use std::time::Duration;

use quill_core::QuillError;
use tracing::debug;

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the job database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and applies pending
    /// migrations.
    pub async fn open(path: &str) -> Result<Self, QuillError> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT).await
    }

    pub async fn open_with_timeout(path: &str, busy_timeout: Duration) -> Result<Self, QuillError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| QuillError::Storage {
                source: Box::new(e),
            })?;
        }

        // refinery needs `&mut rusqlite::Connection`, so migrate on a
        // short-lived blocking connection before handing the file over.
        let migrate_path = path.to_string();
        tokio::task::spawn_blocking(move || migrate(&migrate_path, busy_timeout))
            .await
            .map_err(|e| QuillError::Internal(format!("migration task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| QuillError::Storage {
                source: Box::new(e),
            })?;
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Checkpoints the WAL into the main file.
    pub async fn checkpoint_wal(&self) -> Result<(), QuillError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoints the WAL and closes the connection.
    pub async fn close(self) -> Result<(), QuillError> {
        self.checkpoint_wal().await?;
        self.conn.close().await.map_err(|e| QuillError::Storage {
            source: e.to_string().into(),
        })?;
        debug!(path = %self.path, "database closed");
        Ok(())
    }
}

fn migrate(path: &str, busy_timeout: Duration) -> Result<(), QuillError> {
    let storage_err = |e: rusqlite::Error| QuillError::Storage {
        source: Box::new(e),
    };
    let mut conn = rusqlite::Connection::open(path).map_err(storage_err)?;
    conn.busy_timeout(busy_timeout).map_err(storage_err)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")
        .map_err(storage_err)?;
    crate::migrations::run_migrations(&mut conn)
}

/// Converts a tokio-rusqlite call error into [`QuillError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> QuillError {
    QuillError::Storage {
        source: Box::new(e),
    }
}
