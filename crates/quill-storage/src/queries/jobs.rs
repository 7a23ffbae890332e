// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job queue operations.
//!
//! Every mutation is a single guarded statement, so concurrent dispatchers
//! (threads or processes sharing the file) never observe a half-applied
//! transition.

use std::time::Duration;

use quill_core::types::format_timestamp;
use quill_core::{Job, JobId, JobStatus, NewJob, OwnerId, QuillError, RetryOutcome, StatusUpdate};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::database::{Database, map_tr_err};

macro_rules! job_columns {
    () => {
        "id, message_id, conversation_id, owner_id, priority, payload, status, \
         created_at, updated_at, available_at, started_at, completed_at, \
         retry_count, max_retries, error"
    };
}

/// Error recorded on jobs reclaimed from a dead dispatcher.
pub const LEASE_EXPIRED_ERROR: &str = "dispatcher lease expired";

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let payload: String = row.get(5)?;
    let status: String = row.get(6)?;
    Ok(Job {
        id: JobId(row.get(0)?),
        message_id: row.get::<_, String>(1)?.into(),
        conversation_id: row.get::<_, String>(2)?.into(),
        owner_id: row.get::<_, String>(3)?.into(),
        priority: row.get(4)?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        status: status
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        available_at: row.get(9)?,
        started_at: row.get(10)?,
        completed_at: row.get(11)?,
        retry_count: row.get(12)?,
        max_retries: row.get(13)?,
        error: row.get(14)?,
    })
}

/// Inserts a `queued` job. `default_max_retries` applies when the request
/// does not carry its own limit.
pub async fn enqueue(
    db: &Database,
    job: NewJob,
    default_max_retries: u32,
) -> Result<JobId, QuillError> {
    let id = JobId::generate();
    let payload = serde_json::to_string(&job.payload).map_err(|e| QuillError::Storage {
        source: Box::new(e),
    })?;
    let max_retries = job.max_retries.unwrap_or(default_max_retries);
    let job_id = id.clone();
    let priority = job.priority;

    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO jobs (id, message_id, conversation_id, owner_id, priority, payload, max_retries)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    job_id.as_str(),
                    job.message_id.as_str(),
                    job.conversation_id.as_str(),
                    job.owner_id.as_str(),
                    job.priority,
                    payload,
                    max_retries,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

    info!(job_id = %id, priority, max_retries, "job enqueued");
    Ok(id)
}

/// Claims the next job while fewer than `max_concurrent` are active.
///
/// Selection and the concurrency check happen in the same `UPDATE` under an
/// `IMMEDIATE` transaction, so two claimers can never exceed the cap or take
/// the same job.
pub async fn dequeue(db: &Database, max_concurrent: usize) -> Result<Option<Job>, QuillError> {
    let max = i64::try_from(max_concurrent).unwrap_or(i64::MAX);
    let job = db
        .connection()
        .call(move |conn| -> Result<Option<Job>, rusqlite::Error> {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let job = tx
                .query_row(
                    concat!(
                        "UPDATE jobs
                         SET status = 'processing',
                             started_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = (
                             SELECT id FROM jobs
                             WHERE status = 'queued'
                               AND available_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                             ORDER BY priority ASC, created_at ASC, rowid ASC
                             LIMIT 1
                         )
                         AND (SELECT COUNT(*) FROM jobs WHERE status IN ('processing', 'streaming')) < ?1
                         RETURNING ",
                        job_columns!()
                    ),
                    params![max],
                    job_from_row,
                )
                .optional()?;
            tx.commit()?;
            Ok(job)
        })
        .await
        .map_err(map_tr_err)?;

    if let Some(job) = &job {
        debug!(job_id = %job.id, priority = job.priority, retry_count = job.retry_count, "job claimed");
    }
    Ok(job)
}

pub async fn get(db: &Database, id: &JobId) -> Result<Option<Job>, QuillError> {
    let id = id.clone();
    db.connection()
        .call(move |conn| -> Result<Option<Job>, rusqlite::Error> {
            conn.query_row(
                concat!("SELECT ", job_columns!(), " FROM jobs WHERE id = ?1"),
                params![id.as_str()],
                job_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Applies `update` only if the job is currently in one of the target's
/// allowed source states. Returns whether a row changed.
///
/// `queued` is never a valid target here; requeueing goes through
/// [`retry_or_fail`].
pub async fn update_status(
    db: &Database,
    id: &JobId,
    update: StatusUpdate,
) -> Result<bool, QuillError> {
    let target = update.status;
    let sources = target.allowed_sources();
    if sources.is_empty() {
        let from = get(db, id)
            .await?
            .map(|job| job.status)
            .ok_or_else(|| QuillError::NotFound {
                kind: "job",
                id: id.to_string(),
            })?;
        return Err(QuillError::InvalidTransition { from, to: target });
    }

    let source_list = sources
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE jobs
         SET status = ?2,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
             started_at = CASE WHEN ?2 = 'processing'
                 THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') ELSE started_at END,
             completed_at = CASE WHEN ?2 IN ('completed', 'failed', 'cancelled')
                 THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') ELSE completed_at END,
             error = COALESCE(?3, error)
         WHERE id = ?1 AND status IN ({source_list})"
    );

    let job_id = id.clone();
    let status = target.to_string();
    let error = update.error;
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(&sql, params![job_id.as_str(), status, error])
        })
        .await
        .map_err(map_tr_err)?;

    if changed == 0 {
        debug!(job_id = %id, to = %target, "status transition ignored");
    } else {
        debug!(job_id = %id, to = %target, "status updated");
    }
    Ok(changed > 0)
}

/// Consumes one retry and requeues the job behind `backoff`, or fails it
/// permanently once the budget is spent. Only active jobs are affected.
pub async fn retry_or_fail(
    db: &Database,
    id: &JobId,
    error: &str,
    backoff: Duration,
) -> Result<RetryOutcome, QuillError> {
    let delay = chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::zero());
    let available_at = format_timestamp(chrono::Utc::now() + delay);
    let job_id = id.clone();
    let error = error.to_string();

    let row = db
        .connection()
        .call(move |conn| -> Result<Option<(String, u32, String)>, rusqlite::Error> {
            conn.query_row(
                "UPDATE jobs
                 SET status = CASE WHEN retry_count < max_retries THEN 'queued' ELSE 'failed' END,
                     retry_count = CASE WHEN retry_count < max_retries
                         THEN retry_count + 1 ELSE retry_count END,
                     available_at = CASE WHEN retry_count < max_retries THEN ?3 ELSE available_at END,
                     started_at = CASE WHEN retry_count < max_retries THEN NULL ELSE started_at END,
                     completed_at = CASE WHEN retry_count < max_retries
                         THEN NULL ELSE strftime('%Y-%m-%dT%H:%M:%fZ', 'now') END,
                     error = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status IN ('processing', 'streaming')
                 RETURNING status, retry_count, available_at",
                params![job_id.as_str(), error, available_at],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    let outcome = match row {
        None => RetryOutcome::Ignored,
        Some((status, retry_count, available_at)) if status == "queued" => RetryOutcome::Requeued {
            retry_count,
            available_at,
        },
        Some((_, retry_count, _)) => RetryOutcome::Failed { retry_count },
    };
    match &outcome {
        RetryOutcome::Requeued {
            retry_count,
            available_at,
        } => info!(job_id = %id, retry_count, available_at = %available_at, "job requeued for retry"),
        RetryOutcome::Failed { retry_count } => {
            warn!(job_id = %id, retry_count, "job failed permanently")
        }
        RetryOutcome::Ignored => debug!(job_id = %id, "retry ignored for inactive job"),
    }
    Ok(outcome)
}

/// Cancels a job that has not reached a terminal state.
pub async fn cancel(db: &Database, id: &JobId) -> Result<bool, QuillError> {
    let job_id = id.clone();
    let changed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs
                 SET status = 'cancelled',
                     completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status IN ('queued', 'processing', 'streaming')",
                params![job_id.as_str()],
            )
        })
        .await
        .map_err(map_tr_err)?;

    if changed > 0 {
        info!(job_id = %id, "job cancelled");
    }
    Ok(changed > 0)
}

pub async fn list_by_owner(
    db: &Database,
    owner: &OwnerId,
    status: Option<JobStatus>,
) -> Result<Vec<Job>, QuillError> {
    let owner = owner.clone();
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<Job>, rusqlite::Error> {
            let mut stmt = conn.prepare(concat!(
                "SELECT ",
                job_columns!(),
                " FROM jobs
                 WHERE owner_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![owner.as_str(), status], job_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Bumps `updated_at` on an active job and reports its status.
pub async fn heartbeat(db: &Database, id: &JobId) -> Result<Option<JobStatus>, QuillError> {
    let job_id = id.clone();
    let status = db
        .connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "UPDATE jobs
                 SET updated_at = CASE WHEN status IN ('processing', 'streaming')
                     THEN strftime('%Y-%m-%dT%H:%M:%fZ', 'now') ELSE updated_at END
                 WHERE id = ?1
                 RETURNING status",
                params![job_id.as_str()],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    status
        .map(|s| {
            s.parse::<JobStatus>().map_err(|e| QuillError::Storage {
                source: Box::new(e),
            })
        })
        .transpose()
}

pub async fn active_count(db: &Database) -> Result<usize, QuillError> {
    let count = db
        .connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE status IN ('processing', 'streaming')",
                [],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(usize::try_from(count).unwrap_or(0))
}

/// Sends active jobs whose lease (`updated_at`) is older than `lease` back
/// through the retry path, immediately claimable.
pub async fn recover_stale(db: &Database, lease: Duration) -> Result<usize, QuillError> {
    let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero());
    let cutoff = format_timestamp(chrono::Utc::now() - lease);

    let recovered = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "UPDATE jobs
                 SET status = CASE WHEN retry_count < max_retries THEN 'queued' ELSE 'failed' END,
                     retry_count = CASE WHEN retry_count < max_retries
                         THEN retry_count + 1 ELSE retry_count END,
                     available_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     started_at = CASE WHEN retry_count < max_retries THEN NULL ELSE started_at END,
                     completed_at = CASE WHEN retry_count < max_retries
                         THEN NULL ELSE strftime('%Y-%m-%dT%H:%M:%fZ', 'now') END,
                     error = ?2,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status IN ('processing', 'streaming') AND updated_at < ?1",
                params![cutoff, LEASE_EXPIRED_ERROR],
            )
        })
        .await
        .map_err(map_tr_err)?;

    if recovered > 0 {
        warn!(recovered, "reclaimed jobs with expired leases");
    }
    Ok(recovered)
}
