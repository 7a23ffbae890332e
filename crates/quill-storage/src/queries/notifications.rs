// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner notification outbox.

use quill_core::{Notification, OwnerId, QuillError};
use rusqlite::params;
use rusqlite::types::Type;

use crate::database::{Database, map_tr_err};

/// Records a notification unless one of the same kind already exists for the
/// job. Returns whether this call wrote it.
pub async fn insert_notification(
    db: &Database,
    notification: &Notification,
) -> Result<bool, QuillError> {
    let n = notification.clone();
    let inserted = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "INSERT OR IGNORE INTO notifications
                     (job_id, owner_id, kind, conversation_id, message_id, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    n.job_id.as_str(),
                    n.owner_id.as_str(),
                    n.kind.to_string(),
                    n.conversation_id.as_str(),
                    n.message_id.as_str(),
                    n.error,
                    n.created_at,
                ],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(inserted > 0)
}

/// Notifications for an owner, oldest first.
pub async fn list_notifications(
    db: &Database,
    owner: &OwnerId,
) -> Result<Vec<Notification>, QuillError> {
    let owner = owner.clone();
    db.connection()
        .call(move |conn| -> Result<Vec<Notification>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT job_id, owner_id, kind, conversation_id, message_id, error, created_at
                 FROM notifications WHERE owner_id = ?1
                 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![owner.as_str()], |row| {
                let kind: String = row.get(2)?;
                Ok(Notification {
                    job_id: row.get::<_, String>(0)?.into(),
                    owner_id: row.get::<_, String>(1)?.into(),
                    kind: kind.parse().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?,
                    conversation_id: row.get::<_, String>(3)?.into(),
                    message_id: row.get::<_, String>(4)?.into(),
                    error: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::jobs;
    use quill_core::{JobPayload, NewJob, NotificationKind};
    use tempfile::tempdir;

    #[tokio::test]
    async fn notification_is_written_once_per_job_and_kind() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("n.db").to_str().unwrap())
            .await
            .unwrap();
        let id = jobs::enqueue(
            &db,
            NewJob {
                message_id: "m-1".into(),
                conversation_id: "c-1".into(),
                owner_id: "o-1".into(),
                priority: 0,
                payload: JobPayload::default(),
                max_retries: None,
            },
            3,
        )
        .await
        .unwrap();
        let job = jobs::get(&db, &id).await.unwrap().unwrap();

        assert!(insert_notification(&db, &Notification::completed(&job)).await.unwrap());
        assert!(!insert_notification(&db, &Notification::completed(&job)).await.unwrap());
        assert!(insert_notification(&db, &Notification::failed(&job, "x")).await.unwrap());

        let listed = list_notifications(&db, &"o-1".into()).await.unwrap();
        let kinds: Vec<NotificationKind> = listed.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, [NotificationKind::JobCompleted, NotificationKind::JobFailed]);
        assert_eq!(listed[1].error.as_deref(), Some("x"));
    }
}
