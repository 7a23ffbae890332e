// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Final assistant message persistence.

use quill_core::{ConversationId, MessageId, PersistedMessage, QuillError};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedMessage> {
    let products: String = row.get(5)?;
    Ok(PersistedMessage {
        id: row.get::<_, String>(0)?.into(),
        conversation_id: row.get::<_, String>(1)?.into(),
        role: row.get(2)?,
        content: row.get(3)?,
        thinking: row.get(4)?,
        products: serde_json::from_str(&products)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        created_at: row.get(6)?,
    })
}

/// Writes a message keyed by its id. Returns `false` if it already existed,
/// in which case the stored row is left untouched.
pub async fn insert_message(db: &Database, message: &PersistedMessage) -> Result<bool, QuillError> {
    let products = serde_json::to_string(&message.products).map_err(|e| QuillError::Storage {
        source: Box::new(e),
    })?;
    let msg = message.clone();
    let inserted = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "INSERT OR IGNORE INTO messages (id, conversation_id, role, content, thinking, products, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.id.as_str(),
                    msg.conversation_id.as_str(),
                    msg.role,
                    msg.content,
                    msg.thinking,
                    products,
                    msg.created_at,
                ],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(inserted > 0)
}

pub async fn get_message(db: &Database, id: &MessageId) -> Result<Option<PersistedMessage>, QuillError> {
    let id = id.clone();
    db.connection()
        .call(move |conn| -> Result<Option<PersistedMessage>, rusqlite::Error> {
            conn.query_row(
                "SELECT id, conversation_id, role, content, thinking, products, created_at
                 FROM messages WHERE id = ?1",
                params![id.as_str()],
                message_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of a conversation, oldest first.
pub async fn list_messages(
    db: &Database,
    conversation_id: &ConversationId,
) -> Result<Vec<PersistedMessage>, QuillError> {
    let conversation_id = conversation_id.clone();
    db.connection()
        .call(move |conn| -> Result<Vec<PersistedMessage>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, role, content, thinking, products, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id.as_str()], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Product;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("messages.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn message(id: &str, content: &str) -> PersistedMessage {
        PersistedMessage {
            id: id.into(),
            conversation_id: "conv-1".into(),
            role: "assistant".into(),
            content: content.into(),
            thinking: Some("considered options".into()),
            products: vec![Product {
                id: Some("p-1".into()),
                name: "Desk Lamp".into(),
                url: None,
                price: Some("19.99".into()),
                image_url: None,
                attributes: serde_json::Map::new(),
            }],
            created_at: "2026-01-01T00:00:00.000Z".into(),
        }
    }

    #[tokio::test]
    async fn insert_and_read_back() {
        let (db, _dir) = setup_db().await;
        assert!(insert_message(&db, &message("m-1", "Hello")).await.unwrap());

        let stored = get_message(&db, &"m-1".into()).await.unwrap().unwrap();
        assert_eq!(stored, message("m-1", "Hello"));
    }

    #[tokio::test]
    async fn second_write_for_same_id_is_ignored() {
        let (db, _dir) = setup_db().await;
        assert!(insert_message(&db, &message("m-1", "first")).await.unwrap());
        assert!(!insert_message(&db, &message("m-1", "second")).await.unwrap());

        let stored = get_message(&db, &"m-1".into()).await.unwrap().unwrap();
        assert_eq!(stored.content, "first");
        assert_eq!(list_messages(&db, &"conv-1".into()).await.unwrap().len(), 1);
    }
}
