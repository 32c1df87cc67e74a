use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use hub_core::ids::{MessageId, TopicId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Page size used when a caller asks for zero messages.
pub const DEFAULT_READ_LIMIT: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub topic_id: TopicId,
    pub sender: String,
    pub content: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        row_helpers::parse_timestamp(&self.created_at)
    }
}

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a message to a topic. The topic must exist.
    #[instrument(skip(self, content), fields(topic_id = %topic_id, sender))]
    pub fn post(
        &self,
        topic_id: TopicId,
        sender: &str,
        content: &str,
    ) -> Result<MessageRow, StoreError> {
        self.db.with_conn(|conn| insert_message(conn, topic_id, sender, content))
    }

    /// The `limit` most recent messages of a topic, newest first.
    #[instrument(skip(self), fields(topic_id = %topic_id))]
    pub fn recent(&self, topic_id: TopicId, limit: usize) -> Result<Vec<MessageRow>, StoreError> {
        let limit = if limit == 0 { DEFAULT_READ_LIMIT } else { limit };
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, topic_id, sender, content, created_at
                 FROM messages WHERE topic_id = ?1
                 ORDER BY id DESC LIMIT ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![topic_id.get(), limit as i64])?;
            let mut messages = Vec::new();
            while let Some(row) = rows.next()? {
                messages.push(row_to_message(row)?);
            }
            Ok(messages)
        })
    }

    /// Messages across all topics posted after the reader's last
    /// `mark_read`. An unknown reader has read nothing.
    #[instrument(skip(self))]
    pub fn count_unread(&self, reader: &str) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE id > COALESCE(
                     (SELECT last_read_id FROM agent_presence WHERE name = ?1), 0)",
                [reader],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

/// Insert on an open connection or transaction.
pub(crate) fn insert_message(
    conn: &Connection,
    topic_id: TopicId,
    sender: &str,
    content: &str,
) -> Result<MessageRow, StoreError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM topics WHERE id = ?1)",
        [topic_id.get()],
        |row| row.get::<_, bool>(0),
    )?;
    if !exists {
        return Err(StoreError::NotFound(format!("{topic_id}")));
    }

    let now = row_helpers::now_timestamp();
    conn.execute(
        "INSERT INTO messages (topic_id, sender, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![topic_id.get(), sender, content, now],
    )?;
    Ok(MessageRow {
        id: MessageId::from_raw(conn.last_insert_rowid()),
        topic_id,
        sender: sender.to_string(),
        content: content.to_string(),
        created_at: now,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<MessageRow, StoreError> {
    Ok(MessageRow {
        id: MessageId::from_raw(row_helpers::get(row, 0, "messages", "id")?),
        topic_id: TopicId::from_raw(row_helpers::get(row, 1, "messages", "topic_id")?),
        sender: row_helpers::get(row, 2, "messages", "sender")?,
        content: row_helpers::get(row, 3, "messages", "content")?,
        created_at: row_helpers::get(row, 4, "messages", "created_at")?,
    })
}
