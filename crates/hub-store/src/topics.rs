use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use hub_core::ids::TopicId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicRow {
    pub id: TopicId,
    pub title: String,
    pub created_at: String,
}

pub struct TopicRepo {
    db: Database,
}

impl TopicRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub fn create(&self, title: &str) -> Result<TopicRow, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::Conflict("topic title must not be empty".into()));
        }
        let now = row_helpers::now_timestamp();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO topics (title, created_at) VALUES (?1, ?2)",
                rusqlite::params![title, now],
            )?;
            Ok(TopicRow {
                id: TopicId::from_raw(conn.last_insert_rowid()),
                title: title.to_string(),
                created_at: now,
            })
        })
    }

    #[instrument(skip(self), fields(topic_id = %id))]
    pub fn get(&self, id: TopicId) -> Result<TopicRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, title, created_at FROM topics WHERE id = ?1")?;
            let mut rows = stmt.query([id.get()])?;
            match rows.next()? {
                Some(row) => row_to_topic(row),
                None => Err(StoreError::NotFound(format!("{id}"))),
            }
        })
    }

    pub fn exists(&self, id: TopicId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM topics WHERE id = ?1", [id.get()], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// All topics, newest first.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<TopicRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, title, created_at FROM topics ORDER BY id DESC")?;
            let mut rows = stmt.query([])?;
            let mut topics = Vec::new();
            while let Some(row) = rows.next()? {
                topics.push(row_to_topic(row)?);
            }
            Ok(topics)
        })
    }
}

fn row_to_topic(row: &rusqlite::Row<'_>) -> Result<TopicRow, StoreError> {
    Ok(TopicRow {
        id: TopicId::from_raw(row_helpers::get(row, 0, "topics", "id")?),
        title: row_helpers::get(row, 1, "topics", "title")?,
        created_at: row_helpers::get(row, 2, "topics", "created_at")?,
    })
}
