use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use hub_core::ids::{MessageId, SummaryId, TopicId};

use crate::database::Database;
use crate::error::StoreError;
use crate::messages::{insert_message, MessageRow};
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub id: SummaryId,
    pub topic_id: TopicId,
    pub summary_text: String,
    /// Written without the generative backend.
    pub degraded: bool,
    /// Highest message id the summary accounts for.
    pub covers_through: Option<MessageId>,
    pub created_at: String,
}

/// A summary about to be published to a topic.
#[derive(Clone, Debug)]
pub struct NewSummary<'a> {
    pub topic_id: TopicId,
    /// Sender of the board message that carries the summary.
    pub author: &'a str,
    pub text: &'a str,
    pub degraded: bool,
    pub covers_through: Option<MessageId>,
}

/// Both rows written by [`SummaryRepo::publish`].
#[derive(Clone, Debug, Serialize)]
pub struct PublishedSummary {
    pub summary: SummaryRow,
    pub message: MessageRow,
}

pub struct SummaryRepo {
    db: Database,
}

impl SummaryRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store the summary row and post it to the topic as a message, in one
    /// transaction. Either both rows exist afterwards or neither does.
    #[instrument(skip(self, summary), fields(topic_id = %summary.topic_id, degraded = summary.degraded))]
    pub fn publish(&self, summary: &NewSummary<'_>) -> Result<PublishedSummary, StoreError> {
        self.db.with_tx(|tx| {
            let now = row_helpers::now_timestamp();
            tx.execute(
                "INSERT INTO topic_summaries (topic_id, summary_text, degraded, covers_through, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    summary.topic_id.get(),
                    summary.text,
                    summary.degraded,
                    summary.covers_through.map(MessageId::get),
                    now,
                ],
            )?;
            let id = SummaryId::from_raw(tx.last_insert_rowid());
            let message = insert_message(tx, summary.topic_id, summary.author, summary.text)?;
            debug!(summary_id = %id, message_id = %message.id, "summary published");

            Ok(PublishedSummary {
                summary: SummaryRow {
                    id,
                    topic_id: summary.topic_id,
                    summary_text: summary.text.to_string(),
                    degraded: summary.degraded,
                    covers_through: summary.covers_through,
                    created_at: now,
                },
                message,
            })
        })
    }

    /// Up to `limit` summaries of a topic, newest first.
    #[instrument(skip(self), fields(topic_id = %topic_id))]
    pub fn recent(&self, topic_id: TopicId, limit: usize) -> Result<Vec<SummaryRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, topic_id, summary_text, degraded, covers_through, created_at
                 FROM topic_summaries WHERE topic_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![topic_id.get(), limit.max(1) as i64])?;
            let mut summaries = Vec::new();
            while let Some(row) = rows.next()? {
                summaries.push(row_to_summary(row)?);
            }
            Ok(summaries)
        })
    }

    pub fn latest(&self, topic_id: TopicId) -> Result<Option<SummaryRow>, StoreError> {
        Ok(self.recent(topic_id, 1)?.into_iter().next())
    }
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> Result<SummaryRow, StoreError> {
    let covers: Option<i64> = row_helpers::get_opt(row, 4, "topic_summaries", "covers_through")?;
    Ok(SummaryRow {
        id: SummaryId::from_raw(row_helpers::get(row, 0, "topic_summaries", "id")?),
        topic_id: TopicId::from_raw(row_helpers::get(row, 1, "topic_summaries", "topic_id")?),
        summary_text: row_helpers::get(row, 2, "topic_summaries", "summary_text")?,
        degraded: row_helpers::get(row, 3, "topic_summaries", "degraded")?,
        covers_through: covers.map(MessageId::from_raw),
        created_at: row_helpers::get(row, 5, "topic_summaries", "created_at")?,
    })
}
