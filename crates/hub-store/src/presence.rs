use serde::{Deserialize, Serialize};
use tracing::instrument;

use hub_core::ids::TopicId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresenceRow {
    pub name: String,
    pub role: String,
    pub status: String,
    pub topic_id: Option<TopicId>,
    pub last_seen: String,
    pub last_read_at: Option<String>,
}

pub struct PresenceRepo {
    db: Database,
}

impl PresenceRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register an agent, or refresh its role and `last_seen` if known.
    #[instrument(skip(self))]
    pub fn upsert(&self, name: &str, role: &str) -> Result<PresenceRow, StoreError> {
        let now = row_helpers::now_timestamp();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO agent_presence (name, role, status, last_seen)
                 VALUES (?1, ?2, 'online', ?3)
                 ON CONFLICT(name) DO UPDATE SET role = excluded.role, last_seen = excluded.last_seen",
                rusqlite::params![name, role, now],
            )?;
            Ok(())
        })?;
        self.get(name)?
            .ok_or_else(|| StoreError::NotFound(format!("agent {name}")))
    }

    /// Set an agent's status and current topic. The agent must be registered.
    #[instrument(skip(self))]
    pub fn update_status(
        &self,
        name: &str,
        status: &str,
        topic_id: Option<TopicId>,
    ) -> Result<(), StoreError> {
        let now = row_helpers::now_timestamp();
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE agent_presence SET status = ?2, topic_id = ?3, last_seen = ?4 WHERE name = ?1",
                rusqlite::params![name, status, topic_id.map(TopicId::get), now],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("agent {name}")));
        }
        Ok(())
    }

    /// Record that `name` has read everything posted so far. The watermark
    /// is the newest message id, so messages sharing a timestamp with the
    /// read are still ordered correctly.
    #[instrument(skip(self))]
    pub fn mark_read(&self, name: &str) -> Result<(), StoreError> {
        let now = row_helpers::now_timestamp();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE agent_presence
                 SET last_read_at = ?2, last_seen = ?2,
                     last_read_id = (SELECT COALESCE(MAX(id), 0) FROM messages)
                 WHERE name = ?1",
                rusqlite::params![name, now],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, name: &str) -> Result<Option<PresenceRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, role, status, topic_id, last_seen, last_read_at
                 FROM agent_presence WHERE name = ?1",
            )?;
            let mut rows = stmt.query([name])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_presence(row)?)),
                None => Ok(None),
            }
        })
    }

    /// All known agents, most recently seen first.
    pub fn list(&self) -> Result<Vec<PresenceRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, role, status, topic_id, last_seen, last_read_at
                 FROM agent_presence ORDER BY last_seen DESC, name ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut agents = Vec::new();
            while let Some(row) = rows.next()? {
                agents.push(row_to_presence(row)?);
            }
            Ok(agents)
        })
    }
}

fn row_to_presence(row: &rusqlite::Row<'_>) -> Result<PresenceRow, StoreError> {
    let topic: Option<i64> = row_helpers::get_opt(row, 3, "agent_presence", "topic_id")?;
    Ok(PresenceRow {
        name: row_helpers::get(row, 0, "agent_presence", "name")?,
        role: row_helpers::get(row, 1, "agent_presence", "role")?,
        status: row_helpers::get(row, 2, "agent_presence", "status")?,
        topic_id: topic.map(TopicId::from_raw),
        last_seen: row_helpers::get(row, 4, "agent_presence", "last_seen")?,
        last_read_at: row_helpers::get_opt(row, 5, "agent_presence", "last_read_at")?,
    })
}
