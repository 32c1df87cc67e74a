use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use hub_core::ids::{MessageId, TopicId};
use hub_store::{BoardStore, StoreError};

/// In-memory position of the monitor in one topic. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TopicCursor {
    pub last_seen: Option<MessageId>,
    /// Messages observed since the last successful summary.
    pub pending: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Result of one [`TopicTracker::observe`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub new_count: usize,
    pub pending: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

pub struct TopicTracker {
    cursors: RwLock<HashMap<TopicId, TopicCursor>>,
    observe_window: usize,
    identity: String,
}

impl TopicTracker {
    pub fn new(observe_window: usize, identity: impl Into<String>) -> Self {
        Self {
            cursors: RwLock::new(HashMap::new()),
            observe_window: observe_window.max(1),
            identity: identity.into(),
        }
    }

    /// Seed a cursor for every topic at its newest message, pending zero.
    /// A topic whose messages cannot be read is skipped and picked up by
    /// the first `observe`. Existing cursors are left alone.
    pub fn initialize(&self, store: &dyn BoardStore) -> Result<usize, StoreError> {
        let topics = store.list_topics()?;
        let mut seeded = 0;
        for topic in topics {
            let latest = match store.recent_messages(topic.id, 1) {
                Ok(messages) => messages.into_iter().next(),
                Err(e) => {
                    warn!(topic_id = %topic.id, error = %e, "skipping topic during tracker initialization");
                    continue;
                }
            };
            let cursor = TopicCursor {
                last_seen: latest.as_ref().map(|m| m.id),
                pending: 0,
                last_activity: latest.as_ref().and_then(|m| m.created_at_utc()),
            };
            self.cursors.write().entry(topic.id).or_insert(cursor);
            seeded += 1;
        }
        debug!(topics = seeded, "tracker initialized");
        Ok(seeded)
    }

    /// Count messages newer than the cursor within the observation window
    /// and advance the cursor past them. Calling it again with no new
    /// messages changes nothing.
    pub fn observe(
        &self,
        store: &dyn BoardStore,
        topic_id: TopicId,
    ) -> Result<Observation, StoreError> {
        let messages = store.recent_messages(topic_id, self.observe_window)?;

        let mut cursors = self.cursors.write();
        let cursor = cursors.entry(topic_id).or_default();
        let seen = cursor.last_seen;

        let mut new_count = 0;
        let mut max_id = seen;
        let mut latest: Option<DateTime<Utc>> = None;
        for message in messages.iter().filter(|m| seen.map_or(true, |s| m.id > s)) {
            max_id = Some(max_id.map_or(message.id, |id| id.max(message.id)));
            if let Some(at) = message.created_at_utc() {
                latest = Some(latest.map_or(at, |l| l.max(at)));
            }
            if message.sender != self.identity {
                new_count += 1;
            }
        }

        cursor.last_seen = max_id;
        cursor.pending += new_count;
        if let Some(at) = latest {
            cursor.last_activity = Some(cursor.last_activity.map_or(at, |prev| prev.max(at)));
        }

        Ok(Observation {
            new_count,
            pending: cursor.pending,
            last_activity: cursor.last_activity,
        })
    }

    pub fn pending(&self, topic_id: TopicId) -> usize {
        self.cursors
            .read()
            .get(&topic_id)
            .map_or(0, |c| c.pending)
    }

    pub fn reset_pending(&self, topic_id: TopicId) {
        if let Some(cursor) = self.cursors.write().get_mut(&topic_id) {
            cursor.pending = 0;
        }
    }

    pub fn cursor(&self, topic_id: TopicId) -> Option<TopicCursor> {
        self.cursors.read().get(&topic_id).cloned()
    }

    /// Topics whose last activity is older than `inactivity`.
    pub fn idle_topics(&self, inactivity: Duration, now: DateTime<Utc>) -> Vec<TopicId> {
        let Ok(inactivity) = chrono::Duration::from_std(inactivity) else {
            return Vec::new();
        };
        let mut idle: Vec<TopicId> = self
            .cursors
            .read()
            .iter()
            .filter(|(_, c)| c.last_activity.is_some_and(|at| now - at > inactivity))
            .map(|(id, _)| *id)
            .collect();
        idle.sort();
        idle
    }
}
