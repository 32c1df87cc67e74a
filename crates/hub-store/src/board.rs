//! The narrow store surface the monitor and tool handlers depend on.
//!
//! [`Database`] implements it by delegating to the per-table repos; tests
//! wrap it to inject failures.

use hub_core::ids::TopicId;

use crate::database::Database;
use crate::error::StoreError;
use crate::messages::{MessageRepo, MessageRow};
use crate::presence::{PresenceRepo, PresenceRow};
use crate::summaries::{NewSummary, PublishedSummary, SummaryRepo, SummaryRow};
use crate::topics::{TopicRepo, TopicRow};

pub trait BoardStore: Send + Sync {
    fn create_topic(&self, title: &str) -> Result<TopicRow, StoreError>;
    fn list_topics(&self) -> Result<Vec<TopicRow>, StoreError>;

    fn post_message(
        &self,
        topic_id: TopicId,
        sender: &str,
        content: &str,
    ) -> Result<MessageRow, StoreError>;
    /// Up to `limit` most recent messages, newest first.
    fn recent_messages(&self, topic_id: TopicId, limit: usize)
        -> Result<Vec<MessageRow>, StoreError>;

    fn publish_summary(&self, summary: &NewSummary<'_>) -> Result<PublishedSummary, StoreError>;
    fn recent_summaries(&self, topic_id: TopicId, limit: usize)
        -> Result<Vec<SummaryRow>, StoreError>;
    fn latest_summary(&self, topic_id: TopicId) -> Result<Option<SummaryRow>, StoreError>;

    fn register_agent(&self, name: &str, role: &str) -> Result<PresenceRow, StoreError>;
    fn update_status(
        &self,
        name: &str,
        status: &str,
        topic_id: Option<TopicId>,
    ) -> Result<(), StoreError>;
    fn agent(&self, name: &str) -> Result<Option<PresenceRow>, StoreError>;
    fn list_agents(&self) -> Result<Vec<PresenceRow>, StoreError>;
    fn mark_read(&self, name: &str) -> Result<(), StoreError>;
    fn count_unread(&self, name: &str) -> Result<i64, StoreError>;
}

impl BoardStore for Database {
    fn create_topic(&self, title: &str) -> Result<TopicRow, StoreError> {
        TopicRepo::new(self.clone()).create(title)
    }

    fn list_topics(&self) -> Result<Vec<TopicRow>, StoreError> {
        TopicRepo::new(self.clone()).list()
    }

    fn post_message(
        &self,
        topic_id: TopicId,
        sender: &str,
        content: &str,
    ) -> Result<MessageRow, StoreError> {
        MessageRepo::new(self.clone()).post(topic_id, sender, content)
    }

    fn recent_messages(
        &self,
        topic_id: TopicId,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError> {
        MessageRepo::new(self.clone()).recent(topic_id, limit)
    }

    fn publish_summary(&self, summary: &NewSummary<'_>) -> Result<PublishedSummary, StoreError> {
        SummaryRepo::new(self.clone()).publish(summary)
    }

    fn recent_summaries(
        &self,
        topic_id: TopicId,
        limit: usize,
    ) -> Result<Vec<SummaryRow>, StoreError> {
        SummaryRepo::new(self.clone()).recent(topic_id, limit)
    }

    fn latest_summary(&self, topic_id: TopicId) -> Result<Option<SummaryRow>, StoreError> {
        SummaryRepo::new(self.clone()).latest(topic_id)
    }

    fn register_agent(&self, name: &str, role: &str) -> Result<PresenceRow, StoreError> {
        PresenceRepo::new(self.clone()).upsert(name, role)
    }

    fn update_status(
        &self,
        name: &str,
        status: &str,
        topic_id: Option<TopicId>,
    ) -> Result<(), StoreError> {
        PresenceRepo::new(self.clone()).update_status(name, status, topic_id)
    }

    fn agent(&self, name: &str) -> Result<Option<PresenceRow>, StoreError> {
        PresenceRepo::new(self.clone()).get(name)
    }

    fn list_agents(&self) -> Result<Vec<PresenceRow>, StoreError> {
        PresenceRepo::new(self.clone()).list()
    }

    fn mark_read(&self, name: &str) -> Result<(), StoreError> {
        PresenceRepo::new(self.clone()).mark_read(name)
    }

    fn count_unread(&self, name: &str) -> Result<i64, StoreError> {
        MessageRepo::new(self.clone()).count_unread(name)
    }
}
