//! Failure-injecting store for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use hub_core::ids::TopicId;
use hub_store::{
    BoardStore, Database, MessageRow, NewSummary, PresenceRow, PublishedSummary, StoreError,
    SummaryRow, TopicRow,
};

pub struct FlakyStore {
    inner: Database,
    fail_list: AtomicBool,
    fail_publish: AtomicBool,
    fail_latest_summary: AtomicBool,
    fail_messages: Mutex<HashSet<TopicId>>,
}

impl FlakyStore {
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            fail_list: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            fail_latest_summary: AtomicBool::new(false),
            fail_messages: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_latest_summary(&self, fail: bool) {
        self.fail_latest_summary.store(fail, Ordering::SeqCst);
    }

    pub fn fail_messages_for(&self, topic_id: TopicId) {
        self.fail_messages.lock().insert(topic_id);
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Database(format!("injected failure: {what}"))
    }
}

impl BoardStore for FlakyStore {
    fn create_topic(&self, title: &str) -> Result<TopicRow, StoreError> {
        self.inner.create_topic(title)
    }

    fn list_topics(&self) -> Result<Vec<TopicRow>, StoreError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Self::injected("list_topics"));
        }
        self.inner.list_topics()
    }

    fn post_message(
        &self,
        topic_id: TopicId,
        sender: &str,
        content: &str,
    ) -> Result<MessageRow, StoreError> {
        self.inner.post_message(topic_id, sender, content)
    }

    fn recent_messages(
        &self,
        topic_id: TopicId,
        limit: usize,
    ) -> Result<Vec<MessageRow>, StoreError> {
        if self.fail_messages.lock().contains(&topic_id) {
            return Err(Self::injected("recent_messages"));
        }
        self.inner.recent_messages(topic_id, limit)
    }

    fn publish_summary(&self, summary: &NewSummary<'_>) -> Result<PublishedSummary, StoreError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(Self::injected("publish_summary"));
        }
        self.inner.publish_summary(summary)
    }

    fn recent_summaries(
        &self,
        topic_id: TopicId,
        limit: usize,
    ) -> Result<Vec<SummaryRow>, StoreError> {
        self.inner.recent_summaries(topic_id, limit)
    }

    fn latest_summary(&self, topic_id: TopicId) -> Result<Option<SummaryRow>, StoreError> {
        if self.fail_latest_summary.load(Ordering::SeqCst) {
            return Err(Self::injected("latest_summary"));
        }
        self.inner.latest_summary(topic_id)
    }

    fn register_agent(&self, name: &str, role: &str) -> Result<PresenceRow, StoreError> {
        self.inner.register_agent(name, role)
    }

    fn update_status(
        &self,
        name: &str,
        status: &str,
        topic_id: Option<TopicId>,
    ) -> Result<(), StoreError> {
        self.inner.update_status(name, status, topic_id)
    }

    fn agent(&self, name: &str) -> Result<Option<PresenceRow>, StoreError> {
        self.inner.agent(name)
    }

    fn list_agents(&self) -> Result<Vec<PresenceRow>, StoreError> {
        self.inner.list_agents()
    }

    fn mark_read(&self, name: &str) -> Result<(), StoreError> {
        self.inner.mark_read(name)
    }

    fn count_unread(&self, name: &str) -> Result<i64, StoreError> {
        self.inner.count_unread(name)
    }
}
