//! When a topic crosses its threshold: pick a strategy, produce the text,
//! persist it, reset the pending count.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use hub_core::backend::SummaryBackend;
use hub_core::errors::BackendError;
use hub_core::ids::{MessageId, SummaryId, TopicId};
use hub_store::{BoardStore, MessageRow, NewSummary, SummaryRow};

use crate::config::MonitorConfig;
use crate::digest::{self, DegradedReason};
use crate::error::MonitorError;
use crate::tracker::TopicTracker;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Degraded,
    FullHistory,
    Incremental,
}

/// Strategy from backend availability and the latest persisted summary.
/// A degraded predecessor forces a full-history rebuild.
pub fn select_strategy(backend_available: bool, latest: Option<&SummaryRow>) -> Strategy {
    match latest {
        _ if !backend_available => Strategy::Degraded,
        Some(prev) if prev.degraded => Strategy::FullHistory,
        Some(_) => Strategy::Incremental,
        None => Strategy::FullHistory,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryOutcome {
    pub topic_id: TopicId,
    pub strategy: Strategy,
    /// True when the backend was skipped or failed.
    pub degraded: bool,
    pub summary_id: SummaryId,
    pub message_id: MessageId,
    /// Messages given to the backend or the digest.
    pub input_messages: usize,
}

pub struct Summarizer {
    backend: Option<Arc<dyn SummaryBackend>>,
    context_window: usize,
    identity: String,
    backend_timeout: Duration,
}

impl Summarizer {
    pub fn new(backend: Option<Arc<dyn SummaryBackend>>, config: &MonitorConfig) -> Self {
        Self {
            backend,
            context_window: config.context_window,
            identity: config.identity.clone(),
            backend_timeout: config.backend_timeout,
        }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Summarize one topic. Backend trouble degrades the summary; store
    /// trouble fails the attempt and leaves the pending count untouched.
    pub async fn summarize(
        &self,
        store: &dyn BoardStore,
        tracker: &TopicTracker,
        topic_id: TopicId,
    ) -> Result<SummaryOutcome, MonitorError> {
        let latest = match store.latest_summary(topic_id) {
            Ok(latest) => latest,
            Err(e) => {
                warn!(topic_id = %topic_id, error = %e, "latest summary unreadable, treating as absent");
                None
            }
        };

        let last_seen = tracker.cursor(topic_id).and_then(|c| c.last_seen);
        let mut window = store.recent_messages(topic_id, self.context_window)?;
        window.retain(|m| m.sender != self.identity && last_seen.is_some_and(|seen| m.id <= seen));
        window.reverse();

        let strategy = select_strategy(self.backend.is_some(), latest.as_ref());
        info!(topic_id = %topic_id, ?strategy, messages = window.len(), "summarizing topic");

        let (input, previous): (Vec<MessageRow>, Option<&SummaryRow>) = match strategy {
            Strategy::Incremental => {
                let prev = latest.as_ref();
                let since = prev.and_then(|p| p.covers_through);
                let fresh = window
                    .iter()
                    .filter(|m| since.map_or(true, |s| m.id > s))
                    .cloned()
                    .collect();
                (fresh, prev)
            }
            Strategy::FullHistory | Strategy::Degraded => (window.clone(), None),
        };

        let (text, degraded) = self.compose(topic_id, strategy, &input, &window, previous).await;

        let covers_through = input
            .last()
            .map(|m| m.id)
            .into_iter()
            .chain(previous.and_then(|p| p.covers_through))
            .max();

        let published = store.publish_summary(&NewSummary {
            topic_id,
            author: &self.identity,
            text: &text,
            degraded,
            covers_through,
        })?;
        tracker.reset_pending(topic_id);

        info!(
            topic_id = %topic_id,
            summary_id = %published.summary.id,
            degraded,
            "summary published"
        );

        Ok(SummaryOutcome {
            topic_id,
            strategy,
            degraded,
            summary_id: published.summary.id,
            message_id: published.message.id,
            input_messages: input.len(),
        })
    }

    async fn compose(
        &self,
        topic_id: TopicId,
        strategy: Strategy,
        input: &[MessageRow],
        window: &[MessageRow],
        previous: Option<&SummaryRow>,
    ) -> (String, bool) {
        let backend = match (&self.backend, strategy) {
            (Some(backend), Strategy::FullHistory | Strategy::Incremental) => backend,
            _ => return (digest::degraded_digest(window, DegradedReason::NoBackend), true),
        };

        if input.is_empty() {
            return match previous {
                Some(prev) => (prev.summary_text.clone(), false),
                None => (digest::NO_ACTIVITY.to_string(), false),
            };
        }

        let prompt = match previous {
            Some(prev) => digest::incremental_prompt(&prev.summary_text, input),
            None => digest::full_history_prompt(input),
        };

        match self.call_backend(backend.as_ref(), &prompt).await {
            Ok(text) => (digest::backend_summary(backend.name(), &text), false),
            Err(e) => {
                warn!(
                    topic_id = %topic_id,
                    backend = backend.name(),
                    error_kind = e.error_kind(),
                    error = %e,
                    "backend failed, falling back to degraded digest"
                );
                let reason = DegradedReason::BackendFailed(e.error_kind());
                (digest::degraded_digest(window, reason), true)
            }
        }
    }

    async fn call_backend(
        &self,
        backend: &dyn SummaryBackend,
        prompt: &str,
    ) -> Result<String, MonitorError> {
        let text = tokio::time::timeout(self.backend_timeout, backend.complete(prompt))
            .await
            .map_err(|_| BackendError::Timeout(self.backend_timeout))??;
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResponse.into());
        }
        Ok(text)
    }
}
