use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use hub_core::backend::SummaryBackend;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hub_store::BoardStore;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::policy::Summarizer;
use crate::tracker::TopicTracker;

/// Counters for one poll cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PollReport {
    pub topics: usize,
    pub new_messages: usize,
    pub summaries: usize,
    pub failures: usize,
}

/// Timer-driven driver: observe every topic, summarize the ones past the
/// threshold.
pub struct Monitor {
    store: Arc<dyn BoardStore>,
    tracker: TopicTracker,
    summarizer: Summarizer,
    config: MonitorConfig,
    initialized: AtomicBool,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn BoardStore>,
        backend: Option<Arc<dyn SummaryBackend>>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            tracker: TopicTracker::new(config.observe_window, config.identity.clone()),
            summarizer: Summarizer::new(backend, &config),
            config,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn tracker(&self) -> &TopicTracker {
        &self.tracker
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Seed tracker cursors from the store. Safe to call again after a
    /// failure.
    pub fn initialize(&self) -> Result<usize, MonitorError> {
        let seeded = self.tracker.initialize(self.store.as_ref())?;
        self.initialized.store(true, Ordering::Release);
        info!(topics = seeded, degraded_only = !self.summarizer.has_backend(), "monitor initialized");
        Ok(seeded)
    }

    /// One poll cycle. Fails only when the topic list cannot be read; a
    /// failing topic is counted and skipped.
    pub async fn poll_once(&self) -> Result<PollReport, MonitorError> {
        if !self.is_initialized() {
            self.initialize()?;
        }

        let topics = self.store.list_topics()?;
        debug!(topics = topics.len(), "poll cycle started");
        let mut report = PollReport {
            topics: topics.len(),
            ..PollReport::default()
        };

        for topic in &topics {
            let observation = match self.tracker.observe(self.store.as_ref(), topic.id) {
                Ok(obs) => obs,
                Err(e) => {
                    warn!(topic_id = %topic.id, error = %e, "observe failed");
                    report.failures += 1;
                    continue;
                }
            };

            if observation.new_count > 0 {
                info!(
                    topic_id = %topic.id,
                    new = observation.new_count,
                    pending = observation.pending,
                    "new activity"
                );
                report.new_messages += observation.new_count;
            }

            if observation.pending >= self.config.summary_threshold {
                match self
                    .summarizer
                    .summarize(self.store.as_ref(), &self.tracker, topic.id)
                    .await
                {
                    Ok(_) => report.summaries += 1,
                    Err(e) => {
                        warn!(
                            topic_id = %topic.id,
                            error_kind = e.error_kind(),
                            error = %e,
                            "summarization failed, will retry next cycle"
                        );
                        report.failures += 1;
                    }
                }
            }
        }

        let idle = self
            .tracker
            .idle_topics(self.config.inactivity_timeout, Utc::now());
        if !idle.is_empty() {
            debug!(count = idle.len(), "idle topics");
        }

        Ok(report)
    }

    /// Poll until `cancel` fires. The first cycle runs one interval after
    /// start; a cycle in flight at cancellation is abandoned.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Err(e) = self.initialize() {
            warn!(error = %e, "tracker initialization failed, retrying on next tick");
        }
        info!(
            interval_secs = period.as_secs(),
            threshold = self.config.summary_threshold,
            "monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.poll_once() => match result {
                    Ok(report) => debug!(
                        topics = report.topics,
                        new = report.new_messages,
                        summaries = report.summaries,
                        failures = report.failures,
                        "poll cycle finished"
                    ),
                    Err(e) => warn!(error = %e, "poll cycle aborted"),
                },
            }
        }

        info!("monitor stopped");
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
