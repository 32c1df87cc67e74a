use std::time::Duration;

use hub_core::settings::HubSettings;

/// Runtime knobs for the poll loop and summarizer.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Pending count at which a topic is summarized.
    pub summary_threshold: usize,
    pub inactivity_timeout: Duration,
    /// Messages fetched per topic on each observation.
    pub observe_window: usize,
    /// Messages fetched as summarization input.
    pub context_window: usize,
    /// Sender name of summary posts. Messages from this sender never count
    /// toward the threshold.
    pub identity: String,
    pub backend_timeout: Duration,
}

impl MonitorConfig {
    pub fn from_settings(settings: &HubSettings) -> Self {
        let monitor = &settings.monitor;
        Self {
            poll_interval: monitor.poll_interval(),
            summary_threshold: monitor.summary_threshold.max(1),
            inactivity_timeout: monitor.inactivity_timeout(),
            observe_window: monitor.observe_window.max(1),
            context_window: monitor.context_window.max(monitor.observe_window).max(1),
            identity: monitor.identity.clone(),
            backend_timeout: settings.backend.timeout(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_settings(&HubSettings::default())
    }
}
