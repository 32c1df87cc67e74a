pub mod config;
pub mod digest;
pub mod error;
pub mod monitor;
pub mod notifier;
pub mod policy;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use monitor::{Monitor, PollReport};
pub use notifier::{MailboxHandle, Notification, Notifier, Registration, WaitOutcome};
pub use policy::{select_strategy, Strategy, SummaryOutcome, Summarizer};
pub use tracker::{Observation, TopicCursor, TopicTracker};
