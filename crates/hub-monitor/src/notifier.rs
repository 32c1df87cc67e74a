//! Per-agent wake-up mailboxes.
//!
//! Each registered agent owns a capacity-one slot. Publishing never blocks:
//! if the slot already holds an event the new one is dropped. Waiters block
//! on their own slot only, so the registry lock is never held while
//! waiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use hub_core::ids::TopicId;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub sender: String,
    pub topic_id: TopicId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(sender: &str, topic_id: TopicId, content: &str) -> Self {
        Self {
            sender: sender.to_string(),
            topic_id,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WaitOutcome {
    Delivered(Notification),
    TimedOut,
    /// The token fired, or the mailbox was unregistered or replaced.
    Cancelled,
}

type Slot = Arc<AsyncMutex<mpsc::Receiver<Notification>>>;

struct Mailbox {
    tx: mpsc::Sender<Notification>,
    rx: Slot,
}

/// A registered agent's view of its mailbox.
#[derive(Clone)]
pub struct MailboxHandle {
    agent_id: String,
    rx: Slot,
}

impl MailboxHandle {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

impl std::fmt::Debug for MailboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxHandle")
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

/// A registration that releases its mailbox when dropped, including when
/// the waiting future is abandoned mid-wait.
pub struct Registration<'a> {
    notifier: &'a Notifier,
    handle: MailboxHandle,
}

impl Registration<'_> {
    pub fn handle(&self) -> &MailboxHandle {
        &self.handle
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.notifier.release(&self.handle);
    }
}

pub struct Notifier {
    mailboxes: RwLock<HashMap<String, Mailbox>>,
    default_timeout: Duration,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_TIMEOUT)
    }
}

impl Notifier {
    pub fn new(default_timeout: Duration) -> Self {
        let default_timeout = if default_timeout.is_zero() {
            DEFAULT_WAIT_TIMEOUT
        } else {
            default_timeout
        };
        Self {
            mailboxes: RwLock::new(HashMap::new()),
            default_timeout,
        }
    }

    /// Create a fresh mailbox for `agent_id`, discarding any previous one.
    pub fn register(&self, agent_id: &str) -> MailboxHandle {
        let (tx, rx) = mpsc::channel(1);
        let rx = Arc::new(AsyncMutex::new(rx));
        let previous = self.mailboxes.write().insert(
            agent_id.to_string(),
            Mailbox {
                tx,
                rx: Arc::clone(&rx),
            },
        );
        if let Some(old) = previous {
            discard(old);
            debug!(agent_id, "mailbox replaced");
        }
        MailboxHandle {
            agent_id: agent_id.to_string(),
            rx,
        }
    }

    /// Like [`Notifier::register`], but the mailbox is released when the
    /// returned guard drops.
    pub fn register_scoped(&self, agent_id: &str) -> Registration<'_> {
        Registration {
            notifier: self,
            handle: self.register(agent_id),
        }
    }

    pub fn unregister(&self, agent_id: &str) {
        let removed = self.mailboxes.write().remove(agent_id);
        if let Some(old) = removed {
            discard(old);
        }
    }

    /// Unregister only if `handle` still owns the agent's mailbox, so a
    /// finished wait never tears down a newer registration.
    pub fn release(&self, handle: &MailboxHandle) {
        let removed = {
            let mut mailboxes = self.mailboxes.write();
            let owned = mailboxes
                .get(&handle.agent_id)
                .is_some_and(|m| Arc::ptr_eq(&m.rx, &handle.rx));
            if owned {
                mailboxes.remove(&handle.agent_id)
            } else {
                None
            }
        };
        if let Some(old) = removed {
            discard(old);
        }
    }

    /// Deliver to one agent without blocking. Returns false when the agent
    /// is unknown or its slot is already full.
    pub fn notify_one(&self, agent_id: &str, event: &Notification) -> bool {
        let mailboxes = self.mailboxes.read();
        let Some(mailbox) = mailboxes.get(agent_id) else {
            return false;
        };
        match mailbox.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(agent_id, topic_id = %event.topic_id, "mailbox full, notification dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Deliver to every registered agent. Returns the delivered count.
    pub fn notify_all(&self, event: &Notification) -> usize {
        let mailboxes = self.mailboxes.read();
        let mut delivered = 0;
        for (agent_id, mailbox) in mailboxes.iter() {
            match mailbox.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => debug!(agent_id = %agent_id, "notification dropped"),
            }
        }
        delivered
    }

    pub fn count(&self) -> usize {
        self.mailboxes.read().len()
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.mailboxes.read().contains_key(agent_id)
    }

    pub fn effective_timeout(&self, timeout: Option<Duration>) -> Duration {
        match timeout {
            Some(t) if !t.is_zero() => t,
            _ => self.default_timeout,
        }
    }

    /// Wait on the agent's current mailbox. An unregistered agent times out
    /// immediately.
    pub async fn wait(
        &self,
        agent_id: &str,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let slot = self
            .mailboxes
            .read()
            .get(agent_id)
            .map(|m| Arc::clone(&m.rx));
        match slot {
            Some(rx) => self.wait_slot(rx, timeout, cancel).await,
            None => WaitOutcome::TimedOut,
        }
    }

    /// Wait on a specific registration.
    pub async fn wait_handle(
        &self,
        handle: &MailboxHandle,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        self.wait_slot(Arc::clone(&handle.rx), timeout, cancel).await
    }

    async fn wait_slot(
        &self,
        rx: Slot,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let timeout = self.effective_timeout(timeout);
        let recv = async move {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            event = recv => match event {
                Some(event) => WaitOutcome::Delivered(event),
                None => WaitOutcome::Cancelled,
            },
            _ = tokio::time::sleep(timeout) => WaitOutcome::TimedOut,
        }
    }
}

/// Close a removed mailbox and drop anything still queued in it. A waiter
/// blocked on it sees the channel close.
fn discard(mailbox: Mailbox) {
    let Mailbox { tx, rx } = mailbox;
    drop(tx);
    if let Ok(mut rx) = rx.try_lock() {
        rx.close();
        while rx.try_recv().is_ok() {}
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn event(content: &str) -> Notification {
        Notification::new("alice", TopicId::from_raw(1), content)
    }

    #[tokio::test]
    async fn slot_holds_at_most_one_event() {
        let notifier = Notifier::default();
        notifier.register("a");
        assert!(notifier.notify_one("a", &event("first")));
        assert!(!notifier.notify_one("a", &event("second")));

        let cancel = CancellationToken::new();
        match notifier.wait("a", Some(Duration::from_millis(50)), &cancel).await {
            WaitOutcome::Delivered(n) => assert_eq!(n.content, "first"),
            other => panic!("expected delivery, got {other:?}"),
        }
        assert_eq!(
            notifier.wait("a", Some(Duration::from_millis(20)), &cancel).await,
            WaitOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn notify_unknown_agent_is_a_miss() {
        let notifier = Notifier::default();
        assert!(!notifier.notify_one("ghost", &event("x")));
        assert_eq!(notifier.notify_all(&event("x")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn one_second_wait_times_out_on_time() {
        let notifier = Notifier::default();
        notifier.register("a");
        let start = Instant::now();
        let outcome = notifier
            .wait("a", Some(Duration::from_secs(1)), &CancellationToken::new())
            .await;
        let elapsed = start.elapsed();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn notified_agent_wakes_other_times_out() {
        let notifier = Notifier::default();
        notifier.register("a");
        notifier.register("b");
        assert!(notifier.notify_one("a", &event("for a")));

        let cancel = CancellationToken::new();
        let start = Instant::now();
        let a = notifier.wait("a", Some(Duration::from_secs(5)), &cancel).await;
        assert!(matches!(a, WaitOutcome::Delivered(_)));
        assert!(start.elapsed() < Duration::from_millis(10));

        let start = Instant::now();
        let b = notifier.wait("b", Some(Duration::from_millis(200)), &cancel).await;
        assert_eq!(b, WaitOutcome::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn unregistered_wait_returns_immediately() {
        let notifier = Notifier::default();
        let start = std::time::Instant::now();
        let outcome = notifier.wait("nobody", None, &CancellationToken::new()).await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_uses_default() {
        let notifier = Notifier::default();
        notifier.register("a");
        let start = Instant::now();
        let outcome = notifier
            .wait("a", Some(Duration::ZERO), &CancellationToken::new())
            .await;
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(start.elapsed() >= DEFAULT_WAIT_TIMEOUT);
    }

    #[tokio::test]
    async fn cancellation_ends_wait() {
        let notifier = Arc::new(Notifier::default());
        notifier.register("a");
        let cancel = CancellationToken::new();

        let waiter = {
            let notifier = Arc::clone(&notifier);
            let cancel = cancel.clone();
            tokio::spawn(async move { notifier.wait("a", Some(Duration::from_secs(60)), &cancel).await })
        };
        tokio::task::yield_now().await;
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_token_wins_over_pending_event() {
        let notifier = Notifier::default();
        notifier.register("a");
        notifier.notify_one("a", &event("x"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(notifier.wait("a", None, &cancel).await, WaitOutcome::Cancelled);
    }

    #[tokio::test]
    async fn unregister_cancels_blocked_waiter() {
        let notifier = Arc::new(Notifier::default());
        let handle = notifier.register("a");
        let waiter = {
            let notifier = Arc::clone(&notifier);
            tokio::spawn(async move {
                notifier
                    .wait_handle(&handle, Some(Duration::from_secs(60)), &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        notifier.unregister("a");
        assert_eq!(waiter.await.unwrap(), WaitOutcome::Cancelled);
        assert!(!notifier.is_registered("a"));
    }

    #[tokio::test]
    async fn reregister_discards_pending_event() {
        let notifier = Notifier::default();
        let old = notifier.register("a");
        notifier.notify_one("a", &event("stale"));
        let _new = notifier.register("a");

        let cancel = CancellationToken::new();
        assert_eq!(
            notifier.wait("a", Some(Duration::from_millis(20)), &cancel).await,
            WaitOutcome::TimedOut
        );
        assert_eq!(
            notifier.wait_handle(&old, Some(Duration::from_millis(20)), &cancel).await,
            WaitOutcome::Cancelled
        );
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test]
    async fn notify_all_counts_deliveries() {
        let notifier = Notifier::default();
        notifier.register("a");
        notifier.register("b");
        notifier.register("c");
        notifier.notify_one("c", &event("pre"));
        assert_eq!(notifier.notify_all(&event("broadcast")), 2);
    }

    #[tokio::test]
    async fn release_leaves_newer_registration() {
        let notifier = Notifier::default();
        let first = notifier.register("a");
        let second = notifier.register("a");
        notifier.release(&first);
        assert!(notifier.is_registered("a"));
        notifier.release(&second);
        assert!(!notifier.is_registered("a"));
    }

    #[tokio::test]
    async fn scoped_registration_released_on_drop() {
        let notifier = Notifier::default();
        {
            let scoped = notifier.register_scoped("a");
            assert_eq!(scoped.handle().agent_id(), "a");
            assert!(notifier.is_registered("a"));
        }
        assert!(!notifier.is_registered("a"));

        let stale = notifier.register_scoped("b");
        let _fresh = notifier.register("b");
        drop(stale);
        assert!(notifier.is_registered("b"));
    }

    #[tokio::test]
    async fn abandoned_wait_releases_mailbox() {
        let notifier = Arc::new(Notifier::default());
        let task = {
            let notifier = Arc::clone(&notifier);
            tokio::spawn(async move {
                let scoped = notifier.register_scoped("gone");
                let cancel = CancellationToken::new();
                notifier
                    .wait_handle(scoped.handle(), Some(Duration::from_secs(60)), &cancel)
                    .await
            })
        };
        while !notifier.is_registered("gone") {
            tokio::task::yield_now().await;
        }

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert!(!notifier.is_registered("gone"));
        assert_eq!(notifier.count(), 0);
    }
}
