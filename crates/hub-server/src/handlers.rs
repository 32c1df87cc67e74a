//! Tool handlers for the message board.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hub_core::ids::TopicId;
use hub_core::settings::AgentSettings;
use hub_monitor::{Notification, Notifier, WaitOutcome};
use hub_store::BoardStore;

use crate::rpc::{self, RpcResponse};

const DEFAULT_SUMMARY_LIMIT: usize = 5;
const MAX_WAIT_SECS: i64 = 3600;

/// Identity used when a call does not name a sender.
#[derive(Clone, Debug)]
pub struct CurrentAgent {
    pub sender: String,
    pub role: String,
}

/// Shared state available to all handlers.
pub struct HandlerState {
    pub store: Arc<dyn BoardStore>,
    pub notifier: Arc<Notifier>,
    pub current: RwLock<CurrentAgent>,
    /// Fired on process shutdown; ends every pending wait.
    pub shutdown: CancellationToken,
}

impl HandlerState {
    pub fn new(store: Arc<dyn BoardStore>, notifier: Arc<Notifier>, agent: &AgentSettings) -> Self {
        Self {
            store,
            notifier,
            current: RwLock::new(CurrentAgent {
                sender: agent.sender.clone(),
                role: agent.role.clone(),
            }),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn sender_or_current(&self, params: &serde_json::Value) -> String {
        rpc::optional_str(params, "sender")
            .map(str::to_string)
            .unwrap_or_else(|| self.current.read().sender.clone())
    }
}

/// Dispatch a tool call to its handler.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    debug!(method, "dispatch");
    match method {
        "bbs_create_topic" => create_topic(state, params, id),
        "bbs_list_topics" => list_topics(state, id),
        "bbs_post" => post(state, params, id),
        "bbs_read" => read(state, params, id),
        "bbs_summaries" => summaries(state, params, id),
        "bbs_register_agent" => register_agent(state, params, id),
        "update_status" => update_status(state, params, id),
        "check_hub_status" => check_hub_status(state, params, id),
        "wait_notify" => wait_notify(state, params, id).await,
        "health" => health(state, id),
        _ => RpcResponse::method_not_found(id, method),
    }
}

fn require_topic(params: &serde_json::Value) -> Result<TopicId, String> {
    let raw = rpc::require_i64(params, "topic_id")?;
    if raw <= 0 {
        return Err("topic_id must be a positive integer".into());
    }
    Ok(TopicId::from_raw(raw))
}

fn optional_topic(params: &serde_json::Value) -> Option<TopicId> {
    rpc::optional_i64(params, "topic_id")
        .filter(|raw| *raw > 0)
        .map(TopicId::from_raw)
}

fn to_value<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn create_topic(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let title = match rpc::require_str(params, "title") {
        Ok(t) => t,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    match state.store.create_topic(title) {
        Ok(topic) => {
            info!(topic_id = %topic.id, "topic created");
            RpcResponse::success(
                id,
                json!({
                    "topic": to_value(&topic),
                    "message": format!("Topic created with ID: {}", topic.id.get()),
                }),
            )
        }
        Err(e) => RpcResponse::from_store_error(id, e),
    }
}

fn list_topics(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    match state.store.list_topics() {
        Ok(topics) => RpcResponse::success(id, json!({ "topics": to_value(&topics) })),
        Err(e) => RpcResponse::from_store_error(id, e),
    }
}

/// Append a message and wake every waiting agent.
fn post(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let topic_id = match require_topic(params) {
        Ok(t) => t,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let content = match rpc::require_str(params, "content") {
        Ok(c) => c,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let sender = state.sender_or_current(params);

    let message = match state.store.post_message(topic_id, &sender, content) {
        Ok(m) => m,
        Err(e) => return RpcResponse::from_store_error(id, e),
    };

    let notified = state
        .notifier
        .notify_all(&Notification::new(&sender, topic_id, content));
    debug!(topic_id = %topic_id, message_id = %message.id, notified, "message posted");

    RpcResponse::success(
        id,
        json!({
            "message_id": message.id,
            "topic_id": topic_id,
            "notified": notified,
            "message": format!("Message posted with ID: {}", message.id.get()),
        }),
    )
}

fn read(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let topic_id = match require_topic(params) {
        Ok(t) => t,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let limit = rpc::optional_i64(params, "limit").unwrap_or(0).max(0) as usize;
    match state.store.recent_messages(topic_id, limit) {
        Ok(messages) => RpcResponse::success(id, json!({ "messages": to_value(&messages) })),
        Err(e) => RpcResponse::from_store_error(id, e),
    }
}

fn summaries(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let topic_id = match require_topic(params) {
        Ok(t) => t,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let limit = rpc::optional_i64(params, "limit")
        .filter(|l| *l > 0)
        .map_or(DEFAULT_SUMMARY_LIMIT, |l| l as usize);
    match state.store.recent_summaries(topic_id, limit) {
        Ok(rows) => RpcResponse::success(id, json!({ "summaries": to_value(&rows) })),
        Err(e) => RpcResponse::from_store_error(id, e),
    }
}

/// Register (or refresh) an agent and make it the default sender.
fn register_agent(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let name = match rpc::require_str(params, "name") {
        Ok(n) => n,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let role = match rpc::require_str(params, "role") {
        Ok(r) => r,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let status = rpc::optional_str(params, "status").unwrap_or("online");
    let topic_id = optional_topic(params);

    if let Err(e) = state.store.register_agent(name, role) {
        return RpcResponse::from_store_error(id, e);
    }
    if let Err(e) = state.store.update_status(name, status, topic_id) {
        return RpcResponse::from_store_error(id, e);
    }
    *state.current.write() = CurrentAgent {
        sender: name.to_string(),
        role: role.to_string(),
    };

    match state.store.agent(name) {
        Ok(agent) => RpcResponse::success(
            id,
            json!({
                "agent": to_value(&agent),
                "message": format!("Agent registered: name={name}, role={role}, status={status}"),
            }),
        ),
        Err(e) => RpcResponse::from_store_error(id, e),
    }
}

fn update_status(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let status = match rpc::require_str(params, "status") {
        Ok(s) => s,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let topic_id = optional_topic(params);
    let sender = state.sender_or_current(params);

    match state.store.update_status(&sender, status, topic_id) {
        Ok(()) => {
            let on_topic = topic_id
                .map(|t| format!(" on topic {}", t.get()))
                .unwrap_or_default();
            RpcResponse::success(
                id,
                json!({
                    "agent": sender,
                    "status": status,
                    "topic_id": topic_id,
                    "message": format!("Status updated: {status}{on_topic}"),
                }),
            )
        }
        Err(e) => RpcResponse::from_store_error(id, e),
    }
}

/// Unread count since the caller's watermark, then advance the watermark.
fn check_hub_status(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let sender = state.sender_or_current(params);

    let unread = match state.store.count_unread(&sender) {
        Ok(n) => n,
        Err(e) => return RpcResponse::from_store_error(id, e),
    };
    if let Err(e) = state.store.mark_read(&sender) {
        warn!(agent = %sender, error = %e, "failed to update read watermark");
    }
    let presence = match state.store.list_agents() {
        Ok(p) => p,
        Err(e) => return RpcResponse::from_store_error(id, e),
    };

    let mut result = json!({
        "has_new_activity": unread > 0,
        "unread_count": unread,
        "team_presence": to_value(&presence),
    });
    if unread > 0 {
        result["hint"] = json!(
            "There are unread messages on the board. Save your work, run bbs_read, then report with update_status."
        );
    }
    RpcResponse::success(id, result)
}

/// Block until the next post, the timeout, or shutdown.
async fn wait_notify(
    state: &Arc<HandlerState>,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let agent_id = match rpc::require_str(params, "agent_id") {
        Ok(a) => a,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let timeout = rpc::optional_i64(params, "timeout_sec")
        .filter(|secs| *secs > 0)
        .map(|secs| Duration::from_secs(secs.min(MAX_WAIT_SECS) as u64));
    let effective = state.notifier.effective_timeout(timeout);

    let registration = state.notifier.register_scoped(agent_id);
    let outcome = state
        .notifier
        .wait_handle(registration.handle(), Some(effective), &state.shutdown)
        .await;
    drop(registration);

    let result = match outcome {
        WaitOutcome::Delivered(event) => json!({
            "has_new": true,
            "status": "new_messages",
            "message": format!("New message on topic {}: {}", event.topic_id.get(), event.content),
            "notification": to_value(&event),
        }),
        WaitOutcome::TimedOut => json!({
            "has_new": false,
            "status": "timeout",
            "message": format!("No new messages within {} seconds", effective.as_secs()),
        }),
        WaitOutcome::Cancelled => json!({
            "has_new": false,
            "status": "cancelled",
            "message": "Wait operation cancelled",
        }),
    };
    RpcResponse::success(id, result)
}

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let topics = state.store.list_topics().map(|t| t.len());
    RpcResponse::success(
        id,
        json!({
            "status": if topics.is_ok() { "healthy" } else { "degraded" },
            "registered_waiters": state.notifier.count(),
            "topics": topics.ok(),
        }),
    )
}
