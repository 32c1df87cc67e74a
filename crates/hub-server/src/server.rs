use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use hub_core::settings::ServerSettings;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::HandlerState;
use crate::rpc::{RpcRequest, RpcResponse};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<HandlerState>) -> Router {
    Router::new()
        .route("/rpc", post(rpc_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `state.shutdown` fires.
pub async fn start(
    config: ServerConfig,
    state: Arc<HandlerState>,
) -> Result<ServerHandle, std::io::Error> {
    let shutdown = state.shutdown.clone();
    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "hub server started");

    let task = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "hub server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        task,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Wait for the server task to finish after shutdown.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

async fn rpc_handler(State(state): State<Arc<HandlerState>>, body: String) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable request");
            return Json(RpcResponse::parse_error());
        }
    };

    let params = request.params.unwrap_or(serde_json::json!({}));
    Json(crate::handlers::dispatch(&state, &request.method, &params, request.id).await)
}

async fn health_handler(State(state): State<Arc<HandlerState>>) -> impl IntoResponse {
    let resp = crate::handlers::dispatch(&state, "health", &serde_json::json!({}), None).await;

    let healthy = resp
        .result
        .as_ref()
        .and_then(|r| r.get("status"))
        .and_then(|s| s.as_str())
        == Some("healthy");

    let http_status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(resp.result.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::settings::AgentSettings;
    use hub_monitor::Notifier;
    use hub_store::Database;

    fn state() -> Arc<HandlerState> {
        let db = Database::in_memory().unwrap();
        Arc::new(HandlerState::new(
            Arc::new(db),
            Arc::new(Notifier::default()),
            &AgentSettings::default(),
        ))
    }

    async fn start_local(state: Arc<HandlerState>) -> ServerHandle {
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        };
        start(config, state).await.unwrap()
    }

    #[tokio::test]
    async fn serves_health() {
        let handle = start_local(state()).await;
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn rpc_round_trip_over_http() {
        let handle = start_local(state()).await;
        let url = format!("http://127.0.0.1:{}/rpc", handle.port);
        let client = reqwest::Client::new();

        let body: serde_json::Value = client
            .post(&url)
            .json(&serde_json::json!({
                "method": "bbs_create_topic",
                "params": { "title": "release" },
                "id": 7,
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["id"], 7);
        assert_eq!(body["result"]["topic"]["title"], "release");
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let handle = start_local(state()).await;
        let url = format!("http://127.0.0.1:{}/rpc", handle.port);
        let body: serde_json::Value = reqwest::Client::new()
            .post(&url)
            .body("{not json")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "PARSE_ERROR");
    }

    #[tokio::test]
    async fn shutdown_stops_server() {
        let state = state();
        let handle = start_local(Arc::clone(&state)).await;
        state.shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle.join())
            .await
            .unwrap();
    }
}
