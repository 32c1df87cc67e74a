use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use hub_core::backend::SummaryBackend;
use hub_core::errors::BackendError;

use crate::auth::ApiKey;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini `generateContent` client. One request per summary, no streaming.
pub struct GeminiBackend {
    client: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
}

impl GeminiBackend {
    pub fn new(api_key: ApiKey, model: impl Into<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: API_BASE.to_string(),
        })
    }

    /// Point the client at another endpoint root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl SummaryBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.0.expose_secret())
            .header("content-type", "application/json")
            .json(&request_body(prompt))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(CONNECT_TIMEOUT)
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::from_status(status, body));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let text = parse_response(&body)?;
        debug!(response_len = text.len(), "completion received");
        Ok(text)
    }
}

pub fn request_body(prompt: &str) -> Value {
    json!({
        "contents": [
            { "parts": [ { "text": prompt } ] }
        ]
    })
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Text of the first candidate, parts concatenated.
pub fn parse_response(body: &str) -> Result<String, BackendError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()))?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(BackendError::EmptyResponse);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn backend() -> GeminiBackend {
        GeminiBackend::new(ApiKey(SecretString::from("test-key")), "gemini-2.0-flash-lite").unwrap()
    }

    #[test]
    fn endpoint_includes_model() {
        assert_eq!(
            backend().endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-lite:generateContent"
        );
        let local = backend().with_base_url("http://127.0.0.1:9/v1/");
        assert_eq!(
            local.endpoint(),
            "http://127.0.0.1:9/v1/models/gemini-2.0-flash-lite:generateContent"
        );
    }

    #[test]
    fn body_wraps_prompt() {
        let body = request_body("summarize this");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "summarize this");
    }

    #[test]
    fn parses_first_candidate() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Decided "},{"text":"to ship."}]}},
                     {"content":{"parts":[{"text":"ignored"}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Decided to ship.");
    }

    #[test]
    fn empty_candidates_are_empty_response() {
        assert!(matches!(parse_response(r#"{"candidates":[]}"#), Err(BackendError::EmptyResponse)));
        assert!(matches!(parse_response("{}"), Err(BackendError::EmptyResponse)));
        assert!(matches!(
            parse_response(r#"{"candidates":[{"content":{"parts":[{"text":"  "}]}}]}"#),
            Err(BackendError::EmptyResponse)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(parse_response("<html>"), Err(BackendError::Malformed(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let backend = backend().with_base_url("http://127.0.0.1:1");
        let err = backend.complete("hi").await.unwrap_err();
        assert!(matches!(err, BackendError::Network(_)), "got {err:?}");
    }

    #[cfg(feature = "integration")]
    #[tokio::test]
    async fn live_completion() {
        let settings = hub_core::settings::HubSettings::default();
        let Some((key, _)) = crate::auth::resolve_api_key(&settings) else {
            return;
        };
        let backend = GeminiBackend::new(key, settings.backend.model).unwrap();
        let text = backend.complete("Reply with the single word: ok").await.unwrap();
        assert!(!text.trim().is_empty());
    }
}
