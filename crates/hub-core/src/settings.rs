//! Layered configuration for the hub.
//!
//! Loading flow:
//! 1. Start with compiled [`HubSettings::default()`]
//! 2. If `~/.config/agent-hub/config.json` exists, deep-merge it over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Command-line flags are applied by the binary on top of the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HubSettings {
    pub db_path: String,
    pub agent: AgentSettings,
    pub monitor: MonitorSettings,
    pub backend: BackendSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            db_path: config_dir().join("agent-hub.db").to_string_lossy().into_owned(),
            agent: AgentSettings::default(),
            monitor: MonitorSettings::default(),
            backend: BackendSettings::default(),
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Identity used by tool calls that do not name a sender.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    pub sender: String,
    pub role: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            sender: "unknown".into(),
            role: "agent".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorSettings {
    pub poll_interval_secs: u64,
    pub summary_threshold: usize,
    /// Tracked only; no nudge is sent when it elapses.
    pub inactivity_timeout_secs: u64,
    pub observe_window: usize,
    pub context_window: usize,
    /// Sender name used for summary posts.
    pub identity: String,
    pub role: String,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            summary_threshold: 5,
            inactivity_timeout_secs: 300,
            observe_window: 20,
            context_window: 50,
            identity: "orchestrator".into(),
            role: "orchestrator".into(),
        }
    }
}

impl MonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-lite".into(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub default_wait_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
            default_wait_timeout_secs: 180,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// `~/.config/agent-hub`, falling back to `/tmp` when HOME is unset.
pub fn config_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".config").join("agent-hub")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HubSettings, SettingsError> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HubSettings, SettingsError> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<HubSettings, SettingsError> {
    let defaults = serde_json::to_value(HubSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        if !user.is_object() {
            return Err(SettingsError::InvalidValue(
                "settings file must contain a JSON object".into(),
            ));
        }
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Objects merge per key; arrays and primitives are replaced; nulls in
/// `source` are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `HUB_*` / `BBS_*` overrides read through `lookup`.
///
/// Unparseable or out-of-range values are ignored.
pub fn apply_env_overrides<F>(settings: &mut HubSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = read("HUB_DB_PATH") {
        settings.db_path = v;
    }
    if let Some(v) = read("BBS_AGENT_ID") {
        settings.agent.sender = v;
    }
    if let Some(v) = read("BBS_AGENT_ROLE") {
        settings.agent.role = v;
    }
    if let Some(v) = read("HUB_MODEL") {
        settings.backend.model = v;
    }
    if let Some(v) = read("HUB_POLL_INTERVAL_SECS").and_then(|v| parse_in_range(&v, 1, 3600)) {
        settings.monitor.poll_interval_secs = v;
    }
    if let Some(v) = read("HUB_SUMMARY_THRESHOLD").and_then(|v| parse_in_range(&v, 1, 10_000)) {
        settings.monitor.summary_threshold = v as usize;
    }
    if let Some(v) = read("HUB_PORT").and_then(|v| parse_in_range(&v, 1, 65_535)) {
        settings.server.port = v as u16;
    }
    if let Some(v) = read("HUB_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn parse_in_range(raw: &str, min: u64, max: u64) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|v| (min..=max).contains(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn temp_settings(content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hub-settings-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = HubSettings::default();
        assert_eq!(s.monitor.poll_interval(), Duration::from_secs(5));
        assert_eq!(s.monitor.summary_threshold, 5);
        assert_eq!(s.monitor.inactivity_timeout(), Duration::from_secs(300));
        assert_eq!(s.monitor.observe_window, 20);
        assert_eq!(s.monitor.context_window, 50);
        assert_eq!(s.monitor.identity, "orchestrator");
        assert_eq!(s.backend.model, "gemini-2.0-flash-lite");
        assert!(s.backend.api_key.is_none());
        assert_eq!(s.server.default_wait_timeout_secs, 180);
        assert!(s.db_path.ends_with("agent-hub.db"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let s = read_settings_file(Path::new("/nonexistent/agent-hub/config.json")).unwrap();
        assert_eq!(s, HubSettings::default());
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let path = temp_settings(
            r#"{"api_key_ignored": 1, "backend": {"api_key": "k-123"}, "monitor": {"summary_threshold": 8}}"#,
        );
        let s = read_settings_file(&path).unwrap();
        assert_eq!(s.backend.api_key.as_deref(), Some("k-123"));
        assert_eq!(s.backend.model, "gemini-2.0-flash-lite");
        assert_eq!(s.monitor.summary_threshold, 8);
        assert_eq!(s.monitor.poll_interval_secs, 5);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let path = temp_settings("{not json");
        assert!(matches!(read_settings_file(&path), Err(SettingsError::Json(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn non_object_file_is_rejected() {
        let path = temp_settings("[1, 2]");
        assert!(matches!(read_settings_file(&path), Err(SettingsError::InvalidValue(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("BBS_AGENT_ID", "alice"),
            ("HUB_SUMMARY_THRESHOLD", "3"),
            ("HUB_POLL_INTERVAL_SECS", "0"),
            ("HUB_PORT", "not-a-port"),
            ("BBS_AGENT_ROLE", "  "),
        ]
        .into_iter()
        .collect();

        let mut s = HubSettings::default();
        apply_env_overrides(&mut s, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(s.agent.sender, "alice");
        assert_eq!(s.agent.role, "agent");
        assert_eq!(s.monitor.summary_threshold, 3);
        assert_eq!(s.monitor.poll_interval_secs, 5);
        assert_eq!(s.server.port, 8765);
    }

    #[test]
    fn deep_merge_skips_nulls_and_replaces_arrays() {
        let a = serde_json::json!({"x": {"y": 1, "z": 2}, "list": [1, 2]});
        let b = serde_json::json!({"x": {"y": null, "z": 3}, "list": [9]});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"]["y"], 1);
        assert_eq!(merged["x"]["z"], 3);
        assert_eq!(merged["list"], serde_json::json!([9]));
    }
}
