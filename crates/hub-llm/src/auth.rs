use secrecy::SecretString;

use hub_core::settings::HubSettings;

pub mod env_vars {
    pub const HUB_MASTER_API_KEY: &str = "HUB_MASTER_API_KEY";
    pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
}

/// API key with secrecy protection. Debug never prints the key.
#[derive(Clone)]
pub struct ApiKey(pub SecretString);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Where a resolved key came from, for `doctor` output and startup logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeySource {
    SettingsFile,
    MasterEnv,
    GeminiEnv,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SettingsFile => write!(f, "settings file"),
            Self::MasterEnv => write!(f, "{}", env_vars::HUB_MASTER_API_KEY),
            Self::GeminiEnv => write!(f, "{}", env_vars::GEMINI_API_KEY),
        }
    }
}

/// Resolve the backend key from the process environment.
///
/// Priority:
/// 1. `backend.api_key` from the settings file
/// 2. HUB_MASTER_API_KEY env var
/// 3. GEMINI_API_KEY env var
/// 4. None (the monitor runs degraded)
pub fn resolve_api_key(settings: &HubSettings) -> Option<(ApiKey, KeySource)> {
    resolve_api_key_with(settings, |name| std::env::var(name).ok())
}

/// [`resolve_api_key`] with an injectable environment lookup.
pub fn resolve_api_key_with<F>(settings: &HubSettings, lookup: F) -> Option<(ApiKey, KeySource)>
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |v: String| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    if let Some(key) = settings.backend.api_key.clone().and_then(non_blank) {
        return Some((ApiKey(SecretString::from(key)), KeySource::SettingsFile));
    }
    if let Some(key) = lookup(env_vars::HUB_MASTER_API_KEY).and_then(non_blank) {
        return Some((ApiKey(SecretString::from(key)), KeySource::MasterEnv));
    }
    if let Some(key) = lookup(env_vars::GEMINI_API_KEY).and_then(non_blank) {
        return Some((ApiKey(SecretString::from(key)), KeySource::GeminiEnv));
    }
    None
}
