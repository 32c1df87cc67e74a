pub mod auth;
pub mod mock;
pub mod provider;

pub use auth::{resolve_api_key, ApiKey, KeySource};
pub use mock::{MockBackend, MockResponse};
pub use provider::GeminiBackend;
