use hub_core::errors::BackendError;
use hub_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("backend failed: {0}")]
    Backend(#[from] BackendError),
}

impl MonitorError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store_unavailable",
            Self::Backend(e) => e.error_kind(),
        }
    }
}
