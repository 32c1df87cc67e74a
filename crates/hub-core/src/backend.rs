use async_trait::async_trait;

use crate::errors::BackendError;

/// A text-completion service used to write topic summaries.
///
/// Implementations return the completion text verbatim; an empty completion
/// must be reported as [`BackendError::EmptyResponse`] rather than `Ok("")`.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}
