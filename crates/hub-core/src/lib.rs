pub mod backend;
pub mod errors;
pub mod ids;
pub mod settings;

pub use backend::SummaryBackend;
pub use errors::BackendError;
pub use ids::{MessageId, SummaryId, TopicId};
pub use settings::HubSettings;
