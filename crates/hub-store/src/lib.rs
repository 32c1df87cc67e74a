pub mod board;
pub mod database;
pub mod error;
pub mod messages;
pub mod presence;
pub mod row_helpers;
pub mod schema;
pub mod summaries;
pub mod topics;

pub use board::BoardStore;
pub use database::{Database, IntegrityReport};
pub use error::StoreError;
pub use messages::MessageRow;
pub use presence::PresenceRow;
pub use summaries::{NewSummary, PublishedSummary, SummaryRow};
pub use topics::TopicRow;
