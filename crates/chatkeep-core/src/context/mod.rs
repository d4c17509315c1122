mod log;
pub mod persistence;

pub use log::ConversationLog;
pub use persistence::{validate_title, ConversationStore, ConversationSummary};
