//! Conversation session management.
//!
//! A `Session` holds the active conversation, persists it after every turn
//! and names new conversations through the `TitleSynthesizer`.

mod events;
mod manager;
mod title;

pub use events::{SessionEvent, SessionState};
pub use manager::Session;
pub use title::{sanitize_title, TitleSynthesizer};
