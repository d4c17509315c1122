use crate::llm::Role;

/// Notifications for the presentation layer. Sent on an unbounded channel;
/// a dropped receiver is ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The set of stored titles changed; carries the new list.
    ConversationListChanged(Vec<String>),
    MessageAppended { role: Role, content: String },
    TitleAssigned(String),
    OperationFailed(String),
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No messages.
    Empty,
    /// Has messages but no stored record yet.
    Unbound,
    /// Backed by the stored record with this title.
    Bound(String),
}
