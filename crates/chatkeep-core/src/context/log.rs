use crate::llm::{Message, Role};
use serde::{Deserialize, Serialize};

/// Ordered, append-only message log of one conversation.
///
/// Serializes transparently as a JSON array of `{role, content}` objects,
/// which is also the persisted record layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationLog {
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh log holding only the system message.
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
        }
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(Message::assistant(content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn first_user_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::User)
    }

    pub fn has_user_turn(&self) -> bool {
        self.first_user_message().is_some()
    }

    /// Empty, or exactly one leading system message followed only by user
    /// and assistant turns. Strict alternation is not required.
    pub fn is_well_formed(&self) -> bool {
        match self.messages.split_first() {
            None => true,
            Some((first, rest)) => {
                first.role == Role::System && rest.iter().all(|m| m.role != Role::System)
            }
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl From<Vec<Message>> for ConversationLog {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_messages(messages)
    }
}
