use thiserror::Error;

use crate::llm::InvocationError;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No API key configured")]
    MissingCredentials,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Conversation not found: {0}")]
    NotFound(String),

    #[error("Conversation already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid conversation title {title:?}: {reason}")]
    InvalidTitle { title: String, reason: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("No conversation is bound to the current session")]
    NoActiveConversation,

    #[error(transparent)]
    Invocation(#[from] InvocationError),
}

impl ChatError {
    pub fn invalid_title(title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTitle {
            title: title.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Persistence(format!("{context}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
