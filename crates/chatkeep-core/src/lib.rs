pub mod error;
pub mod constants;
pub mod llm;
pub mod context;
pub mod config;
pub mod session;

// Re-export key types
pub use error::ChatError;
pub use llm::{
    Completion, CompletionRequest, InvocationError, LlmClient, Message, OpenAIClient, RetryPolicy,
    RetryingInvoker, Role,
};
pub use context::{ConversationLog, ConversationStore, ConversationSummary};
pub use config::{CredentialStore, Credentials, RenamePolicy, Settings};
pub use session::{Session, SessionEvent, SessionState, TitleSynthesizer};
