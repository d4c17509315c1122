/// Chatkeep: centralized constants.
/// Defaults for settings, prompts and limits live here.

// ─── Models ───────────────────────────────────────────────────────────────────

pub mod models {
    /// Model used for both conversation turns and title synthesis.
    pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
}

// ─── API Endpoints ────────────────────────────────────────────────────────────

pub mod endpoints {
    pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
    pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
}

// ─── Retry ────────────────────────────────────────────────────────────────────

pub mod retry {
    pub const MAX_ATTEMPTS: u32 = 5;
    pub const INITIAL_BACKOFF_MS: u64 = 1_000;
    pub const MULTIPLIER: u32 = 2;
    /// Assistant text stored when every attempt failed.
    pub const FAILURE_MESSAGE: &str = "Failed to get a response due to rate limit errors.";
}

// ─── Titles ───────────────────────────────────────────────────────────────────

pub mod titles {
    pub const SYSTEM_PROMPT: &str =
        "You are an assistant that generates titles for conversations.";
    pub const USER_PROMPT_PREFIX: &str =
        "Generate a title for a conversation based on this first query: ";
    pub const MAX_TOKENS: u32 = 10;
    pub const TEMPERATURE: f32 = 0.5;
    pub const MAX_LENGTH: usize = 80;
    pub const UNTITLED: &str = "Untitled";
}

// ─── Default Settings ─────────────────────────────────────────────────────────

pub mod defaults {
    pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
    pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
    pub const REQUEST_TIMEOUT_SECS: u64 = 120;
    pub const APP_DIR: &str = "chatkeep";
    pub const CONFIG_FILE: &str = "config.toml";
    pub const CREDENTIALS_FILE: &str = "credentials.toml";
    pub const CONVERSATIONS_DIR: &str = "conversations";
    pub const RECORD_EXTENSION: &str = "json";
}
