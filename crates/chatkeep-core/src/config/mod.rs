mod credentials;

pub use credentials::{CredentialStore, Credentials};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{defaults, models, retry, titles};
use crate::error::ChatError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub title: TitleSettings,
    #[serde(default)]
    pub conversation: ConversationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmSettings {
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: u32,
    /// Stored as the assistant reply when every attempt failed.
    pub failure_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TitleSettings {
    /// Model for title requests; the chat model when unset.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationSettings {
    pub system_prompt: String,
    /// Where conversation records live; the platform data dir when unset.
    pub directory: Option<PathBuf>,
    pub rename_policy: RenamePolicy,
}

/// What a rename does when the target title is already taken.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenamePolicy {
    /// Replace the existing record.
    #[default]
    Overwrite,
    /// Fail with `AlreadyExists`.
    Reject,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: models::DEFAULT_CHAT_MODEL.to_string(),
            base_url: None,
            api_key_env: defaults::API_KEY_ENV.to_string(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            initial_backoff_ms: retry::INITIAL_BACKOFF_MS,
            multiplier: retry::MULTIPLIER,
            failure_message: retry::FAILURE_MESSAGE.to_string(),
        }
    }
}

impl Default for TitleSettings {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: titles::MAX_TOKENS,
            temperature: titles::TEMPERATURE,
            max_length: titles::MAX_LENGTH,
        }
    }
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            system_prompt: defaults::SYSTEM_PROMPT.to_string(),
            directory: None,
            rename_policy: RenamePolicy::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            retry: RetrySettings::default(),
            title: TitleSettings::default(),
            conversation: ConversationSettings::default(),
        }
    }
}

impl Settings {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(defaults::APP_DIR)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join(defaults::CONFIG_FILE)
    }

    /// Load from the default location, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match Self::load_from(&config_path) {
            Ok(settings) => settings,
            Err(e) => {
                if config_path.exists() {
                    tracing::warn!(path = %config_path.display(), error = %e, "Ignoring unreadable config");
                }
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ChatError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ChatError::Config(e.to_string()))
    }

    pub fn save(&self) -> Result<(), ChatError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ChatError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory holding one record per conversation.
    pub fn conversations_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.conversation.directory {
            return dir.clone();
        }
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(defaults::APP_DIR)
            .join(defaults::CONVERSATIONS_DIR)
    }

    pub fn title_model(&self) -> &str {
        self.title.model.as_deref().unwrap_or(&self.llm.model)
    }

    /// Get the API key from the environment variable specified in settings.
    pub fn api_key_from_env(&self) -> Option<String> {
        if self.llm.api_key_env.is_empty() {
            return None;
        }
        std::env::var(&self.llm.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}
