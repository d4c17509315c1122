//! Naming of new conversations.
//!
//! The remote model is asked once for a short title based on the first user
//! message. The raw answer is then cleaned so it can serve as a storage key.

use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::config::Settings;
use crate::constants::titles;
use crate::context::persistence::{is_reserved_title_char, validate_title, MAX_TITLE_BYTES};
use crate::error::ChatError;
use crate::llm::{CompletionRequest, LlmClient, Message};

/// Bytes kept free for a " (n)" de-duplication suffix.
const SUFFIX_RESERVE: usize = 12;

pub struct TitleSynthesizer {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
    temperature: f32,
    max_length: usize,
}

impl TitleSynthesizer {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: titles::MAX_TOKENS,
            temperature: titles::TEMPERATURE,
            max_length: titles::MAX_LENGTH,
        }
    }

    pub fn from_settings(client: Arc<dyn LlmClient>, settings: &Settings) -> Self {
        Self {
            client,
            model: settings.title_model().to_string(),
            max_tokens: settings.title.max_tokens,
            temperature: settings.title.temperature,
            max_length: settings.title.max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn build_request(&self, first_user_message: &str) -> CompletionRequest {
        CompletionRequest::new(
            self.model.clone(),
            vec![
                Message::system(titles::SYSTEM_PROMPT),
                Message::user(format!("{}{}", titles::USER_PROMPT_PREFIX, first_user_message)),
            ],
        )
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature)
    }

    /// Ask for a title. This call is not retried; failures go to the caller.
    pub async fn synthesize(&self, first_user_message: &str) -> Result<String, ChatError> {
        let request = self.build_request(first_user_message);
        let completion = self.client.complete(&request).await?;
        Ok(completion.content.trim().to_string())
    }
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^title\s*:\s*").unwrap())
}

const WRAPPING: &[char] = &['"', '\'', '`', '*', '“', '”', '‘', '’', '«', '»'];

fn clean(raw: &str, max_length: usize) -> String {
    let unlabeled = label_re().replace(raw.trim(), "");
    let unwrapped = unlabeled.trim().trim_matches(WRAPPING);

    let replaced: String = unwrapped
        .chars()
        .map(|c| if is_reserved_title_char(c) { ' ' } else { c })
        .collect();
    let collapsed = whitespace_re().replace_all(&replaced, " ");

    let mut title: String = collapsed
        .trim()
        .trim_start_matches('.')
        .chars()
        .take(max_length)
        .collect();
    while title.len() > MAX_TITLE_BYTES - SUFFIX_RESERVE {
        title.pop();
    }

    title
        .trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | ',' | ';') || WRAPPING.contains(&c)
        })
        .trim_start_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// Turn a model-produced title into a valid storage key.
///
/// Falls back to the first user message, then to "Untitled", when nothing
/// usable is left. The result always passes [`validate_title`].
pub fn sanitize_title(raw: &str, fallback: &str, max_length: usize) -> String {
    [raw, fallback]
        .into_iter()
        .map(|candidate| clean(candidate, max_length))
        .find(|title| validate_title(title).is_ok())
        .unwrap_or_else(|| titles::UNTITLED.to_string())
}
