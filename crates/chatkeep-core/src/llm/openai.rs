use crate::config::{Credentials, Settings};
use crate::constants::endpoints;
use crate::error::ChatError;
use crate::llm::traits::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client for the OpenAI chat-completions endpoint.
///
/// The API key is looked up on every call, so replacing it through the shared
/// [`Credentials`] handle affects all later requests without rebuilding the
/// client.
pub struct OpenAIClient {
    client: reqwest::Client,
    credentials: Credentials,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: endpoints::OPENAI_BASE_URL.to_string(),
        }
    }

    /// Build a client honoring the base URL and request timeout from settings.
    pub fn from_settings(settings: &Settings, credentials: Credentials) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(settings.llm.request_timeout_secs))
            .build()?;

        let mut oai = Self {
            client,
            credentials,
            base_url: endpoints::OPENAI_BASE_URL.to_string(),
        };
        if let Some(ref url) = settings.llm.base_url {
            oai = oai.with_base_url(url.clone());
        }
        Ok(oai)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Handle the API key is read from on every call.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, endpoints::CHAT_COMPLETIONS_PATH)
    }

    fn build_request_body(request: &CompletionRequest) -> OpenAIRequest<'_> {
        OpenAIRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }

    fn parse_response(response_text: &str) -> Result<Completion, ChatError> {
        let api_response: OpenAIResponse = serde_json::from_str(response_text)
            .map_err(|e| ChatError::Llm(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Llm("No response from API".into()))?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            usage: api_response.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait::async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ChatError> {
        let api_key = self
            .credentials
            .api_key()
            .ok_or(ChatError::MissingCredentials)?;

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&Self::build_request_body(request))
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(ChatError::Llm(format!(
                "OpenAI API error ({}): {}",
                status, response_text
            )));
        }

        Self::parse_response(&response_text)
    }
}
