use crate::config::RetrySettings;
use crate::constants::retry;
use crate::llm::traits::{Completion, CompletionRequest, LlmClient};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum InvocationError {
    #[error("Remote call failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Bounded exponential backoff: `initial_backoff * multiplier^(n-1)` after
/// the n-th failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(retry::INITIAL_BACKOFF_MS),
            multiplier: retry::MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            multiplier: settings.multiplier,
        }
    }

    /// Attempts actually made; a zero setting still calls the client once.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay following the given 1-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }

    /// Total time spent waiting by an invocation whose every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (1..=self.attempts())
            .map(|attempt| self.delay_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Wraps an [`LlmClient`] so that each call is retried with backoff.
///
/// Every error from the client counts as transient. Once the attempts are
/// used up the caller gets [`InvocationError::Exhausted`], or the failure
/// sentinel text through [`RetryingInvoker::invoke_or_sentinel`].
pub struct RetryingInvoker {
    client: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    failure_message: String,
}

impl RetryingInvoker {
    pub fn new(client: Arc<dyn LlmClient>, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            failure_message: retry::FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    pub fn client(&self) -> Arc<dyn LlmClient> {
        Arc::clone(&self.client)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn failure_message(&self) -> &str {
        &self.failure_message
    }

    pub async fn invoke(&self, request: &CompletionRequest) -> Result<Completion, InvocationError> {
        let attempts = self.policy.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.client.complete(request).await {
                Ok(completion) => {
                    debug!(attempt, model = %request.model, "Completion succeeded");
                    return Ok(completion);
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Completion attempt failed, backing off"
                    );
                    last_error = e.to_string();
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(InvocationError::Exhausted {
            attempts,
            last_error,
        })
    }

    /// Like [`invoke`](Self::invoke) but folds exhaustion into the failure
    /// sentinel, which callers store as ordinary assistant content.
    pub async fn invoke_or_sentinel(&self, request: &CompletionRequest) -> String {
        match self.invoke(request).await {
            Ok(completion) => completion.content,
            Err(_) => self.failure_message.clone(),
        }
    }
}
