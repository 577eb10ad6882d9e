//! The text-generation boundary.
//!
//! The engine talks to a generative service only through [`Generator`].
//! [`ClaudeGenerator`] adapts the `claude` client; tests use the scripted
//! generator in [`crate::testing`]. Every call the engine makes goes
//! through [`send_with_retry`], which bounds it with a timeout and retries
//! transient failures with doubling backoff.

use async_trait::async_trait;
use claude::{Claude, Message, Request};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a generator call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("No API key configured")]
    NoApiKey,

    #[error("Invalid generator configuration: {0}")]
    Config(String),

    #[error("Provider error: {message}")]
    Provider { message: String, transient: bool },

    #[error("Generator call timed out after {0:?}")]
    Timeout(Duration),
}

impl GeneratorError {
    /// A transient provider failure.
    pub fn provider(message: impl Into<String>) -> Self {
        GeneratorError::Provider {
            message: message.into(),
            transient: true,
        }
    }

    /// Whether the same call is worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            GeneratorError::Provider { transient, .. } => *transient,
            GeneratorError::Timeout(_) => true,
            GeneratorError::NoApiKey | GeneratorError::Config(_) => false,
        }
    }
}

impl From<claude::Error> for GeneratorError {
    fn from(e: claude::Error) -> Self {
        match e {
            claude::Error::NoApiKey => GeneratorError::NoApiKey,
            claude::Error::Config(msg) => GeneratorError::Config(msg),
            other => GeneratorError::Provider {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}

/// Author of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One entry of the ordered conversation handed to a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// A generative text service.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Send an ordered conversation plus a system prompt; return the reply text.
    async fn send_prompt(
        &self,
        messages: &[PromptMessage],
        system_prompt: &str,
    ) -> Result<String, GeneratorError>;
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for Arc<T> {
    async fn send_prompt(
        &self,
        messages: &[PromptMessage],
        system_prompt: &str,
    ) -> Result<String, GeneratorError> {
        (**self).send_prompt(messages, system_prompt).await
    }
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for Box<T> {
    async fn send_prompt(
        &self,
        messages: &[PromptMessage],
        system_prompt: &str,
    ) -> Result<String, GeneratorError> {
        (**self).send_prompt(messages, system_prompt).await
    }
}

/// Settings for the Claude adapter.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Defaults to the client's model.
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
    /// HTTP-level timeout of the underlying client.
    pub request_timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            temperature: Some(0.8),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl GeneratorConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// [`Generator`] backed by the Anthropic Messages API.
pub struct ClaudeGenerator {
    client: Claude,
    config: GeneratorConfig,
}

impl ClaudeGenerator {
    pub fn new(api_key: impl Into<String>, config: GeneratorConfig) -> Result<Self, GeneratorError> {
        let client = Claude::with_timeout(api_key, config.request_timeout)?;
        Ok(Self { client, config })
    }

    /// Read the key from `ANTHROPIC_API_KEY`. Fails before any call when it is absent.
    pub fn from_env(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| GeneratorError::NoApiKey)?;
        Self::new(api_key, config)
    }

    fn build_request(&self, messages: &[PromptMessage], system_prompt: &str) -> Request {
        // The Messages API has no system role inside the conversation, so
        // system entries are appended to the system prompt.
        let mut system = system_prompt.to_string();
        let mut conversation = Vec::with_capacity(messages.len());

        for message in messages {
            match message.role {
                PromptRole::System => {
                    system.push_str("\n\n");
                    system.push_str(&message.content);
                }
                PromptRole::User => conversation.push(Message::user(&message.content)),
                PromptRole::Assistant => conversation.push(Message::assistant(&message.content)),
            }
        }

        let mut request = Request::new(conversation)
            .with_system(system)
            .with_max_tokens(self.config.max_tokens);

        if let Some(ref model) = self.config.model {
            request = request.with_model(model);
        }
        if let Some(temp) = self.config.temperature {
            request = request.with_temperature(temp);
        }
        request
    }
}

#[async_trait]
impl Generator for ClaudeGenerator {
    async fn send_prompt(
        &self,
        messages: &[PromptMessage],
        system_prompt: &str,
    ) -> Result<String, GeneratorError> {
        let request = self.build_request(messages, system_prompt);
        let response = self.client.complete(request).await?;

        tracing::debug!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Claude response received"
        );
        Ok(response.text())
    }
}

/// Timeout and retry behaviour for generator calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Extra attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(90),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries, for callers that want a single bounded attempt.
    pub fn single_attempt(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Call `generator` under `policy`, retrying transient failures.
pub async fn send_with_retry(
    generator: &dyn Generator,
    messages: &[PromptMessage],
    system_prompt: &str,
    policy: &RetryPolicy,
    operation: &str,
) -> Result<String, GeneratorError> {
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(
            policy.timeout,
            generator.send_prompt(messages, system_prompt),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GeneratorError::Timeout(policy.timeout)),
        };

        match result {
            Ok(text) => {
                if attempt > 0 {
                    tracing::info!(attempt = attempt + 1, operation, "Generator call succeeded after retry");
                }
                return Ok(text);
            }
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    operation,
                    "Generator call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(attempts = attempt + 1, error = %e, operation, "Generator call failed");
                return Err(e);
            }
        }
    }
}
