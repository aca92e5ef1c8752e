//! Retry-guarded calls to the generative-text backend.
//!
//! The backend is reached through [`CompletionBackend`], implemented once per call shape
//! (plain completion and chat). [`CompletionClient`] fills in the process-wide generation
//! parameters and retries failed calls with jittered exponential backoff. The generated text is
//! returned as-is; interpreting it is up to the caller.

pub mod azure;

pub use azure::{ChatCompletionBackend, TextCompletionBackend, get_completion_backend};

use crate::config::CompletionSettings;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single backend call, or by the last attempt once retries ran out.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP layer failed before receiving a response.
    #[error("Failed to reach generation backend: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend answered with a non-success status.
    #[error("Generation backend returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Backend response could not be interpreted.
    #[error("Malformed generation response: {0}")]
    InvalidResponse(String),
}

/// Sampling parameters shared by every call in the process.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParameters {
    /// Model deployment name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Frequency penalty.
    pub frequency_penalty: f32,
    /// Presence penalty.
    pub presence_penalty: f32,
}

impl From<&CompletionSettings> for GenerationParameters {
    fn from(settings: &CompletionSettings) -> Self {
        Self {
            model: settings.deployment.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
            frequency_penalty: settings.frequency_penalty,
            presence_penalty: settings.presence_penalty,
        }
    }
}

/// One fully-resolved generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Input text.
    pub text: String,
    /// Instruction applied to the input.
    pub system_prompt: String,
    /// Sampling parameters.
    pub parameters: GenerationParameters,
}

/// A generation backend call shape.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Perform a single call and return the generated text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

/// Bounds for the jittered exponential backoff applied between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Smallest wait before a retry.
    pub min_delay: Duration,
    /// Largest wait before a retry.
    pub max_delay: Duration,
    /// Total attempts including the first one.
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            max_attempts: 6,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        // Jitter adds up to one extra base delay, so the base is capped at half the ceiling.
        let base_ceiling = (self.max_delay / 2).max(self.min_delay);
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(base_ceiling)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }
}

/// Generation client combining a backend strategy with defaults and retries.
pub struct CompletionClient {
    backend: Box<dyn CompletionBackend>,
    system_prompt: String,
    parameters: GenerationParameters,
    retry: RetryPolicy,
}

impl CompletionClient {
    /// Assemble a client from an explicit backend.
    pub fn new(
        backend: Box<dyn CompletionBackend>,
        system_prompt: String,
        parameters: GenerationParameters,
    ) -> Self {
        Self {
            backend,
            system_prompt,
            parameters,
            retry: RetryPolicy::default(),
        }
    }

    /// Build the backend selected by `settings.mode` and wrap it with the configured defaults.
    pub fn from_settings(settings: &CompletionSettings) -> Result<Self, BackendError> {
        let backend = get_completion_backend(settings)?;
        Ok(Self::new(
            backend,
            settings.system_prompt.clone(),
            GenerationParameters::from(settings),
        ))
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generate text for `text`, using `prompt_override` instead of the configured prompt when
    /// it is non-empty.
    ///
    /// Any failed attempt is retried until the policy is exhausted; the error of the final
    /// attempt is returned.
    pub async fn generate(
        &self,
        text: &str,
        prompt_override: Option<&str>,
    ) -> Result<String, BackendError> {
        let request = self.request_for(text, prompt_override);
        let attempt = || async { self.backend.complete(&request).await };

        attempt
            .retry(self.retry.backoff())
            .notify(|error: &BackendError, delay: Duration| {
                tracing::warn!(
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "Generation attempt failed; retrying"
                );
            })
            .await
            .inspect_err(|error| {
                tracing::error!(
                    attempts = self.retry.max_attempts,
                    error = %error,
                    "Generation retries exhausted"
                );
            })
    }

    fn request_for(&self, text: &str, prompt_override: Option<&str>) -> CompletionRequest {
        let system_prompt = prompt_override
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or(&self.system_prompt);
        CompletionRequest {
            text: text.to_string(),
            system_prompt: system_prompt.to_string(),
            parameters: self.parameters.clone(),
        }
    }
}
