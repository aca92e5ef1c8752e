//! Azure OpenAI REST backends for the two call shapes.

use crate::completion::{BackendError, CompletionBackend, CompletionRequest};
use crate::config::{CompletionMode, CompletionSettings};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Build the backend matching the configured call shape.
pub fn get_completion_backend(
    settings: &CompletionSettings,
) -> Result<Box<dyn CompletionBackend>, BackendError> {
    let transport = AzureOpenAiTransport::new(settings)?;
    tracing::debug!(
        mode = ?settings.mode,
        deployment = %settings.deployment,
        "Initialized generation backend"
    );
    Ok(match settings.mode {
        CompletionMode::Completion => Box::new(TextCompletionBackend { transport }),
        CompletionMode::Chat => Box::new(ChatCompletionBackend { transport }),
    })
}

struct AzureOpenAiTransport {
    http: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
}

impl AzureOpenAiTransport {
    fn new(settings: &CompletionSettings) -> Result<Self, BackendError> {
        let http = Client::builder()
            .user_agent("enrichment-skill/completion")
            .build()?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    async fn post<T: DeserializeOwned>(
        &self,
        deployment: &str,
        operation: &str,
        body: &Value,
    ) -> Result<T, BackendError> {
        let url = format!(
            "{}/openai/deployments/{deployment}/{operation}",
            self.endpoint
        );
        let response = self
            .http
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::UnexpectedStatus { status, body });
        }

        response
            .json()
            .await
            .map_err(|error| BackendError::InvalidResponse(error.to_string()))
    }
}

/// Plain completion: one prompt made of the input followed by the instruction.
pub struct TextCompletionBackend {
    transport: AzureOpenAiTransport,
}

#[derive(Deserialize)]
struct TextCompletionResponse {
    choices: Vec<TextChoice>,
}

#[derive(Deserialize)]
struct TextChoice {
    text: String,
}

#[async_trait]
impl CompletionBackend for TextCompletionBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let parameters = &request.parameters;
        let body = json!({
            "prompt": format!("{}:\n\n{}", request.text, request.system_prompt),
            "temperature": parameters.temperature,
            "max_tokens": parameters.max_tokens,
            "top_p": parameters.top_p,
            "frequency_penalty": parameters.frequency_penalty,
            "presence_penalty": parameters.presence_penalty,
        });

        let response: TextCompletionResponse = self
            .transport
            .post(&parameters.model, "completions", &body)
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| BackendError::InvalidResponse("response contained no choices".into()))
    }
}

/// Chat completion: the instruction as the system message, the input as the user message.
pub struct ChatCompletionBackend {
    transport: AzureOpenAiTransport,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionBackend for ChatCompletionBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let parameters = &request.parameters;
        let body = json!({
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.text },
            ],
            "temperature": parameters.temperature,
            "max_tokens": parameters.max_tokens,
            "top_p": parameters.top_p,
            "frequency_penalty": parameters.frequency_penalty,
            "presence_penalty": parameters.presence_penalty,
        });

        let response: ChatCompletionResponse = self
            .transport
            .post(&parameters.model, "chat/completions", &body)
            .await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::InvalidResponse("response contained no message".into()))
    }
}
