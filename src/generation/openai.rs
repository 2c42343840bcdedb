//! OpenAI-compatible chat completions client

use super::{LlmProvider, check_status, http_client, retry_request};
use crate::config::LlmConfig;
use crate::error::LlmError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Environment variable consulted when `llm.api_key` is unset
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty()))
            .ok_or_else(|| LlmError::MissingApiKey(config.provider.clone()))?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn send(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let body: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response has no message content".to_string()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::debug!("Requesting completion from {} ({})", self.endpoint, self.model);
        retry_request(self.max_retries, || self.send(prompt)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
