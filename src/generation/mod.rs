//! Answer generation through a hosted or local LLM

mod ollama;
mod openai;
mod prompt;

pub use ollama::{DEFAULT_OLLAMA_URL, OllamaClient};
pub use openai::OpenAiClient;
pub use prompt::{CONTEXT_SEPARATOR, PromptTemplate};

use crate::config::LlmConfig;
use crate::error::LlmError;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// A text-completion backend
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send `prompt` and return the generated text
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;

    /// Whether the backend looks reachable; providers without a cheap probe say yes
    async fn health_check(&self) -> bool {
        true
    }
}

/// Construct the provider named by `llm.provider`
pub fn build_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaClient::new(config)?)),
        other => Err(LlmError::UnknownProvider(other.to_string())),
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(5)
        .build()
        .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))
}

/// Run `operation` up to `max_retries + 1` times, sleeping 2^attempt seconds
/// between attempts; client errors other than 429 are returned immediately
pub(crate) async fn retry_request<F, Fut, T>(max_retries: u32, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = Duration::from_secs(2u64.saturating_pow(attempt));
                tracing::warn!(
                    "LLM request failed (attempt {}/{}): {}, retrying in {:?}",
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a non-2xx response to `LlmError::HttpStatus`, keeping the body for diagnostics
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LlmError::HttpStatus {
        status: status.as_u16(),
        body,
    })
}
