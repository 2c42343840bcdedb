//! Ollama `/api/generate` client

use super::{LlmProvider, check_status, http_client, retry_request};
use crate::config::LlmConfig;
use crate::error::LlmError;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Used when the configured base URL still points at the OpenAI default
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = if config.base_url == OPENAI_DEFAULT_URL {
            DEFAULT_OLLAMA_URL.to_string()
        } else {
            config.base_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(format!("Generation request failed: {}", e)))?;

        let body: GenerateResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(body.response)
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        tracing::info!("Generating answer with model: {}", self.model);
        retry_request(self.max_retries, || self.generate(prompt)).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            provider: "ollama".to_string(),
            base_url,
            model: "llama3".to_string(),
            max_retries: 0,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_non_streaming() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], false);
                assert_eq!(body["model"], "llama3");
                Json(json!({"response": format!("echo: {}", body["prompt"].as_str().unwrap())}))
            }),
        );
        let base = serve(router).await;

        let client = OllamaClient::new(&config(base)).unwrap();
        assert_eq!(client.complete("hi").await.unwrap(), "echo: hi");
    }

    #[tokio::test]
    async fn test_health_check() {
        let router = Router::new().route("/api/tags", get(|| async { Json(json!({"models": []})) }));
        let base = serve(router).await;

        assert!(OllamaClient::new(&config(base)).unwrap().health_check().await);
        assert!(
            !OllamaClient::new(&config("http://127.0.0.1:9".to_string()))
                .unwrap()
                .health_check()
                .await
        );
    }

    #[test]
    fn test_openai_default_url_replaced() {
        let client = OllamaClient::new(&LlmConfig {
            provider: "ollama".to_string(),
            ..LlmConfig::default()
        })
        .unwrap();
        assert_eq!(client.base_url, DEFAULT_OLLAMA_URL);
    }
}
