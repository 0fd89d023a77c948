//! HTTP generation provider for OpenAI-compatible `/chat/completions`
//! endpoints. Used for grounded answering and quiz drafting.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{env_string, env_u64, is_retryable, normalize_endpoint, GenerationProvider};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TEMPERATURE: f32 = 0.7;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation provider not configured, set LLM_API_KEY")]
    NotConfigured,
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generation endpoint returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("generation response could not be decoded: {0}")]
    Json(String),
    #[error("generation response carried no choices")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GenerationConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("LLM_API_KEY"),
            model: env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_endpoint: normalize_endpoint(
                env_string("LLM_API_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            ),
            timeout_secs: env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_SECS),
            temperature: env_string("LLM_TEMPERATURE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TEMPERATURE),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl ChatResponse {
    fn first_content(self) -> Option<String> {
        self.choices.into_iter().next().map(|c| c.message.content)
    }
}

pub struct HttpGenerationProvider {
    config: GenerationConfig,
    client: reqwest::Client,
}

impl HttpGenerationProvider {
    pub fn from_env() -> Self {
        Self::with_config(GenerationConfig::from_env())
    }

    pub fn with_config(config: GenerationConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let api_key = self.config.api_key.as_deref().ok_or(GenerationError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.config.api_endpoint);
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
        };

        let response = self.post_with_retry(&url, api_key, &request).await?;
        let content = response.first_content().ok_or(GenerationError::Empty)?;
        if content.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        debug!(model = %self.config.model, chars = content.len(), "generation completed");
        Ok(content)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        request: &ChatRequest<'_>,
    ) -> Result<ChatResponse, GenerationError> {
        let mut retry = 0;
        loop {
            let result = self
                .client
                .post(url)
                .bearer_auth(api_key)
                .json(request)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.text().await?;
                        return serde_json::from_str(&body)
                            .map_err(|e| GenerationError::Json(e.to_string()));
                    }
                    if retry < MAX_RETRIES && is_retryable(status) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(%status, retry, "generation request rejected, backing off");
                        tokio::time::sleep(backoff).await;
                        retry += 1;
                        continue;
                    }
                    return Err(GenerationError::HttpStatus(status));
                }
                Err(e) => {
                    if retry < MAX_RETRIES && (e.is_timeout() || e.is_connect()) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(error = %e, retry, "generation request failed, backing off");
                        tokio::time::sleep(backoff).await;
                        retry += 1;
                        continue;
                    }
                    return Err(GenerationError::Request(e));
                }
            }
        }
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        self.chat(&messages).await
    }
}
