//! HTTP embedding provider for OpenAI-compatible `/embeddings` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{env_string, env_u64, env_usize, is_retryable, normalize_endpoint, EmbeddingProvider};

const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DIMENSION: usize = 1536;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider not configured, set EMBEDDING_API_KEY")]
    NotConfigured,
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("embedding endpoint returned status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("embedding response could not be decoded: {0}")]
    Json(String),
    #[error("embedding response carried no vectors")]
    Empty,
    #[error("requested {requested} embeddings, got {got}")]
    CountMismatch { requested: usize, got: usize },
    #[error("expected dimension {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout_secs: u64,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl EmbeddingConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("EMBEDDING_API_KEY"),
            model: env_string("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_endpoint: normalize_endpoint(
                env_string("EMBEDDING_API_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            ),
            timeout_secs: env_u64("EMBEDDING_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_SECS),
            dimension: env_usize("EMBEDDING_DIMENSION").unwrap_or(DEFAULT_DIMENSION),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

pub struct HttpEmbeddingProvider {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn from_env() -> Self {
        Self::with_config(EmbeddingConfig::from_env())
    }

    pub fn with_config(config: EmbeddingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self.config.api_key.as_deref().ok_or(EmbeddingError::NotConfigured)?;
        let url = format!("{}/embeddings", self.config.api_endpoint);
        let request = EmbeddingRequest { model: &self.config.model, input: texts };

        let response = self.post_with_retry(&url, api_key, &request).await?;
        if response.data.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if response.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                requested: texts.len(),
                got: response.data.len(),
            });
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        let mut vectors = Vec::with_capacity(data.len());
        for datum in data {
            if datum.embedding.len() != self.config.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.config.dimension,
                    got: datum.embedding.len(),
                });
            }
            vectors.push(datum.embedding);
        }
        debug!(count = vectors.len(), model = %self.config.model, "embedded texts");
        Ok(vectors)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        request: &EmbeddingRequest<'_>,
    ) -> Result<EmbeddingResponse, EmbeddingError> {
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
                            .map_err(|e| EmbeddingError::Json(e.to_string()));
                    }
                    if retry < MAX_RETRIES && is_retryable(status) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(%status, retry, "embedding request rejected, backing off");
                        tokio::time::sleep(backoff).await;
                        retry += 1;
                        continue;
                    }
                    return Err(EmbeddingError::HttpStatus(status));
                }
                Err(e) => {
                    if retry < MAX_RETRIES && (e.is_timeout() || e.is_connect()) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(error = %e, retry, "embedding request failed, backing off");
                        tokio::time::sleep(backoff).await;
                        retry += 1;
                        continue;
                    }
                    return Err(EmbeddingError::Request(e));
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_texts(&texts).await?;
        vectors.pop().ok_or(EmbeddingError::Empty)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_texts(texts).await
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}
