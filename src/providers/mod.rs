//! External model collaborators.
//!
//! The core consumes embeddings and text generation through the two traits
//! here, so the algorithms stay testable with the deterministic fakes below
//! while production wires in the HTTP implementations.

pub mod embedding;
pub mod generation;

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

pub use embedding::{EmbeddingConfig, EmbeddingError, HttpEmbeddingProvider};
pub use generation::{ChatMessage, GenerationConfig, GenerationError, HttpGenerationProvider};

/// Text-to-vector collaborator. Deterministic for identical input within a
/// session; every vector has [`EmbeddingProvider::dimension`] entries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// Language-model collaborator. The response is opaque to the core; parsing
/// it (if any) is the caller's concern.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

/// Offline embedding based on hashed word counts, L2-normalized. Texts that
/// share vocabulary score high under cosine similarity, which is all the
/// tests and offline runs need.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(hash_embedding(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dimension = dimension.max(1);
    let mut vector = vec![0.0f32; dimension];
    let lowered = text.to_lowercase();
    for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let slot = (fnv1a(word.as_bytes()) % dimension as u64) as usize;
        vector[slot] += 1.0;
    }
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Scripted generation fake. Returns a fixed response and records what it
/// was asked, so tests can assert on the prompt the core built.
#[derive(Default)]
pub struct FixedGeneration {
    response: String,
    calls: AtomicU32,
    last_system: Mutex<Option<String>>,
    last_user: Mutex<Option<String>>,
}

impl FixedGeneration {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self { response: response.into(), ..Default::default() }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn last_system(&self) -> Option<String> {
        self.last_system.lock().clone()
    }

    pub fn last_user(&self) -> Option<String> {
        self.last_user.lock().clone()
    }
}

#[async_trait]
impl GenerationProvider for FixedGeneration {
    async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        *self.last_system.lock() = Some(system.to_string());
        *self.last_user.lock() = Some(user.to_string());
        Ok(self.response.clone())
    }
}

pub(crate) fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

pub(crate) fn env_usize(key: &str) -> Option<usize> {
    env_string(key)?.parse().ok()
}

/// Ensure the endpoint carries a `/v1` segment exactly once.
pub(crate) fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

pub(crate) fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
