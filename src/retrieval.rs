//! Top-k snippet retrieval over the knowledge store.
//!
//! [`LinearScanRetriever`] scores every stored snippet against the query
//! embedding. The corpus is small enough (study material for three
//! certificate levels) that a full scan stays cheap; [`SnippetSearch`] is
//! the seam to swap in an approximate index if that stops being true.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::CoreError;
use crate::store::{Repository, SnippetFilter};
use crate::types::{CertificateLevel, Snippet};

#[derive(Debug, Clone)]
pub struct ScoredSnippet {
    pub snippet: Snippet,
    pub score: f32,
}

/// Similarity search over stored snippets. Pure read; every call recomputes.
pub trait SnippetSearch: Send + Sync {
    /// Top `k` snippets by cosine similarity, descending; ties broken by
    /// snippet id ascending. `k == 0` is an invalid argument. An empty or
    /// fully filtered store yields an empty vec, not an error.
    fn retrieve(
        &self,
        query_embedding: &[f32],
        k: usize,
        level: Option<CertificateLevel>,
    ) -> Result<Vec<ScoredSnippet>, CoreError>;
}

pub struct LinearScanRetriever {
    repo: Arc<dyn Repository>,
}

impl LinearScanRetriever {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }
}

impl SnippetSearch for LinearScanRetriever {
    fn retrieve(
        &self,
        query_embedding: &[f32],
        k: usize,
        level: Option<CertificateLevel>,
    ) -> Result<Vec<ScoredSnippet>, CoreError> {
        if k == 0 {
            return Err(CoreError::invalid_argument("k must be at least 1"));
        }

        let filter = SnippetFilter { topic: None, level };
        let snippets = self.repo.query_snippets(&filter)?;

        let mut scored: Vec<ScoredSnippet> = snippets
            .into_iter()
            .filter_map(|snippet| match cosine_similarity(query_embedding, &snippet.embedding) {
                Some(score) => Some(ScoredSnippet { snippet, score }),
                None => {
                    tracing::debug!(
                        snippet_id = %snippet.id,
                        expected = query_embedding.len(),
                        actual = snippet.embedding.len(),
                        "skipping snippet with incomparable embedding"
                    );
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.snippet.id.cmp(&b.snippet.id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// `None` when the vectors differ in length or either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
