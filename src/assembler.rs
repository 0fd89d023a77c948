//! Grounded-context assembly for answer generation.
//!
//! Embeds the learner's question, retrieves the best-matching snippets, and
//! formats them into the context block handed to the language model.

use std::sync::Arc;

use crate::config::AssemblerParams;
use crate::error::CoreError;
use crate::providers::EmbeddingProvider;
use crate::retrieval::{ScoredSnippet, SnippetSearch};
use crate::types::CertificateLevel;

pub struct ContextAssembler {
    retriever: Arc<dyn SnippetSearch>,
    embedder: Arc<dyn EmbeddingProvider>,
    params: AssemblerParams,
}

impl ContextAssembler {
    pub fn new(
        retriever: Arc<dyn SnippetSearch>,
        embedder: Arc<dyn EmbeddingProvider>,
        params: AssemblerParams,
    ) -> Self {
        Self { retriever, embedder, params }
    }

    /// Build the context string for a query.
    ///
    /// Snippets arrive in descending score order and are concatenated whole
    /// until the byte budget would be exceeded; everything after the first
    /// overflow is dropped (those score lower by construction). With
    /// `require_context` an empty result is [`CoreError::NoContextAvailable`];
    /// otherwise the empty string lets the caller answer ungrounded.
    pub async fn assemble(
        &self,
        query_text: &str,
        level: Option<CertificateLevel>,
        top_k: usize,
        require_context: bool,
    ) -> Result<String, CoreError> {
        if query_text.trim().is_empty() {
            return Err(CoreError::invalid_argument("query text is empty"));
        }

        let embedding = self.embedder.embed(query_text).await?;
        let scored = self.retriever.retrieve(&embedding, top_k, level)?;
        let context = render_context(&scored, self.params.max_context_bytes);

        if context.is_empty() {
            tracing::debug!(query = query_text, "no grounding context assembled");
            if require_context {
                return Err(CoreError::NoContextAvailable);
            }
        }
        Ok(context)
    }
}

/// Concatenate snippets with their metadata markers, keeping whole snippets
/// only and stopping at the first one that would overflow the budget.
fn render_context(snippets: &[ScoredSnippet], budget: usize) -> String {
    let mut out = String::new();
    for scored in snippets {
        let snippet = &scored.snippet;
        let block = format!(
            "[{} | Certificate {}]\n{}",
            snippet.topic,
            snippet.level.as_str(),
            snippet.text.trim()
        );
        let separator = if out.is_empty() { 0 } else { 2 };
        if out.len() + separator + block.len() > budget {
            break;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&block);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Snippet;

    fn scored(id: &str, topic: &str, text: &str, score: f32) -> ScoredSnippet {
        ScoredSnippet {
            snippet: Snippet {
                id: id.to_string(),
                topic: topic.to_string(),
                text: text.to_string(),
                embedding: vec![1.0],
                level: CertificateLevel::A,
            },
            score,
        }
    }

    #[test]
    fn renders_markers_in_given_order() {
        let snippets = vec![
            scored("s1", "NCC Organization", "The motto is Unity and Discipline.", 0.9),
            scored("s2", "Foot Drill", "Savdhan is the attention position.", 0.4),
        ];
        let context = render_context(&snippets, 4000);
        assert!(context.starts_with("[NCC Organization | Certificate A]\n"));
        assert!(context.contains("\n\n[Foot Drill | Certificate A]\n"));
        let first = context.find("Unity and Discipline").unwrap();
        let second = context.find("Savdhan").unwrap();
        assert!(first < second);
    }

    #[test]
    fn budget_drops_lowest_scoring_whole_snippets() {
        let snippets = vec![
            scored("s1", "Leadership", "Lead by example.", 0.9),
            scored("s2", "Leadership", "Plan, brief, execute, debrief.", 0.5),
        ];
        let full = render_context(&snippets, 4000);
        assert!(full.contains("Plan, brief"));

        let first_block_len = "[Leadership | Certificate A]\nLead by example.".len();
        let tight = render_context(&snippets, first_block_len);
        assert!(tight.contains("Lead by example."));
        assert!(!tight.contains("Plan, brief"), "partial snippets are never emitted");
    }

    #[test]
    fn oversized_first_snippet_yields_empty_context() {
        let snippets = vec![scored("s1", "Leadership", &"x".repeat(100), 0.9)];
        assert_eq!(render_context(&snippets, 50), "");
    }
}
