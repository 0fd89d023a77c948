//! Persistence seam for the assessment core.
//!
//! The core reads and writes exclusively through [`Repository`]; the backing
//! technology stays a deployment decision. [`memory::InMemoryRepository`]
//! is the bundled implementation, suitable for tests and single-process use.

pub mod memory;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Attempt, CertificateLevel, DifficultyRange, MasteryEstimate, Question, Snippet};

pub use memory::InMemoryRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    /// Append-only rules refused the write (e.g. re-using a question id).
    #[error("constraint violated: {0}")]
    Constraint(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<DifficultyRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<CertificateLevel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<CertificateLevel>,
}

/// Durable storage contract: attempts are append-only, mastery estimates
/// upsert by (learner, topic), questions and snippets are immutable
/// catalogs. All records are flat and serde-serializable.
///
/// Methods are synchronous; implementations must not block on network or
/// disk inside them. An async backend belongs behind its own adapter that
/// the caller drives.
pub trait Repository: Send + Sync {
    fn append_attempt(&self, attempt: Attempt) -> Result<(), RepositoryError>;

    /// All attempts for a learner in insertion (chronological) order.
    fn attempts(&self, learner_id: &str) -> Result<Vec<Attempt>, RepositoryError>;

    fn get_mastery(
        &self,
        learner_id: &str,
        topic: &str,
    ) -> Result<Option<MasteryEstimate>, RepositoryError>;

    /// Every stored estimate for a learner, ordered by topic.
    fn mastery_for_learner(&self, learner_id: &str)
        -> Result<Vec<MasteryEstimate>, RepositoryError>;

    fn upsert_mastery(&self, estimate: MasteryEstimate) -> Result<(), RepositoryError>;

    fn add_questions(&self, questions: Vec<Question>) -> Result<(), RepositoryError>;

    fn question(&self, id: &str) -> Result<Option<Question>, RepositoryError>;

    /// Questions matching every field of the filter, ordered by id.
    fn query_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, RepositoryError>;

    fn add_snippets(&self, snippets: Vec<Snippet>) -> Result<(), RepositoryError>;

    fn query_snippets(&self, filter: &SnippetFilter) -> Result<Vec<Snippet>, RepositoryError>;
}
