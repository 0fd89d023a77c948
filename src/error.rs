use thiserror::Error;

use crate::providers::{EmbeddingError, GenerationError};
use crate::store::RepositoryError;

/// Error taxonomy for the assessment core.
///
/// Session exhaustion is deliberately not here: running out of fresh
/// questions is a normal terminal outcome reported through
/// [`crate::selector::SelectionOutcome`], not a failure.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input from the caller. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A referenced id does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Retrieval produced nothing and the caller required grounding.
    /// Soft condition: callers may answer ungrounded instead.
    #[error("no context available for the query")]
    NoContextAvailable,

    /// Persistence failure, propagated unmodified so the caller can apply
    /// its own retry policy.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl CoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Errors that abort a learner session when raised by the bank or the
    /// performance model mid-selection or mid-grading.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Repository(_) | Self::NotFound { .. })
    }
}
