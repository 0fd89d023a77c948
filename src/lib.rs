//! Adaptive assessment and retrieval core for NCC cadet study tools.
//!
//! The crate tracks per-topic mastery from graded attempts, runs adaptive
//! quiz sessions against a validated question bank, and assembles retrieval
//! context so a language model can answer cadet questions from ingested
//! study material. Callers bring a [`store::Repository`] implementation and
//! the embedding/generation providers; [`engine::AssessmentEngine`] wires
//! the rest.

pub mod assembler;
pub mod bank;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod performance;
pub mod providers;
pub mod retrieval;
pub mod selector;
pub mod store;
pub mod types;

pub use config::CoreConfig;
pub use engine::AssessmentEngine;
pub use error::CoreError;
pub use selector::{SelectionOutcome, SessionPhase};
pub use store::{InMemoryRepository, Repository};
pub use types::{
    Attempt, CertificateLevel, Difficulty, GradeReport, GroundedAnswer, MasteryEstimate,
    MasteryOverview, PresentedQuestion, Question, QuestionOption, SessionStarted, SessionSummary,
    Snippet, TrendDirection, TrendReport,
};
