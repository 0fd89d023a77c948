//! Shared fixtures: an NCC study corpus, a seeded question bank, and an
//! engine wired with offline providers.

#![allow(dead_code)]

use std::sync::Arc;

use cadet_core::config::{CoreConfig, SelectorParams};
use cadet_core::engine::AssessmentEngine;
use cadet_core::providers::{FixedGeneration, GenerationProvider, HashEmbedder};
use cadet_core::store::{InMemoryRepository, Repository, RepositoryError};
use cadet_core::types::{Attempt, CertificateLevel, Difficulty, Question, QuestionOption};

pub const FIXED_TIMESTAMP: i64 = 1700000000000;

pub fn question(id: &str, topic: &str, difficulty: Difficulty, level: CertificateLevel) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("prompt for {id}"),
        options: vec![
            QuestionOption { id: "A".into(), text: "correct choice".into() },
            QuestionOption { id: "B".into(), text: "second choice".into() },
            QuestionOption { id: "C".into(), text: "third choice".into() },
            QuestionOption { id: "D".into(), text: "fourth choice".into() },
        ],
        correct_option_id: "A".to_string(),
        topic: topic.to_string(),
        difficulty,
        level,
        explanation: format!("explanation for {id}"),
    }
}

pub fn attempt(learner: &str, question_id: &str, is_correct: bool, sequence: i64) -> Attempt {
    Attempt {
        learner_id: learner.to_string(),
        question_id: question_id.to_string(),
        chosen_option_id: if is_correct { "A".into() } else { "B".into() },
        is_correct,
        latency_ms: 1500,
        timestamp_ms: FIXED_TIMESTAMP + sequence * 1000,
    }
}

/// A-certificate bank: two topics, one question per difficulty level each.
pub fn drill_and_map_bank() -> Vec<Question> {
    let mut questions = Vec::new();
    for (topic, prefix) in [("Foot Drill", "fd"), ("Map Reading", "mr")] {
        for difficulty in [
            Difficulty::VeryEasy,
            Difficulty::Easy,
            Difficulty::Medium,
            Difficulty::Hard,
            Difficulty::VeryHard,
        ] {
            questions.push(question(
                &format!("{prefix}-{}", difficulty.level()),
                topic,
                difficulty,
                CertificateLevel::A,
            ));
        }
    }
    questions
}

pub struct TestEngine {
    pub engine: AssessmentEngine,
    pub repo: Arc<InMemoryRepository>,
    pub generation: Arc<FixedGeneration>,
}

/// Engine over an in-memory repository with offline providers and a fixed
/// selection seed so runs are reproducible.
pub fn engine_with_bank(questions: Vec<Question>) -> TestEngine {
    let config = CoreConfig {
        selector: SelectorParams { rng_seed: Some(42), ..Default::default() },
        ..Default::default()
    };
    engine_with(config, questions, FixedGeneration::default())
}

pub fn engine_with(
    config: CoreConfig,
    questions: Vec<Question>,
    generation: FixedGeneration,
) -> TestEngine {
    let repo = Arc::new(InMemoryRepository::new());
    let generation = Arc::new(generation);
    let engine = AssessmentEngine::new(
        config,
        repo.clone(),
        Arc::new(HashEmbedder::new(32)),
        generation.clone() as Arc<dyn GenerationProvider>,
    );
    if !questions.is_empty() {
        engine.ingest_questions(questions).expect("seed bank");
    }
    TestEngine { engine, repo, generation }
}

/// Repository wrapper that fails mastery upserts on demand, for exercising
/// the replay recovery path.
pub struct FlakyRepository {
    inner: InMemoryRepository,
    fail_upserts: std::sync::atomic::AtomicBool,
}

impl FlakyRepository {
    pub fn new() -> Self {
        Self {
            inner: InMemoryRepository::new(),
            fail_upserts: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Repository for FlakyRepository {
    fn append_attempt(&self, attempt: Attempt) -> Result<(), RepositoryError> {
        self.inner.append_attempt(attempt)
    }

    fn attempts(&self, learner_id: &str) -> Result<Vec<Attempt>, RepositoryError> {
        self.inner.attempts(learner_id)
    }

    fn get_mastery(
        &self,
        learner_id: &str,
        topic: &str,
    ) -> Result<Option<cadet_core::types::MasteryEstimate>, RepositoryError> {
        self.inner.get_mastery(learner_id, topic)
    }

    fn mastery_for_learner(
        &self,
        learner_id: &str,
    ) -> Result<Vec<cadet_core::types::MasteryEstimate>, RepositoryError> {
        self.inner.mastery_for_learner(learner_id)
    }

    fn upsert_mastery(
        &self,
        estimate: cadet_core::types::MasteryEstimate,
    ) -> Result<(), RepositoryError> {
        if self.fail_upserts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RepositoryError::Backend("injected upsert failure".into()));
        }
        self.inner.upsert_mastery(estimate)
    }

    fn add_questions(&self, questions: Vec<Question>) -> Result<(), RepositoryError> {
        self.inner.add_questions(questions)
    }

    fn question(&self, id: &str) -> Result<Option<Question>, RepositoryError> {
        self.inner.question(id)
    }

    fn query_questions(
        &self,
        filter: &cadet_core::store::QuestionFilter,
    ) -> Result<Vec<Question>, RepositoryError> {
        self.inner.query_questions(filter)
    }

    fn add_snippets(&self, snippets: Vec<cadet_core::types::Snippet>) -> Result<(), RepositoryError> {
        self.inner.add_snippets(snippets)
    }

    fn query_snippets(
        &self,
        filter: &cadet_core::store::SnippetFilter,
    ) -> Result<Vec<cadet_core::types::Snippet>, RepositoryError> {
        self.inner.query_snippets(filter)
    }
}
