//! Assessment engine facade.
//!
//! Owns the shared components and the per-learner session map. Callers keep
//! one engine for the process and address learners by id; mutable session
//! state is partitioned per learner behind a single lock that is never held
//! across an await.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info};

use crate::assembler::ContextAssembler;
use crate::bank::QuestionBank;
use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::ingest::{parse_generated_questions, KnowledgeIngestor};
use crate::performance::PerformanceTracker;
use crate::providers::{EmbeddingProvider, GenerationProvider};
use crate::retrieval::LinearScanRetriever;
use crate::selector::{AdaptiveSelector, SelectionOutcome, SessionPhase};
use crate::store::Repository;
use crate::types::{
    now_ms, CertificateLevel, Difficulty, GradeReport, GroundedAnswer, MasteryEstimate,
    MasteryOverview, Question, SessionStarted, SessionSummary, TrendReport,
};

const INSTRUCTOR_ROLE: &str = "You are an NCC instructor helping a cadet prepare for the certificate examination.";

pub struct AssessmentEngine {
    config: CoreConfig,
    bank: QuestionBank,
    performance: PerformanceTracker,
    assembler: ContextAssembler,
    ingestor: KnowledgeIngestor,
    generation: Arc<dyn GenerationProvider>,
    sessions: Arc<RwLock<HashMap<String, AdaptiveSelector>>>,
}

impl AssessmentEngine {
    pub fn new(
        config: CoreConfig,
        repo: Arc<dyn Repository>,
        embedder: Arc<dyn EmbeddingProvider>,
        generation: Arc<dyn GenerationProvider>,
    ) -> Self {
        let bank = QuestionBank::new(repo.clone());
        let performance = PerformanceTracker::new(repo.clone(), config.mastery.clone());
        let retriever = Arc::new(LinearScanRetriever::new(repo.clone()));
        let assembler =
            ContextAssembler::new(retriever, embedder.clone(), config.assembler.clone());
        let ingestor = KnowledgeIngestor::new(repo, embedder);
        Self {
            config,
            bank,
            performance,
            assembler,
            ingestor,
            generation,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Open an adaptive session for a learner, replacing any session that
    /// learner already had.
    pub async fn start_session(
        &self,
        learner_id: &str,
        level: Option<CertificateLevel>,
    ) -> Result<SessionStarted, CoreError> {
        if learner_id.trim().is_empty() {
            return Err(CoreError::invalid_argument("learner id must not be empty"));
        }

        let selector = AdaptiveSelector::start(
            learner_id,
            level,
            self.bank.clone(),
            self.performance.clone(),
            self.config.selector.clone(),
        )?;
        let started = SessionStarted {
            learner_id: learner_id.to_string(),
            level,
            target_difficulty: selector.state().target_difficulty,
        };

        let mut sessions = self.sessions.write().await;
        if sessions.insert(learner_id.to_string(), selector).is_some() {
            info!(learner_id, "previous session replaced");
        }
        Ok(started)
    }

    pub async fn next_question(&self, learner_id: &str) -> Result<SelectionOutcome, CoreError> {
        let mut sessions = self.sessions.write().await;
        let selector = sessions.get_mut(learner_id).ok_or_else(|| CoreError::NotFound {
            kind: "session",
            id: learner_id.to_string(),
        })?;

        match selector.next_question() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if e.is_session_fatal() {
                    sessions.remove(learner_id);
                    error!(learner_id, error = %e, "session dropped after unrecoverable failure");
                }
                Err(e)
            }
        }
    }

    /// Grade an answer against the outstanding question. Caller mistakes
    /// (wrong question, unknown option) leave the session answerable;
    /// repository failures end it.
    pub async fn submit_answer(
        &self,
        learner_id: &str,
        question_id: &str,
        chosen_option_id: &str,
        latency_ms: u64,
    ) -> Result<GradeReport, CoreError> {
        let timestamp_ms = now_ms();
        let mut sessions = self.sessions.write().await;
        let selector = sessions.get_mut(learner_id).ok_or_else(|| CoreError::NotFound {
            kind: "session",
            id: learner_id.to_string(),
        })?;

        match selector.submit_answer(question_id, chosen_option_id, latency_ms, timestamp_ms) {
            Ok(report) => Ok(report),
            Err(e) => {
                if e.is_session_fatal() {
                    sessions.remove(learner_id);
                    error!(learner_id, error = %e, "session dropped after unrecoverable failure");
                }
                Err(e)
            }
        }
    }

    /// Close the session and return its summary. Works in any phase, so a
    /// learner can stop early or collect results after exhaustion.
    pub async fn end_session(&self, learner_id: &str) -> Result<SessionSummary, CoreError> {
        let selector = self.sessions.write().await.remove(learner_id).ok_or_else(|| {
            CoreError::NotFound { kind: "session", id: learner_id.to_string() }
        })?;
        let summary = selector.summary(self.config.quiz.passing_percent);
        info!(
            learner_id,
            answered = summary.questions_answered,
            score = summary.score_percent,
            passed = summary.passed,
            "session closed"
        );
        Ok(summary)
    }

    pub async fn session_phase(&self, learner_id: &str) -> Option<SessionPhase> {
        self.sessions.read().await.get(learner_id).map(|s| s.phase())
    }

    /// Retrieval context for a free-form query. `top_k` falls back to the
    /// configured default; whether an empty result is an error follows the
    /// configured `require_context`.
    pub async fn assemble_context(
        &self,
        query_text: &str,
        level: Option<CertificateLevel>,
        top_k: Option<usize>,
    ) -> Result<String, CoreError> {
        let k = top_k.unwrap_or(self.config.assembler.default_top_k);
        self.assembler
            .assemble(query_text, level, k, self.config.assembler.require_context)
            .await
    }

    /// Answer a cadet question grounded in retrieved study material. When
    /// nothing relevant is stored the answer falls back to the model's own
    /// knowledge and is flagged as ungrounded.
    pub async fn ask(
        &self,
        query_text: &str,
        level: Option<CertificateLevel>,
    ) -> Result<GroundedAnswer, CoreError> {
        let context = self
            .assembler
            .assemble(
                query_text,
                level,
                self.config.assembler.default_top_k,
                self.config.assembler.require_context,
            )
            .await?;

        let grounded = !context.is_empty();
        let system = if grounded {
            format!(
                "{INSTRUCTOR_ROLE} Answer using only the study material below. \
                 If the material does not cover the question, say so.\n\n\
                 Study material:\n{context}"
            )
        } else {
            format!(
                "{INSTRUCTOR_ROLE} No study material matched this question; \
                 answer from general knowledge and say when you are unsure."
            )
        };

        let answer = self.generation.generate(&system, query_text).await?;
        info!(grounded, chars = answer.len(), "answered cadet question");
        Ok(GroundedAnswer { answer, grounded, context })
    }

    pub async fn ingest_material(
        &self,
        topic: &str,
        level: CertificateLevel,
        text: &str,
    ) -> Result<usize, CoreError> {
        self.ingestor.ingest_material(topic, level, text).await
    }

    pub fn ingest_questions(&self, questions: Vec<Question>) -> Result<usize, CoreError> {
        self.bank.ingest(questions)
    }

    /// Draft quiz questions with the generation provider, grounded in stored
    /// material for the topic, and add them to the bank. Returns the stored
    /// questions.
    pub async fn generate_quiz_into_bank(
        &self,
        topic: &str,
        level: CertificateLevel,
        difficulty: Difficulty,
        count: Option<u32>,
    ) -> Result<Vec<Question>, CoreError> {
        if topic.trim().is_empty() {
            return Err(CoreError::invalid_argument("quiz topic must not be empty"));
        }
        let requested = count
            .unwrap_or(self.config.quiz.default_question_count)
            .clamp(1, self.config.quiz.max_question_count);

        let context = self
            .assembler
            .assemble(topic, Some(level), self.config.assembler.default_top_k, false)
            .await?;

        let system = format!(
            "{INSTRUCTOR_ROLE} Write multiple-choice quiz questions. Number each \
             question like `1.`, list options `A)` through `D)`, then a line \
             `Correct Answer: <letter>` and a line `Explanation: <one sentence>`."
        );
        let mut user = format!(
            "Write {requested} questions on {topic} for certificate {} cadets at {} difficulty.",
            level.as_str(),
            difficulty.as_str(),
        );
        if !context.is_empty() {
            user.push_str("\n\nBase the questions on this study material:\n");
            user.push_str(&context);
        }

        let text = self.generation.generate(&system, &user).await?;
        let questions = parse_generated_questions(&text, topic, level, difficulty)?;
        let stored = self.bank.ingest(questions.clone())?;
        info!(topic, level = level.as_str(), requested, stored, "quiz drafted into bank");
        Ok(questions)
    }

    pub fn mastery_overview(&self, learner_id: &str) -> Result<MasteryOverview, CoreError> {
        self.performance.overview(learner_id)
    }

    pub fn performance_trend(&self, learner_id: &str) -> Result<TrendReport, CoreError> {
        self.performance.trend(learner_id)
    }

    pub fn weak_topics(&self, learner_id: &str) -> Result<Vec<String>, CoreError> {
        self.performance.weak_topics(learner_id)
    }

    /// Recompute a mastery estimate from the attempt history after a
    /// suspected bad write.
    pub fn rebuild_mastery(
        &self,
        learner_id: &str,
        topic: &str,
    ) -> Result<MasteryEstimate, CoreError> {
        self.performance.rebuild(learner_id, topic)
    }

    pub fn topics(&self, level: Option<CertificateLevel>) -> Result<Vec<String>, CoreError> {
        self.bank.topics(level)
    }
}
