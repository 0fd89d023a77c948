//! Read-mostly catalog of authored questions.
//!
//! The bank filters; it never relaxes a filter on its own. Widening a
//! difficulty range or dropping constraints is selector policy.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::CoreError;
use crate::store::{QuestionFilter, Repository};
use crate::types::{CertificateLevel, DifficultyRange, Question};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 6;

#[derive(Clone)]
pub struct QuestionBank {
    repo: Arc<dyn Repository>,
}

impl QuestionBank {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    /// Questions matching every constraint, minus `exclude_ids`.
    pub fn query(
        &self,
        topic: Option<&str>,
        difficulty: Option<DifficultyRange>,
        level: Option<CertificateLevel>,
        exclude_ids: &[String],
    ) -> Result<Vec<Question>, CoreError> {
        let filter = QuestionFilter {
            topic: topic.map(str::to_string),
            difficulty,
            level,
            exclude_ids: exclude_ids.to_vec(),
        };
        Ok(self.repo.query_questions(&filter)?)
    }

    pub fn get(&self, id: &str) -> Result<Question, CoreError> {
        self.repo.question(id)?.ok_or_else(|| CoreError::NotFound {
            kind: "question",
            id: id.to_string(),
        })
    }

    /// Distinct topics holding at least one question at the given level,
    /// sorted for deterministic rotation order.
    pub fn topics(&self, level: Option<CertificateLevel>) -> Result<Vec<String>, CoreError> {
        let filter = QuestionFilter { level, ..Default::default() };
        let questions = self.repo.query_questions(&filter)?;
        let topics: BTreeSet<String> = questions.into_iter().map(|q| q.topic).collect();
        Ok(topics.into_iter().collect())
    }

    /// Validate and append authored questions. Any invalid question rejects
    /// the whole batch before anything is written.
    pub fn ingest(&self, questions: Vec<Question>) -> Result<usize, CoreError> {
        for question in &questions {
            validate_question(question)?;
        }
        let count = questions.len();
        self.repo.add_questions(questions)?;
        tracing::info!(count, "questions added to bank");
        Ok(count)
    }
}

fn validate_question(question: &Question) -> Result<(), CoreError> {
    if question.id.trim().is_empty() {
        return Err(CoreError::invalid_argument("question id is empty"));
    }
    if question.prompt.trim().is_empty() {
        return Err(CoreError::invalid_argument(format!(
            "question {} has an empty prompt",
            question.id
        )));
    }
    if question.topic.trim().is_empty() {
        return Err(CoreError::invalid_argument(format!(
            "question {} has an empty topic",
            question.id
        )));
    }
    let count = question.options.len();
    if !(MIN_OPTIONS..=MAX_OPTIONS).contains(&count) {
        return Err(CoreError::invalid_argument(format!(
            "question {} has {count} options, expected {MIN_OPTIONS}..={MAX_OPTIONS}",
            question.id
        )));
    }
    let mut seen = BTreeSet::new();
    for option in &question.options {
        if !seen.insert(option.id.as_str()) {
            return Err(CoreError::invalid_argument(format!(
                "question {} repeats option id {}",
                question.id, option.id
            )));
        }
    }
    if question.option(&question.correct_option_id).is_none() {
        return Err(CoreError::invalid_argument(format!(
            "question {} marks unknown option {} as correct",
            question.id, question.correct_option_id
        )));
    }
    Ok(())
}
