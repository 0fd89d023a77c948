use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::store::{QuestionFilter, Repository, RepositoryError, SnippetFilter};
use crate::types::{Attempt, MasteryEstimate, Question, Snippet};

/// In-memory [`Repository`]. Attempts are partitioned by learner id so
/// concurrent sessions never contend over each other's history; catalogs
/// are shared read-mostly maps.
#[derive(Default)]
pub struct InMemoryRepository {
    attempts: RwLock<HashMap<String, Vec<Attempt>>>,
    mastery: RwLock<HashMap<String, BTreeMap<String, MasteryEstimate>>>,
    questions: RwLock<BTreeMap<String, Question>>,
    snippets: RwLock<BTreeMap<String, Snippet>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn question_count(&self) -> usize {
        self.questions.read().len()
    }

    pub fn snippet_count(&self) -> usize {
        self.snippets.read().len()
    }
}

impl Repository for InMemoryRepository {
    fn append_attempt(&self, attempt: Attempt) -> Result<(), RepositoryError> {
        self.attempts
            .write()
            .entry(attempt.learner_id.clone())
            .or_default()
            .push(attempt);
        Ok(())
    }

    fn attempts(&self, learner_id: &str) -> Result<Vec<Attempt>, RepositoryError> {
        Ok(self
            .attempts
            .read()
            .get(learner_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_mastery(
        &self,
        learner_id: &str,
        topic: &str,
    ) -> Result<Option<MasteryEstimate>, RepositoryError> {
        Ok(self
            .mastery
            .read()
            .get(learner_id)
            .and_then(|topics| topics.get(topic))
            .cloned())
    }

    fn mastery_for_learner(
        &self,
        learner_id: &str,
    ) -> Result<Vec<MasteryEstimate>, RepositoryError> {
        Ok(self
            .mastery
            .read()
            .get(learner_id)
            .map(|topics| topics.values().cloned().collect())
            .unwrap_or_default())
    }

    fn upsert_mastery(&self, estimate: MasteryEstimate) -> Result<(), RepositoryError> {
        self.mastery
            .write()
            .entry(estimate.learner_id.clone())
            .or_default()
            .insert(estimate.topic.clone(), estimate);
        Ok(())
    }

    fn add_questions(&self, questions: Vec<Question>) -> Result<(), RepositoryError> {
        let mut store = self.questions.write();
        for question in &questions {
            if store.contains_key(&question.id) {
                return Err(RepositoryError::Constraint(format!(
                    "question id already exists: {} (new versions take a new id)",
                    question.id
                )));
            }
        }
        for question in questions {
            store.insert(question.id.clone(), question);
        }
        Ok(())
    }

    fn question(&self, id: &str) -> Result<Option<Question>, RepositoryError> {
        Ok(self.questions.read().get(id).cloned())
    }

    fn query_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, RepositoryError> {
        let store = self.questions.read();
        Ok(store
            .values()
            .filter(|q| match &filter.topic {
                Some(topic) => q.topic == *topic,
                None => true,
            })
            .filter(|q| match filter.difficulty {
                Some(range) => range.contains(q.difficulty),
                None => true,
            })
            .filter(|q| match filter.level {
                Some(level) => q.level == level,
                None => true,
            })
            .filter(|q| !filter.exclude_ids.iter().any(|id| *id == q.id))
            .cloned()
            .collect())
    }

    fn add_snippets(&self, snippets: Vec<Snippet>) -> Result<(), RepositoryError> {
        let mut store = self.snippets.write();
        for snippet in &snippets {
            if store.contains_key(&snippet.id) {
                return Err(RepositoryError::Constraint(format!(
                    "snippet id already exists: {}",
                    snippet.id
                )));
            }
        }
        for snippet in snippets {
            store.insert(snippet.id.clone(), snippet);
        }
        Ok(())
    }

    fn query_snippets(&self, filter: &SnippetFilter) -> Result<Vec<Snippet>, RepositoryError> {
        let store = self.snippets.read();
        Ok(store
            .values()
            .filter(|s| match &filter.topic {
                Some(topic) => s.topic == *topic,
                None => true,
            })
            .filter(|s| match filter.level {
                Some(level) => s.level == level,
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CertificateLevel, Difficulty, DifficultyRange, QuestionOption};

    fn question(id: &str, topic: &str, difficulty: Difficulty) -> Question {
        Question {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            options: vec![
                QuestionOption { id: "A".into(), text: "first".into() },
                QuestionOption { id: "B".into(), text: "second".into() },
            ],
            correct_option_id: "A".to_string(),
            topic: topic.to_string(),
            difficulty,
            level: CertificateLevel::A,
            explanation: String::new(),
        }
    }

    fn attempt(learner: &str, question_id: &str, ts: i64) -> Attempt {
        Attempt {
            learner_id: learner.to_string(),
            question_id: question_id.to_string(),
            chosen_option_id: "A".to_string(),
            is_correct: true,
            latency_ms: 1200,
            timestamp_ms: ts,
        }
    }

    #[test]
    fn attempts_keep_insertion_order_per_learner() {
        let repo = InMemoryRepository::new();
        repo.append_attempt(attempt("cadet-1", "q1", 10)).unwrap();
        repo.append_attempt(attempt("cadet-2", "q9", 15)).unwrap();
        repo.append_attempt(attempt("cadet-1", "q2", 20)).unwrap();

        let history = repo.attempts("cadet-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question_id, "q1");
        assert_eq!(history[1].question_id, "q2");
        assert_eq!(repo.attempts("cadet-2").unwrap().len(), 1);
        assert!(repo.attempts("nobody").unwrap().is_empty());
    }

    #[test]
    fn duplicate_question_id_is_rejected() {
        let repo = InMemoryRepository::new();
        repo.add_questions(vec![question("q1", "Foot Drill", Difficulty::Easy)])
            .unwrap();

        let err = repo
            .add_questions(vec![question("q1", "Foot Drill", Difficulty::Hard)])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Constraint(_)));
        assert_eq!(repo.question_count(), 1, "failed batch must not partially apply");
    }

    #[test]
    fn question_filter_applies_every_field() {
        let repo = InMemoryRepository::new();
        repo.add_questions(vec![
            question("q1", "Foot Drill", Difficulty::Easy),
            question("q2", "Foot Drill", Difficulty::Hard),
            question("q3", "Leadership", Difficulty::Easy),
        ])
        .unwrap();

        let filter = QuestionFilter {
            topic: Some("Foot Drill".to_string()),
            difficulty: Some(DifficultyRange::new(Difficulty::VeryEasy, Difficulty::Medium)),
            level: Some(CertificateLevel::A),
            exclude_ids: vec![],
        };
        let hits = repo.query_questions(&filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "q1");

        let excluded = QuestionFilter { exclude_ids: vec!["q1".into(), "q3".into()], ..Default::default() };
        let hits = repo.query_questions(&excluded).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "q2");
    }

    #[test]
    fn mastery_upsert_replaces_by_learner_topic() {
        let repo = InMemoryRepository::new();
        let first = MasteryEstimate {
            learner_id: "cadet-1".into(),
            topic: "Foot Drill".into(),
            estimate: 0.5,
            sample_count: 1,
            updated_at_ms: 10,
        };
        repo.upsert_mastery(first.clone()).unwrap();
        repo.upsert_mastery(MasteryEstimate { estimate: 0.65, sample_count: 2, ..first })
            .unwrap();

        let stored = repo.get_mastery("cadet-1", "Foot Drill").unwrap().unwrap();
        assert_eq!(stored.sample_count, 2);
        assert_eq!(stored.estimate, 0.65);
        assert_eq!(repo.mastery_for_learner("cadet-1").unwrap().len(), 1);
    }
}
