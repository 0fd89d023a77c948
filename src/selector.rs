//! Adaptive question selection.
//!
//! One selector instance is one learner session. The phase machine runs
//! `Initializing -> Selecting -> AwaitingAnswer -> Grading -> Selecting`
//! until the bank runs dry, which parks the session in the terminal
//! `Exhausted` phase. Difficulty targeting uses two-in-a-row hysteresis;
//! topic choice favors the least-mastered topic while rotating recently
//! asked topics to the back of the queue.

use std::collections::{BTreeMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bank::QuestionBank;
use crate::config::SelectorParams;
use crate::error::CoreError;
use crate::performance::PerformanceTracker;
use crate::types::{
    Attempt, CertificateLevel, Difficulty, DifficultyRange, GradeReport, PresentedQuestion,
    Question, SessionSummary, TopicScore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Initializing,
    Selecting,
    AwaitingAnswer,
    Grading,
    Exhausted,
}

/// What selection produced: a question to present, or the signal that the
/// bank has nothing left for this session.
#[derive(Debug, Clone)]
pub enum SelectionOutcome {
    Presented(PresentedQuestion),
    Exhausted,
}

/// Transient per-session state. Safe to drop at session end; mastery lives
/// in the repository, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub learner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<CertificateLevel>,
    pub phase: SessionPhase,
    pub target_difficulty: Difficulty,
    /// Look-back window of recently presented question ids, oldest first.
    pub recent_questions: VecDeque<String>,
    /// Recently asked topics, rotated to the back of the preference order.
    pub recent_topics: VecDeque<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outstanding: Option<String>,
    pub correct_streak: u32,
    pub incorrect_streak: u32,
    pub questions_presented: u32,
    pub questions_answered: u32,
    pub correct_count: u32,
    pub topic_scores: BTreeMap<String, TopicScore>,
}

pub struct AdaptiveSelector {
    bank: QuestionBank,
    performance: PerformanceTracker,
    params: SelectorParams,
    state: SelectionState,
    rng: StdRng,
}

impl AdaptiveSelector {
    /// Open a session: seed the target difficulty from prior mastery when
    /// any exists, otherwise start at medium.
    pub fn start(
        learner_id: &str,
        level: Option<CertificateLevel>,
        bank: QuestionBank,
        performance: PerformanceTracker,
        params: SelectorParams,
    ) -> Result<Self, CoreError> {
        let mut state = SelectionState {
            learner_id: learner_id.to_string(),
            level,
            phase: SessionPhase::Initializing,
            target_difficulty: Difficulty::Medium,
            recent_questions: VecDeque::new(),
            recent_topics: VecDeque::new(),
            outstanding: None,
            correct_streak: 0,
            incorrect_streak: 0,
            questions_presented: 0,
            questions_answered: 0,
            correct_count: 0,
            topic_scores: BTreeMap::new(),
        };

        if let Some(average) = performance.average_mastery(learner_id)? {
            state.target_difficulty = seeded_target(average);
        }
        state.phase = SessionPhase::Selecting;

        let rng = match params.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        tracing::info!(
            learner_id,
            target = %state.target_difficulty.as_str(),
            "session opened"
        );
        Ok(Self { bank, performance, params, state, rng })
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    /// Pick and present the next question.
    ///
    /// Topic order: mastery ascending, with recently asked topics moved to
    /// the back unless one of them is the only topic below the weak
    /// threshold. Per topic the difficulty window `[target-1, target+1]`
    /// widens step by step before difficulty is ignored. Only when no topic
    /// yields a question the look-back window is waived (the bank is out of
    /// fresh questions); an empty bank ends the session as `Exhausted`.
    pub fn next_question(&mut self) -> Result<SelectionOutcome, CoreError> {
        match self.state.phase {
            SessionPhase::Selecting => {}
            SessionPhase::Exhausted => return Ok(SelectionOutcome::Exhausted),
            SessionPhase::AwaitingAnswer => {
                return Err(CoreError::invalid_argument(
                    "an answer for the outstanding question is still pending",
                ))
            }
            SessionPhase::Initializing | SessionPhase::Grading => {
                return Err(CoreError::invalid_argument("session is mid-transition"))
            }
        }

        let preference = self.topic_preference()?;
        if preference.is_empty() {
            return Ok(self.exhaust());
        }

        let exclude: Vec<String> = self.state.recent_questions.iter().cloned().collect();
        for topic in &preference {
            if let Some(question) = self.pick_for_topic(topic, &exclude)? {
                return Ok(self.present(question));
            }
        }

        // No unseen question anywhere: recycle from the look-back window
        // before giving up. Repeats are permitted once the bank is out of
        // fresh questions.
        for topic in &preference {
            let candidates = self.bank.query(Some(topic), None, self.state.level, &[])?;
            if !candidates.is_empty() {
                let question = self.choose(candidates);
                tracing::info!(
                    learner_id = %self.state.learner_id,
                    question_id = %question.id,
                    "bank exhausted of fresh questions, recycling"
                );
                return Ok(self.present(question));
            }
        }

        Ok(self.exhaust())
    }

    /// Grade the outstanding question, record the attempt, and apply the
    /// difficulty hysteresis. Bank or performance-model failures are fatal
    /// to the session; the engine drops it after surfacing them.
    pub fn submit_answer(
        &mut self,
        question_id: &str,
        chosen_option_id: &str,
        latency_ms: u64,
        timestamp_ms: i64,
    ) -> Result<GradeReport, CoreError> {
        if self.state.phase != SessionPhase::AwaitingAnswer {
            return Err(CoreError::invalid_argument(
                "no question is awaiting an answer",
            ));
        }
        match self.state.outstanding.as_deref() {
            Some(outstanding) if outstanding == question_id => {}
            Some(outstanding) => {
                return Err(CoreError::invalid_argument(format!(
                    "answer targets question {question_id} but {outstanding} is outstanding"
                )))
            }
            None => return Err(CoreError::invalid_argument("no question is outstanding")),
        }

        let question = self.bank.get(question_id)?;
        if question.option(chosen_option_id).is_none() {
            return Err(CoreError::invalid_argument(format!(
                "question {question_id} has no option {chosen_option_id}"
            )));
        }

        self.state.phase = SessionPhase::Grading;
        let is_correct = question.correct_option_id == chosen_option_id;

        let attempt = Attempt {
            learner_id: self.state.learner_id.clone(),
            question_id: question.id.clone(),
            chosen_option_id: chosen_option_id.to_string(),
            is_correct,
            latency_ms,
            timestamp_ms,
        };
        let mastery = self.performance.record(&attempt)?;

        self.state.questions_answered += 1;
        if is_correct {
            self.state.correct_count += 1;
        }
        let tally = self.state.topic_scores.entry(question.topic.clone()).or_default();
        tally.total += 1;
        if is_correct {
            tally.correct += 1;
        }

        self.apply_hysteresis(is_correct);

        self.state.outstanding = None;
        self.state.phase = SessionPhase::Selecting;

        Ok(GradeReport {
            question_id: question.id.clone(),
            is_correct,
            chosen_option_id: chosen_option_id.to_string(),
            correct_option_id: question.correct_option_id.clone(),
            explanation: question.explanation.clone(),
            mastery,
            target_difficulty: self.state.target_difficulty,
        })
    }

    pub fn summary(&self, passing_percent: f64) -> SessionSummary {
        let answered = self.state.questions_answered;
        let score_percent = if answered > 0 {
            self.state.correct_count as f64 * 100.0 / answered as f64
        } else {
            0.0
        };
        SessionSummary {
            learner_id: self.state.learner_id.clone(),
            questions_presented: self.state.questions_presented,
            questions_answered: answered,
            correct_count: self.state.correct_count,
            score_percent,
            passed: answered > 0 && score_percent >= passing_percent,
            topic_breakdown: self.state.topic_scores.clone(),
            final_target_difficulty: self.state.target_difficulty,
        }
    }

    /// Topics ordered by preference: mastery ascending, recently asked
    /// topics rotated to the back. The sole topic below the weak threshold
    /// is exempt from rotation.
    fn topic_preference(&self) -> Result<Vec<String>, CoreError> {
        let mut ranked: Vec<(String, f64)> = Vec::new();
        for topic in self.bank.topics(self.state.level)? {
            let mastery = self.performance.mastery(&self.state.learner_id, &topic)?;
            ranked.push((topic, mastery));
        }
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let weak_threshold = self.performance.params().weak_threshold;
        let below: Vec<&String> =
            ranked.iter().filter(|(_, m)| *m < weak_threshold).map(|(t, _)| t).collect();
        let sole_weak = if below.len() == 1 { Some(below[0].clone()) } else { None };

        let (fresh, held): (Vec<String>, Vec<String>) = ranked
            .into_iter()
            .map(|(topic, _)| topic)
            .partition(|topic| {
                !self.state.recent_topics.contains(topic) || Some(topic) == sole_weak.as_ref()
            });
        Ok(fresh.into_iter().chain(held).collect())
    }

    /// Difficulty cascade for one topic: `[target-1, target+1]`, widened up
    /// to `max_widenings` times, then difficulty-free. `None` when the topic
    /// has nothing outside the exclusion list.
    fn pick_for_topic(
        &mut self,
        topic: &str,
        exclude: &[String],
    ) -> Result<Option<Question>, CoreError> {
        let mut range = DifficultyRange::around(self.state.target_difficulty);
        for _ in 0..=self.params.max_widenings {
            let candidates =
                self.bank.query(Some(topic), Some(range), self.state.level, exclude)?;
            if !candidates.is_empty() {
                return Ok(Some(self.choose(candidates)));
            }
            let widened = range.widen();
            if widened == range {
                break;
            }
            range = widened;
        }

        let candidates = self.bank.query(Some(topic), None, self.state.level, exclude)?;
        if candidates.is_empty() {
            Ok(None)
        } else {
            Ok(Some(self.choose(candidates)))
        }
    }

    fn choose(&mut self, mut candidates: Vec<Question>) -> Question {
        // Stable order first so a seeded rng picks reproducibly regardless
        // of repository iteration order.
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        let index = self.rng.random_range(0..candidates.len());
        candidates.swap_remove(index)
    }

    fn present(&mut self, question: Question) -> SelectionOutcome {
        self.state.recent_questions.retain(|id| id != &question.id);
        self.state.recent_questions.push_back(question.id.clone());
        while self.state.recent_questions.len() > self.params.ring_capacity {
            self.state.recent_questions.pop_front();
        }

        self.state.recent_topics.retain(|t| t != &question.topic);
        self.state.recent_topics.push_back(question.topic.clone());
        while self.state.recent_topics.len() > self.params.rotation_window {
            self.state.recent_topics.pop_front();
        }

        self.state.outstanding = Some(question.id.clone());
        self.state.questions_presented += 1;
        self.state.phase = SessionPhase::AwaitingAnswer;
        SelectionOutcome::Presented(PresentedQuestion::from(&question))
    }

    fn exhaust(&mut self) -> SelectionOutcome {
        tracing::info!(learner_id = %self.state.learner_id, "question bank exhausted, ending session");
        self.state.outstanding = None;
        self.state.phase = SessionPhase::Exhausted;
        SelectionOutcome::Exhausted
    }

    fn apply_hysteresis(&mut self, is_correct: bool) {
        if is_correct {
            self.state.correct_streak += 1;
            self.state.incorrect_streak = 0;
        } else {
            self.state.incorrect_streak += 1;
            self.state.correct_streak = 0;
        }

        if self.state.correct_streak >= self.params.streak_length {
            self.state.target_difficulty = self.state.target_difficulty.harder();
            self.state.correct_streak = 0;
            tracing::debug!(
                learner_id = %self.state.learner_id,
                target = %self.state.target_difficulty.as_str(),
                "difficulty stepped up"
            );
        } else if self.state.incorrect_streak >= self.params.streak_length {
            self.state.target_difficulty = self.state.target_difficulty.easier();
            self.state.incorrect_streak = 0;
            tracing::debug!(
                learner_id = %self.state.learner_id,
                target = %self.state.target_difficulty.as_str(),
                "difficulty stepped down"
            );
        }
    }
}

/// `round(1 + 4 * average)` mapped onto the difficulty scale.
fn seeded_target(average_mastery: f64) -> Difficulty {
    let level = (1.0 + 4.0 * average_mastery.clamp(0.0, 1.0)).round() as u8;
    Difficulty::from_level(level.clamp(1, 5)).unwrap_or(Difficulty::Medium)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasteryParams;
    use crate::store::InMemoryRepository;
    use crate::types::QuestionOption;
    use std::sync::Arc;

    fn question(id: &str, topic: &str, difficulty: Difficulty) -> Question {
        Question {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            options: vec![
                QuestionOption { id: "A".into(), text: "right".into() },
                QuestionOption { id: "B".into(), text: "wrong".into() },
            ],
            correct_option_id: "A".to_string(),
            topic: topic.to_string(),
            difficulty,
            level: CertificateLevel::A,
            explanation: "because".to_string(),
        }
    }

    fn selector_with(questions: Vec<Question>) -> AdaptiveSelector {
        let repo = Arc::new(InMemoryRepository::new());
        let bank = QuestionBank::new(repo.clone());
        bank.ingest(questions).unwrap();
        let performance = PerformanceTracker::new(repo, MasteryParams::default());
        let params = SelectorParams { rng_seed: Some(7), ..Default::default() };
        AdaptiveSelector::start("cadet-1", Some(CertificateLevel::A), bank, performance, params)
            .unwrap()
    }

    #[test]
    fn seeded_target_maps_average_mastery_onto_the_scale() {
        assert_eq!(seeded_target(0.0), Difficulty::VeryEasy);
        assert_eq!(seeded_target(0.5), Difficulty::Medium);
        assert_eq!(seeded_target(1.0), Difficulty::VeryHard);
        assert_eq!(seeded_target(0.25), Difficulty::Easy);
        assert_eq!(seeded_target(0.8), Difficulty::Hard);
    }

    #[test]
    fn fresh_learner_starts_at_medium_and_selects() {
        let mut selector = selector_with(vec![question("q1", "Foot Drill", Difficulty::Medium)]);
        assert_eq!(selector.state().target_difficulty, Difficulty::Medium);
        assert_eq!(selector.phase(), SessionPhase::Selecting);

        match selector.next_question().unwrap() {
            SelectionOutcome::Presented(q) => assert_eq!(q.id, "q1"),
            SelectionOutcome::Exhausted => panic!("bank has a question"),
        }
        assert_eq!(selector.phase(), SessionPhase::AwaitingAnswer);
    }

    #[test]
    fn selecting_twice_without_answering_is_rejected() {
        let mut selector = selector_with(vec![
            question("q1", "Foot Drill", Difficulty::Medium),
            question("q2", "Foot Drill", Difficulty::Medium),
        ]);
        selector.next_question().unwrap();
        let err = selector.next_question().unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn answer_must_target_the_outstanding_question() {
        let mut selector = selector_with(vec![question("q1", "Foot Drill", Difficulty::Medium)]);

        let err = selector.submit_answer("q1", "A", 900, 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)), "nothing outstanding yet");

        selector.next_question().unwrap();
        let err = selector.submit_answer("q-other", "A", 900, 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        // Session stays answerable after the caller mistake.
        assert_eq!(selector.phase(), SessionPhase::AwaitingAnswer);
        selector.submit_answer("q1", "A", 900, 0).unwrap();
        assert_eq!(selector.phase(), SessionPhase::Selecting);
    }

    #[test]
    fn unknown_option_is_invalid_and_recoverable() {
        let mut selector = selector_with(vec![question("q1", "Foot Drill", Difficulty::Medium)]);
        selector.next_question().unwrap();

        let err = selector.submit_answer("q1", "Z", 900, 0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        assert_eq!(selector.phase(), SessionPhase::AwaitingAnswer);

        let report = selector.submit_answer("q1", "B", 900, 0).unwrap();
        assert!(!report.is_correct);
        assert_eq!(report.correct_option_id, "A");
    }

    #[test]
    fn empty_bank_is_exhausted_immediately_and_terminal() {
        let mut selector = selector_with(vec![]);
        assert!(matches!(selector.next_question().unwrap(), SelectionOutcome::Exhausted));
        assert_eq!(selector.phase(), SessionPhase::Exhausted);
        // Terminal: further calls keep signaling exhaustion.
        assert!(matches!(selector.next_question().unwrap(), SelectionOutcome::Exhausted));
    }

    #[test]
    fn grading_updates_tallies_and_summary() {
        let mut selector = selector_with(vec![
            question("q1", "Foot Drill", Difficulty::Medium),
            question("q2", "Foot Drill", Difficulty::Medium),
        ]);

        let first = match selector.next_question().unwrap() {
            SelectionOutcome::Presented(q) => q,
            SelectionOutcome::Exhausted => panic!("bank has questions"),
        };
        selector.submit_answer(&first.id, "A", 800, 1).unwrap();

        let second = match selector.next_question().unwrap() {
            SelectionOutcome::Presented(q) => q,
            SelectionOutcome::Exhausted => panic!("bank has questions"),
        };
        assert_ne!(second.id, first.id, "look-back window blocks a repeat");
        selector.submit_answer(&second.id, "B", 800, 2).unwrap();

        let summary = selector.summary(70.0);
        assert_eq!(summary.questions_presented, 2);
        assert_eq!(summary.questions_answered, 2);
        assert_eq!(summary.correct_count, 1);
        assert_eq!(summary.score_percent, 50.0);
        assert!(!summary.passed);
        let drill = &summary.topic_breakdown["Foot Drill"];
        assert_eq!((drill.correct, drill.total), (1, 2));
    }
}
