use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// NCC certificate examination tier. `A` is taken by junior division/wing
/// cadets, `B` and `C` by senior cadets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertificateLevel {
    A,
    B,
    C,
}

impl CertificateLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            _ => None,
        }
    }
}

/// Question difficulty on the 1..5 scale used by the bank and the selector.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    VeryEasy,
    Easy,
    #[default]
    Medium,
    Hard,
    VeryHard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryEasy => "very_easy",
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "very_hard",
        }
    }

    /// Numeric level, 1 (very easy) through 5 (very hard).
    pub fn level(&self) -> u8 {
        match self {
            Self::VeryEasy => 1,
            Self::Easy => 2,
            Self::Medium => 3,
            Self::Hard => 4,
            Self::VeryHard => 5,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::VeryEasy),
            2 => Some(Self::Easy),
            3 => Some(Self::Medium),
            4 => Some(Self::Hard),
            5 => Some(Self::VeryHard),
            _ => None,
        }
    }

    /// One step up, saturating at `VeryHard`.
    pub fn harder(&self) -> Self {
        match self {
            Self::VeryEasy => Self::Easy,
            Self::Easy => Self::Medium,
            Self::Medium => Self::Hard,
            _ => Self::VeryHard,
        }
    }

    /// One step down, saturating at `VeryEasy`.
    pub fn easier(&self) -> Self {
        match self {
            Self::VeryHard => Self::Hard,
            Self::Hard => Self::Medium,
            Self::Medium => Self::Easy,
            _ => Self::VeryEasy,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "very_easy" | "veryeasy" | "1" => Some(Self::VeryEasy),
            "easy" | "2" => Some(Self::Easy),
            "medium" | "mid" | "3" => Some(Self::Medium),
            "hard" | "4" => Some(Self::Hard),
            "very_hard" | "veryhard" | "5" => Some(Self::VeryHard),
            _ => None,
        }
    }
}

/// Inclusive difficulty window used by bank queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyRange {
    pub min: Difficulty,
    pub max: Difficulty,
}

impl DifficultyRange {
    pub fn new(min: Difficulty, max: Difficulty) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn single(difficulty: Difficulty) -> Self {
        Self { min: difficulty, max: difficulty }
    }

    /// `[center - 1, center + 1]`, clamped to the scale.
    pub fn around(center: Difficulty) -> Self {
        Self { min: center.easier(), max: center.harder() }
    }

    pub fn full() -> Self {
        Self { min: Difficulty::VeryEasy, max: Difficulty::VeryHard }
    }

    /// Widen by one step on each side, saturating at the scale bounds.
    pub fn widen(&self) -> Self {
        Self { min: self.min.easier(), max: self.max.harder() }
    }

    pub fn contains(&self, difficulty: Difficulty) -> bool {
        self.min <= difficulty && difficulty <= self.max
    }

    pub fn is_full(&self) -> bool {
        self.min == Difficulty::VeryEasy && self.max == Difficulty::VeryHard
    }
}

/// A stored unit of knowledge text with its precomputed embedding. Immutable
/// once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: String,
    pub topic: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub level: CertificateLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

/// An authored multiple-choice question. Immutable after ingestion; edits
/// arrive as a new question with a new id so attempt history stays valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
    pub correct_option_id: String,
    pub topic: String,
    pub difficulty: Difficulty,
    pub level: CertificateLevel,
    pub explanation: String,
}

impl Question {
    pub fn option(&self, option_id: &str) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.id == option_id)
    }
}

/// The question as shown to a learner: no correct option id, no explanation.
/// Both are revealed by the grade report after the answer is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuestionOption>,
    pub topic: String,
    pub difficulty: Difficulty,
    pub level: CertificateLevel,
}

impl From<&Question> for PresentedQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            prompt: q.prompt.clone(),
            options: q.options.clone(),
            topic: q.topic.clone(),
            difficulty: q.difficulty,
            level: q.level,
        }
    }
}

/// One graded answer. Append-only audit record, never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub learner_id: String,
    pub question_id: String,
    pub chosen_option_id: String,
    pub is_correct: bool,
    pub latency_ms: u64,
    pub timestamp_ms: i64,
}

/// Smoothed per-topic competence in [0, 1]. A projection of the attempt
/// history: replaying all attempts for the pair reproduces it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryEstimate {
    pub learner_id: String,
    pub topic: String,
    pub estimate: f64,
    pub sample_count: u64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicMastery {
    pub topic: String,
    pub estimate: f64,
    pub sample_count: u64,
}

/// Per-topic estimates for one learner plus the topics currently judged weak.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryOverview {
    pub learner_id: String,
    pub topics: Vec<TopicMastery>,
    pub weak_topics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendDirection {
    Improving,
    Steady,
    Declining,
}

/// Recent-versus-previous accuracy comparison over the attempt history.
/// Accuracies are absent until both windows are filled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub direction: TrendDirection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_accuracy: Option<f64>,
    pub total_attempts: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub learner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<CertificateLevel>,
    pub target_difficulty: Difficulty,
}

/// Outcome of grading one submitted answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    pub question_id: String,
    pub is_correct: bool,
    pub chosen_option_id: String,
    pub correct_option_id: String,
    pub explanation: String,
    pub mastery: MasteryEstimate,
    pub target_difficulty: Difficulty,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicScore {
    pub correct: u32,
    pub total: u32,
}

/// End-of-session report: score against the configured passing percentage
/// plus a per-topic breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub learner_id: String,
    pub questions_presented: u32,
    pub questions_answered: u32,
    pub correct_count: u32,
    pub score_percent: f64,
    pub passed: bool,
    pub topic_breakdown: BTreeMap<String, TopicScore>,
    pub final_target_difficulty: Difficulty,
}

/// Answer produced by `ask`: the generated text plus the grounding context
/// that was supplied to the language model (empty when ungrounded).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundedAnswer {
    pub answer: String,
    pub grounded: bool,
    pub context: String,
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_steps_saturate_at_bounds() {
        assert_eq!(Difficulty::VeryHard.harder(), Difficulty::VeryHard);
        assert_eq!(Difficulty::VeryEasy.easier(), Difficulty::VeryEasy);
        assert_eq!(Difficulty::Medium.harder(), Difficulty::Hard);
        assert_eq!(Difficulty::Medium.easier(), Difficulty::Easy);
    }

    #[test]
    fn difficulty_levels_round_trip() {
        for level in 1..=5u8 {
            let d = Difficulty::from_level(level).unwrap();
            assert_eq!(d.level(), level);
        }
        assert!(Difficulty::from_level(0).is_none());
        assert!(Difficulty::from_level(6).is_none());
    }

    #[test]
    fn range_widening_saturates() {
        let range = DifficultyRange::around(Difficulty::Medium);
        assert_eq!(range.min, Difficulty::Easy);
        assert_eq!(range.max, Difficulty::Hard);

        let once = range.widen();
        assert!(once.is_full());
        assert_eq!(once.widen(), once, "widening a full range is a no-op");
    }

    #[test]
    fn range_contains_is_inclusive() {
        let range = DifficultyRange::new(Difficulty::Easy, Difficulty::Hard);
        assert!(range.contains(Difficulty::Easy));
        assert!(range.contains(Difficulty::Medium));
        assert!(range.contains(Difficulty::Hard));
        assert!(!range.contains(Difficulty::VeryEasy));
        assert!(!range.contains(Difficulty::VeryHard));
    }

    #[test]
    fn certificate_parse_accepts_case_and_whitespace() {
        assert_eq!(CertificateLevel::parse(" a "), Some(CertificateLevel::A));
        assert_eq!(CertificateLevel::parse("B"), Some(CertificateLevel::B));
        assert_eq!(CertificateLevel::parse("x"), None);
    }
}
