use serde::{Deserialize, Serialize};

/// Parameters of the exponentially weighted mastery model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryParams {
    /// EWMA learning rate. Recent attempts dominate without discarding
    /// history.
    pub alpha: f64,
    /// Estimates below this mark a topic as weak.
    pub weak_threshold: f64,
    /// Topics with fewer samples than this are never judged weak.
    pub min_samples: u64,
    /// Attempts per window when classifying the performance trend.
    pub trend_window: usize,
    /// Accuracy delta that separates improving/declining from steady.
    pub trend_threshold: f64,
}

impl Default for MasteryParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            weak_threshold: 0.5,
            min_samples: 3,
            trend_window: 5,
            trend_threshold: 0.05,
        }
    }
}

/// Parameters of the adaptive question selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorParams {
    /// Look-back window of recently presented question ids.
    pub ring_capacity: usize,
    /// Consecutive correct (or incorrect) answers before the target
    /// difficulty steps up (or down).
    pub streak_length: u32,
    /// Difficulty-range widenings tried before difficulty is ignored.
    pub max_widenings: u32,
    /// Recently asked topics held out of rotation.
    pub rotation_window: usize,
    /// Seed for the candidate pick; `None` seeds from the OS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for SelectorParams {
    fn default() -> Self {
        Self {
            ring_capacity: 10,
            streak_length: 2,
            max_widenings: 2,
            rotation_window: 2,
            rng_seed: None,
        }
    }
}

/// Parameters of the context assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblerParams {
    /// Maximum assembled context length in bytes. Whole snippets only;
    /// the lowest-scoring are dropped first.
    pub max_context_bytes: usize,
    /// Snippets retrieved when the caller does not pass an explicit k.
    pub default_top_k: usize,
    /// When true, an empty retrieval is an error instead of an empty
    /// context string.
    pub require_context: bool,
}

impl Default for AssemblerParams {
    fn default() -> Self {
        Self {
            max_context_bytes: 4000,
            default_top_k: 3,
            require_context: false,
        }
    }
}

/// Quiz-session conventions surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizParams {
    pub default_question_count: u32,
    pub max_question_count: u32,
    pub passing_percent: f64,
}

impl Default for QuizParams {
    fn default() -> Self {
        Self {
            default_question_count: 10,
            max_question_count: 50,
            passing_percent: 70.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    pub mastery: MasteryParams,
    pub selector: SelectorParams,
    pub assembler: AssemblerParams,
    pub quiz: QuizParams,
}

impl CoreConfig {
    /// Defaults overridden by `CADET_*` environment variables. Unparseable
    /// values fall back to the default rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let defaults = Self::default();

        if let Ok(val) = std::env::var("CADET_MASTERY_ALPHA") {
            config.mastery.alpha = val.parse().unwrap_or(defaults.mastery.alpha);
        }
        if let Ok(val) = std::env::var("CADET_WEAK_THRESHOLD") {
            config.mastery.weak_threshold = val.parse().unwrap_or(defaults.mastery.weak_threshold);
        }
        if let Ok(val) = std::env::var("CADET_MIN_SAMPLES") {
            config.mastery.min_samples = val.parse().unwrap_or(defaults.mastery.min_samples);
        }
        if let Ok(val) = std::env::var("CADET_TREND_WINDOW") {
            config.mastery.trend_window = val.parse().unwrap_or(defaults.mastery.trend_window);
        }
        if let Ok(val) = std::env::var("CADET_RING_CAPACITY") {
            config.selector.ring_capacity = val.parse().unwrap_or(defaults.selector.ring_capacity);
        }
        if let Ok(val) = std::env::var("CADET_STREAK_LENGTH") {
            config.selector.streak_length = val.parse().unwrap_or(defaults.selector.streak_length);
        }
        if let Ok(val) = std::env::var("CADET_MAX_WIDENINGS") {
            config.selector.max_widenings = val.parse().unwrap_or(defaults.selector.max_widenings);
        }
        if let Ok(val) = std::env::var("CADET_ROTATION_WINDOW") {
            config.selector.rotation_window =
                val.parse().unwrap_or(defaults.selector.rotation_window);
        }
        if let Ok(val) = std::env::var("CADET_RNG_SEED") {
            config.selector.rng_seed = val.parse().ok();
        }
        if let Ok(val) = std::env::var("CADET_CONTEXT_BUDGET") {
            config.assembler.max_context_bytes =
                val.parse().unwrap_or(defaults.assembler.max_context_bytes);
        }
        if let Ok(val) = std::env::var("CADET_CONTEXT_TOP_K") {
            config.assembler.default_top_k =
                val.parse().unwrap_or(defaults.assembler.default_top_k);
        }
        if let Ok(val) = std::env::var("CADET_REQUIRE_CONTEXT") {
            config.assembler.require_context =
                val.parse().unwrap_or(defaults.assembler.require_context);
        }
        if let Ok(val) = std::env::var("CADET_DEFAULT_QUESTIONS") {
            config.quiz.default_question_count =
                val.parse().unwrap_or(defaults.quiz.default_question_count);
        }
        if let Ok(val) = std::env::var("CADET_MAX_QUESTIONS") {
            config.quiz.max_question_count =
                val.parse().unwrap_or(defaults.quiz.max_question_count);
        }
        if let Ok(val) = std::env::var("CADET_PASSING_PERCENT") {
            config.quiz.passing_percent = val.parse().unwrap_or(defaults.quiz.passing_percent);
        }

        config
    }
}
