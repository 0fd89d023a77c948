//! Per-learner performance model.
//!
//! Owns every MasteryEstimate mutation. An estimate is a projection of the
//! append-only attempt history: the same EWMA fold, replayed over the
//! attempts for a (learner, topic) pair, reproduces the stored value
//! exactly, which is the recovery path when an upsert fails after the
//! attempt was already persisted.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::MasteryParams;
use crate::error::CoreError;
use crate::store::{QuestionFilter, Repository};
use crate::types::{
    Attempt, MasteryEstimate, MasteryOverview, TopicMastery, TrendDirection, TrendReport,
};

/// Estimate assumed for a topic with no recorded attempts.
pub const NEUTRAL_PRIOR: f64 = 0.5;

/// One exponentially weighted step toward the observed correctness.
pub fn ewma_step(estimate: f64, correctness: f64, alpha: f64) -> f64 {
    (estimate + alpha * (correctness - estimate)).clamp(0.0, 1.0)
}

#[derive(Clone)]
pub struct PerformanceTracker {
    repo: Arc<dyn Repository>,
    params: MasteryParams,
}

impl PerformanceTracker {
    pub fn new(repo: Arc<dyn Repository>, params: MasteryParams) -> Self {
        Self { repo, params }
    }

    pub fn params(&self) -> &MasteryParams {
        &self.params
    }

    /// Append the attempt and fold it into the topic's mastery estimate.
    ///
    /// The attempt lands on the audit trail before the estimate upsert, so a
    /// failed upsert is recoverable through [`PerformanceTracker::rebuild`].
    /// The referenced question must exist; its topic attributes the attempt.
    pub fn record(&self, attempt: &Attempt) -> Result<MasteryEstimate, CoreError> {
        let question = self
            .repo
            .question(&attempt.question_id)?
            .ok_or_else(|| CoreError::NotFound {
                kind: "question",
                id: attempt.question_id.clone(),
            })?;

        self.repo.append_attempt(attempt.clone())?;

        let prior = self.repo.get_mastery(&attempt.learner_id, &question.topic)?;
        let (old_estimate, old_count) = prior
            .map(|m| (m.estimate, m.sample_count))
            .unwrap_or((NEUTRAL_PRIOR, 0));

        let correctness = if attempt.is_correct { 1.0 } else { 0.0 };
        let updated = MasteryEstimate {
            learner_id: attempt.learner_id.clone(),
            topic: question.topic.clone(),
            estimate: ewma_step(old_estimate, correctness, self.params.alpha),
            sample_count: old_count + 1,
            updated_at_ms: attempt.timestamp_ms,
        };
        self.repo.upsert_mastery(updated.clone())?;

        tracing::debug!(
            learner_id = %attempt.learner_id,
            topic = %question.topic,
            estimate = updated.estimate,
            sample_count = updated.sample_count,
            "mastery updated"
        );
        Ok(updated)
    }

    /// Current estimate for a topic; the neutral prior when nothing is
    /// recorded yet. Unknown topics are not an error.
    pub fn mastery(&self, learner_id: &str, topic: &str) -> Result<f64, CoreError> {
        Ok(self
            .repo
            .get_mastery(learner_id, topic)?
            .map(|m| m.estimate)
            .unwrap_or(NEUTRAL_PRIOR))
    }

    /// Mean estimate across topics with at least one attempt; `None` for a
    /// learner with no history.
    pub fn average_mastery(&self, learner_id: &str) -> Result<Option<f64>, CoreError> {
        let rows = self.repo.mastery_for_learner(learner_id)?;
        let observed: Vec<f64> = rows
            .iter()
            .filter(|m| m.sample_count > 0)
            .map(|m| m.estimate)
            .collect();
        if observed.is_empty() {
            return Ok(None);
        }
        Ok(Some(observed.iter().sum::<f64>() / observed.len() as f64))
    }

    /// Topics judged weak: enough samples to trust the estimate, and the
    /// estimate below the threshold. Weakest first.
    pub fn weak_topics(&self, learner_id: &str) -> Result<Vec<String>, CoreError> {
        let mut weak: Vec<MasteryEstimate> = self
            .repo
            .mastery_for_learner(learner_id)?
            .into_iter()
            .filter(|m| {
                m.sample_count >= self.params.min_samples
                    && m.estimate < self.params.weak_threshold
            })
            .collect();
        weak.sort_by(|a, b| {
            a.estimate
                .partial_cmp(&b.estimate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.topic.cmp(&b.topic))
        });
        Ok(weak.into_iter().map(|m| m.topic).collect())
    }

    pub fn overview(&self, learner_id: &str) -> Result<MasteryOverview, CoreError> {
        let topics = self
            .repo
            .mastery_for_learner(learner_id)?
            .into_iter()
            .map(|m| TopicMastery {
                topic: m.topic,
                estimate: m.estimate,
                sample_count: m.sample_count,
            })
            .collect();
        Ok(MasteryOverview {
            learner_id: learner_id.to_string(),
            topics,
            weak_topics: self.weak_topics(learner_id)?,
        })
    }

    /// Recompute a (learner, topic) estimate by replaying the attempt
    /// history through the same fold, then store it. With no attempts the
    /// stored row returns to the neutral prior with a zero sample count.
    pub fn rebuild(&self, learner_id: &str, topic: &str) -> Result<MasteryEstimate, CoreError> {
        let topic_questions: HashSet<String> = self
            .repo
            .query_questions(&QuestionFilter { topic: Some(topic.to_string()), ..Default::default() })?
            .into_iter()
            .map(|q| q.id)
            .collect();

        let mut estimate = NEUTRAL_PRIOR;
        let mut sample_count = 0u64;
        let mut updated_at_ms = 0i64;
        for attempt in self.repo.attempts(learner_id)? {
            if !topic_questions.contains(&attempt.question_id) {
                continue;
            }
            let correctness = if attempt.is_correct { 1.0 } else { 0.0 };
            estimate = ewma_step(estimate, correctness, self.params.alpha);
            sample_count += 1;
            updated_at_ms = attempt.timestamp_ms;
        }

        let rebuilt = MasteryEstimate {
            learner_id: learner_id.to_string(),
            topic: topic.to_string(),
            estimate,
            sample_count,
            updated_at_ms,
        };
        self.repo.upsert_mastery(rebuilt.clone())?;
        tracing::info!(learner_id, topic, sample_count, "mastery rebuilt from attempt history");
        Ok(rebuilt)
    }

    /// Compare the accuracy of the latest window of attempts against the
    /// window before it. Steady until both windows are filled.
    pub fn trend(&self, learner_id: &str) -> Result<TrendReport, CoreError> {
        let attempts = self.repo.attempts(learner_id)?;
        let window = self.params.trend_window.max(1);
        let total_attempts = attempts.len() as u64;

        if attempts.len() < window * 2 {
            return Ok(TrendReport {
                direction: TrendDirection::Steady,
                recent_accuracy: None,
                previous_accuracy: None,
                total_attempts,
            });
        }

        let recent = &attempts[attempts.len() - window..];
        let previous = &attempts[attempts.len() - window * 2..attempts.len() - window];
        let recent_accuracy = accuracy(recent);
        let previous_accuracy = accuracy(previous);
        let delta = recent_accuracy - previous_accuracy;

        let direction = if delta > self.params.trend_threshold {
            TrendDirection::Improving
        } else if delta < -self.params.trend_threshold {
            TrendDirection::Declining
        } else {
            TrendDirection::Steady
        };

        Ok(TrendReport {
            direction,
            recent_accuracy: Some(recent_accuracy),
            previous_accuracy: Some(previous_accuracy),
            total_attempts,
        })
    }
}

fn accuracy(attempts: &[Attempt]) -> f64 {
    if attempts.is_empty() {
        return 0.0;
    }
    let correct = attempts.iter().filter(|a| a.is_correct).count();
    correct as f64 / attempts.len() as f64
}
