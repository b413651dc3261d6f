// Path: crates/types/src/domain/competence.rs

//! Per-principal, per-action-type competence tracking.

use crate::time::TimestampMs;
use serde::{Deserialize, Serialize};

/// Default interval between discrete decay steps: seven days.
pub const DECAY_INTERVAL_MS: i64 = 7 * crate::time::DAY_MS;
/// Multiplier applied to the score at each decay step.
pub const DECAY_FACTOR: f64 = 0.95;

/// The outcome of one recorded execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompetenceOutcome {
    /// The execution succeeded.
    Success,
    /// The execution failed.
    Failure,
    /// The execution was later rolled back.
    Rollback,
}

/// One entry in the competence history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetenceEvent {
    /// When the outcome was recorded.
    pub timestamp: TimestampMs,
    /// What happened.
    pub outcome: CompetenceOutcome,
}

/// Rolling competence of one principal for one action type.
///
/// The score lives in [0, 1]. Decay is discrete: one multiplicative step per
/// elapsed decay interval, applied lazily when the score is read and
/// persisted on the next write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetenceRecord {
    /// The principal tracked.
    pub principal_id: String,
    /// The action type tracked.
    pub action_type: String,
    /// Lifetime success count.
    pub success_count: u64,
    /// Lifetime failure count.
    pub failure_count: u64,
    /// Lifetime rollback count.
    pub rollback_count: u64,
    /// Current run of consecutive successes.
    pub consecutive_successes: u64,
    /// Competence score in [0, 1].
    pub score: f64,
    /// Last recorded activity.
    pub last_activity_at: TimestampMs,
    /// When decay was last folded into `score`.
    pub last_decay_applied_at: TimestampMs,
    /// Bounded recent history, newest last.
    #[serde(default)]
    pub history: Vec<CompetenceEvent>,
}

/// Maximum history entries retained per record.
pub const MAX_COMPETENCE_HISTORY: usize = 50;

impl CompetenceRecord {
    /// A fresh record with a neutral score.
    pub fn new(principal_id: impl Into<String>, action_type: impl Into<String>, now: TimestampMs) -> Self {
        Self {
            principal_id: principal_id.into(),
            action_type: action_type.into(),
            success_count: 0,
            failure_count: 0,
            rollback_count: 0,
            consecutive_successes: 0,
            score: 0.5,
            last_activity_at: now,
            last_decay_applied_at: now,
            history: Vec::new(),
        }
    }

    /// The score with pending decay steps applied, without mutating the
    /// stored record.
    pub fn effective_score(&self, now: TimestampMs) -> f64 {
        let elapsed = now.saturating_sub(self.last_decay_applied_at);
        if elapsed < DECAY_INTERVAL_MS {
            return self.score;
        }
        let steps = (elapsed / DECAY_INTERVAL_MS) as u32;
        self.score * DECAY_FACTOR.powi(steps as i32)
    }

    /// Records an outcome, folding pending decay into the stored score
    /// first.
    pub fn record(&mut self, outcome: CompetenceOutcome, now: TimestampMs) {
        self.score = self.effective_score(now);
        self.last_decay_applied_at = now;
        match outcome {
            CompetenceOutcome::Success => {
                self.success_count += 1;
                self.consecutive_successes += 1;
                self.score += (1.0 - self.score) * 0.1;
            }
            CompetenceOutcome::Failure => {
                self.failure_count += 1;
                self.consecutive_successes = 0;
                self.score -= self.score * 0.2;
            }
            CompetenceOutcome::Rollback => {
                self.rollback_count += 1;
                self.consecutive_successes = 0;
                self.score -= self.score * 0.15;
            }
        }
        self.score = self.score.clamp(0.0, 1.0);
        self.last_activity_at = now;
        self.history.push(CompetenceEvent {
            timestamp: now,
            outcome,
        });
        if self.history.len() > MAX_COMPETENCE_HISTORY {
            let drop = self.history.len() - MAX_COMPETENCE_HISTORY;
            self.history.drain(..drop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successes_raise_and_failures_cut_deeper() {
        let mut r = CompetenceRecord::new("agent_1", "ads.campaign.pause", 0);
        let start = r.score;
        r.record(CompetenceOutcome::Success, 1);
        assert!(r.score > start);
        let after_success = r.score;
        r.record(CompetenceOutcome::Failure, 2);
        assert!(r.score < after_success);
        assert_eq!(r.consecutive_successes, 0);
    }

    #[test]
    fn decay_is_discrete_per_interval() {
        let r = CompetenceRecord::new("agent_1", "x", 0);
        // Just shy of one interval: no decay.
        assert_eq!(r.effective_score(DECAY_INTERVAL_MS - 1), r.score);
        // Exactly two intervals: two steps.
        let expected = r.score * DECAY_FACTOR * DECAY_FACTOR;
        assert!((r.effective_score(2 * DECAY_INTERVAL_MS) - expected).abs() < 1e-12);
    }

    #[test]
    fn history_is_bounded() {
        let mut r = CompetenceRecord::new("agent_1", "x", 0);
        for i in 0..(MAX_COMPETENCE_HISTORY + 10) {
            r.record(CompetenceOutcome::Success, i as i64);
        }
        assert_eq!(r.history.len(), MAX_COMPETENCE_HISTORY);
    }
}
