//! Per-agent reputation record and the outcome buckets that drive weight updates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AgentId;

/// Credit-assignment bucket for one agent on one feedback event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Agent right, majority right
    RewardCorrect,
    /// Agent right while the majority was wrong
    RewardMinority,
    /// Agent wrong, majority right
    PenaltyWrong,
    /// Agent and majority both wrong
    PenaltyBothWrong,
}

impl Outcome {
    /// Pick the bucket from the two correctness flags
    pub fn classify(agent_correct: bool, majority_correct: bool) -> Self {
        match (agent_correct, majority_correct) {
            (true, true) => Outcome::RewardCorrect,
            (true, false) => Outcome::RewardMinority,
            (false, true) => Outcome::PenaltyWrong,
            (false, false) => Outcome::PenaltyBothWrong,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RewardCorrect => write!(f, "reward_correct"),
            Self::RewardMinority => write!(f, "reward_minority"),
            Self::PenaltyWrong => write!(f, "penalty_wrong"),
            Self::PenaltyBothWrong => write!(f, "penalty_both_wrong"),
        }
    }
}

/// Accumulated statistics for one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReputation {
    pub agent_id: AgentId,
    pub total_predictions: u64,
    pub correct_predictions: u64,
    /// `correct / total`, `0` before the first feedback
    pub accuracy: f64,
    /// Running mean of reported confidences
    pub confidence_avg: f64,
    /// Running population standard deviation of reported confidences
    pub confidence_std: f64,
    /// Right while the majority was wrong
    pub minority_correct_count: u64,
    /// Right together with the majority
    pub majority_correct_count: u64,
    /// Wrong together with the majority
    pub both_wrong_count: u64,
    pub current_weight: f64,
    pub weight_history: Vec<f64>,
    /// Accuracy at each point of `weight_history`
    pub accuracy_history: Vec<f64>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    confidence_m2: f64,
}

impl AgentReputation {
    /// Fresh record with no feedback yet
    pub fn new(agent_id: impl Into<AgentId>, initial_weight: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            total_predictions: 0,
            correct_predictions: 0,
            accuracy: 0.0,
            confidence_avg: 0.0,
            confidence_std: 0.0,
            minority_correct_count: 0,
            majority_correct_count: 0,
            both_wrong_count: 0,
            current_weight: initial_weight,
            weight_history: Vec::new(),
            accuracy_history: Vec::new(),
            last_updated: Utc::now(),
            confidence_m2: 0.0,
        }
    }

    /// Update the counters for one feedback event
    pub(crate) fn record(&mut self, outcome: Outcome, confidence: f64) {
        self.total_predictions += 1;
        match outcome {
            Outcome::RewardCorrect => {
                self.correct_predictions += 1;
                self.majority_correct_count += 1;
            }
            Outcome::RewardMinority => {
                self.correct_predictions += 1;
                self.minority_correct_count += 1;
            }
            Outcome::PenaltyBothWrong => self.both_wrong_count += 1,
            Outcome::PenaltyWrong => {}
        }

        let n = self.total_predictions as f64;
        self.accuracy = self.correct_predictions as f64 / n;

        let old_avg = self.confidence_avg;
        self.confidence_avg = (old_avg * (n - 1.0) + confidence) / n;
        self.confidence_m2 += (confidence - old_avg) * (confidence - self.confidence_avg);
        self.confidence_std = (self.confidence_m2 / n).max(0.0).sqrt();
    }

    /// Set the current weight and append it to the history
    pub(crate) fn push_weight(&mut self, weight: f64) {
        self.current_weight = weight;
        self.weight_history.push(weight);
        self.accuracy_history.push(self.accuracy);
        self.last_updated = Utc::now();
    }

    /// Replace the latest history point, or push one if the history is empty
    pub(crate) fn rewrite_last_weight(&mut self, weight: f64) {
        self.current_weight = weight;
        match self.weight_history.last_mut() {
            Some(last) => *last = weight,
            None => {
                self.weight_history.push(weight);
                self.accuracy_history.push(self.accuracy);
            }
        }
    }

    /// Derived statistics
    pub fn stats(&self) -> AgentStats {
        let correct = self.minority_correct_count + self.majority_correct_count;
        let win_vs_majority_rate = if correct > 0 {
            self.minority_correct_count as f64 / correct as f64
        } else {
            0.0
        };

        let agreement_with_majority = if self.total_predictions > 0 {
            (self.majority_correct_count + self.both_wrong_count) as f64
                / self.total_predictions as f64
        } else {
            0.0
        };

        AgentStats {
            agent_id: self.agent_id.clone(),
            total_predictions: self.total_predictions,
            accuracy: self.accuracy,
            current_weight: self.current_weight,
            confidence_avg: self.confidence_avg,
            win_vs_majority_rate,
            agreement_with_majority,
            weight_trend: WeightTrend::from_history(&self.weight_history),
        }
    }
}

/// Direction of the last weight change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightTrend {
    Increasing,
    Decreasing,
    Stable,
}

impl WeightTrend {
    fn from_history(history: &[f64]) -> Self {
        match history {
            [.., previous, last] if last > previous => WeightTrend::Increasing,
            [.., previous, last] if last < previous => WeightTrend::Decreasing,
            _ => WeightTrend::Stable,
        }
    }
}

/// Summary view of an agent's track record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub agent_id: AgentId,
    pub total_predictions: u64,
    pub accuracy: f64,
    pub current_weight: f64,
    pub confidence_avg: f64,
    /// Share of correct predictions made against a wrong majority
    pub win_vs_majority_rate: f64,
    /// Share of predictions that sided with the majority
    pub agreement_with_majority: f64,
    pub weight_trend: WeightTrend,
}
