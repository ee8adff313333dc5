//! Weighted voting over binary class votes
//!
//! Each vote contributes `weight * confidence` to its class. The class with
//! the larger score wins; an exact tie goes to the lower label. Confidence is
//! the winner's share of the total score.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;
use crate::types::{AgentId, Label, VoteSet, WeightMap};

/// Outcome of a weighted voting round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotingResult {
    /// The winning class
    pub predicted_class: Label,
    /// Winner's share of the total weighted score, `0` if the total is `0`
    pub confidence: f64,
    /// Total weighted score per class
    pub class_scores: BTreeMap<Label, f64>,
    /// The weights the round was scored with
    pub weights: WeightMap,
}

/// Stateless weighted voter
pub struct WeightedVoter;

impl WeightedVoter {
    /// Combine votes using per-agent weights.
    ///
    /// `votes` must be non-empty and cover exactly the agents in `weights`.
    pub fn vote(votes: &VoteSet, weights: &WeightMap) -> Result<VotingResult, ValidationError> {
        if votes.is_empty() {
            return Err(ValidationError::EmptyVotes);
        }
        check_agent_sets(votes, weights)?;

        let mut scores = [0.0_f64; 2];
        for (agent_id, vote) in votes {
            vote.validate()?;
            let weight = weights[agent_id];
            if !weight.is_finite() || weight < 0.0 {
                return Err(ValidationError::InvalidWeight {
                    agent_id: agent_id.clone(),
                    value: weight,
                });
            }
            scores[vote.predicted_class.index()] += weight * vote.confidence;
        }

        let total: f64 = scores.iter().sum();
        let (predicted_class, confidence) = if total > 0.0 {
            // Strict comparison keeps the lower label on an exact tie
            let winner = if scores[Label::Positive.index()] > scores[Label::Negative.index()] {
                Label::Positive
            } else {
                Label::Negative
            };
            (winner, scores[winner.index()] / total)
        } else {
            (Label::Negative, 0.0)
        };

        debug!(
            votes = votes.len(),
            predicted_class = %predicted_class,
            confidence,
            "Weighted vote complete"
        );

        Ok(VotingResult {
            predicted_class,
            confidence,
            class_scores: Label::ALL
                .iter()
                .map(|label| (*label, scores[label.index()]))
                .collect(),
            weights: weights.clone(),
        })
    }

    /// Unweighted mode of the predicted classes. Ties go to the lower label.
    pub fn majority_class(votes: &VoteSet) -> Result<Label, ValidationError> {
        if votes.is_empty() {
            return Err(ValidationError::EmptyVotes);
        }

        let mut counts = [0_usize; 2];
        for vote in votes.values() {
            counts[vote.predicted_class.index()] += 1;
        }

        if counts[Label::Positive.index()] > counts[Label::Negative.index()] {
            Ok(Label::Positive)
        } else {
            Ok(Label::Negative)
        }
    }

    /// Winner's share of the class scores and whether it reaches `threshold`
    pub fn consensus_confidence(
        class_scores: &BTreeMap<Label, f64>,
        threshold: f64,
    ) -> (f64, bool) {
        let total: f64 = class_scores.values().sum();
        if class_scores.is_empty() || total <= 0.0 {
            return (0.0, false);
        }

        let max = class_scores.values().cloned().fold(f64::MIN, f64::max);
        let confidence = max / total;
        (confidence, confidence >= threshold)
    }
}

fn check_agent_sets(votes: &VoteSet, weights: &WeightMap) -> Result<(), ValidationError> {
    let missing: Vec<AgentId> = votes
        .keys()
        .filter(|id| !weights.contains_key(*id))
        .cloned()
        .collect();
    let unexpected: Vec<AgentId> = weights
        .keys()
        .filter(|id| !votes.contains_key(*id))
        .cloned()
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::AgentSetMismatch {
            missing,
            unexpected,
        })
    }
}
