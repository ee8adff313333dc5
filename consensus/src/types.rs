//! Core value types shared by the voter, the reputation ledger and the engine
//!
//! Everything here is plain data: labels, votes and the per-agent prediction
//! an agent collaborator hands back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Unique identifier for an agent within one engine
pub type AgentId = String;

/// Per-agent weight map, ordered by agent id
pub type WeightMap = BTreeMap<AgentId, f64>;

/// One vote per agent, ordered by agent id
pub type VoteSet = BTreeMap<AgentId, Vote>;

/// Binary class label
///
/// `Negative < Positive`, so every "lower label wins" tie-break is just `min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Label {
    /// Class `0`
    Negative,
    /// Class `1`
    Positive,
}

impl Label {
    /// Both labels in ascending order
    pub const ALL: [Label; 2] = [Label::Negative, Label::Positive];

    /// Numeric value of the label (`0` or `1`)
    pub fn as_u8(self) -> u8 {
        match self {
            Label::Negative => 0,
            Label::Positive => 1,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.as_u8() as usize
    }
}

impl TryFrom<u8> for Label {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Label::Negative),
            1 => Ok(Label::Positive),
            other => Err(ValidationError::InvalidLabel(other)),
        }
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> Self {
        label.as_u8()
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// What a single agent returns for one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_class: Label,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

impl Prediction {
    pub fn new(predicted_class: Label, confidence: f64) -> Self {
        Self {
            predicted_class,
            confidence,
        }
    }
}

/// One agent's vote for one prediction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub agent_id: AgentId,
    pub predicted_class: Label,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

impl Vote {
    /// Create a new vote
    pub fn new(agent_id: impl Into<AgentId>, predicted_class: Label, confidence: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            predicted_class,
            confidence,
        }
    }

    /// Build a vote from an agent's prediction
    pub fn from_prediction(agent_id: impl Into<AgentId>, prediction: Prediction) -> Self {
        Self::new(agent_id, prediction.predicted_class, prediction.confidence)
    }

    /// Check the confidence is a finite value in `[0, 1]`
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::InvalidConfidence {
                agent_id: self.agent_id.clone(),
                value: self.confidence,
            });
        }
        Ok(())
    }
}

/// Build a vote set keyed by agent id from a list of votes
///
/// A later vote from the same agent replaces the earlier one.
pub fn vote_set(votes: impl IntoIterator<Item = Vote>) -> VoteSet {
    votes
        .into_iter()
        .map(|vote| (vote.agent_id.clone(), vote))
        .collect()
}
