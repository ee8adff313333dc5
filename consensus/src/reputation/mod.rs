//! Agent reputation management
//!
//! The [`ReputationManager`] owns one [`AgentReputation`] per agent and
//! applies the four-bucket reward rule on feedback:
//!
//! | agent | majority | bucket               | default multiplier |
//! |-------|----------|----------------------|--------------------|
//! | right | right    | `reward_correct`     | 1.05               |
//! | right | wrong    | `reward_minority`    | 1.15               |
//! | wrong | right    | `penalty_wrong`      | 0.90               |
//! | wrong | wrong    | `penalty_both_wrong` | 0.85               |
//!
//! Each update mutates a single agent and clamps its weight into the policy
//! bounds. Renormalizing across agents is the engine's job.

mod record;

pub use record::{AgentReputation, AgentStats, Outcome, WeightTrend};

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::RewardPolicy;
use crate::error::{ConsensusError, EngineResult, ValidationError};
use crate::types::{AgentId, Label, WeightMap};

/// Field used to order agents in [`ReputationManager::rank`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    Accuracy,
    Weight,
}

/// Owns per-agent statistics and current weights
#[derive(Debug, Clone)]
pub struct ReputationManager {
    policy: RewardPolicy,
    reputations: BTreeMap<AgentId, AgentReputation>,
}

impl Default for ReputationManager {
    fn default() -> Self {
        Self::new(RewardPolicy::default())
    }
}

impl ReputationManager {
    /// Create an empty manager using `policy`
    pub fn new(policy: RewardPolicy) -> Self {
        Self {
            policy,
            reputations: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> &RewardPolicy {
        &self.policy
    }

    /// Register an agent with a starting weight (clamped into bounds)
    pub fn register(&mut self, agent_id: &str, initial_weight: f64) -> EngineResult<()> {
        if self.reputations.contains_key(agent_id) {
            return Err(ConsensusError::AlreadyExists(agent_id.to_string()));
        }
        if !initial_weight.is_finite() {
            return Err(ValidationError::InvalidWeight {
                agent_id: agent_id.to_string(),
                value: initial_weight,
            }
            .into());
        }

        let weight = self.policy.clamp(initial_weight);
        self.reputations
            .insert(agent_id.to_string(), AgentReputation::new(agent_id, weight));
        debug!(agent_id, weight, "Agent registered");
        Ok(())
    }

    /// Apply one feedback event to one agent and return its new weight.
    ///
    /// Unknown agents are registered on the fly at weight 1.0.
    pub fn record_and_update(
        &mut self,
        agent_id: &str,
        predicted_class: Label,
        true_class: Label,
        confidence: f64,
        majority_class: Label,
    ) -> Result<f64, ValidationError> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::InvalidConfidence {
                agent_id: agent_id.to_string(),
                value: confidence,
            });
        }

        let policy = self.policy;
        let rep = self
            .reputations
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentReputation::new(agent_id, policy.clamp(1.0)));

        let outcome = Outcome::classify(
            predicted_class == true_class,
            majority_class == true_class,
        );
        let weight = policy.clamp(rep.current_weight * policy.multiplier(outcome));

        rep.record(outcome, confidence);
        rep.push_weight(weight);

        debug!(
            agent_id,
            outcome = %outcome,
            weight,
            accuracy = rep.accuracy,
            "Reputation updated"
        );

        Ok(weight)
    }

    /// Copy of one agent's reputation
    pub fn reputation(&self, agent_id: &str) -> Result<AgentReputation, ValidationError> {
        self.reputations
            .get(agent_id)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownAgent(agent_id.to_string()))
    }

    /// Copy of every reputation
    pub fn all(&self) -> BTreeMap<AgentId, AgentReputation> {
        self.reputations.clone()
    }

    /// Derived statistics for one agent
    pub fn stats(&self, agent_id: &str) -> Result<AgentStats, ValidationError> {
        self.reputations
            .get(agent_id)
            .map(AgentReputation::stats)
            .ok_or_else(|| ValidationError::UnknownAgent(agent_id.to_string()))
    }

    /// Agents ordered by `by`, descending; ties by agent id ascending
    pub fn rank(&self, by: RankBy) -> Vec<(AgentId, f64)> {
        let mut ranked: Vec<(AgentId, f64)> = self
            .reputations
            .values()
            .map(|rep| {
                let value = match by {
                    RankBy::Accuracy => rep.accuracy,
                    RankBy::Weight => rep.current_weight,
                };
                (rep.agent_id.clone(), value)
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.reputations.contains_key(agent_id)
    }

    pub fn len(&self) -> usize {
        self.reputations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reputations.is_empty()
    }

    /// Current weight of every agent
    pub fn weights(&self) -> WeightMap {
        self.reputations
            .iter()
            .map(|(id, rep)| (id.clone(), rep.current_weight))
            .collect()
    }

    /// Write renormalized weights back.
    ///
    /// Agents in `participants` had a history point pushed by this round; that
    /// point is rewritten to the settled weight.
    pub fn settle(&mut self, weights: &WeightMap, participants: &BTreeSet<AgentId>) {
        let now = Utc::now();
        for (agent_id, weight) in weights {
            if let Some(rep) = self.reputations.get_mut(agent_id) {
                if participants.contains(agent_id) {
                    rep.rewrite_last_weight(*weight);
                    rep.last_updated = now;
                } else {
                    rep.current_weight = *weight;
                }
            }
        }
    }

    /// Set a single weight (clamped). Unknown agents are an error.
    pub fn set_weight(&mut self, agent_id: &str, value: f64) -> Result<f64, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::InvalidWeight {
                agent_id: agent_id.to_string(),
                value,
            });
        }
        let weight = self.policy.clamp(value);
        let rep = self
            .reputations
            .get_mut(agent_id)
            .ok_or_else(|| ValidationError::UnknownAgent(agent_id.to_string()))?;
        rep.current_weight = weight;
        rep.last_updated = Utc::now();
        Ok(weight)
    }

    /// Set every agent's weight to `value` (clamped). Counters are kept.
    pub fn reset_weights(&mut self, value: f64) {
        let weight = self.policy.clamp(value);
        for rep in self.reputations.values_mut() {
            rep.current_weight = weight;
        }
    }

    /// Drop every reputation. Irreversible.
    pub fn reset(&mut self) {
        let cleared = self.reputations.len();
        self.reputations.clear();
        info!(cleared, "All reputations reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with(agents: &[&str]) -> ReputationManager {
        let mut manager = ReputationManager::default();
        for agent in agents {
            manager.register(agent, 1.0).unwrap();
        }
        manager
    }

    #[test]
    fn test_register_twice_fails() {
        let mut manager = manager_with(&["a"]);
        let result = manager.register("a", 1.0);
        assert!(matches!(result, Err(ConsensusError::AlreadyExists(id)) if id == "a"));
    }

    #[test]
    fn test_register_clamps_initial_weight() {
        let mut manager = ReputationManager::default();
        manager.register("big", 50.0).unwrap();
        manager.register("small", 0.0).unwrap();
        assert_eq!(manager.weights()["big"], 5.0);
        assert_eq!(manager.weights()["small"], 0.1);
    }

    #[test]
    fn test_four_buckets() {
        use Label::{Negative, Positive};
        let mut manager = manager_with(&["a", "b", "c", "d"]);

        let w = manager.record_and_update("a", Negative, Negative, 0.9, Negative).unwrap();
        assert!((w - 1.05).abs() < 1e-12);
        let w = manager.record_and_update("b", Negative, Negative, 0.9, Positive).unwrap();
        assert!((w - 1.15).abs() < 1e-12);
        let w = manager.record_and_update("c", Positive, Negative, 0.9, Negative).unwrap();
        assert!((w - 0.90).abs() < 1e-12);
        let w = manager.record_and_update("d", Positive, Negative, 0.9, Positive).unwrap();
        assert!((w - 0.85).abs() < 1e-12);

        assert_eq!(manager.reputation("a").unwrap().majority_correct_count, 1);
        assert_eq!(manager.reputation("b").unwrap().minority_correct_count, 1);
        assert_eq!(manager.reputation("c").unwrap().correct_predictions, 0);
        assert_eq!(manager.reputation("d").unwrap().both_wrong_count, 1);
    }

    #[test]
    fn test_update_touches_only_one_agent() {
        let mut manager = manager_with(&["a", "b"]);
        let before = manager.reputation("b").unwrap();

        manager
            .record_and_update("a", Label::Positive, Label::Positive, 0.7, Label::Positive)
            .unwrap();

        assert_eq!(manager.reputation("b").unwrap(), before);
        let a = manager.reputation("a").unwrap();
        assert_eq!(a.weight_history, vec![a.current_weight]);
        assert_eq!(a.accuracy_history, vec![1.0]);
    }

    #[test]
    fn test_lazy_registration() {
        let mut manager = ReputationManager::default();
        manager
            .record_and_update("new", Label::Negative, Label::Positive, 0.5, Label::Positive)
            .unwrap();
        let rep = manager.reputation("new").unwrap();
        assert_eq!(rep.total_predictions, 1);
        assert!((rep.current_weight - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_confidence_mutates_nothing() {
        let mut manager = manager_with(&["a"]);
        let before = manager.all();
        let result =
            manager.record_and_update("a", Label::Negative, Label::Negative, 2.0, Label::Negative);
        assert!(result.is_err());
        assert_eq!(manager.all(), before);
    }

    #[test]
    fn test_minority_reward_saturates_at_max() {
        let mut manager = manager_with(&["a"]);
        for _ in 0..100 {
            let w = manager
                .record_and_update("a", Label::Negative, Label::Negative, 0.9, Label::Positive)
                .unwrap();
            assert!(w <= 5.0);
        }
        assert_eq!(manager.weights()["a"], 5.0);
    }

    #[test]
    fn test_penalty_saturates_at_min() {
        let mut manager = manager_with(&["a"]);
        for _ in 0..100 {
            manager
                .record_and_update("a", Label::Positive, Label::Negative, 0.9, Label::Positive)
                .unwrap();
        }
        assert_eq!(manager.weights()["a"], 0.1);
    }

    #[test]
    fn test_rank_descending_with_id_tiebreak() {
        let mut manager = manager_with(&["c", "a", "b"]);
        manager.set_weight("b", 2.0).unwrap();

        let ranked = manager.rank(RankBy::Weight);
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        manager
            .record_and_update("c", Label::Positive, Label::Positive, 0.9, Label::Positive)
            .unwrap();
        let ranked = manager.rank(RankBy::Accuracy);
        assert_eq!(ranked[0], ("c".to_string(), 1.0));
        assert_eq!(ranked[1].0, "a");
    }

    #[test]
    fn test_set_weight_unknown_agent() {
        let mut manager = manager_with(&["a"]);
        assert!(matches!(
            manager.set_weight("zzz", 1.0),
            Err(ValidationError::UnknownAgent(_))
        ));
        assert_eq!(manager.set_weight("a", 100.0).unwrap(), 5.0);
    }

    #[test]
    fn test_settle_rewrites_participant_history() {
        let mut manager = manager_with(&["a", "b"]);
        manager
            .record_and_update("a", Label::Positive, Label::Positive, 0.9, Label::Positive)
            .unwrap();

        let weights: WeightMap = [("a".to_string(), 1.2), ("b".to_string(), 0.8)]
            .into_iter()
            .collect();
        let participants: BTreeSet<AgentId> = ["a".to_string()].into_iter().collect();
        manager.settle(&weights, &participants);

        let a = manager.reputation("a").unwrap();
        assert_eq!(a.weight_history, vec![1.2]);
        assert_eq!(a.current_weight, 1.2);
        let b = manager.reputation("b").unwrap();
        assert!(b.weight_history.is_empty());
        assert_eq!(b.current_weight, 0.8);
    }

    #[test]
    fn test_reset_weights_keeps_counters() {
        let mut manager = manager_with(&["a"]);
        manager
            .record_and_update("a", Label::Positive, Label::Positive, 0.9, Label::Positive)
            .unwrap();
        manager.reset_weights(1.0);

        let a = manager.reputation("a").unwrap();
        assert_eq!(a.current_weight, 1.0);
        assert_eq!(a.total_predictions, 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut manager = manager_with(&["a", "b"]);
        manager.reset();
        assert!(manager.is_empty());
        assert!(manager.reputation("a").is_err());
    }
}
