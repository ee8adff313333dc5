//! Consensus engine - orchestrates agents, voting and reputation
//!
//! # Flow
//!
//! ```text
//! predict(features)
//!   ├─ fan out to every agent (concurrent, per-agent timeout)
//!   ├─ failed / timed-out agents → reasoning.excluded
//!   ├─ weight snapshot (read lock)
//!   └─ WeightedVoter::vote → ConsensusResult
//!
//! record_feedback(true_label, votes)          (write lock held throughout)
//!   ├─ unweighted majority
//!   ├─ ReputationManager::record_and_update per voting agent
//!   ├─ renormalize every tracked agent to sum N
//!   └─ append HistoryEntry
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let engine = ConsensusEngine::builder()
//!     .config(EngineConfig::from_env()?)
//!     .agent("linear", linear_agent)
//!     .agent("centroid", centroid_agent)
//!     .build()?
//!     .shared();
//!
//! let result = engine.predict(&features).await?;
//! let weights = engine.record_feedback(Label::Positive, &result.votes).await?;
//! ```

mod history;

pub use history::{FeedbackHistory, HistoryEntry};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{Agent, SharedAgent};
use crate::config::EngineConfig;
use crate::error::{AgentError, ConsensusError, EngineResult, ValidationError};
use crate::reputation::{AgentReputation, AgentStats, RankBy, ReputationManager};
use crate::types::{AgentId, Label, Vote, VoteSet, WeightMap};
use crate::voting::WeightedVoter;
use crate::weights::{assert_consistent, renormalize};

/// Weight every agent returns to on [`ConsensusEngine::reset_weights`]
pub const RESET_WEIGHT: f64 = 1.0;

/// Shared reference to ConsensusEngine
pub type SharedConsensusEngine = Arc<ConsensusEngine>;

/// Per-agent explanations and exclusions for one prediction round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    /// Explanation strings from agents that provide them
    pub per_agent: BTreeMap<AgentId, String>,
    /// Agents left out of the round, with the reason
    pub excluded: BTreeMap<AgentId, String>,
}

/// Result of one consensus prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub id: Uuid,
    pub predicted_class: Label,
    /// Winner's share of the weighted score
    pub confidence: f64,
    /// Whether `confidence` reached the configured threshold
    pub meets_threshold: bool,
    /// Votes of the agents that responded
    pub votes: VoteSet,
    /// Weights of all tracked agents at prediction time
    pub weights: WeightMap,
    pub class_scores: BTreeMap<Label, f64>,
    pub reasoning: Reasoning,
    pub timestamp: DateTime<Utc>,
}

/// Builder for [`ConsensusEngine`]
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    agents: Vec<(AgentId, SharedAgent)>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an agent under `agent_id`
    pub fn agent(self, agent_id: impl Into<AgentId>, agent: impl Agent + 'static) -> Self {
        self.shared_agent(agent_id, Arc::new(agent))
    }

    /// Add an already shared agent under `agent_id`
    pub fn shared_agent(mut self, agent_id: impl Into<AgentId>, agent: SharedAgent) -> Self {
        self.agents.push((agent_id.into(), agent));
        self
    }

    /// Validate the configuration and register every agent
    pub fn build(self) -> EngineResult<ConsensusEngine> {
        self.config.validate()?;
        if self.agents.is_empty() {
            return Err(ConsensusError::Config(
                "at least one agent is required".to_string(),
            ));
        }

        let mut ledger = ReputationManager::new(self.config.policy);
        let mut agents = BTreeMap::new();
        for (agent_id, agent) in self.agents {
            ledger.register(&agent_id, self.config.initial_weight)?;
            agents.insert(agent_id, agent);
        }

        info!(
            agents = agents.len(),
            timeout_ms = self.config.agent_timeout_ms,
            "Consensus engine ready"
        );

        Ok(ConsensusEngine {
            config: self.config,
            agents,
            ledger: RwLock::new(ledger),
            history: FeedbackHistory::new(),
        })
    }
}

/// Reputation-weighted consensus over a fixed set of agents
pub struct ConsensusEngine {
    config: EngineConfig,
    agents: BTreeMap<AgentId, SharedAgent>,
    ledger: RwLock<ReputationManager>,
    history: FeedbackHistory,
}

impl ConsensusEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Create a shared reference to this engine
    pub fn shared(self) -> SharedConsensusEngine {
        Arc::new(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered agent ids, ascending
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.keys().cloned().collect()
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Ask every agent and combine their votes.
    ///
    /// Agents that fail, time out or return an out-of-range confidence are
    /// left out and listed in `reasoning.excluded`. Never mutates weights.
    pub async fn predict(&self, features: &[f64]) -> EngineResult<ConsensusResult> {
        if features.is_empty() {
            return Err(ValidationError::EmptyFeatures.into());
        }

        let timeout = self.config.agent_timeout();
        let calls = self.agents.iter().map(|(agent_id, agent)| async move {
            let outcome = match tokio::time::timeout(timeout, agent.predict(features)).await {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(timeout.as_millis() as u64)),
            };
            (agent_id, agent, outcome)
        });
        let responses = join_all(calls).await;

        let mut votes = VoteSet::new();
        let mut responders = Vec::new();
        let mut reasoning = Reasoning::default();

        for (agent_id, agent, outcome) in responses {
            let vote = outcome.and_then(|prediction| {
                let vote = Vote::from_prediction(agent_id.clone(), prediction);
                vote.validate()
                    .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
                Ok(vote)
            });

            match vote {
                Ok(vote) => {
                    debug!(
                        agent_id = %agent_id,
                        predicted_class = %vote.predicted_class,
                        confidence = vote.confidence,
                        "Vote received"
                    );
                    responders.push((agent_id, agent, vote.predicted_class));
                    votes.insert(agent_id.clone(), vote);
                }
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Agent excluded from round");
                    reasoning.excluded.insert(agent_id.clone(), e.to_string());
                }
            }
        }

        if votes.is_empty() {
            warn!(excluded = reasoning.excluded.len(), "No agent produced a vote");
            return Err(ConsensusError::NoVotes {
                excluded: reasoning.excluded.len(),
            });
        }

        let snapshot = self.ledger.read().await.weights();
        let round_weights: WeightMap = votes
            .keys()
            .filter_map(|id| snapshot.get(id).map(|w| (id.clone(), *w)))
            .collect();

        let voting = WeightedVoter::vote(&votes, &round_weights)?;
        let (_, meets_threshold) = WeightedVoter::consensus_confidence(
            &voting.class_scores,
            self.config.consensus_threshold,
        );

        let explanations = responders.into_iter().map(|(agent_id, agent, class)| async move {
            let explanation = tokio::time::timeout(timeout, agent.explain(features, class))
                .await
                .ok()
                .flatten();
            (agent_id, explanation)
        });
        for (agent_id, explanation) in join_all(explanations).await {
            if let Some(text) = explanation {
                reasoning.per_agent.insert(agent_id.clone(), text);
            }
        }

        info!(
            predicted_class = %voting.predicted_class,
            confidence = voting.confidence,
            voters = votes.len(),
            excluded = reasoning.excluded.len(),
            "Consensus reached"
        );

        Ok(ConsensusResult {
            id: Uuid::new_v4(),
            predicted_class: voting.predicted_class,
            confidence: voting.confidence,
            meets_threshold,
            votes,
            weights: snapshot,
            class_scores: voting.class_scores,
            reasoning,
            timestamp: Utc::now(),
        })
    }

    /// Predict each sample in turn. The first error aborts the batch.
    pub async fn predict_batch(&self, samples: &[Vec<f64>]) -> EngineResult<Vec<ConsensusResult>> {
        let mut results = Vec::with_capacity(samples.len());
        for features in samples {
            results.push(self.predict(features).await?);
        }
        Ok(results)
    }

    // =========================================================================
    // Feedback
    // =========================================================================

    /// Apply ground truth to a set of votes and return the renormalized weights.
    ///
    /// Every vote must come from a registered agent. Invalid input is rejected
    /// before anything is touched.
    pub async fn record_feedback(
        &self,
        true_label: Label,
        votes: &VoteSet,
    ) -> EngineResult<WeightMap> {
        if votes.is_empty() {
            return Err(ValidationError::EmptyVotes.into());
        }
        for (agent_id, vote) in votes {
            if !self.agents.contains_key(agent_id) {
                return Err(ValidationError::UnknownAgent(agent_id.clone()).into());
            }
            vote.validate()?;
        }
        let majority_class = WeightedVoter::majority_class(votes)?;

        let mut ledger = self.ledger.write().await;
        for (agent_id, vote) in votes {
            ledger.record_and_update(
                agent_id,
                vote.predicted_class,
                true_label,
                vote.confidence,
                majority_class,
            )?;
        }

        let policy = *ledger.policy();
        let mut weights = ledger.weights();
        renormalize(&mut weights, &policy);
        assert_consistent(&weights, &policy);

        let participants: BTreeSet<AgentId> = votes.keys().cloned().collect();
        ledger.settle(&weights, &participants);

        self.history
            .append(HistoryEntry::new(
                true_label,
                majority_class,
                votes.clone(),
                weights.clone(),
            ))
            .await;
        drop(ledger);

        info!(
            true_label = %true_label,
            majority_class = %majority_class,
            voters = votes.len(),
            "Feedback applied"
        );

        Ok(weights)
    }

    // =========================================================================
    // Queries and operator controls
    // =========================================================================

    /// Current weight of every tracked agent
    pub async fn weights(&self) -> WeightMap {
        self.ledger.read().await.weights()
    }

    pub async fn reputations(&self) -> BTreeMap<AgentId, AgentReputation> {
        self.ledger.read().await.all()
    }

    pub async fn reputation(&self, agent_id: &str) -> EngineResult<AgentReputation> {
        Ok(self.ledger.read().await.reputation(agent_id)?)
    }

    pub async fn agent_stats(&self, agent_id: &str) -> EngineResult<AgentStats> {
        Ok(self.ledger.read().await.stats(agent_id)?)
    }

    pub async fn rank(&self, by: RankBy) -> Vec<(AgentId, f64)> {
        self.ledger.read().await.rank(by)
    }

    /// Every feedback event so far, oldest first
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.snapshot().await
    }

    /// The `limit` most recent feedback events, oldest first
    pub async fn recent_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.recent(limit).await
    }

    /// Number of feedback events recorded
    pub async fn history_len(&self) -> usize {
        self.history.count().await
    }

    /// Put every agent back at weight 1.0. Counters are kept.
    ///
    /// Always 1.0 regardless of `initial_weight`, so the total is N again.
    pub async fn reset_weights(&self) {
        self.ledger.write().await.reset_weights(RESET_WEIGHT);
        info!(weight = RESET_WEIGHT, "Weights reset");
    }

    /// Manually override one agent's weight (clamped into bounds)
    pub async fn set_weight(&self, agent_id: &str, value: f64) -> EngineResult<f64> {
        let weight = self.ledger.write().await.set_weight(agent_id, value)?;
        info!(agent_id, requested = value, weight, "Weight set manually");
        Ok(weight)
    }

    /// Clear all reputation counters and re-register every agent
    pub async fn reset_reputations(&self) -> EngineResult<()> {
        let mut ledger = self.ledger.write().await;
        ledger.reset();
        for agent_id in self.agents.keys() {
            ledger.register(agent_id, self.config.initial_weight)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Prediction;
    use async_trait::async_trait;

    struct Fixed(Label, f64);

    #[async_trait]
    impl Agent for Fixed {
        async fn predict(&self, _features: &[f64]) -> Result<Prediction, AgentError> {
            Ok(Prediction::new(self.0, self.1))
        }
    }

    fn engine() -> ConsensusEngine {
        ConsensusEngine::builder()
            .agent("a", Fixed(Label::Negative, 0.9))
            .agent("b", Fixed(Label::Negative, 0.8))
            .agent("c", Fixed(Label::Positive, 0.7))
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_agents() {
        let result = ConsensusEngine::builder().build();
        assert!(matches!(result, Err(ConsensusError::Config(_))));
    }

    #[test]
    fn test_build_rejects_duplicate_ids() {
        let result = ConsensusEngine::builder()
            .agent("a", Fixed(Label::Negative, 0.9))
            .agent("a", Fixed(Label::Positive, 0.9))
            .build();
        assert!(matches!(result, Err(ConsensusError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_initial_weights_equal() {
        let engine = engine();
        let weights = engine.weights().await;
        assert_eq!(weights.len(), 3);
        assert!(weights.values().all(|w| *w == 1.0));
    }

    #[tokio::test]
    async fn test_predict_does_not_touch_weights() {
        let engine = engine();
        let before = engine.weights().await;
        let result = engine.predict(&[0.0, 1.0]).await.unwrap();
        assert_eq!(result.predicted_class, Label::Negative);
        assert_eq!(engine.weights().await, before);
        assert!(engine.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_features_rejected() {
        let engine = engine();
        let result = engine.predict(&[]).await;
        assert!(matches!(
            result,
            Err(ConsensusError::Validation(ValidationError::EmptyFeatures))
        ));
    }

    #[tokio::test]
    async fn test_reset_reputations_restores_fresh_state() {
        let engine = engine();
        let result = engine.predict(&[1.0]).await.unwrap();
        engine
            .record_feedback(Label::Positive, &result.votes)
            .await
            .unwrap();

        engine.reset_reputations().await.unwrap();
        let reps = engine.reputations().await;
        assert_eq!(reps.len(), 3);
        assert!(reps.values().all(|r| r.total_predictions == 0));
        assert!(reps.values().all(|r| r.current_weight == 1.0));
        // history is append-only
        assert_eq!(engine.history().await.len(), 1);
    }
}
