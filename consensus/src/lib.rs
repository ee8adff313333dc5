//! Reputation-Weighted Proposer-Voter (RWPV) consensus
//!
//! This library provides:
//! - Weighted voting over binary class votes from independent agents
//! - Per-agent reputation tracking with a four-bucket reward/penalty rule
//! - A consensus engine that fans out to agents concurrently, combines their
//!   votes and renormalizes weights on feedback
//!
//! # Components
//!
//! - **WeightedVoter**: pure `weight * confidence` scoring with a
//!   deterministic lower-label tie-break
//! - **ReputationManager**: counters, weight history and the reward rule
//! - **ConsensusEngine**: agent fan-out, weight snapshots, feedback and the
//!   append-only history
//!
//! # Usage
//!
//! ```ignore
//! use consensus::{ConsensusEngine, EngineConfig, Label};
//!
//! let engine = ConsensusEngine::builder()
//!     .config(EngineConfig::default())
//!     .agent("lr", logistic)
//!     .agent("nb", bayes)
//!     .build()?;
//!
//! let result = engine.predict(&features).await?;
//! engine.record_feedback(Label::Positive, &result.votes).await?;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod reputation;
pub mod types;
pub mod voting;
pub mod weights;

pub use agent::{Agent, SharedAgent};
pub use config::{EngineConfig, RewardPolicy};
pub use engine::{
    ConsensusEngine, ConsensusResult, EngineBuilder, FeedbackHistory, HistoryEntry, Reasoning,
    SharedConsensusEngine,
};
pub use error::{AgentError, ConsensusError, EngineResult, ValidationError};
pub use reputation::{
    AgentReputation, AgentStats, Outcome, RankBy, ReputationManager, WeightTrend,
};
pub use types::{vote_set, AgentId, Label, Prediction, Vote, VoteSet, WeightMap};
pub use voting::{VotingResult, WeightedVoter};
