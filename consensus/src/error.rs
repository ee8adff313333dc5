//! Error types for the consensus engine
//!
//! Validation errors come from caller misuse and never mutate state.
//! `NoVotes` comes from collaborator failures. Agent-side failures are
//! [`AgentError`] and are absorbed by the engine unless no agent responds.

use crate::types::AgentId;

/// Caller-side input errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Vote set is empty")]
    EmptyVotes,

    #[error("Agent sets differ: missing weights for {missing:?}, weights without votes for {unexpected:?}")]
    AgentSetMismatch {
        missing: Vec<AgentId>,
        unexpected: Vec<AgentId>,
    },

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Invalid confidence {value} from agent {agent_id}")]
    InvalidConfidence { agent_id: AgentId, value: f64 },

    #[error("Invalid weight {value} for agent {agent_id}")]
    InvalidWeight { agent_id: AgentId, value: f64 },

    #[error("Invalid class label: {0} (expected 0 or 1)")]
    InvalidLabel(u8),

    #[error("Feature vector is empty")]
    EmptyFeatures,
}

/// Error type for engine and reputation operations
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("No agent produced a usable vote ({excluded} excluded)")]
    NoVotes { excluded: usize },

    #[error("Agent already registered: {0}")]
    AlreadyExists(AgentId),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, ConsensusError>;

/// Error returned by an agent collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}
