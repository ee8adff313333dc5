//! Agent collaborator contract
//!
//! Any binary classifier can take part in consensus by implementing
//! [`Agent`]. The engine only ever holds agents behind `Arc<dyn Agent>`;
//! their lifecycle belongs to whoever built them.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::types::{Label, Prediction};

/// Shared reference to an agent
pub type SharedAgent = Arc<dyn Agent>;

/// Trait for classifier agents taking part in consensus
#[async_trait]
pub trait Agent: Send + Sync {
    /// Classify one feature vector
    async fn predict(&self, features: &[f64]) -> Result<Prediction, AgentError>;

    /// Human-readable reasoning for a prediction. Optional.
    async fn explain(&self, _features: &[f64], _predicted_class: Label) -> Option<String> {
        None
    }
}
