//! Agent roster - TOML description of an engine and its agents
//!
//! ```toml
//! [engine]
//! agent_timeout_ms = 1500
//!
//! [engine.policy]
//! reward_minority = 1.2
//!
//! [[agents]]
//! id = "logit"
//! kind = "linear"
//! weights = [0.8, -1.2]
//! bias = 0.1
//!
//! [[agents]]
//! id = "centroid"
//! kind = "centroid"
//! negative = [0.0, 0.0]
//! positive = [1.0, 1.0]
//!
//! # Centroids fitted from labelled JSONL samples instead
//! [[agents]]
//! id = "fitted"
//! kind = "centroid"
//! samples = "train.jsonl"
//!
//! [[agents]]
//! id = "server"
//! kind = "remote"
//! endpoint = "http://127.0.0.1:9000/predict"
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use consensus::{ConsensusEngine, EngineConfig, SharedAgent};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::{CentroidAgent, LinearAgent, RemoteAgent};
use crate::replay::load_samples;

/// One `[[agents]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    #[serde(flatten)]
    pub kind: AgentKind,
}

/// Agent model selected by the `kind` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentKind {
    Linear {
        weights: Vec<f64>,
        #[serde(default)]
        bias: f64,
        #[serde(default)]
        feature_names: Vec<String>,
    },
    /// Explicit centroids, or `samples` to fit them from a JSONL file
    Centroid {
        #[serde(default)]
        negative: Vec<f64>,
        #[serde(default)]
        positive: Vec<f64>,
        #[serde(default)]
        samples: Option<PathBuf>,
    },
    Remote {
        endpoint: String,
        /// HTTP timeout, defaults to the engine's per-agent timeout
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
}

impl AgentKind {
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::Linear { .. } => "linear",
            AgentKind::Centroid { .. } => "centroid",
            AgentKind::Remote { .. } => "remote",
        }
    }
}

/// Engine settings plus the agents to register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRoster {
    #[serde(default)]
    pub engine: EngineConfig,
    pub agents: Vec<AgentEntry>,
}

impl AgentRoster {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let roster: Self = toml::from_str(raw).context("Failed to parse agent roster")?;
        roster.validate()?;
        Ok(roster)
    }

    /// Read a roster file and apply `RWPV_*` overrides to its engine section
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read agent roster {}", path.display()))?;
        let mut roster = Self::from_toml_str(&raw)
            .with_context(|| format!("Invalid agent roster {}", path.display()))?;
        roster
            .engine
            .apply_env_overrides()
            .context("Invalid RWPV_* environment override")?;
        Ok(roster)
    }

    /// Check ids are unique and the engine section is usable
    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            bail!("roster defines no agents");
        }
        let mut seen = BTreeSet::new();
        for entry in &self.agents {
            if entry.id.trim().is_empty() {
                bail!("agent id must not be empty");
            }
            if !seen.insert(entry.id.as_str()) {
                bail!("duplicate agent id: {}", entry.id);
            }
        }
        self.engine.validate()?;
        Ok(())
    }

    /// Instantiate every agent and build the engine
    pub fn build_engine(&self) -> Result<ConsensusEngine> {
        let mut builder = ConsensusEngine::builder().config(self.engine.clone());
        for entry in &self.agents {
            let agent = self
                .build_agent(entry)
                .with_context(|| format!("Failed to build agent {}", entry.id))?;
            info!(agent_id = %entry.id, kind = entry.kind.name(), "Agent configured");
            builder = builder.shared_agent(entry.id.clone(), agent);
        }
        Ok(builder.build()?)
    }

    fn build_agent(&self, entry: &AgentEntry) -> Result<SharedAgent> {
        let agent: SharedAgent = match &entry.kind {
            AgentKind::Linear {
                weights,
                bias,
                feature_names,
            } => {
                if weights.is_empty() {
                    bail!("linear agent needs at least one weight");
                }
                Arc::new(
                    LinearAgent::new(weights.clone(), *bias)
                        .with_feature_names(feature_names.clone()),
                )
            }
            AgentKind::Centroid {
                negative,
                positive,
                samples: Some(path),
            } => {
                if !negative.is_empty() || !positive.is_empty() {
                    bail!("centroid agent takes either centroids or samples, not both");
                }
                Arc::new(fit_centroids(path)?)
            }
            AgentKind::Centroid {
                negative,
                positive,
                samples: None,
            } => Arc::new(CentroidAgent::new(negative.clone(), positive.clone())?),
            AgentKind::Remote {
                endpoint,
                timeout_ms,
            } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| self.engine.agent_timeout());
                Arc::new(RemoteAgent::new(endpoint.clone(), timeout)?)
            }
        };
        Ok(agent)
    }
}

fn fit_centroids(path: &Path) -> Result<CentroidAgent> {
    let training: Vec<_> = load_samples(path)?
        .into_iter()
        .map(|sample| (sample.features, sample.label))
        .collect();
    let agent = CentroidAgent::fit(&training)
        .with_context(|| format!("Failed to fit centroids from {}", path.display()))?;
    info!(samples = training.len(), path = %path.display(), "Centroids fitted");
    Ok(agent)
}
