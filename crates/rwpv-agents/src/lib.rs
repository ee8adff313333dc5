//! Classifier agents and tooling around the `consensus` engine
//!
//! - [`agents`]: logistic, nearest-centroid and HTTP-backed agents
//! - [`roster`]: TOML roster that declares the engine and its agents
//! - [`replay`]: run labelled samples through predict + feedback

pub mod agents;
pub mod replay;
pub mod roster;

pub use agents::{CentroidAgent, LinearAgent, RemoteAgent};
pub use replay::{load_samples, read_samples, replay, LabelledSample, ReplayReport};
pub use roster::{AgentEntry, AgentKind, AgentRoster};
