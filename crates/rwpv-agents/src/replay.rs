//! Replay labelled samples through an engine
//!
//! Each sample is predicted, then its label is fed back with the round's
//! votes, so weights evolve exactly as they would online. Rounds where no
//! agent answers are skipped.

use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use anyhow::{Context, Result};
use consensus::{AgentId, AgentStats, ConsensusEngine, ConsensusError, Label, RankBy, WeightMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One JSONL line: `{"features": [..], "label": 0|1}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledSample {
    pub features: Vec<f64>,
    pub label: Label,
}

/// Outcome of a replay run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub samples: usize,
    /// Rounds where every agent failed
    pub skipped: usize,
    pub correct: usize,
    /// `correct / (samples - skipped)`, `0` when nothing was scored
    pub accuracy: f64,
    /// Rounds whose confidence fell below the consensus threshold
    pub below_threshold: usize,
    pub final_weights: WeightMap,
    /// Agents by accuracy, best first
    pub ranking: Vec<(AgentId, f64)>,
    pub agents: BTreeMap<AgentId, AgentStats>,
}

/// Parse JSONL samples, ignoring blank lines
pub fn read_samples(reader: impl BufRead) -> Result<Vec<LabelledSample>> {
    let mut samples = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let sample: LabelledSample = serde_json::from_str(&line)
            .with_context(|| format!("Invalid sample on line {}", index + 1))?;
        samples.push(sample);
    }
    Ok(samples)
}

pub fn load_samples(path: impl AsRef<Path>) -> Result<Vec<LabelledSample>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open samples file {}", path.display()))?;
    read_samples(std::io::BufReader::new(file))
}

/// Predict and feed back every sample in order
pub async fn replay(engine: &ConsensusEngine, samples: &[LabelledSample]) -> Result<ReplayReport> {
    let mut skipped = 0;
    let mut correct = 0;
    let mut below_threshold = 0;

    for (index, sample) in samples.iter().enumerate() {
        let result = match engine.predict(&sample.features).await {
            Ok(result) => result,
            Err(ConsensusError::NoVotes { excluded }) => {
                warn!(sample = index, excluded, "Skipping sample, no agent voted");
                skipped += 1;
                continue;
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Prediction failed for sample {}", index));
            }
        };

        if result.predicted_class == sample.label {
            correct += 1;
        }
        if !result.meets_threshold {
            below_threshold += 1;
        }

        engine
            .record_feedback(sample.label, &result.votes)
            .await
            .with_context(|| format!("Feedback failed for sample {}", index))?;
        debug!(
            sample = index,
            predicted = %result.predicted_class,
            truth = %sample.label,
            "Sample replayed"
        );
    }

    let scored = samples.len() - skipped;
    let accuracy = if scored > 0 {
        correct as f64 / scored as f64
    } else {
        0.0
    };

    let mut agents = BTreeMap::new();
    for agent_id in engine.agent_ids() {
        let stats = engine.agent_stats(&agent_id).await?;
        agents.insert(agent_id, stats);
    }

    info!(samples = samples.len(), skipped, accuracy, "Replay finished");

    Ok(ReplayReport {
        samples: samples.len(),
        skipped,
        correct,
        accuracy,
        below_threshold,
        final_weights: engine.weights().await,
        ranking: engine.rank(RankBy::Accuracy).await,
        agents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_samples_skips_blank_lines() {
        let raw = concat!(
            "{\"features\": [0.1, 0.2], \"label\": 1}\n",
            "\n",
            "{\"features\": [0.3], \"label\": 0}\n",
        );
        let samples = read_samples(raw.as_bytes()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, Label::Positive);
        assert_eq!(samples[1].features, vec![0.3]);
    }

    #[test]
    fn test_read_samples_reports_line() {
        let raw = "{\"features\": [0.1], \"label\": 1}\n{\"features\": [0.1], \"label\": 7}\n";
        let err = read_samples(raw.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
