//! Logistic-regression agent

use async_trait::async_trait;
use consensus::{Agent, AgentError, Label, Prediction};
use serde::{Deserialize, Serialize};

use super::check_features;

/// How many features `explain` lists
const TOP_FEATURES: usize = 3;

/// Binary logistic model `p = σ(w·x + b)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearAgent {
    weights: Vec<f64>,
    bias: f64,
    /// Optional names used in explanations, `x{i}` otherwise
    #[serde(default)]
    feature_names: Vec<String>,
}

impl LinearAgent {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self {
            weights,
            bias,
            feature_names: Vec::new(),
        }
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    pub fn dimension(&self) -> usize {
        self.weights.len()
    }

    /// Probability of the positive class
    pub fn probability(&self, features: &[f64]) -> Result<f64, AgentError> {
        check_features(self.weights.len(), features)?;
        let z = self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        Ok(sigmoid(z))
    }

    fn feature_name(&self, index: usize) -> String {
        self.feature_names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("x{}", index))
    }
}

/// Logistic function, split on sign so large |z| does not overflow
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[async_trait]
impl Agent for LinearAgent {
    async fn predict(&self, features: &[f64]) -> Result<Prediction, AgentError> {
        let p = self.probability(features)?;
        let predicted_class = if p >= 0.5 {
            Label::Positive
        } else {
            Label::Negative
        };
        Ok(Prediction::new(predicted_class, p.max(1.0 - p)))
    }

    async fn explain(&self, features: &[f64], predicted_class: Label) -> Option<String> {
        let p = self.probability(features).ok()?;

        let mut contributions: Vec<(usize, f64)> = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .enumerate()
            .collect();
        contributions.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let top: Vec<String> = contributions
            .iter()
            .take(TOP_FEATURES)
            .map(|(i, c)| format!("{}={:+.3}", self.feature_name(*i), c))
            .collect();

        Some(format!(
            "class {} with p(1)={:.3}; top features: {}",
            predicted_class,
            p,
            top.join(", ")
        ))
    }
}
