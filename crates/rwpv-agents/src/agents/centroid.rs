//! Nearest-centroid agent

use async_trait::async_trait;
use consensus::{Agent, AgentError, Label, Prediction};
use serde::{Deserialize, Serialize};

use super::check_features;

/// Classifies by distance to one centroid per class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidAgent {
    negative: Vec<f64>,
    positive: Vec<f64>,
}

impl CentroidAgent {
    pub fn new(negative: Vec<f64>, positive: Vec<f64>) -> Result<Self, AgentError> {
        if negative.is_empty() || negative.len() != positive.len() {
            return Err(AgentError::InvalidInput(format!(
                "centroids must be non-empty and equal length, got {} and {}",
                negative.len(),
                positive.len()
            )));
        }
        Ok(Self { negative, positive })
    }

    /// Centroids as the per-class mean of labelled samples
    pub fn fit(samples: &[(Vec<f64>, Label)]) -> Result<Self, AgentError> {
        let dimension = samples
            .first()
            .map(|(x, _)| x.len())
            .ok_or_else(|| AgentError::InvalidInput("no training samples".to_string()))?;

        let mut sums = [vec![0.0; dimension], vec![0.0; dimension]];
        let mut counts = [0usize; 2];
        for (features, label) in samples {
            check_features(dimension, features)?;
            let slot = match label {
                Label::Negative => 0,
                Label::Positive => 1,
            };
            for (sum, x) in sums[slot].iter_mut().zip(features) {
                *sum += x;
            }
            counts[slot] += 1;
        }

        if counts.contains(&0) {
            return Err(AgentError::InvalidInput(
                "training samples must cover both classes".to_string(),
            ));
        }

        let [negative, positive] = sums;
        let mean = |sum: Vec<f64>, count: usize| -> Vec<f64> {
            sum.into_iter().map(|s| s / count as f64).collect()
        };
        Self::new(mean(negative, counts[0]), mean(positive, counts[1]))
    }

    /// Distances to the negative and positive centroids
    pub fn distances(&self, features: &[f64]) -> Result<(f64, f64), AgentError> {
        check_features(self.negative.len(), features)?;
        Ok((
            euclidean(&self.negative, features),
            euclidean(&self.positive, features),
        ))
    }
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

#[async_trait]
impl Agent for CentroidAgent {
    async fn predict(&self, features: &[f64]) -> Result<Prediction, AgentError> {
        let (d_negative, d_positive) = self.distances(features)?;

        // Equidistant points go to the lower label
        let (predicted_class, d_own, d_other) = if d_positive < d_negative {
            (Label::Positive, d_positive, d_negative)
        } else {
            (Label::Negative, d_negative, d_positive)
        };

        let total = d_own + d_other;
        let confidence = if total > 0.0 { d_other / total } else { 0.5 };
        Ok(Prediction::new(predicted_class, confidence))
    }

    async fn explain(&self, features: &[f64], predicted_class: Label) -> Option<String> {
        let (d_negative, d_positive) = self.distances(features).ok()?;
        Some(format!(
            "class {}: distance to centroid 0 is {:.3}, to centroid 1 is {:.3}",
            predicted_class, d_negative, d_positive
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> CentroidAgent {
        CentroidAgent::new(vec![0.0, 0.0], vec![4.0, 0.0]).unwrap()
    }

    #[tokio::test]
    async fn test_nearest_centroid_wins() {
        let prediction = agent().predict(&[1.0, 0.0]).await.unwrap();
        assert_eq!(prediction.predicted_class, Label::Negative);
        // d_own = 1, d_other = 3
        assert_eq!(prediction.confidence, 0.75);

        let prediction = agent().predict(&[4.0, 0.0]).await.unwrap();
        assert_eq!(prediction.predicted_class, Label::Positive);
        assert_eq!(prediction.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_equidistant_point() {
        let prediction = agent().predict(&[2.0, 5.0]).await.unwrap();
        assert_eq!(prediction.predicted_class, Label::Negative);
        assert_eq!(prediction.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_coincident_centroids_give_half_confidence() {
        let agent = CentroidAgent::new(vec![1.0], vec![1.0]).unwrap();
        let prediction = agent.predict(&[1.0]).await.unwrap();
        assert_eq!(prediction.confidence, 0.5);
    }

    #[test]
    fn test_new_rejects_mismatched_centroids() {
        assert!(CentroidAgent::new(vec![0.0], vec![0.0, 1.0]).is_err());
        assert!(CentroidAgent::new(vec![], vec![]).is_err());
    }

    #[test]
    fn test_fit_averages_each_class() {
        let samples = vec![
            (vec![0.0, 2.0], Label::Negative),
            (vec![2.0, 0.0], Label::Negative),
            (vec![5.0, 5.0], Label::Positive),
        ];
        let agent = CentroidAgent::fit(&samples).unwrap();
        assert_eq!(agent, CentroidAgent::new(vec![1.0, 1.0], vec![5.0, 5.0]).unwrap());

        let one_class = vec![(vec![0.0], Label::Positive)];
        assert!(CentroidAgent::fit(&one_class).is_err());
        assert!(CentroidAgent::fit(&[]).is_err());
    }

    #[tokio::test]
    async fn test_wrong_dimension() {
        let result = agent().predict(&[1.0]).await;
        assert!(matches!(result, Err(AgentError::InvalidInput(_))));
    }
}
