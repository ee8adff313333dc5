//! HTTP model-server agent
//!
//! Request:  `POST <endpoint>` with `{"features": [..]}`
//! Response: `{"predicted_class": 0|1, "confidence": f, "reasoning": "..."?}`

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use consensus::{Agent, AgentError, Label, Prediction};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    features: &'a [f64],
}

#[derive(Debug, Deserialize)]
pub(crate) struct PredictResponse {
    predicted_class: u8,
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Responses that keep their reasoning around for `explain`
const REASONING_CACHE_SIZE: usize = 64;

/// Reasoning of recent responses, keyed by features and predicted class.
///
/// Every response replaces the entry for its features, even without
/// reasoning, so `explain` never pairs old text with a newer prediction.
#[derive(Debug, Default)]
struct ReasoningCache {
    entries: VecDeque<(Vec<f64>, Label, Option<String>)>,
}

impl ReasoningCache {
    fn store(&mut self, features: &[f64], class: Label, reasoning: Option<String>) {
        self.entries.retain(|(seen, _, _)| seen.as_slice() != features);
        self.entries.push_back((features.to_vec(), class, reasoning));
        while self.entries.len() > REASONING_CACHE_SIZE {
            self.entries.pop_front();
        }
    }

    fn lookup(&self, features: &[f64], class: Label) -> Option<String> {
        self.entries
            .iter()
            .find(|(seen, _, _)| seen.as_slice() == features)
            .filter(|(_, seen_class, _)| *seen_class == class)
            .and_then(|(_, _, reasoning)| reasoning.clone())
    }
}

/// Agent backed by a remote model server
pub struct RemoteAgent {
    http: reqwest::Client,
    endpoint: String,
    reasoning: Mutex<ReasoningCache>,
}

impl RemoteAgent {
    /// `timeout` bounds the whole HTTP exchange
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for remote agent")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            reasoning: Mutex::new(ReasoningCache::default()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Turn a decoded server payload into a prediction
pub(crate) fn parse_response(
    response: PredictResponse,
) -> Result<(Prediction, Option<String>), AgentError> {
    let predicted_class = Label::try_from(response.predicted_class)
        .map_err(|e| AgentError::InvalidResponse(e.to_string()))?;
    if !(0.0..=1.0).contains(&response.confidence) {
        return Err(AgentError::InvalidResponse(format!(
            "confidence {} outside [0, 1]",
            response.confidence
        )));
    }
    Ok((
        Prediction::new(predicted_class, response.confidence),
        response.reasoning,
    ))
}

#[async_trait]
impl Agent for RemoteAgent {
    async fn predict(&self, features: &[f64]) -> Result<Prediction, AgentError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&PredictRequest { features })
            .send()
            .await
            .map_err(|e| AgentError::Unavailable(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Unavailable(format!(
                "model server error ({}): {}",
                status, body
            )));
        }

        let payload: PredictResponse = response
            .json()
            .await
            .map_err(|e| AgentError::InvalidResponse(format!("Failed to parse response: {}", e)))?;
        let (prediction, reasoning) = parse_response(payload)?;
        debug!(
            endpoint = %self.endpoint,
            predicted_class = %prediction.predicted_class,
            confidence = prediction.confidence,
            "Remote prediction"
        );

        if let Ok(mut cache) = self.reasoning.lock() {
            cache.store(features, prediction.predicted_class, reasoning);
        }
        Ok(prediction)
    }

    async fn explain(&self, features: &[f64], predicted_class: Label) -> Option<String> {
        let cache = self.reasoning.lock().ok()?;
        cache.lookup(features, predicted_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(raw: &str) -> PredictResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_parse_valid_payload() {
        let (prediction, reasoning) = parse_response(payload(
            r#"{"predicted_class": 1, "confidence": 0.82, "reasoning": "high load"}"#,
        ))
        .unwrap();
        assert_eq!(prediction.predicted_class, Label::Positive);
        assert_eq!(prediction.confidence, 0.82);
        assert_eq!(reasoning.as_deref(), Some("high load"));

        let (prediction, reasoning) =
            parse_response(payload(r#"{"predicted_class": 0, "confidence": 1.0}"#)).unwrap();
        assert_eq!(prediction.predicted_class, Label::Negative);
        assert!(reasoning.is_none());
    }

    #[test]
    fn test_parse_rejects_bad_label() {
        let result = parse_response(payload(r#"{"predicted_class": 2, "confidence": 0.5}"#));
        assert!(matches!(result, Err(AgentError::InvalidResponse(_))));
    }

    #[test]
    fn test_parse_rejects_bad_confidence() {
        let result = parse_response(payload(r#"{"predicted_class": 1, "confidence": 1.7}"#));
        assert!(matches!(result, Err(AgentError::InvalidResponse(msg)) if msg.contains("1.7")));
    }

    #[test]
    fn test_cache_replaces_stale_reasoning() {
        let mut cache = ReasoningCache::default();
        cache.store(&[1.0], Label::Positive, Some("reason for 1".to_string()));
        assert_eq!(cache.lookup(&[1.0], Label::Positive).as_deref(), Some("reason for 1"));

        // Same features, new answer without reasoning
        cache.store(&[1.0], Label::Negative, None);
        assert!(cache.lookup(&[1.0], Label::Negative).is_none());
        assert!(cache.lookup(&[1.0], Label::Positive).is_none());
        assert_eq!(cache.entries.len(), 1);
    }

    #[test]
    fn test_cache_requires_matching_class() {
        let mut cache = ReasoningCache::default();
        cache.store(&[0.5, 0.5], Label::Negative, Some("quiet".to_string()));
        assert!(cache.lookup(&[0.5, 0.5], Label::Positive).is_none());
        assert_eq!(cache.lookup(&[0.5, 0.5], Label::Negative).as_deref(), Some("quiet"));
    }

    #[test]
    fn test_cache_keeps_interleaved_requests_and_evicts_oldest() {
        let mut cache = ReasoningCache::default();
        cache.store(&[1.0], Label::Positive, Some("first".to_string()));
        cache.store(&[2.0], Label::Negative, Some("second".to_string()));
        assert_eq!(cache.lookup(&[1.0], Label::Positive).as_deref(), Some("first"));
        assert_eq!(cache.lookup(&[2.0], Label::Negative).as_deref(), Some("second"));

        for i in 0..REASONING_CACHE_SIZE {
            cache.store(&[10.0 + i as f64], Label::Positive, None);
        }
        assert_eq!(cache.entries.len(), REASONING_CACHE_SIZE);
        assert!(cache.lookup(&[1.0], Label::Positive).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let agent = RemoteAgent::new("http://127.0.0.1:1/predict", Duration::from_secs(2)).unwrap();
        let result = agent.predict(&[0.1, 0.2]).await;
        assert!(matches!(result, Err(AgentError::Unavailable(_))));
        assert!(agent.explain(&[0.1, 0.2], Label::Negative).await.is_none());
    }
}
