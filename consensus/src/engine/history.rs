//! Append-only feedback history
//!
//! One entry per accepted feedback event. Entries are never edited or
//! removed; readers get a copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::types::{Label, VoteSet, WeightMap};

/// Record of one feedback event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub true_label: Label,
    /// Unweighted majority of `votes`
    pub majority_class: Label,
    pub votes: VoteSet,
    /// Renormalized weights of every tracked agent after the update
    pub weights_after: WeightMap,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        true_label: Label,
        majority_class: Label,
        votes: VoteSet,
        weights_after: WeightMap,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            true_label,
            majority_class,
            votes,
            weights_after,
            timestamp: Utc::now(),
        }
    }

    /// Whether the unweighted majority matched the ground truth
    pub fn majority_correct(&self) -> bool {
        self.majority_class == self.true_label
    }
}

/// Append log guarded by its own lock, separate from the weight ledger
#[derive(Debug, Default)]
pub struct FeedbackHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl FeedbackHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, entry: HistoryEntry) {
        self.entries.lock().await.push(entry);
    }

    /// Copy of every entry, oldest first
    pub async fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }

    /// The `limit` most recent entries, oldest first
    pub async fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.lock().await;
        let start = entries.len().saturating_sub(limit);
        entries[start..].to_vec()
    }

    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{vote_set, Vote};

    fn entry(true_label: Label) -> HistoryEntry {
        let votes = vote_set(vec![Vote::new("a", Label::Negative, 0.9)]);
        let weights: WeightMap = [("a".to_string(), 1.0)].into_iter().collect();
        HistoryEntry::new(true_label, Label::Negative, votes, weights)
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let history = FeedbackHistory::new();
        assert_eq!(history.count().await, 0);

        history.append(entry(Label::Negative)).await;
        history.append(entry(Label::Positive)).await;

        let entries = history.snapshot().await;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].majority_correct());
        assert!(!entries[1].majority_correct());
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[tokio::test]
    async fn test_recent_returns_tail() {
        let history = FeedbackHistory::new();
        for _ in 0..5 {
            history.append(entry(Label::Negative)).await;
        }
        history.append(entry(Label::Positive)).await;

        let recent = history.recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].true_label, Label::Positive);
        assert_eq!(history.recent(100).await.len(), 6);
    }
}
