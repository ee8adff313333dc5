//! Weight renormalization
//!
//! After a feedback round every tracked agent's weight is rescaled so the
//! total equals the number of agents. Weights that a plain rescale would push
//! outside `[weight_min, weight_max]` are pinned at the bound and the rest is
//! rescaled again, until nothing moves. With `weight_min <= 1 <= weight_max`
//! (enforced by [`RewardPolicy::validate`]) this always terminates with a
//! total of exactly N.

use tracing::{debug, error};

use crate::config::RewardPolicy;
use crate::types::WeightMap;

/// Relative tolerance on the `sum == N` post-condition
pub const SUM_TOLERANCE: f64 = 1e-9;

/// Slack allowed on the bounds post-condition
const BOUND_TOLERANCE: f64 = 1e-12;

/// Rescale `weights` in place to sum to `weights.len()` within the policy bounds
pub fn renormalize(weights: &mut WeightMap, policy: &RewardPolicy) {
    let n = weights.len();
    if n == 0 {
        return;
    }
    let target = n as f64;

    let mut pinned = vec![false; n];
    // Each pass pins at least one agent or finishes
    for pass in 0..=n {
        let pinned_sum: f64 = weights
            .values()
            .zip(&pinned)
            .filter(|(_, p)| **p)
            .map(|(w, _)| *w)
            .sum();
        let free_sum: f64 = weights
            .values()
            .zip(&pinned)
            .filter(|(_, p)| !**p)
            .map(|(w, _)| *w)
            .sum();

        if free_sum <= 0.0 {
            break;
        }
        let scale = (target - pinned_sum) / free_sum;

        let mut newly_pinned = 0;
        for (weight, is_pinned) in weights.values_mut().zip(pinned.iter_mut()) {
            if *is_pinned {
                continue;
            }
            let scaled = *weight * scale;
            if scaled > policy.weight_max {
                *weight = policy.weight_max;
                *is_pinned = true;
                newly_pinned += 1;
            } else if scaled < policy.weight_min {
                *weight = policy.weight_min;
                *is_pinned = true;
                newly_pinned += 1;
            } else {
                *weight = scaled;
            }
        }

        if newly_pinned == 0 {
            debug!(pass, scale, "Weights renormalized");
            break;
        }
    }
}

/// Check the post-renormalization invariants.
///
/// # Panics
///
/// Panics if any weight is outside the policy bounds or the total differs
/// from `weights.len()`. Either means the update logic is broken.
pub fn assert_consistent(weights: &WeightMap, policy: &RewardPolicy) {
    for (agent_id, weight) in weights {
        if !weight.is_finite()
            || *weight < policy.weight_min - BOUND_TOLERANCE
            || *weight > policy.weight_max + BOUND_TOLERANCE
        {
            error!(agent_id = %agent_id, weight, "Weight outside bounds after renormalization");
            panic!(
                "internal consistency fault: weight {} for agent {} outside [{}, {}]",
                weight, agent_id, policy.weight_min, policy.weight_max
            );
        }
    }

    let n = weights.len() as f64;
    let total: f64 = weights.values().sum();
    if (total - n).abs() > SUM_TOLERANCE * n.max(1.0) {
        error!(total, n, "Weight total drifted after renormalization");
        panic!(
            "internal consistency fault: weights sum to {} for {} agents",
            total, n
        );
    }
}
