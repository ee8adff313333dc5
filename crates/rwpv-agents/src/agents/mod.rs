//! Built-in classifier agents
//!
//! | Agent            | Model                         | Confidence                    |
//! |------------------|-------------------------------|-------------------------------|
//! | `LinearAgent`    | logistic `σ(w·x + b)`         | `max(p, 1 - p)`               |
//! | `CentroidAgent`  | nearest class centroid        | `d_other / (d_own + d_other)` |
//! | `RemoteAgent`    | HTTP model server             | whatever the server reports   |

mod centroid;
mod linear;
mod remote;

pub use centroid::CentroidAgent;
pub use linear::LinearAgent;
pub use remote::RemoteAgent;

use consensus::AgentError;

/// Reject vectors of the wrong length or with non-finite entries
pub(crate) fn check_features(expected: usize, features: &[f64]) -> Result<(), AgentError> {
    if features.len() != expected {
        return Err(AgentError::InvalidInput(format!(
            "expected {} features, got {}",
            expected,
            features.len()
        )));
    }
    if let Some(i) = features.iter().position(|x| !x.is_finite()) {
        return Err(AgentError::InvalidInput(format!(
            "feature {} is not finite ({})",
            i, features[i]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_features() {
        assert!(check_features(2, &[0.1, 0.2]).is_ok());
        assert!(matches!(
            check_features(3, &[0.1, 0.2]),
            Err(AgentError::InvalidInput(_))
        ));
        assert!(matches!(
            check_features(2, &[0.1, f64::NAN]),
            Err(AgentError::InvalidInput(msg)) if msg.contains("feature 1")
        ));
    }
}
