//! Controller-specific error types.
//!
//! Errors returned from a reconcile pass are requeued with backoff by the
//! watcher. Not-yet-ready states are never errors; they are recorded as
//! conditions and the pass returns `Ok`.

use crate::manifest::ManifestError;
use hub_client::HubError;
use thiserror::Error;

/// Errors that can occur in the hosted import controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client construction or watch error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Hub API error
    #[error("Hub error: {0}")]
    Hub(#[from] HubError),

    /// Manifest could not be built
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Several independent failures from one pass
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<ControllerError>),

    /// Probe server failure
    #[error("Probe server error: {0}")]
    Probe(#[from] std::io::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

fn join_errors(errors: &[ControllerError]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("[{}]", messages.join(", "))
}

impl ControllerError {
    /// Combine a primary failure with follow-up failures from the same pass
    #[must_use]
    pub fn aggregate(first: ControllerError, rest: Vec<ControllerError>) -> ControllerError {
        if rest.is_empty() {
            return first;
        }
        let mut errors = Vec::with_capacity(rest.len() + 1);
        errors.push(first);
        errors.extend(rest);
        ControllerError::Aggregate(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_keeps_every_message() {
        let err = ControllerError::aggregate(
            ControllerError::Hub(HubError::Api("apply failed".to_string())),
            vec![ControllerError::Hub(HubError::Conflict("secret changed".to_string()))],
        );
        let message = err.to_string();
        assert!(message.contains("apply failed"));
        assert!(message.contains("secret changed"));
    }

    #[test]
    fn test_aggregate_single_is_unwrapped() {
        let err = ControllerError::aggregate(ControllerError::InvalidConfig("x".to_string()), Vec::new());
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
