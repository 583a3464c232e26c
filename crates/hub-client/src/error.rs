//! Hub client errors

use thiserror::Error;

/// Errors that can occur when talking to the hub API server
#[derive(Debug, Error)]
pub enum HubError {
    /// Kubernetes API error not covered by a more specific variant
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// Optimistic concurrency conflict (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// API server rejected the request
    #[error("API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object is missing a field the request needs (name, namespace)
    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl HubError {
    /// Whether the error is an optimistic concurrency conflict
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, HubError::Conflict(_))
    }

    /// Whether the error means the resource does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, HubError::NotFound(_))
    }
}

impl From<kube::Error> for HubError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => HubError::Conflict(ae.message.clone()),
            kube::Error::Api(ae) if ae.code == 404 => HubError::NotFound(ae.message.clone()),
            other => HubError::Kube(other),
        }
    }
}
