//! Kubernetes Events emitted by the controller

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Routine, informational
    Normal,
    /// Something an operator should look at
    Warning,
}

/// A Kubernetes Event about a hub resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubEvent {
    pub kind: EventKind,
    /// Machine-readable reason (e.g. "ManifestWorkCreated")
    pub reason: String,
    /// Action taken (e.g. "Reconcile")
    pub action: String,
    pub note: Option<String>,
}

impl HubEvent {
    /// Normal event
    pub fn normal(reason: impl Into<String>, action: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.into(),
            action: action.into(),
            note: Some(note.into()),
        }
    }

    /// Warning event
    pub fn warning(reason: impl Into<String>, action: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.into(),
            action: action.into(),
            note: Some(note.into()),
        }
    }
}
