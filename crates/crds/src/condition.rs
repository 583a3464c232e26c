//! Status conditions
//!
//! Shared condition model used by `ManagedCluster` and `ManifestWork` status.
//! Mirrors the Kubernetes `metav1.Condition` shape.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Condition state is not known
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Wire representation ("True", "False", "Unknown")
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

/// A single status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type, unique within a condition list
    #[serde(rename = "type")]
    pub type_: String,

    /// Condition status
    pub status: ConditionStatus,

    /// Machine-readable reason for the last transition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Create a condition stamped with the current time
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Some(Utc::now()),
        }
    }

    /// Whether `other` carries the same status, reason and message
    #[must_use]
    pub fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Find a condition by type
#[must_use]
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether the condition of the given type exists with status `True`
#[must_use]
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Whether the condition of the given type exists with status `False`
#[must_use]
pub fn is_condition_false(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::False)
}

/// Insert or update a condition, returning whether the list changed.
///
/// `lastTransitionTime` only moves when the status flips. A reason or message
/// change alone keeps the previous transition time.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.same_state(&condition) {
                return false;
            }
            if existing.status != condition.status {
                existing.last_transition_time = condition.last_transition_time.or_else(|| Some(Utc::now()));
            }
            existing.status = condition.status;
            existing.reason = condition.reason;
            existing.message = condition.message;
            true
        }
        None => {
            let mut condition = condition;
            if condition.last_transition_time.is_none() {
                condition.last_transition_time = Some(Utc::now());
            }
            conditions.push(condition);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_condition_inserts_missing_type() {
        let mut conditions = Vec::new();
        let changed = set_condition(
            &mut conditions,
            Condition::new("Available", ConditionStatus::True, "Ready", ""),
        );
        assert!(changed);
        assert!(is_condition_true(&conditions, "Available"));
    }

    #[test]
    fn test_set_condition_same_state_is_noop() {
        let mut conditions = vec![Condition::new("Available", ConditionStatus::False, "Down", "lease expired")];
        let before = conditions.clone();
        let changed = set_condition(
            &mut conditions,
            Condition::new("Available", ConditionStatus::False, "Down", "lease expired"),
        );
        assert!(!changed);
        assert_eq!(conditions, before);
    }

    #[test]
    fn test_set_condition_keeps_transition_time_on_message_change() {
        let earlier = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut conditions = vec![Condition {
            type_: "Available".to_string(),
            status: ConditionStatus::False,
            reason: "Down".to_string(),
            message: "old".to_string(),
            last_transition_time: Some(earlier),
        }];
        assert!(set_condition(
            &mut conditions,
            Condition::new("Available", ConditionStatus::False, "Down", "new"),
        ));
        assert_eq!(conditions[0].message, "new");
        assert_eq!(conditions[0].last_transition_time, Some(earlier));

        assert!(set_condition(
            &mut conditions,
            Condition::new("Available", ConditionStatus::True, "Up", ""),
        ));
        assert_ne!(conditions[0].last_transition_time, Some(earlier));
    }

    #[test]
    fn test_condition_status_wire_format() {
        let condition: Condition = serde_json::from_value(serde_json::json!({
            "type": "ManagedClusterConditionAvailable",
            "status": "Unknown",
            "reason": "ClusterStatusUnknown",
            "message": "",
            "lastTransitionTime": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(condition.status, ConditionStatus::Unknown);
        assert!(!is_condition_false(std::slice::from_ref(&condition), "ManagedClusterConditionAvailable"));
    }
}
