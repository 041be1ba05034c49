//! Status conditions
//!
//! Conditions are keyed by type: a list never holds two entries of the same
//! type, and setting a condition replaces the previous entry of that type.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types reported on a `LandscaperInstance`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    /// All components were applied successfully
    Installed,

    /// All components report ready
    Ready,

    /// All components were removed successfully
    Uninstalled,
}

impl ConditionType {
    /// All condition types, in the order they are initialized.
    pub const ALL: [ConditionType; 3] = [
        ConditionType::Installed,
        ConditionType::Ready,
        ConditionType::Uninstalled,
    ];
}

/// Tri-state condition status, serialized the Kubernetes way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Well-known condition reasons.
pub mod reasons {
    /// Condition has not been evaluated yet
    pub const PENDING: &str = "Pending";
    /// Install of all components succeeded
    pub const INSTALL_SUCCEEDED: &str = "InstallSucceeded";
    /// Install of at least one component failed
    pub const INSTALL_FAILED: &str = "InstallFailed";
    /// At least one component is not ready
    pub const NOT_READY: &str = "ComponentsNotReady";
    /// All components are ready
    pub const READY: &str = "ComponentsReady";
    /// Uninstall of all components succeeded
    pub const UNINSTALL_SUCCEEDED: &str = "UninstallSucceeded";
    /// Uninstall of at least one component failed
    pub const UNINSTALL_FAILED: &str = "UninstallFailed";
}

/// A single status condition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Condition status
    pub status: ConditionStatus,

    /// Generation of the instance this condition was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Machine-readable reason
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the status value changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Creates a condition without a transition time; `set_condition` fills it in.
    pub fn new(
        type_: ConditionType,
        status: ConditionStatus,
        observed_generation: Option<i64>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_,
            status,
            observed_generation,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: None,
        }
    }
}

/// Returns the condition of the given type, if present.
pub fn find_condition(conditions: &[Condition], type_: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Inserts or replaces the condition of the same type.
///
/// The transition time is carried over from the existing entry when the
/// status value did not change, so setting an identical condition twice
/// leaves the list byte-for-byte unchanged.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.or_else(|| Some(Utc::now()))
            } else {
                Some(Utc::now())
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Some(Utc::now());
            conditions.push(condition);
        }
    }
}
