//! Constructors for the `Ready` and `Synced` conditions.

use crate::crd::{Condition, ConditionStatus, ConditionType};

pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_CREATING: &str = "Creating";
pub const REASON_DELETING: &str = "Deleting";
pub const REASON_UNAVAILABLE: &str = "Unavailable";
pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";
pub const REASON_REFERENCE_RESOLUTION_ERROR: &str = "ReferenceResolutionError";

fn condition(
    r#type: ConditionType,
    status: ConditionStatus,
    reason: &str,
    message: Option<String>,
) -> Condition {
    Condition {
        r#type,
        status,
        last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        reason: reason.to_string(),
        message,
    }
}

#[must_use]
pub fn available() -> Condition {
    condition(ConditionType::Ready, ConditionStatus::True, REASON_AVAILABLE, None)
}

#[must_use]
pub fn creating() -> Condition {
    condition(ConditionType::Ready, ConditionStatus::False, REASON_CREATING, None)
}

#[must_use]
pub fn deleting() -> Condition {
    condition(ConditionType::Ready, ConditionStatus::False, REASON_DELETING, None)
}

#[must_use]
pub fn unavailable(message: impl Into<String>) -> Condition {
    condition(
        ConditionType::Ready,
        ConditionStatus::False,
        REASON_UNAVAILABLE,
        Some(message.into()),
    )
}

#[must_use]
pub fn reconcile_success() -> Condition {
    condition(
        ConditionType::Synced,
        ConditionStatus::True,
        REASON_RECONCILE_SUCCESS,
        None,
    )
}

#[must_use]
pub fn reconcile_error(reason: &str, message: impl Into<String>) -> Condition {
    condition(
        ConditionType::Synced,
        ConditionStatus::False,
        reason,
        Some(message.into()),
    )
}

/// Whether the `Ready` condition is `True`
#[must_use]
pub fn is_ready(conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .any(|c| c.r#type == ConditionType::Ready && c.status == ConditionStatus::True)
}
