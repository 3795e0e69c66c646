//! # Batch Adapters
//!
//! - `compute_environment.rs` - `ComputeEnvironment`
//! - `job_queue.rs` - `JobQueue`
//! - `job_definition.rs` - `JobDefinition`
//! - `job.rs` - `Job`
//!
//! Compute environments and job queues must be `DISABLED` before AWS lets
//! them go. [`delete_gate`] turns their observed state into the next step of
//! that dance.

pub mod compute_environment;
pub mod job;
pub mod job_definition;
pub mod job_queue;

pub use compute_environment::ComputeEnvironmentHooks;
pub use job::JobHooks;
pub use job_definition::JobDefinitionHooks;
pub use job_queue::JobQueueHooks;

use crate::crd::{Condition, Tag};
use crate::managed::conditions;
use crate::managed::tags::diff_tags;
use crate::provider::batch::BatchApi;
use crate::provider::AwsError;
use std::collections::BTreeMap;

pub const STATE_ENABLED: &str = "ENABLED";
pub const STATE_DISABLED: &str = "DISABLED";

/// `Ready` for a compute environment or job queue status
#[must_use]
pub fn status_condition(status: Option<&str>, reason: Option<&str>) -> Condition {
    match status.unwrap_or_default() {
        "VALID" | "UPDATING" => conditions::available(),
        "CREATING" => conditions::creating(),
        "DELETING" | "DELETED" => conditions::deleting(),
        "INVALID" => conditions::unavailable(reason.unwrap_or("INVALID")),
        "" => conditions::unavailable("status not reported"),
        other => conditions::unavailable(other),
    }
}

/// AWS rejects updates while a change is in flight
#[must_use]
pub fn is_transitioning(status: Option<&str>) -> bool {
    matches!(status, Some("CREATING" | "UPDATING" | "DELETING"))
}

/// Next step when deleting a compute environment or job queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteGate {
    /// Still enabled: switch to `DISABLED` and come back later
    Disable,
    /// A state change or deletion is in flight
    Wait,
    /// Disabled and settled
    Delete,
}

#[must_use]
pub fn delete_gate(state: Option<&str>, status: Option<&str>) -> DeleteGate {
    if is_transitioning(status) {
        return DeleteGate::Wait;
    }
    if state == Some(STATE_DISABLED) {
        DeleteGate::Delete
    } else {
        DeleteGate::Disable
    }
}

pub(crate) fn observed_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter().map(|(k, v)| Tag::new(k, v)).collect()
}

/// Bring the tags on `arn` in line with `desired`
pub(crate) async fn sync_tags(
    batch: &dyn BatchApi,
    arn: &str,
    desired: &[Tag],
    observed: &BTreeMap<String, String>,
) -> Result<(), AwsError> {
    let diff = diff_tags(desired, &observed_tags(observed));
    let stale: Vec<String> = diff
        .remove
        .into_iter()
        .filter(|k| !diff.add.iter().any(|t| &t.key == k))
        .collect();
    if !stale.is_empty() {
        batch.untag_resource(arn, &stale).await?;
    }
    // TagResource overwrites existing values
    if !diff.add.is_empty() {
        batch.tag_resource(arn, &diff.add).await?;
    }
    Ok(())
}

/// Set equality for desired lists; an empty desired list accepts anything
pub(crate) fn same_set(desired: &[String], observed: &[String]) -> bool {
    if desired.is_empty() {
        return true;
    }
    let mut a: Vec<&str> = desired.iter().map(String::as_str).collect();
    let mut b: Vec<&str> = observed.iter().map(String::as_str).collect();
    a.sort_unstable();
    a.dedup();
    b.sort_unstable();
    b.dedup();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConditionStatus;

    #[test]
    fn test_delete_gate() {
        assert_eq!(delete_gate(Some("ENABLED"), Some("VALID")), DeleteGate::Disable);
        assert_eq!(delete_gate(Some("ENABLED"), Some("UPDATING")), DeleteGate::Wait);
        assert_eq!(delete_gate(Some("DISABLED"), Some("UPDATING")), DeleteGate::Wait);
        assert_eq!(delete_gate(Some("DISABLED"), Some("VALID")), DeleteGate::Delete);
        assert_eq!(delete_gate(Some("DISABLED"), Some("DELETING")), DeleteGate::Wait);
    }

    #[test]
    fn test_invalid_status_carries_reason() {
        let c = status_condition(Some("INVALID"), Some("CLIENT_ERROR - bad role"));
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.message.as_deref(), Some("CLIENT_ERROR - bad role"));
        assert_eq!(
            status_condition(Some("VALID"), None).status,
            ConditionStatus::True
        );
    }

    #[test]
    fn test_same_set() {
        let observed = vec!["subnet-b".to_string(), "subnet-a".to_string()];
        assert!(same_set(&["subnet-a".to_string(), "subnet-b".to_string()], &observed));
        assert!(!same_set(&["subnet-a".to_string()], &observed));
        assert!(same_set(&[], &observed));
    }
}
