//! # Common Managed Resource Types
//!
//! Types shared by every managed resource kind: the lifecycle knobs carried in
//! `spec`, the condition list carried in `status`, and the reference, selector,
//! secret and tag shapes used inside `forProvider` blocks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happens to the AWS resource when the managed resource is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeletionPolicy {
    /// Delete the external resource
    #[default]
    Delete,
    /// Leave the external resource in place and only release the managed resource
    Orphan,
}

/// Which lifecycle phases the controller may perform for a resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ManagementPolicy {
    /// Observe, create, update, late-initialize and delete
    #[default]
    FullControl,
    /// Only observe and report; never mutate AWS or the spec
    ObserveOnly,
    /// Observe and create; never update or delete
    ObserveCreate,
    /// Observe, create and update; never delete
    ObserveCreateUpdate,
    /// Observe and update; never create or delete
    ObserveUpdate,
    /// Observe and delete; never create or update
    ObserveDelete,
}

/// Reference to the `ProviderConfig` holding region defaults and credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfigReference {
    pub name: String,
}

impl Default for ProviderConfigReference {
    fn default() -> Self {
        Self {
            name: crate::constants::DEFAULT_PROVIDER_CONFIG_NAME.to_string(),
        }
    }
}

/// Reference to a Kubernetes secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretReference {
    pub name: String,
    pub namespace: String,
}

/// Reference to one key inside a Kubernetes secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretKeySelector {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

/// Lifecycle fields shared by every managed resource `spec`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Delete or orphan the external resource when this object is deleted
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    /// Lifecycle phases the controller may perform (default: FullControl)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_policy: Option<ManagementPolicy>,
    /// ProviderConfig used to obtain AWS credentials
    #[serde(default)]
    pub provider_config_ref: ProviderConfigReference,
    /// Secret the connection details are written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
}

impl ResourceSpec {
    #[must_use]
    pub fn management_policy(&self) -> ManagementPolicy {
        self.management_policy.unwrap_or_default()
    }
}

/// Whether a failed reference resolution is an error
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ResolutionPolicy {
    #[default]
    Required,
    Optional,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferencePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionPolicy>,
}

/// Symbolic pointer to another managed resource by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ReferencePolicy>,
}

impl Reference {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: None,
        }
    }

    #[must_use]
    pub fn is_optional(&self) -> bool {
        resolution_of(self.policy.as_ref()) == ResolutionPolicy::Optional
    }
}

/// Label-based selection of another managed resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    /// Only match resources sharing this resource's controller reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_controller_ref: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<ReferencePolicy>,
}

impl Selector {
    #[must_use]
    pub fn is_optional(&self) -> bool {
        resolution_of(self.policy.as_ref()) == ResolutionPolicy::Optional
    }
}

fn resolution_of(policy: Option<&ReferencePolicy>) -> ResolutionPolicy {
    policy.and_then(|p| p.resolution).unwrap_or_default()
}

/// AWS resource tag
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Status condition types reported on every managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    /// Remote resource availability
    Ready,
    /// Outcome of the last reconcile
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    /// Same type, status, reason and message; transition time is ignored
    #[must_use]
    pub fn equivalent(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Status block shared by every managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStatus<O> {
    /// Observed state, written only by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<O>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl<O> Default for ManagedStatus<O> {
    fn default() -> Self {
        Self {
            at_provider: None,
            conditions: Vec::new(),
        }
    }
}

impl<O> ManagedStatus<O> {
    #[must_use]
    pub fn condition(&self, ct: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == ct)
    }

    /// Set a condition, keeping the existing entry (and its transition time)
    /// when nothing but the timestamp would change
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            Some(existing) if existing.equivalent(&condition) => {}
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }
}
