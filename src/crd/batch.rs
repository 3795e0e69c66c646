//! # Batch Custom Resources
//!
//! `ComputeEnvironment`, `JobQueue`, `JobDefinition` and `Job`.

use crate::crd::common::{ManagedStatus, Reference, ResourceSpec, Selector, Tag};
use crate::crd::managed::managed_resource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `ENABLED` / `DISABLED` for compute environments and job queues
pub const STATE_ENABLED: &str = "ENABLED";
pub const STATE_DISABLED: &str = "DISABLED";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeyValuePair {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirement {
    /// `VCPU`, `MEMORY` or `GPU`
    pub resource_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetryStrategy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobTimeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_duration_seconds: Option<i32>,
}

// ---------------------------------------------------------------------------
// ComputeEnvironment

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "batch.aws.octopilot.io",
    version = "v1alpha1",
    kind = "ComputeEnvironment",
    status = "ComputeEnvironmentStatus",
    category = "aws",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}, {"name":"State", "type":"string", "jsonPath":".status.atProvider.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvironmentSpec {
    #[serde(flatten)]
    pub resource_spec: ResourceSpec,
    pub for_provider: ComputeEnvironmentParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResource {
    /// `EC2`, `SPOT`, `FARGATE` or `FARGATE_SPOT`
    #[serde(rename = "type")]
    pub resource_type: String,
    pub max_vcpus: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_vcpus: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_vcpus: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_percentage: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnet_refs: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_group_id_refs: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group_id_selector: Option<Selector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvironmentParameters {
    pub region: String,
    /// `MANAGED` or `UNMANAGED`
    #[serde(rename = "type")]
    pub environment_type: String,
    /// `ENABLED` (default) or `DISABLED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_role_arn_ref: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_role_arn_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_resources: Option<ComputeResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmanaged_vcpus: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvironmentObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_environment_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecs_cluster_arn: Option<String>,
    /// `CREATING`, `UPDATING`, `DELETING`, `DELETED`, `VALID` or `INVALID`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

pub type ComputeEnvironmentStatus = ManagedStatus<ComputeEnvironmentObservation>;

managed_resource!(
    ComputeEnvironment,
    ComputeEnvironmentParameters,
    ComputeEnvironmentObservation
);

// ---------------------------------------------------------------------------
// JobQueue

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "batch.aws.octopilot.io",
    version = "v1alpha1",
    kind = "JobQueue",
    status = "JobQueueStatus",
    category = "aws",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}, {"name":"State", "type":"string", "jsonPath":".status.atProvider.state"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JobQueueSpec {
    #[serde(flatten)]
    pub resource_spec: ResourceSpec,
    pub for_provider: JobQueueParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComputeEnvironmentOrder {
    pub order: i32,
    /// Compute environment ARN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_environment_ref: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_environment_selector: Option<Selector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobQueueParameters {
    pub region: String,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_state: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compute_environment_order: Vec<ComputeEnvironmentOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_policy_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobQueueObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_queue_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

pub type JobQueueStatus = ManagedStatus<JobQueueObservation>;

managed_resource!(JobQueue, JobQueueParameters, JobQueueObservation);

// ---------------------------------------------------------------------------
// JobDefinition

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "batch.aws.octopilot.io",
    version = "v1alpha1",
    kind = "JobDefinition",
    status = "JobDefinitionStatus",
    category = "aws",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}, {"name":"Revision", "type":"integer", "jsonPath":".status.atProvider.revision"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinitionSpec {
    #[serde(flatten)]
    pub resource_spec: ResourceSpec,
    pub for_provider: JobDefinitionParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_requirements: Vec<ResourceRequirement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinitionParameters {
    pub region: String,
    /// `container` or `multinode`
    #[serde(rename = "type")]
    pub job_definition_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_properties: Option<ContainerProperties>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platform_capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate_tags: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_strategy: Option<RetryStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<JobTimeout>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDefinitionObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_definition_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i32>,
    /// `ACTIVE` or `INACTIVE`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

pub type JobDefinitionStatus = ManagedStatus<JobDefinitionObservation>;

managed_resource!(JobDefinition, JobDefinitionParameters, JobDefinitionObservation);

// ---------------------------------------------------------------------------
// Job

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "batch.aws.octopilot.io",
    version = "v1alpha1",
    kind = "Job",
    status = "JobStatus",
    category = "aws",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}, {"name":"Status", "type":"string", "jsonPath":".status.atProvider.status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    #[serde(flatten)]
    pub resource_spec: ResourceSpec,
    pub for_provider: JobParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverrides {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_requirements: Vec<ResourceRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobParameters {
    pub region: String,
    /// Job definition ARN (or `name:revision`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_definition_ref: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_definition_selector: Option<Selector>,
    /// Job queue ARN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_queue_ref: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_queue_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_overrides: Option<ContainerOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_strategy: Option<RetryStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<JobTimeout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate_tags: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_arn: Option<String>,
    /// `SUBMITTED`, `PENDING`, `RUNNABLE`, `STARTING`, `RUNNING`, `SUCCEEDED` or `FAILED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<i64>,
}

pub type JobStatus = ManagedStatus<JobObservation>;

managed_resource!(Job, JobParameters, JobObservation);
