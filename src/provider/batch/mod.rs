//! # Batch Client
//!
//! [`BatchApi`] covers compute environments, job queues, job definitions and
//! jobs. Models reuse the CRD shapes where AWS returns the same fields.

pub mod sdk;

use crate::crd::batch::{
    ComputeEnvironmentOrder, ComputeEnvironmentParameters, ComputeResource, JobDefinitionParameters,
    JobParameters, JobQueueParameters,
};
use crate::crd::Tag;
use crate::provider::AwsError;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputeEnvironmentDetail {
    pub name: String,
    pub arn: Option<String>,
    pub ecs_cluster_arn: Option<String>,
    pub environment_type: Option<String>,
    /// `ENABLED` or `DISABLED`
    pub state: Option<String>,
    /// `CREATING`, `UPDATING`, `DELETING`, `DELETED`, `VALID` or `INVALID`
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub service_role: Option<String>,
    pub compute_resources: Option<ComputeResource>,
    pub unmanaged_vcpus: Option<i32>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobQueueDetail {
    pub name: String,
    pub arn: Option<String>,
    pub state: Option<String>,
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub priority: Option<i32>,
    pub compute_environment_order: Vec<ComputeEnvironmentOrder>,
    pub scheduling_policy_arn: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDefinitionDetail {
    pub name: String,
    pub arn: String,
    pub revision: Option<i32>,
    pub status: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobDetail {
    pub job_id: String,
    pub job_arn: Option<String>,
    /// `SUBMITTED` through `SUCCEEDED` / `FAILED`
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub created_at: Option<i64>,
    pub started_at: Option<i64>,
    pub stopped_at: Option<i64>,
    pub tags: BTreeMap<String, String>,
}

impl JobDetail {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_deref(), Some("SUCCEEDED" | "FAILED"))
    }
}

#[async_trait]
pub trait BatchApi: Send + Sync {
    async fn describe_compute_environment(&self, name: &str) -> Result<ComputeEnvironmentDetail, AwsError>;
    /// Returns the new environment's ARN
    async fn create_compute_environment(
        &self,
        name: &str,
        params: &ComputeEnvironmentParameters,
    ) -> Result<String, AwsError>;
    async fn update_compute_environment(
        &self,
        name: &str,
        params: &ComputeEnvironmentParameters,
    ) -> Result<(), AwsError>;
    async fn set_compute_environment_state(&self, name: &str, state: &str) -> Result<(), AwsError>;
    async fn delete_compute_environment(&self, name: &str) -> Result<(), AwsError>;

    async fn describe_job_queue(&self, name: &str) -> Result<JobQueueDetail, AwsError>;
    async fn create_job_queue(&self, name: &str, params: &JobQueueParameters) -> Result<String, AwsError>;
    async fn update_job_queue(&self, name: &str, params: &JobQueueParameters) -> Result<(), AwsError>;
    async fn set_job_queue_state(&self, name: &str, state: &str) -> Result<(), AwsError>;
    async fn delete_job_queue(&self, name: &str) -> Result<(), AwsError>;

    /// Latest ACTIVE revision; `NotFound` when there is none
    async fn describe_job_definition(&self, name: &str) -> Result<JobDefinitionDetail, AwsError>;
    async fn register_job_definition(
        &self,
        name: &str,
        params: &JobDefinitionParameters,
    ) -> Result<JobDefinitionDetail, AwsError>;
    async fn deregister_job_definition(&self, arn: &str) -> Result<(), AwsError>;

    async fn describe_job(&self, job_id: &str) -> Result<JobDetail, AwsError>;
    async fn submit_job(&self, name: &str, params: &JobParameters) -> Result<JobDetail, AwsError>;
    async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<(), AwsError>;

    async fn tag_resource(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError>;
    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), AwsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_terminal_states() {
        let mut job = JobDetail {
            job_id: "j-1".into(),
            status: Some("RUNNING".into()),
            ..Default::default()
        };
        assert!(!job.is_terminal());
        job.status = Some("FAILED".into());
        assert!(job.is_terminal());
        job.status = Some("SUCCEEDED".into());
        assert!(job.is_terminal());
    }
}
