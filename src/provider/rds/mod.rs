//! # RDS Client
//!
//! [`RdsApi`] covers the RDS calls the instance, cluster and parameter group
//! adapters make. [`sdk::SdkRds`] implements it with `aws-sdk-rds`; tests
//! substitute an in-memory fake.

pub mod sdk;

use crate::crd::rds::{
    DBClusterParameters, DBInstanceParameters, Endpoint, Parameter, PendingModifiedValues,
    VpcSecurityGroupMembership,
};
use crate::crd::Tag;
use crate::provider::AwsError;
use async_trait::async_trait;

/// Subset of `DescribeDBInstances` the adapters read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbInstance {
    pub identifier: String,
    pub status: Option<String>,
    pub arn: Option<String>,
    pub resource_id: Option<String>,
    pub db_instance_class: Option<String>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub allocated_storage: Option<i32>,
    pub max_allocated_storage: Option<i32>,
    pub storage_type: Option<String>,
    pub iops: Option<i32>,
    pub storage_encrypted: Option<bool>,
    pub kms_key_id: Option<String>,
    pub master_username: Option<String>,
    pub db_name: Option<String>,
    pub endpoint: Option<Endpoint>,
    pub multi_az: Option<bool>,
    pub publicly_accessible: Option<bool>,
    pub backup_retention_period: Option<i32>,
    pub preferred_backup_window: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub db_subnet_group_name: Option<String>,
    pub db_parameter_group_name: Option<String>,
    pub vpc_security_groups: Vec<VpcSecurityGroupMembership>,
    pub deletion_protection: Option<bool>,
    pub auto_minor_version_upgrade: Option<bool>,
    pub copy_tags_to_snapshot: Option<bool>,
    pub iam_database_authentication_enabled: Option<bool>,
    pub instance_create_time: Option<String>,
    pub latest_restorable_time: Option<String>,
    pub pending_modified_values: Option<PendingModifiedValues>,
    pub aws_backup_recovery_point_arn: Option<String>,
    pub tags: Vec<Tag>,
}

/// Subset of `DescribeDBClusters` the adapters read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbCluster {
    pub identifier: String,
    pub status: Option<String>,
    pub arn: Option<String>,
    pub resource_id: Option<String>,
    pub engine: Option<String>,
    pub engine_version: Option<String>,
    pub engine_mode: Option<String>,
    pub database_name: Option<String>,
    pub port: Option<i32>,
    pub master_username: Option<String>,
    pub endpoint: Option<String>,
    pub reader_endpoint: Option<String>,
    pub backup_retention_period: Option<i32>,
    pub preferred_backup_window: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    pub storage_encrypted: Option<bool>,
    pub kms_key_id: Option<String>,
    pub db_cluster_parameter_group: Option<String>,
    pub db_subnet_group: Option<String>,
    pub vpc_security_groups: Vec<VpcSecurityGroupMembership>,
    pub deletion_protection: Option<bool>,
    pub copy_tags_to_snapshot: Option<bool>,
    pub iam_database_authentication_enabled: Option<bool>,
    pub cluster_create_time: Option<String>,
    pub tags: Vec<Tag>,
}

/// Instance-level or cluster-level parameter group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterGroupKind {
    Instance,
    Cluster,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterGroup {
    pub name: String,
    pub family: Option<String>,
    pub description: Option<String>,
    pub arn: Option<String>,
}

/// A parameter as reported by `DescribeDBParameters`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedParameter {
    pub name: String,
    pub value: Option<String>,
    pub apply_method: Option<String>,
    /// `user`, `system` or `engine-default`
    pub source: Option<String>,
}

#[async_trait]
pub trait RdsApi: Send + Sync {
    /// `NotFound` when the instance does not exist
    async fn describe_db_instance(&self, id: &str) -> Result<DbInstance, AwsError>;
    async fn create_db_instance(
        &self,
        id: &str,
        params: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError>;
    /// Restore from the source named in `params.restore_from`
    async fn restore_db_instance(
        &self,
        id: &str,
        params: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError>;
    /// Fields left unset in `params` are not modified
    async fn modify_db_instance(
        &self,
        id: &str,
        params: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError>;
    async fn delete_db_instance(&self, id: &str, params: &DBInstanceParameters) -> Result<(), AwsError>;

    async fn describe_db_cluster(&self, id: &str) -> Result<DbCluster, AwsError>;
    async fn create_db_cluster(
        &self,
        id: &str,
        params: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError>;
    async fn restore_db_cluster(
        &self,
        id: &str,
        params: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError>;
    async fn modify_db_cluster(
        &self,
        id: &str,
        params: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError>;
    async fn delete_db_cluster(&self, id: &str, params: &DBClusterParameters) -> Result<(), AwsError>;

    async fn describe_parameter_group(
        &self,
        kind: ParameterGroupKind,
        name: &str,
    ) -> Result<ParameterGroup, AwsError>;
    async fn create_parameter_group(
        &self,
        kind: ParameterGroupKind,
        name: &str,
        family: &str,
        description: &str,
        tags: &[Tag],
    ) -> Result<ParameterGroup, AwsError>;
    async fn delete_parameter_group(&self, kind: ParameterGroupKind, name: &str) -> Result<(), AwsError>;
    /// Every parameter of the group, optionally filtered by source
    async fn describe_parameters(
        &self,
        kind: ParameterGroupKind,
        name: &str,
        source: Option<&str>,
    ) -> Result<Vec<ObservedParameter>, AwsError>;
    /// At most 20 parameters per call
    async fn modify_parameters(
        &self,
        kind: ParameterGroupKind,
        name: &str,
        parameters: &[Parameter],
    ) -> Result<(), AwsError>;
    /// At most 20 parameters per call
    async fn reset_parameters(
        &self,
        kind: ParameterGroupKind,
        name: &str,
        parameter_names: &[String],
    ) -> Result<(), AwsError>;
    /// Parameter group family of the engine version (the default version
    /// when none is given)
    async fn default_family(&self, engine: &str, engine_version: Option<&str>) -> Result<Option<String>, AwsError>;

    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>, AwsError>;
    async fn add_tags(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError>;
    async fn remove_tags(&self, arn: &str, keys: &[String]) -> Result<(), AwsError>;
}
