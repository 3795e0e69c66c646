//! # DynamoDB Client

pub mod sdk;

use crate::crd::dynamodb::{
    GlobalSecondaryIndex, ProvisionedThroughput, SseSpecification, StreamSpecification, TableParameters,
};
use crate::crd::Tag;
use crate::provider::AwsError;
use async_trait::async_trait;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDescription {
    pub name: String,
    pub arn: Option<String>,
    pub table_id: Option<String>,
    pub status: Option<String>,
    pub item_count: Option<i64>,
    pub table_size_bytes: Option<i64>,
    pub latest_stream_arn: Option<String>,
    pub billing_mode: Option<String>,
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    pub stream_specification: Option<StreamSpecification>,
    pub sse_specification: Option<SseSpecification>,
    pub global_secondary_indexes: Vec<GlobalSecondaryIndex>,
    pub table_class: Option<String>,
    pub deletion_protection_enabled: Option<bool>,
}

/// Fields `UpdateTable` may change; unset fields are left alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableUpdate {
    pub billing_mode: Option<String>,
    pub provisioned_throughput: Option<ProvisionedThroughput>,
    pub stream_specification: Option<StreamSpecification>,
    pub sse_specification: Option<SseSpecification>,
    pub table_class: Option<String>,
    pub deletion_protection_enabled: Option<bool>,
}

impl TableUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &TableUpdate::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupDescription {
    pub arn: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub backup_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub table_name: Option<String>,
    pub table_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalTableDescription {
    pub name: String,
    pub arn: Option<String>,
    pub status: Option<String>,
    pub replica_regions: Vec<String>,
}

#[async_trait]
pub trait DynamoDbApi: Send + Sync {
    async fn describe_table(&self, name: &str) -> Result<TableDescription, AwsError>;
    async fn create_table(&self, name: &str, params: &TableParameters) -> Result<TableDescription, AwsError>;
    async fn update_table(&self, name: &str, update: &TableUpdate) -> Result<(), AwsError>;
    async fn delete_table(&self, name: &str) -> Result<(), AwsError>;

    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>, AwsError>;
    async fn tag_resource(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError>;
    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), AwsError>;

    async fn describe_backup(&self, arn: &str) -> Result<BackupDescription, AwsError>;
    async fn create_backup(&self, table_name: &str, backup_name: &str) -> Result<BackupDescription, AwsError>;
    async fn delete_backup(&self, arn: &str) -> Result<(), AwsError>;

    async fn describe_global_table(&self, name: &str) -> Result<GlobalTableDescription, AwsError>;
    async fn create_global_table(&self, name: &str, regions: &[String]) -> Result<GlobalTableDescription, AwsError>;
    async fn update_global_table(&self, name: &str, add: &[String], remove: &[String]) -> Result<(), AwsError>;
}
