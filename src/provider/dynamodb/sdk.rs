//! `aws-sdk-dynamodb` implementation of [`DynamoDbApi`]

use super::{BackupDescription, DynamoDbApi, GlobalTableDescription, TableDescription, TableUpdate};
use crate::crd::dynamodb::{
    GlobalSecondaryIndex, KeySchemaElement, Projection, ProvisionedThroughput, SseSpecification,
    StreamSpecification, TableParameters,
};
use crate::crd::Tag;
use crate::provider::{invalid, timed, AwsError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::types as ddb;
use aws_sdk_dynamodb::Client;
use tracing::{info, info_span, Instrument};

const SERVICE: &str = "dynamodb";

pub struct SdkDynamoDb {
    client: Client,
    region: String,
}

impl std::fmt::Debug for SdkDynamoDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkDynamoDb")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SdkDynamoDb {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
            region: config
                .region()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }
}

fn text<'a>(v: impl Into<Option<&'a str>>) -> Option<String> {
    v.into().map(ToString::to_string)
}

fn sdk_key_schema(keys: &[KeySchemaElement]) -> Result<Vec<ddb::KeySchemaElement>, AwsError> {
    keys.iter()
        .map(|k| {
            ddb::KeySchemaElement::builder()
                .attribute_name(&k.attribute_name)
                .key_type(ddb::KeyType::from(k.key_type.as_str()))
                .build()
                .map_err(invalid)
        })
        .collect()
}

fn key_schema(keys: &[ddb::KeySchemaElement]) -> Vec<KeySchemaElement> {
    keys.iter()
        .map(|k| KeySchemaElement {
            attribute_name: k.attribute_name().to_string(),
            key_type: k.key_type().as_str().to_string(),
        })
        .collect()
}

fn sdk_throughput(t: Option<&ProvisionedThroughput>) -> Result<Option<ddb::ProvisionedThroughput>, AwsError> {
    t.map(|t| {
        ddb::ProvisionedThroughput::builder()
            .read_capacity_units(t.read_capacity_units)
            .write_capacity_units(t.write_capacity_units)
            .build()
            .map_err(invalid)
    })
    .transpose()
}

/// On-demand tables report zero capacity; that is "no provisioned throughput"
fn throughput(t: Option<&ddb::ProvisionedThroughputDescription>) -> Option<ProvisionedThroughput> {
    let t = t?;
    let read = t.read_capacity_units().unwrap_or_default();
    let write = t.write_capacity_units().unwrap_or_default();
    (read > 0 || write > 0).then_some(ProvisionedThroughput {
        read_capacity_units: read,
        write_capacity_units: write,
    })
}

fn sdk_stream(s: Option<&StreamSpecification>) -> Result<Option<ddb::StreamSpecification>, AwsError> {
    s.map(|s| {
        ddb::StreamSpecification::builder()
            .stream_enabled(s.stream_enabled)
            .set_stream_view_type(s.stream_view_type.as_deref().map(ddb::StreamViewType::from))
            .build()
            .map_err(invalid)
    })
    .transpose()
}

fn sdk_sse(s: Option<&SseSpecification>) -> Option<ddb::SseSpecification> {
    s.map(|s| {
        ddb::SseSpecification::builder()
            .set_enabled(s.enabled)
            .set_sse_type(s.sse_type.as_deref().map(ddb::SseType::from))
            .set_kms_master_key_id(s.kms_master_key_id.clone())
            .build()
    })
}

fn sdk_projection(p: &Projection) -> ddb::Projection {
    ddb::Projection::builder()
        .set_projection_type(p.projection_type.as_deref().map(ddb::ProjectionType::from))
        .set_non_key_attributes((!p.non_key_attributes.is_empty()).then(|| p.non_key_attributes.clone()))
        .build()
}

fn sdk_tags(tags: &[Tag]) -> Result<Option<Vec<ddb::Tag>>, AwsError> {
    if tags.is_empty() {
        return Ok(None);
    }
    tags.iter()
        .map(|t| ddb::Tag::builder().key(&t.key).value(&t.value).build().map_err(invalid))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn table(t: &ddb::TableDescription) -> TableDescription {
    TableDescription {
        name: t.table_name().unwrap_or_default().to_string(),
        arn: text(t.table_arn()),
        table_id: text(t.table_id()),
        status: t.table_status().map(|s| s.as_str().to_string()),
        item_count: t.item_count(),
        table_size_bytes: t.table_size_bytes(),
        latest_stream_arn: text(t.latest_stream_arn()),
        billing_mode: t
            .billing_mode_summary()
            .and_then(|b| b.billing_mode())
            .map(|m| m.as_str().to_string()),
        provisioned_throughput: throughput(t.provisioned_throughput()),
        stream_specification: t.stream_specification().map(|s| StreamSpecification {
            stream_enabled: Option::<bool>::from(s.stream_enabled()).unwrap_or_default(),
            stream_view_type: s.stream_view_type().map(|v| v.as_str().to_string()),
        }),
        sse_specification: t.sse_description().map(|s| SseSpecification {
            enabled: s
                .status()
                .map(|st| matches!(st.as_str(), "ENABLED" | "ENABLING")),
            sse_type: s.sse_type().map(|v| v.as_str().to_string()),
            kms_master_key_id: text(s.kms_master_key_arn()),
        }),
        global_secondary_indexes: t
            .global_secondary_indexes()
            .iter()
            .map(|g| GlobalSecondaryIndex {
                index_name: g.index_name().unwrap_or_default().to_string(),
                key_schema: key_schema(g.key_schema()),
                projection: g
                    .projection()
                    .map(|p| Projection {
                        projection_type: p.projection_type().map(|v| v.as_str().to_string()),
                        non_key_attributes: p.non_key_attributes().to_vec(),
                    })
                    .unwrap_or_default(),
                provisioned_throughput: throughput(g.provisioned_throughput()),
            })
            .collect(),
        table_class: t
            .table_class_summary()
            .and_then(|c| c.table_class())
            .map(|c| c.as_str().to_string()),
        deletion_protection_enabled: t.deletion_protection_enabled(),
    }
}

fn backup(b: &ddb::BackupDetails) -> BackupDescription {
    let status: Option<&ddb::BackupStatus> = b.backup_status().into();
    let backup_type: Option<&ddb::BackupType> = b.backup_type().into();
    BackupDescription {
        arn: text(b.backup_arn()).unwrap_or_default(),
        name: text(b.backup_name()),
        status: status.map(|s| s.as_str().to_string()),
        backup_type: backup_type.map(|t| t.as_str().to_string()),
        size_bytes: b.backup_size_bytes(),
        ..Default::default()
    }
}

fn global_table(name: &str, g: &ddb::GlobalTableDescription) -> GlobalTableDescription {
    let mut regions: Vec<String> = g
        .replication_group()
        .iter()
        .filter_map(|r| text(r.region_name()))
        .collect();
    regions.sort();
    GlobalTableDescription {
        name: text(g.global_table_name()).unwrap_or_else(|| name.to_string()),
        arn: text(g.global_table_arn()),
        status: g.global_table_status().map(|s| s.as_str().to_string()),
        replica_regions: regions,
    }
}

#[async_trait]
impl DynamoDbApi for SdkDynamoDb {
    async fn describe_table(&self, name: &str) -> Result<TableDescription, AwsError> {
        let span = info_span!("aws.dynamodb.describe_table", table = name, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeTable",
            self.client.describe_table().table_name(name).send(),
        )
        .instrument(span)
        .await?;
        out.table()
            .map(table)
            .ok_or_else(|| AwsError::not_found(format!("table {name}")))
    }

    async fn create_table(&self, name: &str, p: &TableParameters) -> Result<TableDescription, AwsError> {
        let span = info_span!("aws.dynamodb.create_table", table = name, region = %self.region);
        info!(table = name, "Creating table");

        let attributes = p
            .attribute_definitions
            .iter()
            .map(|a| {
                ddb::AttributeDefinition::builder()
                    .attribute_name(&a.attribute_name)
                    .attribute_type(ddb::ScalarAttributeType::from(a.attribute_type.as_str()))
                    .build()
                    .map_err(invalid)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let indexes = p
            .global_secondary_indexes
            .iter()
            .map(|g| {
                ddb::GlobalSecondaryIndex::builder()
                    .index_name(&g.index_name)
                    .set_key_schema(Some(sdk_key_schema(&g.key_schema)?))
                    .projection(sdk_projection(&g.projection))
                    .set_provisioned_throughput(sdk_throughput(g.provisioned_throughput.as_ref())?)
                    .build()
                    .map_err(invalid)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let out = timed(
            SERVICE,
            "CreateTable",
            self.client
                .create_table()
                .table_name(name)
                .set_attribute_definitions(Some(attributes))
                .set_key_schema(Some(sdk_key_schema(&p.key_schema)?))
                .set_billing_mode(p.billing_mode.as_deref().map(ddb::BillingMode::from))
                .set_provisioned_throughput(sdk_throughput(p.provisioned_throughput.as_ref())?)
                .set_stream_specification(sdk_stream(p.stream_specification.as_ref())?)
                .set_sse_specification(sdk_sse(p.sse_specification.as_ref()))
                .set_global_secondary_indexes((!indexes.is_empty()).then_some(indexes))
                .set_table_class(p.table_class.as_deref().map(ddb::TableClass::from))
                .set_deletion_protection_enabled(p.deletion_protection_enabled)
                .set_tags(sdk_tags(&p.tags)?)
                .send(),
        )
        .instrument(span)
        .await?;

        out.table_description()
            .map(table)
            .ok_or_else(|| AwsError::Sdk {
                code: None,
                message: format!("table {name} missing from CreateTable response"),
            })
    }

    async fn update_table(&self, name: &str, u: &TableUpdate) -> Result<(), AwsError> {
        let span = info_span!("aws.dynamodb.update_table", table = name, region = %self.region);
        info!(table = name, "Updating table");
        timed(
            SERVICE,
            "UpdateTable",
            self.client
                .update_table()
                .table_name(name)
                .set_billing_mode(u.billing_mode.as_deref().map(ddb::BillingMode::from))
                .set_provisioned_throughput(sdk_throughput(u.provisioned_throughput.as_ref())?)
                .set_stream_specification(sdk_stream(u.stream_specification.as_ref())?)
                .set_sse_specification(sdk_sse(u.sse_specification.as_ref()))
                .set_table_class(u.table_class.as_deref().map(ddb::TableClass::from))
                .set_deletion_protection_enabled(u.deletion_protection_enabled)
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.dynamodb.delete_table", table = name, region = %self.region);
        info!(table = name, "Deleting table");
        timed(
            SERVICE,
            "DeleteTable",
            self.client.delete_table().table_name(name).send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>, AwsError> {
        let span = info_span!("aws.dynamodb.list_tags_of_resource", arn);
        async move {
            let mut tags = Vec::new();
            let mut token: Option<String> = None;
            loop {
                let out = timed(
                    SERVICE,
                    "ListTagsOfResource",
                    self.client
                        .list_tags_of_resource()
                        .resource_arn(arn)
                        .set_next_token(token.clone())
                        .send(),
                )
                .await?;
                tags.extend(out.tags().iter().map(|t| Tag::new(t.key(), t.value())));
                match out.next_token() {
                    Some(next) if !next.is_empty() => token = Some(next.to_string()),
                    _ => break,
                }
            }
            Ok(tags)
        }
        .instrument(span)
        .await
    }

    async fn tag_resource(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError> {
        let span = info_span!("aws.dynamodb.tag_resource", arn, count = tags.len());
        timed(
            SERVICE,
            "TagResource",
            self.client
                .tag_resource()
                .resource_arn(arn)
                .set_tags(sdk_tags(tags)?)
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), AwsError> {
        let span = info_span!("aws.dynamodb.untag_resource", arn, count = keys.len());
        timed(
            SERVICE,
            "UntagResource",
            self.client
                .untag_resource()
                .resource_arn(arn)
                .set_tag_keys(Some(keys.to_vec()))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn describe_backup(&self, arn: &str) -> Result<BackupDescription, AwsError> {
        let span = info_span!("aws.dynamodb.describe_backup", backup = arn, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeBackup",
            self.client.describe_backup().backup_arn(arn).send(),
        )
        .instrument(span)
        .await?;

        let description = out
            .backup_description()
            .ok_or_else(|| AwsError::not_found(format!("backup {arn}")))?;
        let mut result = description
            .backup_details()
            .map(backup)
            .ok_or_else(|| AwsError::not_found(format!("backup {arn}")))?;
        if let Some(source) = description.source_table_details() {
            result.table_name = text(source.table_name());
            result.table_arn = text(source.table_arn());
        }
        Ok(result)
    }

    async fn create_backup(&self, table_name: &str, backup_name: &str) -> Result<BackupDescription, AwsError> {
        let span = info_span!("aws.dynamodb.create_backup", table = table_name, backup = backup_name);
        info!(table = table_name, backup = backup_name, "Creating backup");
        let out = timed(
            SERVICE,
            "CreateBackup",
            self.client
                .create_backup()
                .table_name(table_name)
                .backup_name(backup_name)
                .send(),
        )
        .instrument(span)
        .await?;

        let mut result = out.backup_details().map(backup).ok_or_else(|| AwsError::Sdk {
            code: None,
            message: format!("backup {backup_name} missing from CreateBackup response"),
        })?;
        result.table_name = Some(table_name.to_string());
        Ok(result)
    }

    async fn delete_backup(&self, arn: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.dynamodb.delete_backup", backup = arn);
        info!(backup = arn, "Deleting backup");
        timed(
            SERVICE,
            "DeleteBackup",
            self.client.delete_backup().backup_arn(arn).send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn describe_global_table(&self, name: &str) -> Result<GlobalTableDescription, AwsError> {
        let span = info_span!("aws.dynamodb.describe_global_table", global_table = name, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeGlobalTable",
            self.client.describe_global_table().global_table_name(name).send(),
        )
        .instrument(span)
        .await?;
        out.global_table_description()
            .map(|g| global_table(name, g))
            .ok_or_else(|| AwsError::not_found(format!("global table {name}")))
    }

    async fn create_global_table(&self, name: &str, regions: &[String]) -> Result<GlobalTableDescription, AwsError> {
        let span = info_span!("aws.dynamodb.create_global_table", global_table = name, region = %self.region);
        info!(global_table = name, replicas = ?regions, "Creating global table");
        let replicas = regions
            .iter()
            .map(|r| ddb::Replica::builder().region_name(r).build())
            .collect();
        let out = timed(
            SERVICE,
            "CreateGlobalTable",
            self.client
                .create_global_table()
                .global_table_name(name)
                .set_replication_group(Some(replicas))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(out
            .global_table_description()
            .map(|g| global_table(name, g))
            .unwrap_or_else(|| GlobalTableDescription {
                name: name.to_string(),
                replica_regions: regions.to_vec(),
                ..Default::default()
            }))
    }

    async fn update_global_table(&self, name: &str, add: &[String], remove: &[String]) -> Result<(), AwsError> {
        let span = info_span!("aws.dynamodb.update_global_table", global_table = name, region = %self.region);
        info!(global_table = name, add = ?add, remove = ?remove, "Updating global table replicas");
        let mut updates = Vec::with_capacity(add.len() + remove.len());
        for region in add {
            let create = ddb::CreateReplicaAction::builder()
                .region_name(region)
                .build()
                .map_err(invalid)?;
            updates.push(ddb::ReplicaUpdate::builder().create(create).build());
        }
        for region in remove {
            let delete = ddb::DeleteReplicaAction::builder()
                .region_name(region)
                .build()
                .map_err(invalid)?;
            updates.push(ddb::ReplicaUpdate::builder().delete(delete).build());
        }
        timed(
            SERVICE,
            "UpdateGlobalTable",
            self.client
                .update_global_table()
                .global_table_name(name)
                .set_replica_updates(Some(updates))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }
}
