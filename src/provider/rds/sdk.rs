//! `aws-sdk-rds` implementation of [`RdsApi`]

use super::{DbCluster, DbInstance, ObservedParameter, ParameterGroup, ParameterGroupKind, RdsApi};
use crate::crd::rds::{
    DBClusterParameters, DBInstanceParameters, Endpoint, Parameter, PendingModifiedValues,
    RestoreBackupConfiguration, RestoreSource, VpcSecurityGroupMembership,
};
use crate::crd::Tag;
use crate::provider::{invalid, timed, AwsError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rds::primitives::{DateTime, DateTimeFormat};
use aws_sdk_rds::types::{self as rds, ApplyMethod};
use aws_sdk_rds::Client;
use tracing::{info, info_span, Instrument};

const SERVICE: &str = "rds";

pub struct SdkRds {
    client: Client,
    region: String,
}

impl std::fmt::Debug for SdkRds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkRds")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SdkRds {
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

fn to_sdk_tags(tags: &[Tag]) -> Option<Vec<rds::Tag>> {
    if tags.is_empty() {
        return None;
    }
    Some(
        tags.iter()
            .map(|t| rds::Tag::builder().key(&t.key).value(&t.value).build())
            .collect(),
    )
}

fn from_sdk_tags(tags: &[rds::Tag]) -> Vec<Tag> {
    tags.iter()
        .filter_map(|t| Some(Tag::new(t.key()?, t.value().unwrap_or_default())))
        .collect()
}

fn fmt_time(t: Option<&DateTime>) -> Option<String> {
    t.and_then(|t| t.fmt(DateTimeFormat::DateTime).ok())
}

fn parse_time(t: Option<&str>) -> Result<Option<DateTime>, AwsError> {
    t.map(|t| DateTime::from_str(t, DateTimeFormat::DateTime).map_err(invalid))
        .transpose()
}

fn some_vec(v: &[String]) -> Option<Vec<String>> {
    (!v.is_empty()).then(|| v.to_vec())
}

fn memberships(groups: &[rds::VpcSecurityGroupMembership]) -> Vec<VpcSecurityGroupMembership> {
    groups
        .iter()
        .filter_map(|g| {
            Some(VpcSecurityGroupMembership {
                vpc_security_group_id: g.vpc_security_group_id()?.to_string(),
                status: g.status().map(ToString::to_string),
            })
        })
        .collect()
}

fn owned(s: Option<&str>) -> Option<String> {
    s.map(ToString::to_string)
}

fn restore_config(params: Option<&RestoreBackupConfiguration>) -> Result<&RestoreBackupConfiguration, AwsError> {
    params.ok_or_else(|| invalid("restoreFrom is not set"))
}

fn missing(section: &str) -> AwsError {
    invalid(format!("restoreFrom.{section} is required for this restore source"))
}

fn db_instance(i: &rds::DbInstance) -> DbInstance {
    DbInstance {
        identifier: i.db_instance_identifier().unwrap_or_default().to_string(),
        status: owned(i.db_instance_status()),
        arn: owned(i.db_instance_arn()),
        resource_id: owned(i.dbi_resource_id()),
        db_instance_class: owned(i.db_instance_class()),
        engine: owned(i.engine()),
        engine_version: owned(i.engine_version()),
        allocated_storage: i.allocated_storage(),
        max_allocated_storage: i.max_allocated_storage(),
        storage_type: owned(i.storage_type()),
        iops: i.iops(),
        storage_encrypted: i.storage_encrypted(),
        kms_key_id: owned(i.kms_key_id()),
        master_username: owned(i.master_username()),
        db_name: owned(i.db_name()),
        endpoint: i.endpoint().map(|e| Endpoint {
            address: owned(e.address()),
            port: e.port(),
            hosted_zone_id: owned(e.hosted_zone_id()),
        }),
        multi_az: i.multi_az(),
        publicly_accessible: i.publicly_accessible(),
        backup_retention_period: i.backup_retention_period(),
        preferred_backup_window: owned(i.preferred_backup_window()),
        preferred_maintenance_window: owned(i.preferred_maintenance_window()),
        db_subnet_group_name: i
            .db_subnet_group()
            .and_then(|g| g.db_subnet_group_name())
            .map(ToString::to_string),
        db_parameter_group_name: i
            .db_parameter_groups()
            .first()
            .and_then(|g| g.db_parameter_group_name())
            .map(ToString::to_string),
        vpc_security_groups: memberships(i.vpc_security_groups()),
        deletion_protection: i.deletion_protection(),
        auto_minor_version_upgrade: i.auto_minor_version_upgrade(),
        copy_tags_to_snapshot: i.copy_tags_to_snapshot(),
        iam_database_authentication_enabled: i.iam_database_authentication_enabled(),
        instance_create_time: fmt_time(i.instance_create_time()),
        latest_restorable_time: fmt_time(i.latest_restorable_time()),
        pending_modified_values: i.pending_modified_values().map(|p| PendingModifiedValues {
            db_instance_class: owned(p.db_instance_class()),
            allocated_storage: p.allocated_storage(),
            backup_retention_period: p.backup_retention_period(),
            engine_version: owned(p.engine_version()),
            iops: p.iops(),
            multi_az: p.multi_az(),
            port: p.port(),
            storage_type: owned(p.storage_type()),
            master_user_password_pending: p.master_user_password().map(|_| true),
        }),
        aws_backup_recovery_point_arn: owned(i.aws_backup_recovery_point_arn()),
        tags: from_sdk_tags(i.tag_list()),
    }
}

fn db_cluster(c: &rds::DbCluster) -> DbCluster {
    DbCluster {
        identifier: c.db_cluster_identifier().unwrap_or_default().to_string(),
        status: owned(c.status()),
        arn: owned(c.db_cluster_arn()),
        resource_id: owned(c.db_cluster_resource_id()),
        engine: owned(c.engine()),
        engine_version: owned(c.engine_version()),
        engine_mode: owned(c.engine_mode()),
        database_name: owned(c.database_name()),
        port: c.port(),
        master_username: owned(c.master_username()),
        endpoint: owned(c.endpoint()),
        reader_endpoint: owned(c.reader_endpoint()),
        backup_retention_period: c.backup_retention_period(),
        preferred_backup_window: owned(c.preferred_backup_window()),
        preferred_maintenance_window: owned(c.preferred_maintenance_window()),
        storage_encrypted: c.storage_encrypted(),
        kms_key_id: owned(c.kms_key_id()),
        db_cluster_parameter_group: owned(c.db_cluster_parameter_group()),
        db_subnet_group: owned(c.db_subnet_group()),
        vpc_security_groups: memberships(c.vpc_security_groups()),
        deletion_protection: c.deletion_protection(),
        copy_tags_to_snapshot: c.copy_tags_to_snapshot(),
        iam_database_authentication_enabled: c.iam_database_authentication_enabled(),
        cluster_create_time: fmt_time(c.cluster_create_time()),
        tags: from_sdk_tags(c.tag_list()),
    }
}

fn returned<T>(value: Option<T>, what: &str, id: &str) -> Result<T, AwsError> {
    value.ok_or_else(|| AwsError::Sdk {
        code: None,
        message: format!("{what} {id} missing from response"),
    })
}

fn sdk_parameter(p: &Parameter) -> rds::Parameter {
    rds::Parameter::builder()
        .parameter_name(&p.parameter_name)
        .set_parameter_value(p.parameter_value.clone())
        .set_apply_method(p.apply_method.as_deref().map(ApplyMethod::from))
        .build()
}

#[async_trait]
impl RdsApi for SdkRds {
    async fn describe_db_instance(&self, id: &str) -> Result<DbInstance, AwsError> {
        let span = info_span!("aws.rds.describe_db_instances", db.instance = id, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeDBInstances",
            self.client.describe_db_instances().db_instance_identifier(id).send(),
        )
        .instrument(span)
        .await?;

        out.db_instances()
            .first()
            .map(db_instance)
            .ok_or_else(|| AwsError::not_found(format!("DB instance {id}")))
    }

    async fn create_db_instance(
        &self,
        id: &str,
        p: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError> {
        let span = info_span!("aws.rds.create_db_instance", db.instance = id, region = %self.region);
        info!(db.instance = id, engine = %p.engine, "Creating DB instance");
        let req = self
            .client
            .create_db_instance()
            .db_instance_identifier(id)
            .db_instance_class(&p.db_instance_class)
            .engine(&p.engine)
            .set_engine_version(p.engine_version.clone())
            .set_allocated_storage(p.allocated_storage)
            .set_max_allocated_storage(p.max_allocated_storage)
            .set_storage_type(p.storage_type.clone())
            .set_iops(p.iops)
            .set_storage_encrypted(p.storage_encrypted)
            .set_kms_key_id(p.kms_key_id.clone())
            .set_master_username(p.master_username.clone())
            .set_master_user_password(password.map(ToString::to_string))
            .set_db_name(p.db_name.clone())
            .set_port(p.port)
            .set_multi_az(p.multi_az)
            .set_publicly_accessible(p.publicly_accessible)
            .set_backup_retention_period(p.backup_retention_period)
            .set_preferred_backup_window(p.preferred_backup_window.clone())
            .set_preferred_maintenance_window(p.preferred_maintenance_window.clone())
            .set_db_subnet_group_name(p.db_subnet_group_name.clone())
            .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
            .set_db_parameter_group_name(p.db_parameter_group_name.clone())
            .set_deletion_protection(p.deletion_protection)
            .set_auto_minor_version_upgrade(p.auto_minor_version_upgrade)
            .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
            .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
            .set_tags(to_sdk_tags(&p.tags));

        let out = timed(SERVICE, "CreateDBInstance", req.send())
            .instrument(span)
            .await?;
        returned(out.db_instance().map(db_instance), "DB instance", id)
    }

    async fn restore_db_instance(
        &self,
        id: &str,
        p: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError> {
        let restore = restore_config(p.restore_from.as_ref())?;
        let span = info_span!(
            "aws.rds.restore_db_instance",
            db.instance = id,
            restore.source = ?restore.source,
            region = %self.region
        );
        info!(db.instance = id, source = ?restore.source, "Restoring DB instance");

        let instance = match restore.source {
            RestoreSource::S3 => {
                let s3 = restore.s3.as_ref().ok_or_else(|| missing("s3"))?;
                let req = self
                    .client
                    .restore_db_instance_from_s3()
                    .db_instance_identifier(id)
                    .db_instance_class(&p.db_instance_class)
                    .engine(&p.engine)
                    .source_engine(&s3.source_engine)
                    .source_engine_version(&s3.source_engine_version)
                    .s3_bucket_name(&s3.bucket_name)
                    .set_s3_prefix(s3.prefix.clone())
                    .s3_ingestion_role_arn(&s3.ingestion_role)
                    .set_engine_version(p.engine_version.clone())
                    .set_allocated_storage(p.allocated_storage)
                    .set_max_allocated_storage(p.max_allocated_storage)
                    .set_storage_type(p.storage_type.clone())
                    .set_iops(p.iops)
                    .set_storage_encrypted(p.storage_encrypted)
                    .set_kms_key_id(p.kms_key_id.clone())
                    .set_master_username(p.master_username.clone())
                    .set_master_user_password(password.map(ToString::to_string))
                    .set_db_name(p.db_name.clone())
                    .set_port(p.port)
                    .set_multi_az(p.multi_az)
                    .set_publicly_accessible(p.publicly_accessible)
                    .set_backup_retention_period(p.backup_retention_period)
                    .set_preferred_backup_window(p.preferred_backup_window.clone())
                    .set_preferred_maintenance_window(p.preferred_maintenance_window.clone())
                    .set_db_subnet_group_name(p.db_subnet_group_name.clone())
                    .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
                    .set_db_parameter_group_name(p.db_parameter_group_name.clone())
                    .set_deletion_protection(p.deletion_protection)
                    .set_auto_minor_version_upgrade(p.auto_minor_version_upgrade)
                    .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
                    .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
                    .set_tags(to_sdk_tags(&p.tags));
                timed(SERVICE, "RestoreDBInstanceFromS3", req.send())
                    .instrument(span)
                    .await?
                    .db_instance()
                    .map(db_instance)
            }
            RestoreSource::Snapshot => {
                let snapshot = restore.snapshot.as_ref().ok_or_else(|| missing("snapshot"))?;
                let req = self
                    .client
                    .restore_db_instance_from_db_snapshot()
                    .db_instance_identifier(id)
                    .db_snapshot_identifier(&snapshot.snapshot_identifier)
                    .db_instance_class(&p.db_instance_class)
                    .engine(&p.engine)
                    .set_storage_type(p.storage_type.clone())
                    .set_iops(p.iops)
                    .set_db_name(p.db_name.clone())
                    .set_port(p.port)
                    .set_multi_az(p.multi_az)
                    .set_publicly_accessible(p.publicly_accessible)
                    .set_db_subnet_group_name(p.db_subnet_group_name.clone())
                    .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
                    .set_db_parameter_group_name(p.db_parameter_group_name.clone())
                    .set_deletion_protection(p.deletion_protection)
                    .set_auto_minor_version_upgrade(p.auto_minor_version_upgrade)
                    .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
                    .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
                    .set_tags(to_sdk_tags(&p.tags));
                timed(SERVICE, "RestoreDBInstanceFromDBSnapshot", req.send())
                    .instrument(span)
                    .await?
                    .db_instance()
                    .map(db_instance)
            }
            RestoreSource::PointInTime => {
                let pit = restore
                    .point_in_time
                    .as_ref()
                    .ok_or_else(|| missing("pointInTime"))?;
                let req = self
                    .client
                    .restore_db_instance_to_point_in_time()
                    .target_db_instance_identifier(id)
                    .set_source_db_instance_identifier(pit.source_identifier.clone())
                    .set_source_dbi_resource_id(pit.source_dbi_resource_id.clone())
                    .set_restore_time(parse_time(pit.restore_time.as_deref())?)
                    .set_use_latest_restorable_time(pit.use_latest_restorable_time)
                    .db_instance_class(&p.db_instance_class)
                    .engine(&p.engine)
                    .set_storage_type(p.storage_type.clone())
                    .set_iops(p.iops)
                    .set_db_name(p.db_name.clone())
                    .set_port(p.port)
                    .set_multi_az(p.multi_az)
                    .set_publicly_accessible(p.publicly_accessible)
                    .set_db_subnet_group_name(p.db_subnet_group_name.clone())
                    .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
                    .set_db_parameter_group_name(p.db_parameter_group_name.clone())
                    .set_deletion_protection(p.deletion_protection)
                    .set_auto_minor_version_upgrade(p.auto_minor_version_upgrade)
                    .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
                    .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
                    .set_tags(to_sdk_tags(&p.tags));
                timed(SERVICE, "RestoreDBInstanceToPointInTime", req.send())
                    .instrument(span)
                    .await?
                    .db_instance()
                    .map(db_instance)
            }
        };
        returned(instance, "DB instance", id)
    }

    async fn modify_db_instance(
        &self,
        id: &str,
        p: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError> {
        let span = info_span!("aws.rds.modify_db_instance", db.instance = id, region = %self.region);
        let req = self
            .client
            .modify_db_instance()
            .db_instance_identifier(id)
            .set_db_instance_class((!p.db_instance_class.is_empty()).then(|| p.db_instance_class.clone()))
            .set_engine_version(p.engine_version.clone())
            .set_allocated_storage(p.allocated_storage)
            .set_max_allocated_storage(p.max_allocated_storage)
            .set_storage_type(p.storage_type.clone())
            .set_iops(p.iops)
            .set_master_user_password(password.map(ToString::to_string))
            .set_multi_az(p.multi_az)
            .set_publicly_accessible(p.publicly_accessible)
            .set_backup_retention_period(p.backup_retention_period)
            .set_preferred_backup_window(p.preferred_backup_window.clone())
            .set_preferred_maintenance_window(p.preferred_maintenance_window.clone())
            .set_db_subnet_group_name(p.db_subnet_group_name.clone())
            .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
            .set_db_parameter_group_name(p.db_parameter_group_name.clone())
            .set_deletion_protection(p.deletion_protection)
            .set_auto_minor_version_upgrade(p.auto_minor_version_upgrade)
            .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
            .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
            .set_apply_immediately(p.apply_immediately);

        let out = timed(SERVICE, "ModifyDBInstance", req.send())
            .instrument(span)
            .await?;
        returned(out.db_instance().map(db_instance), "DB instance", id)
    }

    async fn delete_db_instance(&self, id: &str, p: &DBInstanceParameters) -> Result<(), AwsError> {
        let span = info_span!("aws.rds.delete_db_instance", db.instance = id, region = %self.region);
        // AWS rejects a delete with neither a final snapshot name nor an explicit skip
        let skip = p
            .skip_final_snapshot
            .unwrap_or(p.final_db_snapshot_identifier.is_none());
        info!(db.instance = id, skip_final_snapshot = skip, "Deleting DB instance");
        let req = self
            .client
            .delete_db_instance()
            .db_instance_identifier(id)
            .skip_final_snapshot(skip)
            .set_final_db_snapshot_identifier(p.final_db_snapshot_identifier.clone())
            .set_delete_automated_backups(p.delete_automated_backups);
        timed(SERVICE, "DeleteDBInstance", req.send())
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn describe_db_cluster(&self, id: &str) -> Result<DbCluster, AwsError> {
        let span = info_span!("aws.rds.describe_db_clusters", db.cluster = id, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeDBClusters",
            self.client.describe_db_clusters().db_cluster_identifier(id).send(),
        )
        .instrument(span)
        .await?;

        out.db_clusters()
            .first()
            .map(db_cluster)
            .ok_or_else(|| AwsError::not_found(format!("DB cluster {id}")))
    }

    async fn create_db_cluster(
        &self,
        id: &str,
        p: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError> {
        let span = info_span!("aws.rds.create_db_cluster", db.cluster = id, region = %self.region);
        info!(db.cluster = id, engine = %p.engine, "Creating DB cluster");
        let req = self
            .client
            .create_db_cluster()
            .db_cluster_identifier(id)
            .engine(&p.engine)
            .set_engine_version(p.engine_version.clone())
            .set_engine_mode(p.engine_mode.clone())
            .set_database_name(p.database_name.clone())
            .set_port(p.port)
            .set_master_username(p.master_username.clone())
            .set_master_user_password(password.map(ToString::to_string))
            .set_backup_retention_period(p.backup_retention_period)
            .set_preferred_backup_window(p.preferred_backup_window.clone())
            .set_preferred_maintenance_window(p.preferred_maintenance_window.clone())
            .set_storage_encrypted(p.storage_encrypted)
            .set_kms_key_id(p.kms_key_id.clone())
            .set_db_cluster_parameter_group_name(p.db_cluster_parameter_group_name.clone())
            .set_db_subnet_group_name(p.db_subnet_group_name.clone())
            .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
            .set_deletion_protection(p.deletion_protection)
            .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
            .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
            .set_tags(to_sdk_tags(&p.tags));

        let out = timed(SERVICE, "CreateDBCluster", req.send())
            .instrument(span)
            .await?;
        returned(out.db_cluster().map(db_cluster), "DB cluster", id)
    }

    async fn restore_db_cluster(
        &self,
        id: &str,
        p: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError> {
        let restore = restore_config(p.restore_from.as_ref())?;
        let span = info_span!(
            "aws.rds.restore_db_cluster",
            db.cluster = id,
            restore.source = ?restore.source,
            region = %self.region
        );
        info!(db.cluster = id, source = ?restore.source, "Restoring DB cluster");

        let cluster = match restore.source {
            RestoreSource::S3 => {
                let s3 = restore.s3.as_ref().ok_or_else(|| missing("s3"))?;
                let req = self
                    .client
                    .restore_db_cluster_from_s3()
                    .db_cluster_identifier(id)
                    .engine(&p.engine)
                    .set_engine_version(p.engine_version.clone())
                    .source_engine(&s3.source_engine)
                    .source_engine_version(&s3.source_engine_version)
                    .s3_bucket_name(&s3.bucket_name)
                    .set_s3_prefix(s3.prefix.clone())
                    .s3_ingestion_role_arn(&s3.ingestion_role)
                    .set_master_username(p.master_username.clone())
                    .set_master_user_password(password.map(ToString::to_string))
                    .set_database_name(p.database_name.clone())
                    .set_port(p.port)
                    .set_backup_retention_period(p.backup_retention_period)
                    .set_preferred_backup_window(p.preferred_backup_window.clone())
                    .set_preferred_maintenance_window(p.preferred_maintenance_window.clone())
                    .set_storage_encrypted(p.storage_encrypted)
                    .set_kms_key_id(p.kms_key_id.clone())
                    .set_db_cluster_parameter_group_name(p.db_cluster_parameter_group_name.clone())
                    .set_db_subnet_group_name(p.db_subnet_group_name.clone())
                    .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
                    .set_deletion_protection(p.deletion_protection)
                    .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
                    .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
                    .set_tags(to_sdk_tags(&p.tags));
                timed(SERVICE, "RestoreDBClusterFromS3", req.send())
                    .instrument(span)
                    .await?
                    .db_cluster()
                    .map(db_cluster)
            }
            RestoreSource::Snapshot => {
                let snapshot = restore.snapshot.as_ref().ok_or_else(|| missing("snapshot"))?;
                let req = self
                    .client
                    .restore_db_cluster_from_snapshot()
                    .db_cluster_identifier(id)
                    .snapshot_identifier(&snapshot.snapshot_identifier)
                    .engine(&p.engine)
                    .set_engine_version(p.engine_version.clone())
                    .set_engine_mode(p.engine_mode.clone())
                    .set_database_name(p.database_name.clone())
                    .set_port(p.port)
                    .set_kms_key_id(p.kms_key_id.clone())
                    .set_db_cluster_parameter_group_name(p.db_cluster_parameter_group_name.clone())
                    .set_db_subnet_group_name(p.db_subnet_group_name.clone())
                    .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
                    .set_deletion_protection(p.deletion_protection)
                    .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
                    .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
                    .set_tags(to_sdk_tags(&p.tags));
                timed(SERVICE, "RestoreDBClusterFromSnapshot", req.send())
                    .instrument(span)
                    .await?
                    .db_cluster()
                    .map(db_cluster)
            }
            RestoreSource::PointInTime => {
                let pit = restore
                    .point_in_time
                    .as_ref()
                    .ok_or_else(|| missing("pointInTime"))?;
                let source = pit
                    .source_identifier
                    .clone()
                    .ok_or_else(|| invalid("restoreFrom.pointInTime.sourceIdentifier is required for clusters"))?;
                let req = self
                    .client
                    .restore_db_cluster_to_point_in_time()
                    .db_cluster_identifier(id)
                    .source_db_cluster_identifier(source)
                    .set_restore_to_time(parse_time(pit.restore_time.as_deref())?)
                    .set_use_latest_restorable_time(pit.use_latest_restorable_time)
                    .set_port(p.port)
                    .set_kms_key_id(p.kms_key_id.clone())
                    .set_db_cluster_parameter_group_name(p.db_cluster_parameter_group_name.clone())
                    .set_db_subnet_group_name(p.db_subnet_group_name.clone())
                    .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
                    .set_deletion_protection(p.deletion_protection)
                    .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
                    .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
                    .set_tags(to_sdk_tags(&p.tags));
                timed(SERVICE, "RestoreDBClusterToPointInTime", req.send())
                    .instrument(span)
                    .await?
                    .db_cluster()
                    .map(db_cluster)
            }
        };
        returned(cluster, "DB cluster", id)
    }

    async fn modify_db_cluster(
        &self,
        id: &str,
        p: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError> {
        let span = info_span!("aws.rds.modify_db_cluster", db.cluster = id, region = %self.region);
        let req = self
            .client
            .modify_db_cluster()
            .db_cluster_identifier(id)
            .set_engine_version(p.engine_version.clone())
            .set_port(p.port)
            .set_master_user_password(password.map(ToString::to_string))
            .set_backup_retention_period(p.backup_retention_period)
            .set_preferred_backup_window(p.preferred_backup_window.clone())
            .set_preferred_maintenance_window(p.preferred_maintenance_window.clone())
            .set_db_cluster_parameter_group_name(p.db_cluster_parameter_group_name.clone())
            .set_vpc_security_group_ids(some_vec(&p.vpc_security_group_ids))
            .set_deletion_protection(p.deletion_protection)
            .set_copy_tags_to_snapshot(p.copy_tags_to_snapshot)
            .set_enable_iam_database_authentication(p.enable_iam_database_authentication)
            .set_apply_immediately(p.apply_immediately);

        let out = timed(SERVICE, "ModifyDBCluster", req.send())
            .instrument(span)
            .await?;
        returned(out.db_cluster().map(db_cluster), "DB cluster", id)
    }

    async fn delete_db_cluster(&self, id: &str, p: &DBClusterParameters) -> Result<(), AwsError> {
        let span = info_span!("aws.rds.delete_db_cluster", db.cluster = id, region = %self.region);
        let skip = p
            .skip_final_snapshot
            .unwrap_or(p.final_db_snapshot_identifier.is_none());
        info!(db.cluster = id, skip_final_snapshot = skip, "Deleting DB cluster");
        let req = self
            .client
            .delete_db_cluster()
            .db_cluster_identifier(id)
            .skip_final_snapshot(skip)
            .set_final_db_snapshot_identifier(p.final_db_snapshot_identifier.clone());
        timed(SERVICE, "DeleteDBCluster", req.send())
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn describe_parameter_group(
        &self,
        kind: ParameterGroupKind,
        name: &str,
    ) -> Result<ParameterGroup, AwsError> {
        let span = info_span!("aws.rds.describe_parameter_group", parameter_group = name, kind = ?kind);
        let group = match kind {
            ParameterGroupKind::Instance => timed(
                SERVICE,
                "DescribeDBParameterGroups",
                self.client
                    .describe_db_parameter_groups()
                    .db_parameter_group_name(name)
                    .send(),
            )
            .instrument(span)
            .await?
            .db_parameter_groups()
            .first()
            .map(|g| ParameterGroup {
                name: g.db_parameter_group_name().unwrap_or(name).to_string(),
                family: owned(g.db_parameter_group_family()),
                description: owned(g.description()),
                arn: owned(g.db_parameter_group_arn()),
            }),
            ParameterGroupKind::Cluster => timed(
                SERVICE,
                "DescribeDBClusterParameterGroups",
                self.client
                    .describe_db_cluster_parameter_groups()
                    .db_cluster_parameter_group_name(name)
                    .send(),
            )
            .instrument(span)
            .await?
            .db_cluster_parameter_groups()
            .first()
            .map(|g| ParameterGroup {
                name: g.db_cluster_parameter_group_name().unwrap_or(name).to_string(),
                family: owned(g.db_parameter_group_family()),
                description: owned(g.description()),
                arn: owned(g.db_cluster_parameter_group_arn()),
            }),
        };
        group.ok_or_else(|| AwsError::not_found(format!("parameter group {name}")))
    }

    async fn create_parameter_group(
        &self,
        kind: ParameterGroupKind,
        name: &str,
        family: &str,
        description: &str,
        tags: &[Tag],
    ) -> Result<ParameterGroup, AwsError> {
        let span = info_span!("aws.rds.create_parameter_group", parameter_group = name, kind = ?kind, family);
        info!(parameter_group = name, family, "Creating parameter group");
        let arn = match kind {
            ParameterGroupKind::Instance => timed(
                SERVICE,
                "CreateDBParameterGroup",
                self.client
                    .create_db_parameter_group()
                    .db_parameter_group_name(name)
                    .db_parameter_group_family(family)
                    .description(description)
                    .set_tags(to_sdk_tags(tags))
                    .send(),
            )
            .instrument(span)
            .await?
            .db_parameter_group()
            .and_then(|g| g.db_parameter_group_arn())
            .map(ToString::to_string),
            ParameterGroupKind::Cluster => timed(
                SERVICE,
                "CreateDBClusterParameterGroup",
                self.client
                    .create_db_cluster_parameter_group()
                    .db_cluster_parameter_group_name(name)
                    .db_parameter_group_family(family)
                    .description(description)
                    .set_tags(to_sdk_tags(tags))
                    .send(),
            )
            .instrument(span)
            .await?
            .db_cluster_parameter_group()
            .and_then(|g| g.db_cluster_parameter_group_arn())
            .map(ToString::to_string),
        };
        Ok(ParameterGroup {
            name: name.to_string(),
            family: Some(family.to_string()),
            description: Some(description.to_string()),
            arn,
        })
    }

    async fn delete_parameter_group(&self, kind: ParameterGroupKind, name: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.rds.delete_parameter_group", parameter_group = name, kind = ?kind);
        info!(parameter_group = name, "Deleting parameter group");
        match kind {
            ParameterGroupKind::Instance => {
                timed(
                    SERVICE,
                    "DeleteDBParameterGroup",
                    self.client
                        .delete_db_parameter_group()
                        .db_parameter_group_name(name)
                        .send(),
                )
                .instrument(span)
                .await?;
            }
            ParameterGroupKind::Cluster => {
                timed(
                    SERVICE,
                    "DeleteDBClusterParameterGroup",
                    self.client
                        .delete_db_cluster_parameter_group()
                        .db_cluster_parameter_group_name(name)
                        .send(),
                )
                .instrument(span)
                .await?;
            }
        }
        Ok(())
    }

    async fn describe_parameters(
        &self,
        kind: ParameterGroupKind,
        name: &str,
        source: Option<&str>,
    ) -> Result<Vec<ObservedParameter>, AwsError> {
        let span = info_span!("aws.rds.describe_parameters", parameter_group = name, kind = ?kind);
        async move {
            let mut parameters = Vec::new();
            let mut marker: Option<String> = None;
            loop {
                let (page, next) = match kind {
                    ParameterGroupKind::Instance => {
                        let out = timed(
                            SERVICE,
                            "DescribeDBParameters",
                            self.client
                                .describe_db_parameters()
                                .db_parameter_group_name(name)
                                .set_source(source.map(ToString::to_string))
                                .set_marker(marker.clone())
                                .send(),
                        )
                        .await?;
                        (observed(out.parameters()), owned(out.marker()))
                    }
                    ParameterGroupKind::Cluster => {
                        let out = timed(
                            SERVICE,
                            "DescribeDBClusterParameters",
                            self.client
                                .describe_db_cluster_parameters()
                                .db_cluster_parameter_group_name(name)
                                .set_source(source.map(ToString::to_string))
                                .set_marker(marker.clone())
                                .send(),
                        )
                        .await?;
                        (observed(out.parameters()), owned(out.marker()))
                    }
                };
                parameters.extend(page);
                match next {
                    Some(m) if !m.is_empty() => marker = Some(m),
                    _ => break,
                }
            }
            Ok(parameters)
        }
        .instrument(span)
        .await
    }

    async fn modify_parameters(
        &self,
        kind: ParameterGroupKind,
        name: &str,
        parameters: &[Parameter],
    ) -> Result<(), AwsError> {
        let span = info_span!(
            "aws.rds.modify_parameters",
            parameter_group = name,
            kind = ?kind,
            count = parameters.len()
        );
        let sdk: Vec<rds::Parameter> = parameters.iter().map(sdk_parameter).collect();
        match kind {
            ParameterGroupKind::Instance => {
                timed(
                    SERVICE,
                    "ModifyDBParameterGroup",
                    self.client
                        .modify_db_parameter_group()
                        .db_parameter_group_name(name)
                        .set_parameters(Some(sdk))
                        .send(),
                )
                .instrument(span)
                .await?;
            }
            ParameterGroupKind::Cluster => {
                timed(
                    SERVICE,
                    "ModifyDBClusterParameterGroup",
                    self.client
                        .modify_db_cluster_parameter_group()
                        .db_cluster_parameter_group_name(name)
                        .set_parameters(Some(sdk))
                        .send(),
                )
                .instrument(span)
                .await?;
            }
        }
        Ok(())
    }

    async fn reset_parameters(
        &self,
        kind: ParameterGroupKind,
        name: &str,
        parameter_names: &[String],
    ) -> Result<(), AwsError> {
        let span = info_span!(
            "aws.rds.reset_parameters",
            parameter_group = name,
            kind = ?kind,
            count = parameter_names.len()
        );
        // pending-reboot is accepted for static and dynamic parameters alike
        let sdk: Vec<rds::Parameter> = parameter_names
            .iter()
            .map(|n| {
                rds::Parameter::builder()
                    .parameter_name(n)
                    .apply_method(ApplyMethod::PendingReboot)
                    .build()
            })
            .collect();
        match kind {
            ParameterGroupKind::Instance => {
                timed(
                    SERVICE,
                    "ResetDBParameterGroup",
                    self.client
                        .reset_db_parameter_group()
                        .db_parameter_group_name(name)
                        .set_parameters(Some(sdk))
                        .send(),
                )
                .instrument(span)
                .await?;
            }
            ParameterGroupKind::Cluster => {
                timed(
                    SERVICE,
                    "ResetDBClusterParameterGroup",
                    self.client
                        .reset_db_cluster_parameter_group()
                        .db_cluster_parameter_group_name(name)
                        .set_parameters(Some(sdk))
                        .send(),
                )
                .instrument(span)
                .await?;
            }
        }
        Ok(())
    }

    async fn default_family(&self, engine: &str, engine_version: Option<&str>) -> Result<Option<String>, AwsError> {
        let span = info_span!("aws.rds.describe_db_engine_versions", engine, engine_version);
        let out = timed(
            SERVICE,
            "DescribeDBEngineVersions",
            self.client
                .describe_db_engine_versions()
                .engine(engine)
                .set_engine_version(engine_version.map(ToString::to_string))
                .set_default_only(Some(engine_version.is_none()))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(out
            .db_engine_versions()
            .first()
            .and_then(|v| v.db_parameter_group_family())
            .map(ToString::to_string))
    }

    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>, AwsError> {
        let span = info_span!("aws.rds.list_tags_for_resource", arn);
        let out = timed(
            SERVICE,
            "ListTagsForResource",
            self.client.list_tags_for_resource().resource_name(arn).send(),
        )
        .instrument(span)
        .await?;
        Ok(from_sdk_tags(out.tag_list()))
    }

    async fn add_tags(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError> {
        let span = info_span!("aws.rds.add_tags_to_resource", arn, count = tags.len());
        timed(
            SERVICE,
            "AddTagsToResource",
            self.client
                .add_tags_to_resource()
                .resource_name(arn)
                .set_tags(to_sdk_tags(tags))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> Result<(), AwsError> {
        let span = info_span!("aws.rds.remove_tags_from_resource", arn, count = keys.len());
        timed(
            SERVICE,
            "RemoveTagsFromResource",
            self.client
                .remove_tags_from_resource()
                .resource_name(arn)
                .set_tag_keys(Some(keys.to_vec()))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }
}

fn observed(parameters: &[rds::Parameter]) -> Vec<ObservedParameter> {
    parameters
        .iter()
        .filter_map(|p| {
            Some(ObservedParameter {
                name: p.parameter_name()?.to_string(),
                value: owned(p.parameter_value()),
                apply_method: p.apply_method().map(|m| m.as_str().to_string()),
                source: owned(p.source()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_round_trip_through_sdk_shape() {
        let tags = vec![Tag::new("env", "prod"), Tag::new("team", "data")];
        let sdk = to_sdk_tags(&tags).unwrap();
        assert_eq!(from_sdk_tags(&sdk), tags);
        assert!(to_sdk_tags(&[]).is_none());
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(parse_time(None).unwrap().is_none());
        assert!(parse_time(Some("2024-03-01T10:00:00Z")).unwrap().is_some());
        assert!(parse_time(Some("yesterday")).is_err());
    }

    #[test]
    fn test_observed_keeps_source() {
        let params = vec![rds::Parameter::builder()
            .parameter_name("max_connections")
            .parameter_value("200")
            .source("user")
            .apply_method(ApplyMethod::Immediate)
            .build()];
        let obs = observed(&params);
        assert_eq!(obs[0].name, "max_connections");
        assert_eq!(obs[0].source.as_deref(), Some("user"));
        assert_eq!(obs[0].apply_method.as_deref(), Some("immediate"));
    }
}
