//! # DBCluster Adapter
//!
//! Same lifecycle as `DBInstance`: password cache, restore-from-backup, tag
//! sync on the cluster ARN. Connection details add the reader endpoint.

use super::password::{PasswordCache, PasswordSource, RESTORE_STATE_NORMAL, RESTORE_STATE_RESTORED};
use super::windows::window_up_to_date;
use super::{
    accepts_modify, engine_version_up_to_date, field_up_to_date, security_groups_up_to_date,
    status_condition, sync_tags, user_tags, Drift,
};
use crate::constants::{
    CONNECTION_KEY_ENDPOINT, CONNECTION_KEY_PASSWORD, CONNECTION_KEY_PORT, CONNECTION_KEY_USERNAME,
};
use crate::crd::rds::{DBClusterObservation, DBClusterParameters};
use crate::crd::{DBCluster, DBClusterParameterGroup, Managed};
use crate::kinds::{targets, BuildHooks, ConnectContext};
use crate::managed::external::{
    ConnectionDetails, ExternalCreation, ExternalError, ExternalObservation, ExternalUpdate,
    KindHooks,
};
use crate::managed::meta;
use crate::managed::pointer::LateInitializer;
use crate::managed::reference::{resolve_field, resolve_list};
use crate::managed::tags::{are_tags_up_to_date, duplicate_key};
use crate::managed::{Extractor, ReferenceError, ReferenceResolver, ResolveReferences, TargetKind};
use crate::provider::rds::{DbCluster, RdsApi};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Connection detail key for the read-only endpoint
pub const CONNECTION_KEY_READER_ENDPOINT: &str = "readerEndpoint";

pub struct DBClusterHooks {
    rds: Arc<dyn RdsApi>,
    passwords: PasswordCache,
}

impl std::fmt::Debug for DBClusterHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClusterHooks")
            .field("passwords", &self.passwords)
            .finish_non_exhaustive()
    }
}

impl DBClusterHooks {
    pub fn new(rds: Arc<dyn RdsApi>, passwords: PasswordCache) -> Self {
        Self { rds, passwords }
    }
}

fn password_source(params: &DBClusterParameters) -> PasswordSource<'_> {
    PasswordSource {
        secret_ref: params.master_user_password_secret_ref.as_ref(),
        autogenerate: params.autogenerate_password,
    }
}

fn identifier(cr: &DBCluster) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))
}

fn observation(c: &DbCluster) -> DBClusterObservation {
    DBClusterObservation {
        status: c.status.clone(),
        db_cluster_arn: c.arn.clone(),
        db_cluster_resource_id: c.resource_id.clone(),
        endpoint: c.endpoint.clone(),
        reader_endpoint: c.reader_endpoint.clone(),
        port: c.port,
        engine_version: c.engine_version.clone(),
        cluster_create_time: c.cluster_create_time.clone(),
        vpc_security_groups: c.vpc_security_groups.clone(),
    }
}

pub fn cluster_drift(desired: &DBClusterParameters, observed: &DbCluster) -> Vec<&'static str> {
    let mut drift = Drift::default();
    drift.check(
        "engineVersion",
        engine_version_up_to_date(desired.engine_version.as_deref(), observed.engine_version.as_deref()),
    );
    drift.check("port", field_up_to_date(desired.port.as_ref(), observed.port.as_ref()));
    drift.check(
        "backupRetentionPeriod",
        field_up_to_date(
            desired.backup_retention_period.as_ref(),
            observed.backup_retention_period.as_ref(),
        ),
    );
    drift.check(
        "preferredBackupWindow",
        window_up_to_date(
            desired.preferred_backup_window.as_deref(),
            observed.preferred_backup_window.as_deref(),
        ),
    );
    drift.check(
        "preferredMaintenanceWindow",
        window_up_to_date(
            desired.preferred_maintenance_window.as_deref(),
            observed.preferred_maintenance_window.as_deref(),
        ),
    );
    drift.check(
        "dbClusterParameterGroupName",
        field_up_to_date(
            desired.db_cluster_parameter_group_name.as_ref(),
            observed.db_cluster_parameter_group.as_ref(),
        ),
    );
    drift.check(
        "vpcSecurityGroupIds",
        security_groups_up_to_date(&desired.vpc_security_group_ids, &observed.vpc_security_groups),
    );
    drift.check(
        "deletionProtection",
        field_up_to_date(
            desired.deletion_protection.as_ref(),
            observed.deletion_protection.as_ref(),
        ),
    );
    drift.check(
        "copyTagsToSnapshot",
        field_up_to_date(
            desired.copy_tags_to_snapshot.as_ref(),
            observed.copy_tags_to_snapshot.as_ref(),
        ),
    );
    drift.check(
        "enableIAMDatabaseAuthentication",
        field_up_to_date(
            desired.enable_iam_database_authentication.as_ref(),
            observed.iam_database_authentication_enabled.as_ref(),
        ),
    );
    drift.check(
        "tags",
        are_tags_up_to_date(&desired.tags, &user_tags(&observed.tags)),
    );
    drift.fields().to_vec()
}

fn credentials(username: Option<&str>, password: Option<&str>) -> ConnectionDetails {
    let mut details = ConnectionDetails::new();
    if let Some(username) = username.filter(|u| !u.is_empty()) {
        details.insert(CONNECTION_KEY_USERNAME.to_string(), username.as_bytes().to_vec());
    }
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        details.insert(CONNECTION_KEY_PASSWORD.to_string(), password.as_bytes().to_vec());
    }
    details
}

#[async_trait]
impl KindHooks for DBClusterHooks {
    type Resource = DBCluster;
    type Described = DbCluster;

    fn validate(&self, cr: &DBCluster) -> Result<(), ExternalError> {
        let p = cr.for_provider();
        if p.autogenerate_password && p.master_user_password_secret_ref.is_none() {
            return Err(ExternalError::validation(
                "autogeneratePassword requires masterUserPasswordSecretRef",
            ));
        }
        if let Some(key) = duplicate_key(&p.tags) {
            return Err(ExternalError::validation(format!("duplicate tag key {key}")));
        }
        Ok(())
    }

    async fn describe(&self, cr: &DBCluster) -> Result<Vec<DbCluster>, ExternalError> {
        let Some(id) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        Ok(vec![self.rds.describe_db_cluster(id).await?])
    }

    fn generate_observation(&self, described: &DbCluster) -> DBClusterObservation {
        observation(described)
    }

    fn late_initialize(&self, cr: &DBCluster, c: &DbCluster) -> Option<DBClusterParameters> {
        let mut p = cr.for_provider().clone();
        let mut li = LateInitializer::new();
        li.string(&mut p.engine, c.engine.clone());
        li.option(&mut p.engine_version, c.engine_version.clone());
        li.option(&mut p.engine_mode, c.engine_mode.clone());
        li.option(&mut p.database_name, c.database_name.clone());
        li.option(&mut p.port, c.port);
        li.option(&mut p.master_username, c.master_username.clone());
        li.option(&mut p.backup_retention_period, c.backup_retention_period);
        li.option(&mut p.preferred_backup_window, c.preferred_backup_window.clone());
        li.option(&mut p.preferred_maintenance_window, c.preferred_maintenance_window.clone());
        li.option(&mut p.storage_encrypted, c.storage_encrypted);
        li.option(&mut p.kms_key_id, c.kms_key_id.clone());
        li.option(
            &mut p.db_cluster_parameter_group_name,
            c.db_cluster_parameter_group.clone(),
        );
        li.option(&mut p.db_subnet_group_name, c.db_subnet_group.clone());
        li.vec(
            &mut p.vpc_security_group_ids,
            c.vpc_security_groups
                .iter()
                .map(|m| m.vpc_security_group_id.clone())
                .collect(),
        );
        li.option(&mut p.deletion_protection, c.deletion_protection);
        li.option(&mut p.copy_tags_to_snapshot, c.copy_tags_to_snapshot);
        li.option(
            &mut p.enable_iam_database_authentication,
            c.iam_database_authentication_enabled,
        );
        li.is_changed().then_some(p)
    }

    async fn is_up_to_date(&self, cr: &DBCluster, c: &DbCluster) -> Result<bool, ExternalError> {
        if !accepts_modify(c.status.as_deref()) {
            return Ok(true);
        }
        let drift = cluster_drift(cr.for_provider(), c);
        if !drift.is_empty() {
            debug!("DBCluster {} differs in {:?}", cr.resource_name(), drift);
            return Ok(false);
        }
        self.passwords
            .password_up_to_date(cr, password_source(cr.for_provider()))
            .await
    }

    async fn post_observe(
        &self,
        cr: &mut DBCluster,
        c: &DbCluster,
        mut observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(status_condition(c.status.as_deref()));

        let cached = self.passwords.cached_password(cr).await?;
        let username = c
            .master_username
            .as_deref()
            .or(cr.for_provider().master_username.as_deref());
        let mut details = credentials(username, Some(cached.as_str()));
        if let Some(endpoint) = &c.endpoint {
            details.insert(CONNECTION_KEY_ENDPOINT.to_string(), endpoint.as_bytes().to_vec());
        }
        if let Some(reader) = &c.reader_endpoint {
            details.insert(
                CONNECTION_KEY_READER_ENDPOINT.to_string(),
                reader.as_bytes().to_vec(),
            );
        }
        if let Some(port) = c.port {
            details.insert(CONNECTION_KEY_PORT.to_string(), port.to_string().into_bytes());
        }
        observation.connection_details = details;
        Ok(observation)
    }

    async fn create_remote(&self, cr: &mut DBCluster) -> Result<ExternalCreation, ExternalError> {
        let id = identifier(cr)?;
        let params = cr.for_provider().clone();
        let password = self.passwords.desired_password(password_source(&params)).await?;
        let password = password.as_deref().map(String::as_str);

        let (cluster, restore_state) = if params.restore_from.is_some() {
            info!("Restoring DB cluster: {}", id);
            (
                self.rds.restore_db_cluster(&id, &params, password).await?,
                RESTORE_STATE_RESTORED,
            )
        } else {
            info!("Creating DB cluster: {}", id);
            (
                self.rds.create_db_cluster(&id, &params, password).await?,
                RESTORE_STATE_NORMAL,
            )
        };
        self.passwords.cache(cr, password, restore_state).await?;
        cr.set_at_provider(observation(&cluster));

        Ok(ExternalCreation {
            connection_details: credentials(params.master_username.as_deref(), password),
        })
    }

    async fn update_remote(&self, cr: &mut DBCluster) -> Result<ExternalUpdate, ExternalError> {
        let id = identifier(cr)?;
        let desired = cr.for_provider().clone();
        let observed = self.rds.describe_db_cluster(&id).await?;

        let restored =
            self.passwords.restore_state(cr).await?.as_deref() == Some(RESTORE_STATE_RESTORED);
        let password = if self
            .passwords
            .password_up_to_date(cr, password_source(&desired))
            .await?
        {
            None
        } else {
            self.passwords.desired_password(password_source(&desired)).await?
        };
        let password = password.as_deref().map(String::as_str);

        let mut params = desired.clone();
        if engine_version_up_to_date(desired.engine_version.as_deref(), observed.engine_version.as_deref()) {
            params.engine_version = None;
        }

        info!("Modifying DB cluster: {}", id);
        let modified = self.rds.modify_db_cluster(&id, &params, password).await?;

        if let Some(arn) = observed.arn.as_deref() {
            sync_tags(self.rds.as_ref(), arn, &desired.tags, &observed.tags).await?;
        }

        if password.is_some() {
            self.passwords.cache(cr, password, RESTORE_STATE_NORMAL).await?;
        } else if restored {
            let cached = self.passwords.cached_password(cr).await?;
            self.passwords
                .cache(cr, Some(cached.as_str()), RESTORE_STATE_NORMAL)
                .await?;
        }
        cr.set_at_provider(observation(&modified));

        Ok(ExternalUpdate {
            connection_details: credentials(None, password),
        })
    }

    async fn pre_delete(&self, cr: &mut DBCluster) -> Result<bool, ExternalError> {
        Ok(cr.at_provider().and_then(|o| o.status.as_deref()) == Some("deleting"))
    }

    async fn delete_remote(&self, cr: &mut DBCluster) -> Result<(), ExternalError> {
        let id = identifier(cr)?;
        info!("Deleting DB cluster: {}", id);
        Ok(self.rds.delete_db_cluster(&id, cr.for_provider()).await?)
    }
}

#[async_trait]
impl BuildHooks for DBClusterHooks {
    async fn build(ctx: &ConnectContext, cr: &DBCluster) -> Result<Self, ExternalError> {
        let rds = ctx.rds(cr, &cr.for_provider().region).await?;
        Ok(Self::new(
            rds,
            PasswordCache::new(Arc::clone(&ctx.secrets), ctx.controller_namespace.clone()),
        ))
    }

    async fn release(ctx: &ConnectContext, cr: &DBCluster) -> Result<(), ExternalError> {
        PasswordCache::new(Arc::clone(&ctx.secrets), ctx.controller_namespace.clone())
            .delete_cache(cr)
            .await
    }
}

#[async_trait]
impl ResolveReferences for DBCluster {
    async fn resolve_references(&mut self, resolver: &ReferenceResolver) -> Result<(), ReferenceError> {
        let from = self.metadata.clone();
        let p = &mut self.spec.for_provider;
        resolve_field(
            resolver,
            &from,
            &mut p.kms_key_id,
            &mut p.kms_key_id_ref,
            p.kms_key_id_selector.as_ref(),
            &targets::kms_key(),
            Extractor::AtProvider("/arn"),
        )
        .await?;
        resolve_list(
            resolver,
            &from,
            &mut p.vpc_security_group_ids,
            &mut p.vpc_security_group_id_refs,
            p.vpc_security_group_id_selector.as_ref(),
            &targets::security_group(),
            Extractor::ExternalName,
        )
        .await?;
        resolve_field(
            resolver,
            &from,
            &mut p.db_cluster_parameter_group_name,
            &mut p.db_cluster_parameter_group_name_ref,
            p.db_cluster_parameter_group_name_selector.as_ref(),
            &TargetKind::of::<DBClusterParameterGroup>(),
            Extractor::ExternalName,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Tag;

    fn observed() -> DbCluster {
        DbCluster {
            identifier: "aurora".to_string(),
            status: Some("available".to_string()),
            engine: Some("aurora-postgresql".to_string()),
            engine_version: Some("15.4".to_string()),
            port: Some(5432),
            backup_retention_period: Some(1),
            preferred_backup_window: Some("07:00-07:30".to_string()),
            db_cluster_parameter_group: Some("default.aurora-postgresql15".to_string()),
            tags: vec![Tag::new("aws:rds:owner", "x")],
            ..DbCluster::default()
        }
    }

    #[test]
    fn test_cluster_without_desired_fields_is_up_to_date() {
        let desired = DBClusterParameters {
            engine: "aurora-postgresql".to_string(),
            ..DBClusterParameters::default()
        };
        assert!(cluster_drift(&desired, &observed()).is_empty());
    }

    #[test]
    fn test_cluster_drift_fields() {
        let desired = DBClusterParameters {
            engine: "aurora-postgresql".to_string(),
            engine_version: Some("16".to_string()),
            backup_retention_period: Some(7),
            tags: vec![Tag::new("env", "prod")],
            ..DBClusterParameters::default()
        };
        assert_eq!(
            cluster_drift(&desired, &observed()),
            vec!["engineVersion", "backupRetentionPeriod", "tags"]
        );
    }

    #[test]
    fn test_observation_carries_endpoints() {
        let mut c = observed();
        c.endpoint = Some("aurora.cluster-x.us-east-1.rds.amazonaws.com".to_string());
        c.reader_endpoint = Some("aurora.cluster-ro-x.us-east-1.rds.amazonaws.com".to_string());
        let o = observation(&c);
        assert_eq!(o.endpoint, c.endpoint);
        assert_eq!(o.reader_endpoint, c.reader_endpoint);
        assert_eq!(o.port, Some(5432));
    }
}
