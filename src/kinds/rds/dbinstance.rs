//! # DBInstance Adapter
//!
//! The external name is the DB instance identifier. Drift is computed field
//! by field against the describe response; fields with a pending
//! modification are compared against the pending value so a change that
//! waits for the maintenance window is not re-submitted every poll.

use super::password::{PasswordCache, PasswordSource, RESTORE_STATE_NORMAL, RESTORE_STATE_RESTORED};
use super::windows::window_up_to_date;
use super::{
    accepts_modify, engine_version_up_to_date, field_up_to_date, security_groups_up_to_date,
    status_condition, sync_tags, user_tags, Drift,
};
use crate::constants::{
    CONNECTION_KEY_ENDPOINT, CONNECTION_KEY_PASSWORD, CONNECTION_KEY_PORT, CONNECTION_KEY_USERNAME,
};
use crate::crd::rds::{DBInstanceObservation, DBInstanceParameters};
use crate::crd::{DBInstance, DBParameterGroup, Managed};
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
use crate::provider::rds::{DbInstance, RdsApi};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub struct DBInstanceHooks {
    rds: Arc<dyn RdsApi>,
    passwords: PasswordCache,
}

impl std::fmt::Debug for DBInstanceHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBInstanceHooks")
            .field("passwords", &self.passwords)
            .finish_non_exhaustive()
    }
}

impl DBInstanceHooks {
    pub fn new(rds: Arc<dyn RdsApi>, passwords: PasswordCache) -> Self {
        Self { rds, passwords }
    }
}

fn password_source(params: &DBInstanceParameters) -> PasswordSource<'_> {
    PasswordSource {
        secret_ref: params.master_user_password_secret_ref.as_ref(),
        autogenerate: params.autogenerate_password,
    }
}

fn identifier(cr: &DBInstance) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))
}

fn observation(d: &DbInstance) -> DBInstanceObservation {
    DBInstanceObservation {
        db_instance_status: d.status.clone(),
        db_instance_arn: d.arn.clone(),
        dbi_resource_id: d.resource_id.clone(),
        endpoint: d.endpoint.clone(),
        engine_version: d.engine_version.clone(),
        instance_create_time: d.instance_create_time.clone(),
        latest_restorable_time: d.latest_restorable_time.clone(),
        pending_modified_values: d.pending_modified_values.clone(),
        aws_backup_recovery_point_arn: d.aws_backup_recovery_point_arn.clone(),
        vpc_security_groups: d.vpc_security_groups.clone(),
    }
}

/// Fields of `desired` that differ from the instance
pub fn instance_drift(desired: &DBInstanceParameters, observed: &DbInstance) -> Vec<&'static str> {
    let pending = observed
        .pending_modified_values
        .clone()
        .unwrap_or_default();
    let port = observed.endpoint.as_ref().and_then(|e| e.port);
    let mut drift = Drift::default();

    drift.check(
        "dbInstanceClass",
        desired.db_instance_class.is_empty()
            || pending
                .db_instance_class
                .as_ref()
                .or(observed.db_instance_class.as_ref())
                == Some(&desired.db_instance_class),
    );
    drift.check(
        "engineVersion",
        engine_version_up_to_date(
            desired.engine_version.as_deref(),
            pending
                .engine_version
                .as_deref()
                .or(observed.engine_version.as_deref()),
        ),
    );
    drift.check(
        "allocatedStorage",
        field_up_to_date(
            desired.allocated_storage.as_ref(),
            pending
                .allocated_storage
                .as_ref()
                .or(observed.allocated_storage.as_ref()),
        ),
    );
    drift.check(
        "maxAllocatedStorage",
        field_up_to_date(
            desired.max_allocated_storage.as_ref(),
            observed.max_allocated_storage.as_ref(),
        ),
    );
    drift.check(
        "storageType",
        field_up_to_date(
            desired.storage_type.as_ref(),
            pending.storage_type.as_ref().or(observed.storage_type.as_ref()),
        ),
    );
    drift.check(
        "iops",
        field_up_to_date(desired.iops.as_ref(), pending.iops.as_ref().or(observed.iops.as_ref())),
    );
    drift.check(
        "multiAZ",
        field_up_to_date(
            desired.multi_az.as_ref(),
            pending.multi_az.as_ref().or(observed.multi_az.as_ref()),
        ),
    );
    drift.check(
        "publiclyAccessible",
        field_up_to_date(
            desired.publicly_accessible.as_ref(),
            observed.publicly_accessible.as_ref(),
        ),
    );
    // Retention is owned by AWS Backup once a recovery point is attached
    if observed.aws_backup_recovery_point_arn.is_none() {
        drift.check(
            "backupRetentionPeriod",
            field_up_to_date(
                desired.backup_retention_period.as_ref(),
                pending
                    .backup_retention_period
                    .as_ref()
                    .or(observed.backup_retention_period.as_ref()),
            ),
        );
    }
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
        "dbSubnetGroupName",
        field_up_to_date(
            desired.db_subnet_group_name.as_ref(),
            observed.db_subnet_group_name.as_ref(),
        ),
    );
    drift.check(
        "dbParameterGroupName",
        field_up_to_date(
            desired.db_parameter_group_name.as_ref(),
            observed.db_parameter_group_name.as_ref(),
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
        "autoMinorVersionUpgrade",
        field_up_to_date(
            desired.auto_minor_version_upgrade.as_ref(),
            observed.auto_minor_version_upgrade.as_ref(),
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
        "port",
        field_up_to_date(desired.port.as_ref(), pending.port.as_ref().or(port.as_ref())),
    );
    drift.check(
        "tags",
        are_tags_up_to_date(&desired.tags, &user_tags(&observed.tags)),
    );
    drift.fields().to_vec()
}

/// Parameters for `ModifyDBInstance`: the desired parameters minus the
/// fields AWS rejects when resent unchanged
fn modify_parameters(desired: &DBInstanceParameters, observed: &DbInstance) -> DBInstanceParameters {
    let mut params = desired.clone();
    if engine_version_up_to_date(desired.engine_version.as_deref(), observed.engine_version.as_deref()) {
        params.engine_version = None;
    }
    if params.db_subnet_group_name.is_some() && params.db_subnet_group_name == observed.db_subnet_group_name {
        params.db_subnet_group_name = None;
    }
    if observed.aws_backup_recovery_point_arn.is_some() {
        params.backup_retention_period = None;
    }
    params
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
impl KindHooks for DBInstanceHooks {
    type Resource = DBInstance;
    type Described = DbInstance;

    fn validate(&self, cr: &DBInstance) -> Result<(), ExternalError> {
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

    async fn describe(&self, cr: &DBInstance) -> Result<Vec<DbInstance>, ExternalError> {
        let Some(id) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        Ok(vec![self.rds.describe_db_instance(id).await?])
    }

    fn generate_observation(&self, described: &DbInstance) -> DBInstanceObservation {
        observation(described)
    }

    fn late_initialize(&self, cr: &DBInstance, d: &DbInstance) -> Option<DBInstanceParameters> {
        let mut p = cr.for_provider().clone();
        let mut li = LateInitializer::new();
        li.string(&mut p.db_instance_class, d.db_instance_class.clone());
        li.string(&mut p.engine, d.engine.clone());
        li.option(&mut p.engine_version, d.engine_version.clone());
        li.option(&mut p.allocated_storage, d.allocated_storage);
        li.option(&mut p.max_allocated_storage, d.max_allocated_storage);
        li.option(&mut p.storage_type, d.storage_type.clone());
        li.option(&mut p.iops, d.iops);
        li.option(&mut p.storage_encrypted, d.storage_encrypted);
        li.option(&mut p.kms_key_id, d.kms_key_id.clone());
        li.option(&mut p.master_username, d.master_username.clone());
        li.option(&mut p.db_name, d.db_name.clone());
        li.option(&mut p.port, d.endpoint.as_ref().and_then(|e| e.port));
        li.option(&mut p.multi_az, d.multi_az);
        li.option(&mut p.publicly_accessible, d.publicly_accessible);
        if d.aws_backup_recovery_point_arn.is_none() {
            li.option(&mut p.backup_retention_period, d.backup_retention_period);
        }
        li.option(&mut p.preferred_backup_window, d.preferred_backup_window.clone());
        li.option(&mut p.preferred_maintenance_window, d.preferred_maintenance_window.clone());
        li.option(&mut p.db_subnet_group_name, d.db_subnet_group_name.clone());
        li.option(&mut p.db_parameter_group_name, d.db_parameter_group_name.clone());
        li.vec(
            &mut p.vpc_security_group_ids,
            d.vpc_security_groups
                .iter()
                .map(|m| m.vpc_security_group_id.clone())
                .collect(),
        );
        li.option(&mut p.deletion_protection, d.deletion_protection);
        li.option(&mut p.auto_minor_version_upgrade, d.auto_minor_version_upgrade);
        li.option(&mut p.copy_tags_to_snapshot, d.copy_tags_to_snapshot);
        li.option(
            &mut p.enable_iam_database_authentication,
            d.iam_database_authentication_enabled,
        );
        li.is_changed().then_some(p)
    }

    async fn is_up_to_date(&self, cr: &DBInstance, d: &DbInstance) -> Result<bool, ExternalError> {
        if !accepts_modify(d.status.as_deref()) {
            return Ok(true);
        }
        let drift = instance_drift(cr.for_provider(), d);
        if !drift.is_empty() {
            debug!("DBInstance {} differs in {:?}", cr.resource_name(), drift);
            return Ok(false);
        }
        self.passwords
            .password_up_to_date(cr, password_source(cr.for_provider()))
            .await
    }

    async fn post_observe(
        &self,
        cr: &mut DBInstance,
        d: &DbInstance,
        mut observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(status_condition(d.status.as_deref()));

        let cached = self.passwords.cached_password(cr).await?;
        let username = d
            .master_username
            .as_deref()
            .or(cr.for_provider().master_username.as_deref());
        let mut details = credentials(username, Some(cached.as_str()));
        if let Some(endpoint) = &d.endpoint {
            if let Some(address) = &endpoint.address {
                details.insert(CONNECTION_KEY_ENDPOINT.to_string(), address.as_bytes().to_vec());
            }
            if let Some(port) = endpoint.port {
                details.insert(CONNECTION_KEY_PORT.to_string(), port.to_string().into_bytes());
            }
        }
        observation.connection_details = details;
        Ok(observation)
    }

    async fn create_remote(&self, cr: &mut DBInstance) -> Result<ExternalCreation, ExternalError> {
        let id = identifier(cr)?;
        let params = cr.for_provider().clone();
        let password = self.passwords.desired_password(password_source(&params)).await?;
        let password = password.as_deref().map(String::as_str);

        let (instance, restore_state) = if params.restore_from.is_some() {
            info!("Restoring DB instance: {}", id);
            (
                self.rds.restore_db_instance(&id, &params, password).await?,
                RESTORE_STATE_RESTORED,
            )
        } else {
            info!("Creating DB instance: {}", id);
            (
                self.rds.create_db_instance(&id, &params, password).await?,
                RESTORE_STATE_NORMAL,
            )
        };
        self.passwords.cache(cr, password, restore_state).await?;
        cr.set_at_provider(observation(&instance));

        Ok(ExternalCreation {
            connection_details: credentials(params.master_username.as_deref(), password),
        })
    }

    async fn update_remote(&self, cr: &mut DBInstance) -> Result<ExternalUpdate, ExternalError> {
        let id = identifier(cr)?;
        let desired = cr.for_provider().clone();
        let observed = self.rds.describe_db_instance(&id).await?;

        let restored =
            self.passwords.restore_state(cr).await?.as_deref() == Some(RESTORE_STATE_RESTORED);
        let password: Option<Zeroizing<String>> = if self
            .passwords
            .password_up_to_date(cr, password_source(&desired))
            .await?
        {
            None
        } else {
            self.passwords.desired_password(password_source(&desired)).await?
        };
        let password = password.as_deref().map(String::as_str);

        info!("Modifying DB instance: {}", id);
        let modified = self
            .rds
            .modify_db_instance(&id, &modify_parameters(&desired, &observed), password)
            .await?;

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

    async fn pre_delete(&self, cr: &mut DBInstance) -> Result<bool, ExternalError> {
        let deleting = cr
            .at_provider()
            .and_then(|o| o.db_instance_status.as_deref())
            == Some("deleting");
        Ok(deleting)
    }

    async fn delete_remote(&self, cr: &mut DBInstance) -> Result<(), ExternalError> {
        let id = identifier(cr)?;
        info!("Deleting DB instance: {}", id);
        Ok(self.rds.delete_db_instance(&id, cr.for_provider()).await?)
    }
}

#[async_trait]
impl BuildHooks for DBInstanceHooks {
    async fn build(ctx: &ConnectContext, cr: &DBInstance) -> Result<Self, ExternalError> {
        let rds = ctx.rds(cr, &cr.for_provider().region).await?;
        Ok(Self::new(
            rds,
            PasswordCache::new(Arc::clone(&ctx.secrets), ctx.controller_namespace.clone()),
        ))
    }

    async fn release(ctx: &ConnectContext, cr: &DBInstance) -> Result<(), ExternalError> {
        PasswordCache::new(Arc::clone(&ctx.secrets), ctx.controller_namespace.clone())
            .delete_cache(cr)
            .await
    }
}

#[async_trait]
impl ResolveReferences for DBInstance {
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
        resolve_field(
            resolver,
            &from,
            &mut p.db_subnet_group_name,
            &mut p.db_subnet_group_name_ref,
            p.db_subnet_group_name_selector.as_ref(),
            &targets::db_subnet_group(),
            Extractor::ExternalName,
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
            &mut p.db_parameter_group_name,
            &mut p.db_parameter_group_name_ref,
            p.db_parameter_group_name_selector.as_ref(),
            &TargetKind::of::<DBParameterGroup>(),
            Extractor::ExternalName,
        )
        .await
    }
}
