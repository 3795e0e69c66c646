//! Backup adapter.
//!
//! The external name is the backup ARN returned by `CreateBackup`. Backups
//! are immutable, so there is nothing to update.

use crate::crd::dynamodb::BackupObservation;
use crate::crd::{Backup, Condition, Managed, Table};
use crate::kinds::{BuildHooks, ConnectContext};
use crate::managed::external::{
    ExternalCreation, ExternalError, ExternalObservation, ExternalUpdate, KindHooks,
};
use crate::managed::reference::resolve_field;
use crate::managed::{
    conditions, meta, ExternalNameInitializer, Extractor, ReferenceError, ReferenceResolver,
    ResolveReferences, TargetKind,
};
use crate::provider::dynamodb::{BackupDescription, DynamoDbApi};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct BackupHooks {
    dynamodb: Arc<dyn DynamoDbApi>,
}

impl std::fmt::Debug for BackupHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupHooks").finish_non_exhaustive()
    }
}

impl BackupHooks {
    pub fn new(dynamodb: Arc<dyn DynamoDbApi>) -> Self {
        Self { dynamodb }
    }
}

fn backup_arn(cr: &Backup) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("backup has not been created"))
}

fn observation(b: &BackupDescription) -> BackupObservation {
    BackupObservation {
        backup_arn: Some(b.arn.clone()),
        backup_name: b.name.clone(),
        backup_status: b.status.clone(),
        backup_type: b.backup_type.clone(),
        backup_size_bytes: b.size_bytes,
        table_arn: b.table_arn.clone(),
    }
}

#[must_use]
pub fn backup_condition(status: Option<&str>) -> Condition {
    match status {
        Some("AVAILABLE") => conditions::available(),
        Some("CREATING") => conditions::creating(),
        Some("DELETED") => conditions::deleting(),
        Some(other) => conditions::unavailable(other),
        None => conditions::unavailable("status not reported"),
    }
}

#[async_trait]
impl KindHooks for BackupHooks {
    type Resource = Backup;
    type Described = BackupDescription;

    fn validate(&self, cr: &Backup) -> Result<(), ExternalError> {
        if cr.for_provider().table_name.is_none() {
            return Err(ExternalError::validation("tableName is not set"));
        }
        Ok(())
    }

    async fn describe(&self, cr: &Backup) -> Result<Vec<BackupDescription>, ExternalError> {
        let Some(arn) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        let backup = self.dynamodb.describe_backup(arn).await?;
        if backup.status.as_deref() == Some("DELETED") {
            return Ok(Vec::new());
        }
        Ok(vec![backup])
    }

    fn generate_observation(&self, b: &BackupDescription) -> BackupObservation {
        observation(b)
    }

    async fn post_observe(
        &self,
        cr: &mut Backup,
        b: &BackupDescription,
        observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(backup_condition(b.status.as_deref()));
        Ok(observation)
    }

    async fn create_remote(&self, cr: &mut Backup) -> Result<ExternalCreation, ExternalError> {
        let table = cr
            .for_provider()
            .table_name
            .clone()
            .ok_or_else(|| ExternalError::validation("tableName is not set"))?;
        let name = cr.resource_name().to_string();
        info!("Creating backup {} of table {}", name, table);
        let backup = self.dynamodb.create_backup(&table, &name).await?;
        meta::set_external_name(cr, &backup.arn);
        cr.set_at_provider(observation(&backup));
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, _cr: &mut Backup) -> Result<ExternalUpdate, ExternalError> {
        Ok(ExternalUpdate::default())
    }

    async fn delete_remote(&self, cr: &mut Backup) -> Result<(), ExternalError> {
        let arn = backup_arn(cr)?;
        info!("Deleting backup: {}", arn);
        Ok(self.dynamodb.delete_backup(&arn).await?)
    }
}

#[async_trait]
impl BuildHooks for BackupHooks {
    fn external_name_initializer() -> ExternalNameInitializer {
        ExternalNameInitializer::Deferred
    }

    async fn build(ctx: &ConnectContext, cr: &Backup) -> Result<Self, ExternalError> {
        Ok(Self::new(ctx.dynamodb(cr, &cr.for_provider().region).await?))
    }
}

#[async_trait]
impl ResolveReferences for Backup {
    async fn resolve_references(&mut self, resolver: &ReferenceResolver) -> Result<(), ReferenceError> {
        let from = self.metadata.clone();
        let p = &mut self.spec.for_provider;
        resolve_field(
            resolver,
            &from,
            &mut p.table_name,
            &mut p.table_name_ref,
            p.table_name_selector.as_ref(),
            &TargetKind::of::<Table>(),
            Extractor::ExternalName,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConditionStatus;

    #[test]
    fn test_backup_condition() {
        assert_eq!(backup_condition(Some("AVAILABLE")).status, ConditionStatus::True);
        assert_eq!(
            backup_condition(Some("CREATING")).reason,
            conditions::REASON_CREATING
        );
        assert_eq!(backup_condition(None).status, ConditionStatus::False);
    }
}
