//! Table adapter.
//!
//! Key schema, attribute definitions and global secondary indexes are fixed
//! at creation. Billing, throughput, streams, encryption, table class,
//! deletion protection and tags are reconciled through `UpdateTable` and the
//! tagging API.

use super::{status_condition, sync_tags};
use crate::crd::dynamodb::{SseSpecification, StreamSpecification, TableObservation, TableParameters};
use crate::crd::{Managed, Table, Tag};
use crate::kinds::{BuildHooks, ConnectContext};
use crate::managed::external::{
    ExternalCreation, ExternalError, ExternalObservation, ExternalUpdate, KindHooks,
};
use crate::managed::meta;
use crate::managed::pointer::LateInitializer;
use crate::managed::tags::{are_tags_up_to_date, duplicate_key};
use crate::managed::ResolveReferences;
use crate::provider::dynamodb::{DynamoDbApi, TableDescription, TableUpdate};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

const BILLING_PROVISIONED: &str = "PROVISIONED";
const BILLING_PAY_PER_REQUEST: &str = "PAY_PER_REQUEST";
const TABLE_CLASS_STANDARD: &str = "STANDARD";

/// Table description plus its tags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableState {
    pub table: TableDescription,
    pub tags: Vec<Tag>,
}

pub struct TableHooks {
    dynamodb: Arc<dyn DynamoDbApi>,
}

impl std::fmt::Debug for TableHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableHooks").finish_non_exhaustive()
    }
}

impl TableHooks {
    pub fn new(dynamodb: Arc<dyn DynamoDbApi>) -> Self {
        Self { dynamodb }
    }
}

fn table_name(cr: &Table) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))
}

fn observation(t: &TableDescription) -> TableObservation {
    TableObservation {
        table_arn: t.arn.clone(),
        table_id: t.table_id.clone(),
        table_status: t.status.clone(),
        item_count: t.item_count,
        table_size_bytes: t.table_size_bytes,
        latest_stream_arn: t.latest_stream_arn.clone(),
    }
}

fn stream_up_to_date(desired: &StreamSpecification, observed: Option<&StreamSpecification>) -> bool {
    let enabled = observed.is_some_and(|s| s.stream_enabled);
    if desired.stream_enabled != enabled {
        return false;
    }
    !desired.stream_enabled
        || desired.stream_view_type.is_none()
        || desired.stream_view_type == observed.and_then(|s| s.stream_view_type.clone())
}

fn sse_up_to_date(desired: &SseSpecification, observed: Option<&SseSpecification>) -> bool {
    let enabled = observed.and_then(|s| s.enabled).unwrap_or(false);
    if desired.enabled.unwrap_or(false) != enabled {
        return false;
    }
    let key = observed.and_then(|s| s.kms_master_key_id.as_ref());
    desired
        .kms_master_key_id
        .as_ref()
        .map_or(true, |k| key == Some(k) || key.is_some_and(|o| o.ends_with(k.as_str())))
}

/// The `UpdateTable` request that brings the table in line with `desired`
pub fn table_update(desired: &TableParameters, observed: &TableDescription) -> TableUpdate {
    let mut update = TableUpdate::default();
    let observed_billing = observed.billing_mode.as_deref().unwrap_or(BILLING_PROVISIONED);

    if let Some(billing) = desired.billing_mode.as_deref() {
        if billing != observed_billing {
            update.billing_mode = Some(billing.to_string());
        }
    }
    let billing = desired.billing_mode.as_deref().unwrap_or(observed_billing);
    if billing != BILLING_PAY_PER_REQUEST {
        if let Some(throughput) = &desired.provisioned_throughput {
            if observed.provisioned_throughput.as_ref() != Some(throughput) || update.billing_mode.is_some() {
                update.provisioned_throughput = Some(throughput.clone());
            }
        }
    }
    if let Some(stream) = &desired.stream_specification {
        if !stream_up_to_date(stream, observed.stream_specification.as_ref()) {
            update.stream_specification = Some(stream.clone());
        }
    }
    if let Some(sse) = &desired.sse_specification {
        if !sse_up_to_date(sse, observed.sse_specification.as_ref()) {
            update.sse_specification = Some(sse.clone());
        }
    }
    if let Some(class) = desired.table_class.as_deref() {
        if class != observed.table_class.as_deref().unwrap_or(TABLE_CLASS_STANDARD) {
            update.table_class = Some(class.to_string());
        }
    }
    if let Some(protection) = desired.deletion_protection_enabled {
        if Some(protection) != observed.deletion_protection_enabled {
            update.deletion_protection_enabled = Some(protection);
        }
    }
    update
}

#[async_trait]
impl KindHooks for TableHooks {
    type Resource = Table;
    type Described = TableState;

    fn validate(&self, cr: &Table) -> Result<(), ExternalError> {
        let p = cr.for_provider();
        if p.key_schema.is_empty() {
            return Err(ExternalError::validation("keySchema must not be empty"));
        }
        if let Some(key) = duplicate_key(&p.tags) {
            return Err(ExternalError::validation(format!("duplicate tag key {key}")));
        }
        Ok(())
    }

    async fn describe(&self, cr: &Table) -> Result<Vec<TableState>, ExternalError> {
        let Some(name) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        let table = self.dynamodb.describe_table(name).await?;
        let tags = match table.arn.as_deref() {
            Some(arn) => self.dynamodb.list_tags(arn).await?,
            None => Vec::new(),
        };
        Ok(vec![TableState { table, tags }])
    }

    fn generate_observation(&self, state: &TableState) -> TableObservation {
        observation(&state.table)
    }

    fn late_initialize(&self, cr: &Table, state: &TableState) -> Option<TableParameters> {
        let t = &state.table;
        let mut p = cr.for_provider().clone();
        let mut li = LateInitializer::new();
        li.option(&mut p.billing_mode, t.billing_mode.clone());
        if p.billing_mode.as_deref() != Some(BILLING_PAY_PER_REQUEST) {
            li.option(&mut p.provisioned_throughput, t.provisioned_throughput.clone());
        }
        li.option(&mut p.stream_specification, t.stream_specification.clone());
        li.option(&mut p.sse_specification, t.sse_specification.clone());
        li.option(&mut p.table_class, t.table_class.clone());
        li.option(&mut p.deletion_protection_enabled, t.deletion_protection_enabled);
        li.vec(&mut p.global_secondary_indexes, t.global_secondary_indexes.clone());
        li.is_changed().then_some(p)
    }

    async fn is_up_to_date(&self, cr: &Table, state: &TableState) -> Result<bool, ExternalError> {
        if state.table.status.as_deref() != Some("ACTIVE") {
            return Ok(true);
        }
        let p = cr.for_provider();
        let update = table_update(p, &state.table);
        if !update.is_empty() {
            debug!("Table {} needs {:?}", cr.resource_name(), update);
            return Ok(false);
        }
        Ok(are_tags_up_to_date(&p.tags, &state.tags))
    }

    async fn post_observe(
        &self,
        cr: &mut Table,
        state: &TableState,
        observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(status_condition(state.table.status.as_deref()));
        Ok(observation)
    }

    async fn create_remote(&self, cr: &mut Table) -> Result<ExternalCreation, ExternalError> {
        let name = table_name(cr)?;
        info!("Creating table: {}", name);
        let table = self.dynamodb.create_table(&name, cr.for_provider()).await?;
        cr.set_at_provider(observation(&table));
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, cr: &mut Table) -> Result<ExternalUpdate, ExternalError> {
        let name = table_name(cr)?;
        let desired = cr.for_provider().clone();
        let observed = self.dynamodb.describe_table(&name).await?;

        let update = table_update(&desired, &observed);
        if !update.is_empty() {
            self.dynamodb.update_table(&name, &update).await?;
        }
        if let Some(arn) = observed.arn.as_deref() {
            let tags = self.dynamodb.list_tags(arn).await?;
            sync_tags(self.dynamodb.as_ref(), arn, &desired.tags, &tags).await?;
        }
        Ok(ExternalUpdate::default())
    }

    async fn delete_remote(&self, cr: &mut Table) -> Result<(), ExternalError> {
        let name = table_name(cr)?;
        Ok(self.dynamodb.delete_table(&name).await?)
    }
}

#[async_trait]
impl BuildHooks for TableHooks {
    async fn build(ctx: &ConnectContext, cr: &Table) -> Result<Self, ExternalError> {
        Ok(Self::new(ctx.dynamodb(cr, &cr.for_provider().region).await?))
    }
}

impl ResolveReferences for Table {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::dynamodb::ProvisionedThroughput;

    fn throughput(r: i64, w: i64) -> ProvisionedThroughput {
        ProvisionedThroughput {
            read_capacity_units: r,
            write_capacity_units: w,
        }
    }

    fn observed() -> TableDescription {
        TableDescription {
            name: "orders".to_string(),
            status: Some("ACTIVE".to_string()),
            provisioned_throughput: Some(throughput(5, 5)),
            ..TableDescription::default()
        }
    }

    #[test]
    fn test_unset_fields_need_no_update() {
        assert!(table_update(&TableParameters::default(), &observed()).is_empty());
    }

    #[test]
    fn test_throughput_change() {
        let desired = TableParameters {
            provisioned_throughput: Some(throughput(10, 5)),
            ..TableParameters::default()
        };
        let update = table_update(&desired, &observed());
        assert_eq!(update.provisioned_throughput, Some(throughput(10, 5)));
        assert_eq!(update.billing_mode, None);
    }

    #[test]
    fn test_switch_to_on_demand_drops_throughput() {
        let desired = TableParameters {
            billing_mode: Some(BILLING_PAY_PER_REQUEST.to_string()),
            provisioned_throughput: Some(throughput(10, 5)),
            ..TableParameters::default()
        };
        let update = table_update(&desired, &observed());
        assert_eq!(update.billing_mode.as_deref(), Some(BILLING_PAY_PER_REQUEST));
        assert_eq!(update.provisioned_throughput, None);
    }

    #[test]
    fn test_stream_enable() {
        let desired = TableParameters {
            stream_specification: Some(StreamSpecification {
                stream_enabled: true,
                stream_view_type: Some("NEW_IMAGE".to_string()),
            }),
            ..TableParameters::default()
        };
        let update = table_update(&desired, &observed());
        assert!(update.stream_specification.is_some());

        let mut o = observed();
        o.stream_specification = desired.stream_specification.clone();
        assert!(table_update(&desired, &o).is_empty());
    }

    #[test]
    fn test_default_table_class_is_standard() {
        let desired = TableParameters {
            table_class: Some(TABLE_CLASS_STANDARD.to_string()),
            ..TableParameters::default()
        };
        assert!(table_update(&desired, &observed()).is_empty());
    }
}
