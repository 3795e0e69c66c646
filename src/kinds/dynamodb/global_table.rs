//! GlobalTable adapter.
//!
//! A global table is a replica group over same-named tables in several
//! regions. Updates add and remove replicas; deleting removes every replica,
//! after which AWS drops the group.

use super::status_condition;
use crate::crd::dynamodb::{GlobalTableObservation, GlobalTableParameters, Replica};
use crate::crd::{GlobalTable, Managed};
use crate::kinds::{BuildHooks, ConnectContext};
use crate::managed::external::{
    ExternalCreation, ExternalError, ExternalObservation, ExternalUpdate, KindHooks,
};
use crate::managed::meta;
use crate::managed::ResolveReferences;
use crate::provider::dynamodb::{DynamoDbApi, GlobalTableDescription};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

pub struct GlobalTableHooks {
    dynamodb: Arc<dyn DynamoDbApi>,
}

impl std::fmt::Debug for GlobalTableHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalTableHooks").finish_non_exhaustive()
    }
}

impl GlobalTableHooks {
    pub fn new(dynamodb: Arc<dyn DynamoDbApi>) -> Self {
        Self { dynamodb }
    }
}

fn global_table_name(cr: &GlobalTable) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))
}

/// Regions to add and remove to turn `observed` into `desired`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplicaDiff {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl ReplicaDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

pub fn diff_replicas(desired: &[Replica], observed: &[String]) -> ReplicaDiff {
    let desired: BTreeSet<&str> = desired.iter().map(|r| r.region_name.as_str()).collect();
    let observed: BTreeSet<&str> = observed.iter().map(String::as_str).collect();
    ReplicaDiff {
        add: desired.difference(&observed).map(|r| (*r).to_string()).collect(),
        remove: observed.difference(&desired).map(|r| (*r).to_string()).collect(),
    }
}

fn regions(params: &GlobalTableParameters) -> Vec<String> {
    params
        .replication_group
        .iter()
        .map(|r| r.region_name.clone())
        .collect()
}

#[async_trait]
impl KindHooks for GlobalTableHooks {
    type Resource = GlobalTable;
    type Described = GlobalTableDescription;

    fn validate(&self, cr: &GlobalTable) -> Result<(), ExternalError> {
        if cr.for_provider().replication_group.is_empty() {
            return Err(ExternalError::validation("replicationGroup must not be empty"));
        }
        Ok(())
    }

    async fn describe(&self, cr: &GlobalTable) -> Result<Vec<GlobalTableDescription>, ExternalError> {
        let Some(name) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        Ok(vec![self.dynamodb.describe_global_table(name).await?])
    }

    fn generate_observation(&self, g: &GlobalTableDescription) -> GlobalTableObservation {
        GlobalTableObservation {
            global_table_arn: g.arn.clone(),
            global_table_status: g.status.clone(),
        }
    }

    fn late_initialize(&self, cr: &GlobalTable, g: &GlobalTableDescription) -> Option<GlobalTableParameters> {
        if !cr.for_provider().replication_group.is_empty() || g.replica_regions.is_empty() {
            return None;
        }
        let mut p = cr.for_provider().clone();
        p.replication_group = g
            .replica_regions
            .iter()
            .map(|r| Replica {
                region_name: r.clone(),
            })
            .collect();
        Some(p)
    }

    async fn is_up_to_date(&self, cr: &GlobalTable, g: &GlobalTableDescription) -> Result<bool, ExternalError> {
        if g.status.as_deref() != Some("ACTIVE") {
            return Ok(true);
        }
        Ok(diff_replicas(&cr.for_provider().replication_group, &g.replica_regions).is_empty())
    }

    async fn post_observe(
        &self,
        cr: &mut GlobalTable,
        g: &GlobalTableDescription,
        observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(status_condition(g.status.as_deref()));
        Ok(observation)
    }

    async fn create_remote(&self, cr: &mut GlobalTable) -> Result<ExternalCreation, ExternalError> {
        let name = global_table_name(cr)?;
        let regions = regions(cr.for_provider());
        info!("Creating global table {} in {:?}", name, regions);
        let created = self.dynamodb.create_global_table(&name, &regions).await?;
        cr.set_at_provider(GlobalTableObservation {
            global_table_arn: created.arn,
            global_table_status: created.status,
        });
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, cr: &mut GlobalTable) -> Result<ExternalUpdate, ExternalError> {
        let name = global_table_name(cr)?;
        let observed = self.dynamodb.describe_global_table(&name).await?;
        let diff = diff_replicas(&cr.for_provider().replication_group, &observed.replica_regions);
        if !diff.is_empty() {
            info!(
                "Updating global table {}: adding {:?}, removing {:?}",
                name, diff.add, diff.remove
            );
            self.dynamodb
                .update_global_table(&name, &diff.add, &diff.remove)
                .await?;
        }
        Ok(ExternalUpdate::default())
    }

    async fn delete_remote(&self, cr: &mut GlobalTable) -> Result<(), ExternalError> {
        let name = global_table_name(cr)?;
        let observed = self.dynamodb.describe_global_table(&name).await?;
        if observed.replica_regions.is_empty() {
            return Ok(());
        }
        info!("Removing every replica of global table {}", name);
        Ok(self
            .dynamodb
            .update_global_table(&name, &[], &observed.replica_regions)
            .await?)
    }
}

#[async_trait]
impl BuildHooks for GlobalTableHooks {
    async fn build(ctx: &ConnectContext, cr: &GlobalTable) -> Result<Self, ExternalError> {
        Ok(Self::new(ctx.dynamodb(cr, &cr.for_provider().region).await?))
    }
}

impl ResolveReferences for GlobalTable {}

#[cfg(test)]
mod tests {
    use super::*;

    fn replicas(regions: &[&str]) -> Vec<Replica> {
        regions
            .iter()
            .map(|r| Replica {
                region_name: (*r).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_replica_diff() {
        let diff = diff_replicas(
            &replicas(&["us-east-1", "eu-west-1"]),
            &["us-east-1".to_string(), "ap-south-1".to_string()],
        );
        assert_eq!(diff.add, vec!["eu-west-1".to_string()]);
        assert_eq!(diff.remove, vec!["ap-south-1".to_string()]);
    }

    #[test]
    fn test_replica_order_does_not_matter() {
        let diff = diff_replicas(
            &replicas(&["eu-west-1", "us-east-1"]),
            &["us-east-1".to_string(), "eu-west-1".to_string()],
        );
        assert!(diff.is_empty());
    }
}
