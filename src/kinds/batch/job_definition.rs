//! JobDefinition adapter.
//!
//! AWS never edits a registered revision; a changed definition would be a new
//! revision with a new ARN. Only tags are reconciled in place, other drift is
//! left alone. Deregistering moves a revision to `INACTIVE`, which counts as
//! gone.

use super::{observed_tags, sync_tags};
use crate::crd::batch::JobDefinitionObservation;
use crate::crd::{JobDefinition, Managed};
use crate::kinds::{BuildHooks, ConnectContext};
use crate::managed::external::{ExternalCreation, ExternalError, ExternalUpdate, KindHooks};
use crate::managed::meta;
use crate::managed::tags::{are_tags_up_to_date, duplicate_key};
use crate::managed::ResolveReferences;
use crate::provider::batch::{BatchApi, JobDefinitionDetail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const STATUS_INACTIVE: &str = "INACTIVE";

pub struct JobDefinitionHooks {
    batch: Arc<dyn BatchApi>,
}

impl std::fmt::Debug for JobDefinitionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinitionHooks").finish_non_exhaustive()
    }
}

impl JobDefinitionHooks {
    pub fn new(batch: Arc<dyn BatchApi>) -> Self {
        Self { batch }
    }
}

fn definition_name(cr: &JobDefinition) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))
}

fn observation(d: &JobDefinitionDetail) -> JobDefinitionObservation {
    JobDefinitionObservation {
        job_definition_arn: Some(d.arn.clone()),
        revision: d.revision,
        status: d.status.clone(),
    }
}

#[async_trait]
impl KindHooks for JobDefinitionHooks {
    type Resource = JobDefinition;
    type Described = JobDefinitionDetail;

    fn validate(&self, cr: &JobDefinition) -> Result<(), ExternalError> {
        let p = cr.for_provider();
        if p.job_definition_type.eq_ignore_ascii_case("container") && p.container_properties.is_none() {
            return Err(ExternalError::validation(
                "a container job definition requires containerProperties",
            ));
        }
        if let Some(key) = duplicate_key(&p.tags) {
            return Err(ExternalError::validation(format!("duplicate tag key {key}")));
        }
        Ok(())
    }

    async fn describe(&self, cr: &JobDefinition) -> Result<Vec<JobDefinitionDetail>, ExternalError> {
        let Some(name) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        let detail = self.batch.describe_job_definition(name).await?;
        if detail.status.as_deref() == Some(STATUS_INACTIVE) {
            return Ok(Vec::new());
        }
        Ok(vec![detail])
    }

    fn generate_observation(&self, d: &JobDefinitionDetail) -> JobDefinitionObservation {
        observation(d)
    }

    async fn is_up_to_date(&self, cr: &JobDefinition, d: &JobDefinitionDetail) -> Result<bool, ExternalError> {
        Ok(are_tags_up_to_date(&cr.for_provider().tags, &observed_tags(&d.tags)))
    }

    async fn create_remote(&self, cr: &mut JobDefinition) -> Result<ExternalCreation, ExternalError> {
        let name = definition_name(cr)?;
        info!("Registering job definition: {}", name);
        let detail = self.batch.register_job_definition(&name, cr.for_provider()).await?;
        cr.set_at_provider(observation(&detail));
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, cr: &mut JobDefinition) -> Result<ExternalUpdate, ExternalError> {
        let name = definition_name(cr)?;
        let detail = self.batch.describe_job_definition(&name).await?;
        sync_tags(self.batch.as_ref(), &detail.arn, &cr.for_provider().tags, &detail.tags).await?;
        Ok(ExternalUpdate::default())
    }

    async fn delete_remote(&self, cr: &mut JobDefinition) -> Result<(), ExternalError> {
        let arn = match cr.at_provider().and_then(|o| o.job_definition_arn.clone()) {
            Some(arn) => arn,
            None => self.batch.describe_job_definition(&definition_name(cr)?).await?.arn,
        };
        info!("Deregistering job definition: {}", arn);
        Ok(self.batch.deregister_job_definition(&arn).await?)
    }
}

#[async_trait]
impl BuildHooks for JobDefinitionHooks {
    async fn build(ctx: &ConnectContext, cr: &JobDefinition) -> Result<Self, ExternalError> {
        Ok(Self::new(ctx.batch(cr, &cr.for_provider().region).await?))
    }
}

impl ResolveReferences for JobDefinition {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_from_detail() {
        let detail = JobDefinitionDetail {
            name: "etl".to_string(),
            arn: "arn:aws:batch:us-east-1:123456789012:job-definition/etl:3".to_string(),
            revision: Some(3),
            status: Some("ACTIVE".to_string()),
            ..JobDefinitionDetail::default()
        };
        let o = observation(&detail);
        assert_eq!(o.revision, Some(3));
        assert_eq!(o.job_definition_arn.as_deref(), Some(detail.arn.as_str()));
    }
}
