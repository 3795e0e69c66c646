//! Job adapter.
//!
//! The external name is the job ID AWS assigns on submission. A job cannot be
//! changed once submitted except for its tags. Deleting terminates it; a job
//! that already reached `SUCCEEDED` or `FAILED` counts as gone.

use super::{observed_tags, sync_tags};
use crate::crd::batch::{JobObservation, JobParameters};
use crate::crd::{Condition, Job, JobDefinition, JobQueue, Managed};
use crate::kinds::{BuildHooks, ConnectContext};
use crate::managed::external::{
    ExternalCreation, ExternalError, ExternalObservation, ExternalUpdate, KindHooks,
};
use crate::managed::reference::resolve_field;
use crate::managed::tags::{are_tags_up_to_date, duplicate_key};
use crate::managed::{
    conditions, meta, ExternalNameInitializer, Extractor, ReferenceError, ReferenceResolver,
    ResolveReferences, TargetKind,
};
use crate::provider::batch::{BatchApi, JobDetail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

const TERMINATE_REASON: &str = "Terminated by deletion of the managed resource";

pub struct JobHooks {
    batch: Arc<dyn BatchApi>,
}

impl std::fmt::Debug for JobHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHooks").finish_non_exhaustive()
    }
}

impl JobHooks {
    pub fn new(batch: Arc<dyn BatchApi>) -> Self {
        Self { batch }
    }
}

fn job_id(cr: &Job) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("job has not been submitted"))
}

fn observation(d: &JobDetail) -> JobObservation {
    JobObservation {
        job_id: Some(d.job_id.clone()),
        job_arn: d.job_arn.clone(),
        status: d.status.clone(),
        status_reason: d.status_reason.clone(),
        created_at: d.created_at,
        started_at: d.started_at,
        stopped_at: d.stopped_at,
    }
}

#[must_use]
pub fn job_condition(status: Option<&str>, reason: Option<&str>) -> Condition {
    match status {
        Some("SUCCEEDED" | "RUNNING") => conditions::available(),
        Some("FAILED") => conditions::unavailable(reason.unwrap_or("FAILED")),
        _ => conditions::creating(),
    }
}

#[async_trait]
impl KindHooks for JobHooks {
    type Resource = Job;
    type Described = JobDetail;

    fn validate(&self, cr: &Job) -> Result<(), ExternalError> {
        let p = cr.for_provider();
        if p.job_definition.is_none() {
            return Err(ExternalError::validation("jobDefinition is not set"));
        }
        if p.job_queue.is_none() {
            return Err(ExternalError::validation("jobQueue is not set"));
        }
        if let Some(key) = duplicate_key(&p.tags) {
            return Err(ExternalError::validation(format!("duplicate tag key {key}")));
        }
        Ok(())
    }

    async fn describe(&self, cr: &Job) -> Result<Vec<JobDetail>, ExternalError> {
        let Some(id) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        let detail = self.batch.describe_job(id).await?;
        if meta::is_being_deleted(cr) && detail.is_terminal() {
            return Ok(Vec::new());
        }
        Ok(vec![detail])
    }

    fn generate_observation(&self, d: &JobDetail) -> JobObservation {
        observation(d)
    }

    async fn is_up_to_date(&self, cr: &Job, d: &JobDetail) -> Result<bool, ExternalError> {
        Ok(are_tags_up_to_date(&cr.for_provider().tags, &observed_tags(&d.tags)))
    }

    async fn post_observe(
        &self,
        cr: &mut Job,
        d: &JobDetail,
        observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(job_condition(d.status.as_deref(), d.status_reason.as_deref()));
        Ok(observation)
    }

    async fn create_remote(&self, cr: &mut Job) -> Result<ExternalCreation, ExternalError> {
        let name = cr.resource_name().to_string();
        info!("Submitting job: {}", name);
        let detail = self.batch.submit_job(&name, cr.for_provider()).await?;
        meta::set_external_name(cr, &detail.job_id);
        cr.set_at_provider(observation(&detail));
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, cr: &mut Job) -> Result<ExternalUpdate, ExternalError> {
        let id = job_id(cr)?;
        let detail = self.batch.describe_job(&id).await?;
        if let Some(arn) = detail.job_arn.as_deref() {
            sync_tags(self.batch.as_ref(), arn, &cr.for_provider().tags, &detail.tags).await?;
        }
        Ok(ExternalUpdate::default())
    }

    async fn delete_remote(&self, cr: &mut Job) -> Result<(), ExternalError> {
        let id = job_id(cr)?;
        info!("Terminating job: {}", id);
        Ok(self.batch.terminate_job(&id, TERMINATE_REASON).await?)
    }
}

#[async_trait]
impl BuildHooks for JobHooks {
    fn external_name_initializer() -> ExternalNameInitializer {
        ExternalNameInitializer::Deferred
    }

    async fn build(ctx: &ConnectContext, cr: &Job) -> Result<Self, ExternalError> {
        Ok(Self::new(ctx.batch(cr, &cr.for_provider().region).await?))
    }
}

#[async_trait]
impl ResolveReferences for Job {
    async fn resolve_references(&mut self, resolver: &ReferenceResolver) -> Result<(), ReferenceError> {
        let from = self.metadata.clone();
        let p: &mut JobParameters = &mut self.spec.for_provider;
        resolve_field(
            resolver,
            &from,
            &mut p.job_definition,
            &mut p.job_definition_ref,
            p.job_definition_selector.as_ref(),
            &TargetKind::of::<JobDefinition>(),
            Extractor::AtProvider("/jobDefinitionArn"),
        )
        .await?;
        resolve_field(
            resolver,
            &from,
            &mut p.job_queue,
            &mut p.job_queue_ref,
            p.job_queue_selector.as_ref(),
            &TargetKind::of::<JobQueue>(),
            Extractor::AtProvider("/jobQueueArn"),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ConditionStatus;
    use crate::managed::conditions::{REASON_CREATING, REASON_UNAVAILABLE};

    #[test]
    fn test_job_condition() {
        assert_eq!(job_condition(Some("RUNNING"), None).status, ConditionStatus::True);
        assert_eq!(job_condition(Some("SUCCEEDED"), None).status, ConditionStatus::True);
        assert_eq!(job_condition(Some("RUNNABLE"), None).reason, REASON_CREATING);
        let failed = job_condition(Some("FAILED"), Some("Essential container exited"));
        assert_eq!(failed.reason, REASON_UNAVAILABLE);
        assert_eq!(failed.message.as_deref(), Some("Essential container exited"));
    }
}
