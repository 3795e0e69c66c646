//! JobQueue adapter.

use super::{
    delete_gate, is_transitioning, observed_tags, status_condition, sync_tags, DeleteGate,
    STATE_DISABLED,
};
use crate::crd::batch::{ComputeEnvironmentOrder, JobQueueObservation, JobQueueParameters};
use crate::crd::{ComputeEnvironment, JobQueue, Managed};
use crate::kinds::{BuildHooks, ConnectContext};
use crate::managed::external::{
    ExternalCreation, ExternalError, ExternalObservation, ExternalUpdate, KindHooks,
};
use crate::managed::meta;
use crate::managed::pointer::LateInitializer;
use crate::managed::reference::resolve_field;
use crate::managed::tags::{are_tags_up_to_date, duplicate_key};
use crate::managed::{Extractor, ReferenceError, ReferenceResolver, ResolveReferences, TargetKind};
use crate::provider::batch::{BatchApi, JobQueueDetail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct JobQueueHooks {
    batch: Arc<dyn BatchApi>,
}

impl std::fmt::Debug for JobQueueHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueueHooks").finish_non_exhaustive()
    }
}

impl JobQueueHooks {
    pub fn new(batch: Arc<dyn BatchApi>) -> Self {
        Self { batch }
    }
}

fn queue_name(cr: &JobQueue) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))
}

/// A compute environment given by name matches the ARN AWS reports for it
fn same_environment(desired: &str, observed: &str) -> bool {
    desired == observed || observed.rsplit('/').next() == Some(desired)
}

fn orders_up_to_date(desired: &[ComputeEnvironmentOrder], observed: &[ComputeEnvironmentOrder]) -> bool {
    let mut desired: Vec<&ComputeEnvironmentOrder> = desired.iter().collect();
    let mut observed: Vec<&ComputeEnvironmentOrder> = observed.iter().collect();
    desired.sort_by_key(|o| o.order);
    observed.sort_by_key(|o| o.order);
    desired.len() == observed.len()
        && desired.iter().zip(&observed).all(|(d, o)| {
            d.order == o.order
                && match (d.compute_environment.as_deref(), o.compute_environment.as_deref()) {
                    (Some(d), Some(o)) => same_environment(d, o),
                    (None, _) => true,
                    (Some(_), None) => false,
                }
        })
}

pub fn queue_up_to_date(desired: &JobQueueParameters, observed: &JobQueueDetail) -> bool {
    observed.priority == Some(desired.priority)
        && desired
            .desired_state
            .as_ref()
            .map_or(true, |s| observed.state.as_ref() == Some(s))
        && desired
            .scheduling_policy_arn
            .as_ref()
            .map_or(true, |a| observed.scheduling_policy_arn.as_ref() == Some(a))
        && orders_up_to_date(&desired.compute_environment_order, &observed.compute_environment_order)
        && are_tags_up_to_date(&desired.tags, &observed_tags(&observed.tags))
}

#[async_trait]
impl KindHooks for JobQueueHooks {
    type Resource = JobQueue;
    type Described = JobQueueDetail;

    fn validate(&self, cr: &JobQueue) -> Result<(), ExternalError> {
        let p = cr.for_provider();
        if p.compute_environment_order.is_empty() {
            return Err(ExternalError::validation(
                "computeEnvironmentOrder must name at least one compute environment",
            ));
        }
        if let Some(key) = duplicate_key(&p.tags) {
            return Err(ExternalError::validation(format!("duplicate tag key {key}")));
        }
        Ok(())
    }

    async fn describe(&self, cr: &JobQueue) -> Result<Vec<JobQueueDetail>, ExternalError> {
        let Some(name) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        let detail = self.batch.describe_job_queue(name).await?;
        if detail.status.as_deref() == Some("DELETED") {
            return Ok(Vec::new());
        }
        Ok(vec![detail])
    }

    fn generate_observation(&self, d: &JobQueueDetail) -> JobQueueObservation {
        JobQueueObservation {
            job_queue_arn: d.arn.clone(),
            status: d.status.clone(),
            status_reason: d.status_reason.clone(),
            state: d.state.clone(),
        }
    }

    fn late_initialize(&self, cr: &JobQueue, d: &JobQueueDetail) -> Option<JobQueueParameters> {
        let mut p = cr.for_provider().clone();
        let mut li = LateInitializer::new();
        li.option(&mut p.desired_state, d.state.clone());
        li.option(&mut p.scheduling_policy_arn, d.scheduling_policy_arn.clone());
        li.is_changed().then_some(p)
    }

    async fn is_up_to_date(&self, cr: &JobQueue, d: &JobQueueDetail) -> Result<bool, ExternalError> {
        if is_transitioning(d.status.as_deref()) {
            return Ok(true);
        }
        Ok(queue_up_to_date(cr.for_provider(), d))
    }

    async fn post_observe(
        &self,
        cr: &mut JobQueue,
        d: &JobQueueDetail,
        observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(status_condition(d.status.as_deref(), d.status_reason.as_deref()));
        Ok(observation)
    }

    async fn create_remote(&self, cr: &mut JobQueue) -> Result<ExternalCreation, ExternalError> {
        let name = queue_name(cr)?;
        info!("Creating job queue: {}", name);
        let arn = self.batch.create_job_queue(&name, cr.for_provider()).await?;
        cr.set_at_provider(JobQueueObservation {
            job_queue_arn: Some(arn),
            ..JobQueueObservation::default()
        });
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, cr: &mut JobQueue) -> Result<ExternalUpdate, ExternalError> {
        let name = queue_name(cr)?;
        let params = cr.for_provider().clone();
        info!("Updating job queue: {}", name);
        self.batch.update_job_queue(&name, &params).await?;

        let observed = self.batch.describe_job_queue(&name).await?;
        if let Some(arn) = observed.arn.as_deref() {
            sync_tags(self.batch.as_ref(), arn, &params.tags, &observed.tags).await?;
        }
        Ok(ExternalUpdate::default())
    }

    async fn pre_delete(&self, cr: &mut JobQueue) -> Result<bool, ExternalError> {
        let (state, status) = cr
            .at_provider()
            .map(|o| (o.state.clone(), o.status.clone()))
            .unwrap_or_default();
        match delete_gate(state.as_deref(), status.as_deref()) {
            DeleteGate::Delete => Ok(false),
            DeleteGate::Wait => Ok(true),
            DeleteGate::Disable => {
                let name = queue_name(cr)?;
                info!("Disabling job queue {} before deletion", name);
                self.batch.set_job_queue_state(&name, STATE_DISABLED).await?;
                Ok(true)
            }
        }
    }

    async fn delete_remote(&self, cr: &mut JobQueue) -> Result<(), ExternalError> {
        let name = queue_name(cr)?;
        info!("Deleting job queue: {}", name);
        Ok(self.batch.delete_job_queue(&name).await?)
    }
}

#[async_trait]
impl BuildHooks for JobQueueHooks {
    async fn build(ctx: &ConnectContext, cr: &JobQueue) -> Result<Self, ExternalError> {
        Ok(Self::new(ctx.batch(cr, &cr.for_provider().region).await?))
    }
}

#[async_trait]
impl ResolveReferences for JobQueue {
    async fn resolve_references(&mut self, resolver: &ReferenceResolver) -> Result<(), ReferenceError> {
        let from = self.metadata.clone();
        let target = TargetKind::of::<ComputeEnvironment>();
        for order in &mut self.spec.for_provider.compute_environment_order {
            resolve_field(
                resolver,
                &from,
                &mut order.compute_environment,
                &mut order.compute_environment_ref,
                order.compute_environment_selector.as_ref(),
                &target,
                Extractor::AtProvider("/computeEnvironmentArn"),
            )
            .await?;
        }
        Ok(())
    }
}
