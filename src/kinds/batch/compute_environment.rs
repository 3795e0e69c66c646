//! ComputeEnvironment adapter.

use super::{
    delete_gate, is_transitioning, observed_tags, same_set, status_condition, sync_tags, DeleteGate,
    STATE_DISABLED,
};
use crate::crd::batch::{ComputeEnvironmentObservation, ComputeEnvironmentParameters, ComputeResource};
use crate::crd::{ComputeEnvironment, Managed};
use crate::kinds::{targets, BuildHooks, ConnectContext};
use crate::managed::external::{
    ExternalCreation, ExternalError, ExternalObservation, ExternalUpdate, KindHooks,
};
use crate::managed::meta;
use crate::managed::pointer::LateInitializer;
use crate::managed::reference::{resolve_field, resolve_list};
use crate::managed::tags::{are_tags_up_to_date, duplicate_key};
use crate::managed::{Extractor, ReferenceError, ReferenceResolver, ResolveReferences};
use crate::provider::batch::{BatchApi, ComputeEnvironmentDetail};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ComputeEnvironmentHooks {
    batch: Arc<dyn BatchApi>,
}

impl std::fmt::Debug for ComputeEnvironmentHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeEnvironmentHooks").finish_non_exhaustive()
    }
}

impl ComputeEnvironmentHooks {
    pub fn new(batch: Arc<dyn BatchApi>) -> Self {
        Self { batch }
    }
}

fn environment_name(cr: &ComputeEnvironment) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))
}

fn compute_resources_up_to_date(desired: Option<&ComputeResource>, observed: Option<&ComputeResource>) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    let Some(observed) = observed else {
        return false;
    };
    // desiredvCpus is scaled by AWS and never compared
    desired.max_vcpus == observed.max_vcpus
        && desired.min_vcpus.map_or(true, |v| observed.min_vcpus == Some(v))
        && same_set(&desired.subnets, &observed.subnets)
        && same_set(&desired.security_group_ids, &observed.security_group_ids)
}

pub fn environment_up_to_date(desired: &ComputeEnvironmentParameters, observed: &ComputeEnvironmentDetail) -> bool {
    desired
        .desired_state
        .as_ref()
        .map_or(true, |s| observed.state.as_ref() == Some(s))
        && desired
            .service_role_arn
            .as_ref()
            .map_or(true, |r| observed.service_role.as_ref() == Some(r))
        && desired
            .unmanaged_vcpus
            .map_or(true, |v| observed.unmanaged_vcpus == Some(v))
        && compute_resources_up_to_date(
            desired.compute_resources.as_ref(),
            observed.compute_resources.as_ref(),
        )
        && are_tags_up_to_date(&desired.tags, &observed_tags(&observed.tags))
}

#[async_trait]
impl KindHooks for ComputeEnvironmentHooks {
    type Resource = ComputeEnvironment;
    type Described = ComputeEnvironmentDetail;

    fn validate(&self, cr: &ComputeEnvironment) -> Result<(), ExternalError> {
        let p = cr.for_provider();
        if p.environment_type.eq_ignore_ascii_case("MANAGED") && p.compute_resources.is_none() {
            return Err(ExternalError::validation(
                "a MANAGED compute environment requires computeResources",
            ));
        }
        if let Some(key) = duplicate_key(&p.tags) {
            return Err(ExternalError::validation(format!("duplicate tag key {key}")));
        }
        Ok(())
    }

    async fn describe(&self, cr: &ComputeEnvironment) -> Result<Vec<ComputeEnvironmentDetail>, ExternalError> {
        let Some(name) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        let detail = self.batch.describe_compute_environment(name).await?;
        if detail.status.as_deref() == Some("DELETED") {
            return Ok(Vec::new());
        }
        Ok(vec![detail])
    }

    fn generate_observation(&self, d: &ComputeEnvironmentDetail) -> ComputeEnvironmentObservation {
        ComputeEnvironmentObservation {
            compute_environment_arn: d.arn.clone(),
            ecs_cluster_arn: d.ecs_cluster_arn.clone(),
            status: d.status.clone(),
            status_reason: d.status_reason.clone(),
            state: d.state.clone(),
        }
    }

    fn late_initialize(
        &self,
        cr: &ComputeEnvironment,
        d: &ComputeEnvironmentDetail,
    ) -> Option<ComputeEnvironmentParameters> {
        let mut p = cr.for_provider().clone();
        let mut li = LateInitializer::new();
        li.string(&mut p.environment_type, d.environment_type.clone());
        li.option(&mut p.desired_state, d.state.clone());
        li.option(&mut p.service_role_arn, d.service_role.clone());
        li.option(&mut p.unmanaged_vcpus, d.unmanaged_vcpus);
        if let (Some(desired), Some(observed)) = (p.compute_resources.as_mut(), d.compute_resources.as_ref()) {
            li.option(&mut desired.min_vcpus, observed.min_vcpus);
            li.option(&mut desired.instance_role, observed.instance_role.clone());
            li.option(&mut desired.allocation_strategy, observed.allocation_strategy.clone());
            li.option(&mut desired.bid_percentage, observed.bid_percentage);
            li.vec(&mut desired.instance_types, observed.instance_types.clone());
            li.vec(&mut desired.subnets, observed.subnets.clone());
            li.vec(&mut desired.security_group_ids, observed.security_group_ids.clone());
        }
        li.is_changed().then_some(p)
    }

    async fn is_up_to_date(
        &self,
        cr: &ComputeEnvironment,
        d: &ComputeEnvironmentDetail,
    ) -> Result<bool, ExternalError> {
        if is_transitioning(d.status.as_deref()) {
            return Ok(true);
        }
        let up_to_date = environment_up_to_date(cr.for_provider(), d);
        if !up_to_date {
            debug!("ComputeEnvironment {} differs from AWS", cr.resource_name());
        }
        Ok(up_to_date)
    }

    async fn post_observe(
        &self,
        cr: &mut ComputeEnvironment,
        d: &ComputeEnvironmentDetail,
        observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(status_condition(d.status.as_deref(), d.status_reason.as_deref()));
        Ok(observation)
    }

    async fn create_remote(&self, cr: &mut ComputeEnvironment) -> Result<ExternalCreation, ExternalError> {
        let name = environment_name(cr)?;
        info!("Creating compute environment: {}", name);
        let arn = self
            .batch
            .create_compute_environment(&name, cr.for_provider())
            .await?;
        cr.set_at_provider(ComputeEnvironmentObservation {
            compute_environment_arn: Some(arn),
            ..ComputeEnvironmentObservation::default()
        });
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, cr: &mut ComputeEnvironment) -> Result<ExternalUpdate, ExternalError> {
        let name = environment_name(cr)?;
        let mut params = cr.for_provider().clone();
        if let Some(resources) = params.compute_resources.as_mut() {
            resources.desired_vcpus = None;
        }
        info!("Updating compute environment: {}", name);
        self.batch.update_compute_environment(&name, &params).await?;

        let observed = self.batch.describe_compute_environment(&name).await?;
        if let Some(arn) = observed.arn.as_deref() {
            sync_tags(self.batch.as_ref(), arn, &params.tags, &observed.tags).await?;
        }
        Ok(ExternalUpdate::default())
    }

    async fn pre_delete(&self, cr: &mut ComputeEnvironment) -> Result<bool, ExternalError> {
        let (state, status) = cr
            .at_provider()
            .map(|o| (o.state.clone(), o.status.clone()))
            .unwrap_or_default();
        match delete_gate(state.as_deref(), status.as_deref()) {
            DeleteGate::Delete => Ok(false),
            DeleteGate::Wait => Ok(true),
            DeleteGate::Disable => {
                let name = environment_name(cr)?;
                info!("Disabling compute environment {} before deletion", name);
                self.batch
                    .set_compute_environment_state(&name, STATE_DISABLED)
                    .await?;
                Ok(true)
            }
        }
    }

    async fn delete_remote(&self, cr: &mut ComputeEnvironment) -> Result<(), ExternalError> {
        let name = environment_name(cr)?;
        info!("Deleting compute environment: {}", name);
        Ok(self.batch.delete_compute_environment(&name).await?)
    }
}

#[async_trait]
impl BuildHooks for ComputeEnvironmentHooks {
    async fn build(ctx: &ConnectContext, cr: &ComputeEnvironment) -> Result<Self, ExternalError> {
        Ok(Self::new(ctx.batch(cr, &cr.for_provider().region).await?))
    }
}

#[async_trait]
impl ResolveReferences for ComputeEnvironment {
    async fn resolve_references(&mut self, resolver: &ReferenceResolver) -> Result<(), ReferenceError> {
        let from = self.metadata.clone();
        let p = &mut self.spec.for_provider;
        resolve_field(
            resolver,
            &from,
            &mut p.service_role_arn,
            &mut p.service_role_arn_ref,
            p.service_role_arn_selector.as_ref(),
            &targets::iam_role(),
            Extractor::AtProvider("/arn"),
        )
        .await?;
        let Some(resources) = p.compute_resources.as_mut() else {
            return Ok(());
        };
        resolve_list(
            resolver,
            &from,
            &mut resources.subnets,
            &mut resources.subnet_refs,
            resources.subnet_selector.as_ref(),
            &targets::subnet(),
            Extractor::ExternalName,
        )
        .await?;
        resolve_list(
            resolver,
            &from,
            &mut resources.security_group_ids,
            &mut resources.security_group_id_refs,
            resources.security_group_id_selector.as_ref(),
            &targets::security_group(),
            Extractor::ExternalName,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Tag;
    use std::collections::BTreeMap;

    fn resources() -> ComputeResource {
        ComputeResource {
            resource_type: "EC2".to_string(),
            max_vcpus: 16,
            min_vcpus: Some(0),
            desired_vcpus: Some(2),
            subnets: vec!["subnet-a".to_string()],
            ..ComputeResource::default()
        }
    }

    fn params() -> ComputeEnvironmentParameters {
        ComputeEnvironmentParameters {
            region: "us-east-1".to_string(),
            environment_type: "MANAGED".to_string(),
            desired_state: Some("ENABLED".to_string()),
            compute_resources: Some(resources()),
            tags: vec![Tag::new("team", "batch")],
            ..ComputeEnvironmentParameters::default()
        }
    }

    fn detail() -> ComputeEnvironmentDetail {
        let mut observed = resources();
        observed.desired_vcpus = Some(8);
        ComputeEnvironmentDetail {
            name: "ce".to_string(),
            arn: Some("arn:aws:batch:us-east-1:123456789012:compute-environment/ce".to_string()),
            state: Some("ENABLED".to_string()),
            status: Some("VALID".to_string()),
            compute_resources: Some(observed),
            tags: BTreeMap::from([("team".to_string(), "batch".to_string())]),
            ..ComputeEnvironmentDetail::default()
        }
    }

    #[test]
    fn test_desired_vcpus_drift_is_ignored() {
        assert!(environment_up_to_date(&params(), &detail()));
    }

    #[test]
    fn test_max_vcpus_change_is_drift() {
        let mut p = params();
        if let Some(r) = p.compute_resources.as_mut() {
            r.max_vcpus = 32;
        }
        assert!(!environment_up_to_date(&p, &detail()));
    }

    #[test]
    fn test_state_change_is_drift() {
        let mut p = params();
        p.desired_state = Some("DISABLED".to_string());
        assert!(!environment_up_to_date(&p, &detail()));
    }
}
