//! `aws-sdk-batch` implementation of [`BatchApi`]

use super::{BatchApi, ComputeEnvironmentDetail, JobDefinitionDetail, JobDetail, JobQueueDetail};
use crate::crd::batch::{
    ComputeEnvironmentOrder, ComputeEnvironmentParameters, ComputeResource, ContainerOverrides,
    ContainerProperties, JobDefinitionParameters, JobParameters, JobQueueParameters, JobTimeout,
    KeyValuePair, ResourceRequirement, RetryStrategy,
};
use crate::crd::Tag;
use crate::provider::{invalid, timed, AwsError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_batch::types as batch;
use aws_sdk_batch::Client;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, info_span, Instrument};

const SERVICE: &str = "batch";

pub struct SdkBatch {
    client: Client,
    region: String,
}

impl std::fmt::Debug for SdkBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkBatch")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SdkBatch {
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

// Batch marks a different set of members required than the other services;
// these accept both the required (`&str`, `i32`) and optional getter shapes.
fn text<'a>(v: impl Into<Option<&'a str>>) -> Option<String> {
    v.into().map(ToString::to_string)
}

fn int<T>(v: impl Into<Option<T>>) -> Option<T> {
    v.into()
}

fn strings<'a>(v: impl Into<Option<&'a [String]>>) -> Vec<String> {
    v.into().map(<[String]>::to_vec).unwrap_or_default()
}

fn tag_map(tags: &[Tag]) -> Option<HashMap<String, String>> {
    if tags.is_empty() {
        return None;
    }
    Some(
        tags.iter()
            .map(|t| (t.key.clone(), t.value.clone()))
            .collect(),
    )
}

fn from_tag_map(tags: Option<&HashMap<String, String>>) -> BTreeMap<String, String> {
    tags.map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

fn some_vec<T: Clone>(v: &[T]) -> Option<Vec<T>> {
    (!v.is_empty()).then(|| v.to_vec())
}

fn key_values(pairs: &[KeyValuePair]) -> Option<Vec<batch::KeyValuePair>> {
    (!pairs.is_empty()).then(|| {
        pairs
            .iter()
            .map(|p| batch::KeyValuePair::builder().name(&p.name).value(&p.value).build())
            .collect()
    })
}

fn requirements(reqs: &[ResourceRequirement]) -> Result<Option<Vec<batch::ResourceRequirement>>, AwsError> {
    if reqs.is_empty() {
        return Ok(None);
    }
    reqs.iter()
        .map(|r| {
            Ok::<_, AwsError>(
                batch::ResourceRequirement::builder()
                    .r#type(batch::ResourceType::from(r.resource_type.as_str()))
                    .value(&r.value)
                    .build(),
            )
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn retry(r: Option<&RetryStrategy>) -> Option<batch::RetryStrategy> {
    r.map(|r| batch::RetryStrategy::builder().set_attempts(r.attempts).build())
}

fn timeout(t: Option<&JobTimeout>) -> Option<batch::JobTimeout> {
    t.map(|t| {
        batch::JobTimeout::builder()
            .set_attempt_duration_seconds(t.attempt_duration_seconds)
            .build()
    })
}

fn parameter_map(p: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    (!p.is_empty()).then(|| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

fn sdk_compute_resource(cr: &ComputeResource) -> Result<batch::ComputeResource, AwsError> {
    Ok(batch::ComputeResource::builder()
        .r#type(batch::CrType::from(cr.resource_type.as_str()))
        .maxv_cpus(cr.max_vcpus)
        .set_minv_cpus(cr.min_vcpus)
        .set_desiredv_cpus(cr.desired_vcpus)
        .set_instance_types(some_vec(&cr.instance_types))
        .set_instance_role(cr.instance_role.clone())
        .set_allocation_strategy(
            cr.allocation_strategy
                .as_deref()
                .map(batch::CrAllocationStrategy::from),
        )
        .set_bid_percentage(cr.bid_percentage)
        .set_subnets(Some(cr.subnets.clone()))
        .set_security_group_ids(some_vec(&cr.security_group_ids))
        .build())
}

fn compute_resource(cr: &batch::ComputeResource) -> ComputeResource {
    let resource_type: Option<&batch::CrType> = cr.r#type().into();
    let allocation_strategy: Option<&batch::CrAllocationStrategy> = cr.allocation_strategy().into();
    ComputeResource {
        resource_type: resource_type
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        max_vcpus: int(cr.maxv_cpus()).unwrap_or_default(),
        min_vcpus: int(cr.minv_cpus()),
        desired_vcpus: int(cr.desiredv_cpus()),
        instance_types: strings(cr.instance_types()),
        instance_role: text(cr.instance_role()),
        allocation_strategy: allocation_strategy.map(|s| s.as_str().to_string()),
        bid_percentage: int(cr.bid_percentage()),
        subnets: strings(cr.subnets()),
        security_group_ids: strings(cr.security_group_ids()),
        ..Default::default()
    }
}

fn ce_orders(orders: &[ComputeEnvironmentOrder]) -> Result<Vec<batch::ComputeEnvironmentOrder>, AwsError> {
    orders
        .iter()
        .map(|o| {
            let arn = o
                .compute_environment
                .clone()
                .ok_or_else(|| invalid(format!("computeEnvironmentOrder[{}] is unresolved", o.order)))?;
            Ok(batch::ComputeEnvironmentOrder::builder()
                .order(o.order)
                .compute_environment(arn)
                .build())
        })
        .collect()
}

#[async_trait]
impl BatchApi for SdkBatch {
    async fn describe_compute_environment(&self, name: &str) -> Result<ComputeEnvironmentDetail, AwsError> {
        let span = info_span!("aws.batch.describe_compute_environments", compute_environment = name, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeComputeEnvironments",
            self.client.describe_compute_environments().compute_environments(name).send(),
        )
        .instrument(span)
        .await?;

        let ce = out
            .compute_environments()
            .first()
            .ok_or_else(|| AwsError::not_found(format!("compute environment {name}")))?;
        let env_type: Option<&batch::CeType> = ce.r#type().into();
        let state: Option<&batch::CeState> = ce.state().into();
        let status: Option<&batch::CeStatus> = ce.status().into();
        Ok(ComputeEnvironmentDetail {
            name: text(ce.compute_environment_name()).unwrap_or_else(|| name.to_string()),
            arn: text(ce.compute_environment_arn()),
            ecs_cluster_arn: text(ce.ecs_cluster_arn()),
            environment_type: env_type.map(|t| t.as_str().to_string()),
            state: state.map(|s| s.as_str().to_string()),
            status: status.map(|s| s.as_str().to_string()),
            status_reason: text(ce.status_reason()),
            service_role: text(ce.service_role()),
            compute_resources: ce.compute_resources().map(compute_resource),
            unmanaged_vcpus: int(ce.unmanagedv_cpus()),
            tags: from_tag_map(ce.tags()),
        })
    }

    async fn create_compute_environment(
        &self,
        name: &str,
        p: &ComputeEnvironmentParameters,
    ) -> Result<String, AwsError> {
        let span = info_span!("aws.batch.create_compute_environment", compute_environment = name, region = %self.region);
        info!(compute_environment = name, r#type = %p.environment_type, "Creating compute environment");
        let compute_resources = p
            .compute_resources
            .as_ref()
            .map(sdk_compute_resource)
            .transpose()?;
        let out = timed(
            SERVICE,
            "CreateComputeEnvironment",
            self.client
                .create_compute_environment()
                .compute_environment_name(name)
                .r#type(batch::CeType::from(p.environment_type.as_str()))
                .set_state(p.desired_state.as_deref().map(batch::CeState::from))
                .set_service_role(p.service_role_arn.clone())
                .set_compute_resources(compute_resources)
                .set_unmanagedv_cpus(p.unmanaged_vcpus)
                .set_tags(tag_map(&p.tags))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(text(out.compute_environment_arn()).unwrap_or_default())
    }

    async fn update_compute_environment(
        &self,
        name: &str,
        p: &ComputeEnvironmentParameters,
    ) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.update_compute_environment", compute_environment = name, region = %self.region);
        let update = p.compute_resources.as_ref().map(|cr| {
            batch::ComputeResourceUpdate::builder()
                .maxv_cpus(cr.max_vcpus)
                .set_minv_cpus(cr.min_vcpus)
                .set_desiredv_cpus(cr.desired_vcpus)
                .set_subnets(some_vec(&cr.subnets))
                .set_security_group_ids(some_vec(&cr.security_group_ids))
                .build()
        });
        timed(
            SERVICE,
            "UpdateComputeEnvironment",
            self.client
                .update_compute_environment()
                .compute_environment(name)
                .set_state(p.desired_state.as_deref().map(batch::CeState::from))
                .set_service_role(p.service_role_arn.clone())
                .set_unmanagedv_cpus(p.unmanaged_vcpus)
                .set_compute_resources(update)
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn set_compute_environment_state(&self, name: &str, state: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.update_compute_environment", compute_environment = name, state);
        info!(compute_environment = name, state, "Setting compute environment state");
        timed(
            SERVICE,
            "UpdateComputeEnvironment",
            self.client
                .update_compute_environment()
                .compute_environment(name)
                .state(batch::CeState::from(state))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn delete_compute_environment(&self, name: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.delete_compute_environment", compute_environment = name);
        info!(compute_environment = name, "Deleting compute environment");
        timed(
            SERVICE,
            "DeleteComputeEnvironment",
            self.client
                .delete_compute_environment()
                .compute_environment(name)
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn describe_job_queue(&self, name: &str) -> Result<JobQueueDetail, AwsError> {
        let span = info_span!("aws.batch.describe_job_queues", job_queue = name, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeJobQueues",
            self.client.describe_job_queues().job_queues(name).send(),
        )
        .instrument(span)
        .await?;

        let q = out
            .job_queues()
            .first()
            .ok_or_else(|| AwsError::not_found(format!("job queue {name}")))?;
        let state: Option<&batch::JqState> = q.state().into();
        let status: Option<&batch::JqStatus> = q.status().into();
        let orders: Option<&[batch::ComputeEnvironmentOrder]> = q.compute_environment_order().into();
        Ok(JobQueueDetail {
            name: text(q.job_queue_name()).unwrap_or_else(|| name.to_string()),
            arn: text(q.job_queue_arn()),
            state: state.map(|s| s.as_str().to_string()),
            status: status.map(|s| s.as_str().to_string()),
            status_reason: text(q.status_reason()),
            priority: int(q.priority()),
            compute_environment_order: orders
                .unwrap_or_default()
                .iter()
                .map(|o| ComputeEnvironmentOrder {
                    order: int(o.order()).unwrap_or_default(),
                    compute_environment: text(o.compute_environment()),
                    ..Default::default()
                })
                .collect(),
            scheduling_policy_arn: text(q.scheduling_policy_arn()),
            tags: from_tag_map(q.tags()),
        })
    }

    async fn create_job_queue(&self, name: &str, p: &JobQueueParameters) -> Result<String, AwsError> {
        let span = info_span!("aws.batch.create_job_queue", job_queue = name, region = %self.region);
        info!(job_queue = name, priority = p.priority, "Creating job queue");
        let out = timed(
            SERVICE,
            "CreateJobQueue",
            self.client
                .create_job_queue()
                .job_queue_name(name)
                .priority(p.priority)
                .set_state(p.desired_state.as_deref().map(batch::JqState::from))
                .set_compute_environment_order(Some(ce_orders(&p.compute_environment_order)?))
                .set_scheduling_policy_arn(p.scheduling_policy_arn.clone())
                .set_tags(tag_map(&p.tags))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(text(out.job_queue_arn()).unwrap_or_default())
    }

    async fn update_job_queue(&self, name: &str, p: &JobQueueParameters) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.update_job_queue", job_queue = name, region = %self.region);
        timed(
            SERVICE,
            "UpdateJobQueue",
            self.client
                .update_job_queue()
                .job_queue(name)
                .priority(p.priority)
                .set_state(p.desired_state.as_deref().map(batch::JqState::from))
                .set_compute_environment_order(Some(ce_orders(&p.compute_environment_order)?))
                .set_scheduling_policy_arn(p.scheduling_policy_arn.clone())
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn set_job_queue_state(&self, name: &str, state: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.update_job_queue", job_queue = name, state);
        info!(job_queue = name, state, "Setting job queue state");
        timed(
            SERVICE,
            "UpdateJobQueue",
            self.client
                .update_job_queue()
                .job_queue(name)
                .state(batch::JqState::from(state))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn delete_job_queue(&self, name: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.delete_job_queue", job_queue = name);
        info!(job_queue = name, "Deleting job queue");
        timed(
            SERVICE,
            "DeleteJobQueue",
            self.client.delete_job_queue().job_queue(name).send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn describe_job_definition(&self, name: &str) -> Result<JobDefinitionDetail, AwsError> {
        let span = info_span!("aws.batch.describe_job_definitions", job_definition = name, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeJobDefinitions",
            self.client
                .describe_job_definitions()
                .job_definition_name(name)
                .status("ACTIVE")
                .send(),
        )
        .instrument(span)
        .await?;

        out.job_definitions()
            .iter()
            .max_by_key(|d| int::<i32>(d.revision()).unwrap_or_default())
            .map(|d| JobDefinitionDetail {
                name: text(d.job_definition_name()).unwrap_or_else(|| name.to_string()),
                arn: text(d.job_definition_arn()).unwrap_or_default(),
                revision: int(d.revision()),
                status: text(d.status()),
                tags: from_tag_map(d.tags()),
            })
            .ok_or_else(|| AwsError::not_found(format!("job definition {name}")))
    }

    async fn register_job_definition(
        &self,
        name: &str,
        p: &JobDefinitionParameters,
    ) -> Result<JobDefinitionDetail, AwsError> {
        let span = info_span!("aws.batch.register_job_definition", job_definition = name, region = %self.region);
        info!(job_definition = name, "Registering job definition");
        let container = p
            .container_properties
            .as_ref()
            .map(|c: &ContainerProperties| -> Result<batch::ContainerProperties, AwsError> {
                Ok(batch::ContainerProperties::builder()
                    .set_image(c.image.clone())
                    .set_command(some_vec(&c.command))
                    .set_environment(key_values(&c.environment))
                    .set_resource_requirements(requirements(&c.resource_requirements)?)
                    .set_job_role_arn(c.job_role_arn.clone())
                    .set_execution_role_arn(c.execution_role_arn.clone())
                    .build())
            })
            .transpose()?;
        let out = timed(
            SERVICE,
            "RegisterJobDefinition",
            self.client
                .register_job_definition()
                .job_definition_name(name)
                .r#type(batch::JobDefinitionType::from(p.job_definition_type.as_str()))
                .set_container_properties(container)
                .set_parameters(parameter_map(&p.parameters))
                .set_platform_capabilities(
                    (!p.platform_capabilities.is_empty()).then(|| {
                        p.platform_capabilities
                            .iter()
                            .map(|c| batch::PlatformCapability::from(c.as_str()))
                            .collect()
                    }),
                )
                .set_propagate_tags(p.propagate_tags)
                .set_retry_strategy(retry(p.retry_strategy.as_ref()))
                .set_timeout(timeout(p.timeout.as_ref()))
                .set_tags(tag_map(&p.tags))
                .send(),
        )
        .instrument(span)
        .await?;

        Ok(JobDefinitionDetail {
            name: name.to_string(),
            arn: text(out.job_definition_arn()).unwrap_or_default(),
            revision: int(out.revision()),
            status: Some("ACTIVE".to_string()),
            tags: p.tags.iter().map(|t| (t.key.clone(), t.value.clone())).collect(),
        })
    }

    async fn deregister_job_definition(&self, arn: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.deregister_job_definition", job_definition = arn);
        info!(job_definition = arn, "Deregistering job definition");
        timed(
            SERVICE,
            "DeregisterJobDefinition",
            self.client.deregister_job_definition().job_definition(arn).send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn describe_job(&self, job_id: &str) -> Result<JobDetail, AwsError> {
        let span = info_span!("aws.batch.describe_jobs", job.id = job_id, region = %self.region);
        let out = timed(
            SERVICE,
            "DescribeJobs",
            self.client.describe_jobs().jobs(job_id).send(),
        )
        .instrument(span)
        .await?;

        let job = out
            .jobs()
            .first()
            .ok_or_else(|| AwsError::not_found(format!("job {job_id}")))?;
        let status: Option<&batch::JobStatus> = job.status().into();
        Ok(JobDetail {
            job_id: text(job.job_id()).unwrap_or_else(|| job_id.to_string()),
            job_arn: text(job.job_arn()),
            status: status.map(|s| s.as_str().to_string()),
            status_reason: text(job.status_reason()),
            created_at: int(job.created_at()),
            started_at: int(job.started_at()),
            stopped_at: int(job.stopped_at()),
            tags: from_tag_map(job.tags()),
        })
    }

    async fn submit_job(&self, name: &str, p: &JobParameters) -> Result<JobDetail, AwsError> {
        let queue = p
            .job_queue
            .as_deref()
            .ok_or_else(|| invalid("jobQueue is unresolved"))?;
        let definition = p
            .job_definition
            .as_deref()
            .ok_or_else(|| invalid("jobDefinition is unresolved"))?;
        let span = info_span!("aws.batch.submit_job", job.name = name, job.queue = queue, region = %self.region);
        info!(job.name = name, job.queue = queue, job.definition = definition, "Submitting job");

        let overrides = p
            .container_overrides
            .as_ref()
            .map(|o: &ContainerOverrides| -> Result<batch::ContainerOverrides, AwsError> {
                Ok(batch::ContainerOverrides::builder()
                    .set_command(some_vec(&o.command))
                    .set_environment(key_values(&o.environment))
                    .set_resource_requirements(requirements(&o.resource_requirements)?)
                    .build())
            })
            .transpose()?;
        let out = timed(
            SERVICE,
            "SubmitJob",
            self.client
                .submit_job()
                .job_name(name)
                .job_queue(queue)
                .job_definition(definition)
                .set_parameters(parameter_map(&p.parameters))
                .set_container_overrides(overrides)
                .set_retry_strategy(retry(p.retry_strategy.as_ref()))
                .set_timeout(timeout(p.timeout.as_ref()))
                .set_propagate_tags(p.propagate_tags)
                .set_tags(tag_map(&p.tags))
                .send(),
        )
        .instrument(span)
        .await?;

        Ok(JobDetail {
            job_id: text(out.job_id()).unwrap_or_default(),
            job_arn: text(out.job_arn()),
            status: Some("SUBMITTED".to_string()),
            ..Default::default()
        })
    }

    async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.terminate_job", job.id = job_id);
        info!(job.id = job_id, reason, "Terminating job");
        timed(
            SERVICE,
            "TerminateJob",
            self.client.terminate_job().job_id(job_id).reason(reason).send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn tag_resource(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.tag_resource", arn, count = tags.len());
        timed(
            SERVICE,
            "TagResource",
            self.client
                .tag_resource()
                .resource_arn(arn)
                .set_tags(tag_map(tags))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), AwsError> {
        let span = info_span!("aws.batch.untag_resource", arn, count = keys.len());
        timed(
            SERVICE,
            "UntagResource",
            self.client
                .untag_resource()
                .resource_arn(arn)
                .set_tag_keys(Some(keys.to_vec()))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_resource_requires_subnets_and_type() {
        let cr = ComputeResource {
            resource_type: "FARGATE".into(),
            max_vcpus: 16,
            subnets: vec!["subnet-1".into()],
            ..Default::default()
        };
        let sdk = sdk_compute_resource(&cr).unwrap();
        let back = compute_resource(&sdk);
        assert_eq!(back.resource_type, "FARGATE");
        assert_eq!(back.max_vcpus, 16);
        assert_eq!(back.subnets, vec!["subnet-1".to_string()]);
    }

    #[test]
    fn test_unresolved_compute_environment_order_is_invalid() {
        let orders = vec![ComputeEnvironmentOrder {
            order: 1,
            ..Default::default()
        }];
        let err = ce_orders(&orders).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_collections_are_omitted() {
        assert!(tag_map(&[]).is_none());
        assert!(parameter_map(&BTreeMap::new()).is_none());
        assert!(key_values(&[]).is_none());
        assert!(requirements(&[]).unwrap().is_none());
    }
}
