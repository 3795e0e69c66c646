//! Common test utilities
//!
//! In-process fakes of the AWS service APIs plus a harness that wires them
//! into a reconciler backed by the in-memory object and secret stores. The
//! fakes behave like the real services only as far as the scenarios need:
//! resources become available immediately, and every mutating call is
//! recorded so tests can assert on what was sent.

#![allow(dead_code, reason = "each test binary uses a different subset of the helpers")]

use async_trait::async_trait;
use aws_resource_controller::constants::DEFAULT_CONTROLLER_NAMESPACE;
use aws_resource_controller::crd::batch::{
    ComputeEnvironmentParameters, JobDefinitionParameters, JobParameters, JobQueueParameters,
};
use aws_resource_controller::crd::dynamodb::TableParameters;
use aws_resource_controller::crd::lambda::PermissionParameters;
use aws_resource_controller::crd::rds::{DBClusterParameters, DBInstanceParameters, Endpoint, Parameter};
use aws_resource_controller::crd::{Condition, ConditionType, Managed, ResourceSpec, Tag};
use aws_resource_controller::kinds::{reconciler_for, BuildHooks, ConnectContext};
use aws_resource_controller::managed::{
    ExternalError, ManagedReconciler, ReconcileTiming, ResolveReferences, SecretPublisher,
};
use aws_resource_controller::provider::batch::{
    BatchApi, ComputeEnvironmentDetail, JobDefinitionDetail, JobDetail, JobQueueDetail,
};
use aws_resource_controller::provider::dynamodb::{
    BackupDescription, DynamoDbApi, GlobalTableDescription, TableDescription, TableUpdate,
};
use aws_resource_controller::provider::lambda::LambdaApi;
use aws_resource_controller::provider::rds::{
    DbCluster, DbInstance, ObservedParameter, ParameterGroup, ParameterGroupKind, RdsApi,
};
use aws_resource_controller::provider::{AwsError, ServiceFactory};
use aws_resource_controller::store::{MemoryObjectStore, MemorySecretStore, ObjectStore, SecretStore};
use kube::Resource;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const REGION: &str = "us-east-1";
pub const ACCOUNT: &str = "123456789012";

fn unsupported(operation: &str) -> AwsError {
    AwsError::Sdk {
        code: Some("Unsupported".to_string()),
        message: format!("{operation} is not implemented by the fake"),
    }
}

fn not_found(what: &str, name: &str) -> AwsError {
    AwsError::NotFound {
        message: format!("{what} {name} not found"),
    }
}

/// Resource spec using the default provider config
pub fn resource_spec() -> ResourceSpec {
    ResourceSpec::default()
}

pub fn condition<R: Managed>(cr: &R, ct: ConditionType) -> Option<Condition> {
    cr.condition(ct).cloned()
}

pub fn reason<R: Managed>(cr: &R, ct: ConditionType) -> Option<String> {
    cr.condition(ct).map(|c| c.reason.clone())
}

// ============================================================================
// RDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdsCall {
    CreateInstance { id: String, password: Option<String> },
    RestoreInstance { id: String, password: Option<String> },
    ModifyInstance { id: String, password: Option<String> },
    DeleteInstance { id: String },
    CreateCluster { id: String, password: Option<String> },
    RestoreCluster { id: String, password: Option<String> },
    ModifyCluster { id: String, password: Option<String> },
    DeleteCluster { id: String },
    CreateParameterGroup { name: String, family: String },
    ModifyParameters { name: String, count: usize },
    ResetParameters { name: String, count: usize },
    DeleteParameterGroup { name: String },
}

#[derive(Debug, Default)]
pub struct RdsState {
    pub instances: BTreeMap<String, DbInstance>,
    pub clusters: BTreeMap<String, DbCluster>,
    pub groups: BTreeMap<String, ParameterGroup>,
    pub parameters: BTreeMap<String, BTreeMap<String, ObservedParameter>>,
    pub tags: BTreeMap<String, Vec<Tag>>,
    pub calls: Vec<RdsCall>,
}

#[derive(Debug, Default)]
pub struct FakeRds {
    state: Mutex<RdsState>,
}

impl FakeRds {
    pub fn state(&self) -> MutexGuard<'_, RdsState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<RdsCall> {
        self.state().calls.clone()
    }

    pub fn insert_instance(&self, instance: DbInstance) {
        let mut state = self.state();
        if let Some(arn) = &instance.arn {
            state.tags.insert(arn.clone(), instance.tags.clone());
        }
        state.instances.insert(instance.identifier.clone(), instance);
    }

    pub fn instance(&self, id: &str) -> Option<DbInstance> {
        self.state().instances.get(id).cloned()
    }

    /// Values of the user-sourced parameters of a group
    pub fn parameter_values(&self, name: &str) -> BTreeMap<String, Option<String>> {
        self.state()
            .parameters
            .get(name)
            .map(|params| {
                params
                    .values()
                    .map(|p| (p.name.clone(), p.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn instance_arn(id: &str) -> String {
        format!("arn:aws:rds:{REGION}:{ACCOUNT}:db:{id}")
    }

    pub fn cluster(&self, id: &str) -> Option<DbCluster> {
        self.state().clusters.get(id).cloned()
    }

    pub fn cluster_arn(id: &str) -> String {
        format!("arn:aws:rds:{REGION}:{ACCOUNT}:cluster:{id}")
    }

    fn store_new_cluster(&self, id: &str, params: &DBClusterParameters) -> Result<DbCluster, AwsError> {
        let mut state = self.state();
        if state.clusters.contains_key(id) {
            return Err(AwsError::AlreadyExists {
                message: format!("DB cluster {id} already exists"),
            });
        }
        let port = params.port.unwrap_or(5432);
        let cluster = DbCluster {
            identifier: id.to_string(),
            status: Some("available".to_string()),
            arn: Some(Self::cluster_arn(id)),
            resource_id: Some(format!("cluster-{id}")),
            engine: Some(params.engine.clone()),
            engine_version: params.engine_version.clone(),
            port: Some(port),
            master_username: params.master_username.clone(),
            endpoint: Some(format!("{id}.cluster.rds.local")),
            reader_endpoint: Some(format!("{id}.cluster-ro.rds.local")),
            backup_retention_period: params.backup_retention_period,
            tags: params.tags.clone(),
            ..DbCluster::default()
        };
        state.tags.insert(Self::cluster_arn(id), params.tags.clone());
        state.clusters.insert(id.to_string(), cluster.clone());
        Ok(cluster)
    }

    fn new_instance(id: &str, params: &DBInstanceParameters) -> DbInstance {
        DbInstance {
            identifier: id.to_string(),
            status: Some("available".to_string()),
            arn: Some(Self::instance_arn(id)),
            resource_id: Some(format!("db-{id}")),
            db_instance_class: Some(params.db_instance_class.clone()),
            engine: Some(params.engine.clone()),
            engine_version: params.engine_version.clone(),
            allocated_storage: params.allocated_storage,
            kms_key_id: params.kms_key_id.clone(),
            storage_encrypted: params.storage_encrypted,
            master_username: params.master_username.clone(),
            db_name: params.db_name.clone(),
            backup_retention_period: params.backup_retention_period,
            endpoint: Some(Endpoint {
                address: Some(format!("{id}.rds.local")),
                port: Some(params.port.unwrap_or(5432)),
                hosted_zone_id: None,
            }),
            tags: params.tags.clone(),
            ..DbInstance::default()
        }
    }

    fn store_new_instance(&self, id: &str, params: &DBInstanceParameters) -> Result<DbInstance, AwsError> {
        let mut state = self.state();
        if state.instances.contains_key(id) {
            return Err(AwsError::AlreadyExists {
                message: format!("DB instance {id} already exists"),
            });
        }
        let instance = Self::new_instance(id, params);
        state.tags.insert(Self::instance_arn(id), params.tags.clone());
        state.instances.insert(id.to_string(), instance.clone());
        Ok(instance)
    }
}

#[async_trait]
impl RdsApi for FakeRds {
    async fn describe_db_instance(&self, id: &str) -> Result<DbInstance, AwsError> {
        let state = self.state();
        let mut instance = state
            .instances
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("DB instance", id))?;
        if let Some(arn) = &instance.arn {
            instance.tags = state.tags.get(arn).cloned().unwrap_or_default();
        }
        Ok(instance)
    }

    async fn create_db_instance(
        &self,
        id: &str,
        params: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError> {
        let instance = self.store_new_instance(id, params)?;
        self.state().calls.push(RdsCall::CreateInstance {
            id: id.to_string(),
            password: password.map(ToString::to_string),
        });
        Ok(instance)
    }

    async fn restore_db_instance(
        &self,
        id: &str,
        params: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError> {
        let instance = self.store_new_instance(id, params)?;
        self.state().calls.push(RdsCall::RestoreInstance {
            id: id.to_string(),
            password: password.map(ToString::to_string),
        });
        Ok(instance)
    }

    async fn modify_db_instance(
        &self,
        id: &str,
        params: &DBInstanceParameters,
        password: Option<&str>,
    ) -> Result<DbInstance, AwsError> {
        let mut state = self.state();
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| not_found("DB instance", id))?;
        if !params.db_instance_class.is_empty() {
            instance.db_instance_class = Some(params.db_instance_class.clone());
        }
        if params.allocated_storage.is_some() {
            instance.allocated_storage = params.allocated_storage;
        }
        if params.backup_retention_period.is_some() {
            instance.backup_retention_period = params.backup_retention_period;
        }
        if params.preferred_backup_window.is_some() {
            instance.preferred_backup_window = params.preferred_backup_window.clone();
        }
        if params.engine_version.is_some() {
            instance.engine_version = params.engine_version.clone();
        }
        let modified = instance.clone();
        state.calls.push(RdsCall::ModifyInstance {
            id: id.to_string(),
            password: password.map(ToString::to_string),
        });
        Ok(modified)
    }

    async fn delete_db_instance(&self, id: &str, _params: &DBInstanceParameters) -> Result<(), AwsError> {
        let mut state = self.state();
        state
            .instances
            .remove(id)
            .ok_or_else(|| not_found("DB instance", id))?;
        state.calls.push(RdsCall::DeleteInstance { id: id.to_string() });
        Ok(())
    }

    async fn describe_db_cluster(&self, id: &str) -> Result<DbCluster, AwsError> {
        let state = self.state();
        let mut cluster = state
            .clusters
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("DB cluster", id))?;
        if let Some(arn) = &cluster.arn {
            cluster.tags = state.tags.get(arn).cloned().unwrap_or_default();
        }
        Ok(cluster)
    }

    async fn create_db_cluster(
        &self,
        id: &str,
        params: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError> {
        let cluster = self.store_new_cluster(id, params)?;
        self.state().calls.push(RdsCall::CreateCluster {
            id: id.to_string(),
            password: password.map(ToString::to_string),
        });
        Ok(cluster)
    }

    async fn restore_db_cluster(
        &self,
        id: &str,
        params: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError> {
        let cluster = self.store_new_cluster(id, params)?;
        self.state().calls.push(RdsCall::RestoreCluster {
            id: id.to_string(),
            password: password.map(ToString::to_string),
        });
        Ok(cluster)
    }

    async fn modify_db_cluster(
        &self,
        id: &str,
        params: &DBClusterParameters,
        password: Option<&str>,
    ) -> Result<DbCluster, AwsError> {
        let mut state = self.state();
        let cluster = state
            .clusters
            .get_mut(id)
            .ok_or_else(|| not_found("DB cluster", id))?;
        if params.engine_version.is_some() {
            cluster.engine_version = params.engine_version.clone();
        }
        if params.port.is_some() {
            cluster.port = params.port;
        }
        if params.backup_retention_period.is_some() {
            cluster.backup_retention_period = params.backup_retention_period;
        }
        if params.deletion_protection.is_some() {
            cluster.deletion_protection = params.deletion_protection;
        }
        let modified = cluster.clone();
        state.calls.push(RdsCall::ModifyCluster {
            id: id.to_string(),
            password: password.map(ToString::to_string),
        });
        Ok(modified)
    }

    async fn delete_db_cluster(&self, id: &str, _params: &DBClusterParameters) -> Result<(), AwsError> {
        let mut state = self.state();
        state
            .clusters
            .remove(id)
            .ok_or_else(|| not_found("DB cluster", id))?;
        state.calls.push(RdsCall::DeleteCluster { id: id.to_string() });
        Ok(())
    }

    async fn describe_parameter_group(
        &self,
        _kind: ParameterGroupKind,
        name: &str,
    ) -> Result<ParameterGroup, AwsError> {
        self.state()
            .groups
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("parameter group", name))
    }

    async fn create_parameter_group(
        &self,
        _kind: ParameterGroupKind,
        name: &str,
        family: &str,
        description: &str,
        tags: &[Tag],
    ) -> Result<ParameterGroup, AwsError> {
        let mut state = self.state();
        if state.groups.contains_key(name) {
            return Err(AwsError::AlreadyExists {
                message: format!("parameter group {name} already exists"),
            });
        }
        let arn = format!("arn:aws:rds:{REGION}:{ACCOUNT}:pg:{name}");
        let group = ParameterGroup {
            name: name.to_string(),
            family: Some(family.to_string()),
            description: Some(description.to_string()),
            arn: Some(arn.clone()),
        };
        state.groups.insert(name.to_string(), group.clone());
        state.parameters.insert(name.to_string(), BTreeMap::new());
        state.tags.insert(arn, tags.to_vec());
        state.calls.push(RdsCall::CreateParameterGroup {
            name: name.to_string(),
            family: family.to_string(),
        });
        Ok(group)
    }

    async fn delete_parameter_group(&self, _kind: ParameterGroupKind, name: &str) -> Result<(), AwsError> {
        let mut state = self.state();
        state.groups.remove(name).ok_or_else(|| not_found("parameter group", name))?;
        state.parameters.remove(name);
        state.calls.push(RdsCall::DeleteParameterGroup { name: name.to_string() });
        Ok(())
    }

    async fn describe_parameters(
        &self,
        _kind: ParameterGroupKind,
        name: &str,
        source: Option<&str>,
    ) -> Result<Vec<ObservedParameter>, AwsError> {
        let state = self.state();
        let params = state
            .parameters
            .get(name)
            .ok_or_else(|| not_found("parameter group", name))?;
        Ok(params
            .values()
            .filter(|p| source.map_or(true, |s| p.source.as_deref() == Some(s)))
            .cloned()
            .collect())
    }

    async fn modify_parameters(
        &self,
        _kind: ParameterGroupKind,
        name: &str,
        parameters: &[Parameter],
    ) -> Result<(), AwsError> {
        if parameters.len() > 20 {
            return Err(AwsError::InvalidParameter {
                message: format!("{} parameters in one request", parameters.len()),
            });
        }
        let mut state = self.state();
        let group = state
            .parameters
            .get_mut(name)
            .ok_or_else(|| not_found("parameter group", name))?;
        for p in parameters {
            group.insert(
                p.parameter_name.clone(),
                ObservedParameter {
                    name: p.parameter_name.clone(),
                    value: p.parameter_value.clone(),
                    apply_method: p.apply_method.clone(),
                    source: Some("user".to_string()),
                },
            );
        }
        state.calls.push(RdsCall::ModifyParameters {
            name: name.to_string(),
            count: parameters.len(),
        });
        Ok(())
    }

    async fn reset_parameters(
        &self,
        _kind: ParameterGroupKind,
        name: &str,
        parameter_names: &[String],
    ) -> Result<(), AwsError> {
        if parameter_names.len() > 20 {
            return Err(AwsError::InvalidParameter {
                message: format!("{} parameters in one request", parameter_names.len()),
            });
        }
        let mut state = self.state();
        let group = state
            .parameters
            .get_mut(name)
            .ok_or_else(|| not_found("parameter group", name))?;
        for p in parameter_names {
            group.remove(p);
        }
        state.calls.push(RdsCall::ResetParameters {
            name: name.to_string(),
            count: parameter_names.len(),
        });
        Ok(())
    }

    async fn default_family(&self, _engine: &str, _engine_version: Option<&str>) -> Result<Option<String>, AwsError> {
        Ok(Some("postgres14".to_string()))
    }

    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>, AwsError> {
        Ok(self.state().tags.get(arn).cloned().unwrap_or_default())
    }

    async fn add_tags(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError> {
        let mut state = self.state();
        let current = state.tags.entry(arn.to_string()).or_default();
        for tag in tags {
            current.retain(|t| t.key != tag.key);
            current.push(tag.clone());
        }
        Ok(())
    }

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> Result<(), AwsError> {
        if let Some(current) = self.state().tags.get_mut(arn) {
            current.retain(|t| !keys.contains(&t.key));
        }
        Ok(())
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCall {
    CreateComputeEnvironment { name: String },
    UpdateComputeEnvironment { name: String },
    SetComputeEnvironmentState { name: String, state: String },
    DeleteComputeEnvironment { name: String },
    RegisterJobDefinition { name: String },
    DeregisterJobDefinition { arn: String },
    SubmitJob { name: String },
    TerminateJob { job_id: String },
}

#[derive(Debug, Default)]
pub struct BatchState {
    pub compute_environments: BTreeMap<String, ComputeEnvironmentDetail>,
    /// Job definition name to its revisions, oldest first
    pub job_definitions: BTreeMap<String, Vec<JobDefinitionDetail>>,
    pub jobs: BTreeMap<String, JobDetail>,
    pub calls: Vec<BatchCall>,
}

#[derive(Debug, Default)]
pub struct FakeBatch {
    state: Mutex<BatchState>,
}

impl FakeBatch {
    pub fn state(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<BatchCall> {
        self.state().calls.clone()
    }

    pub fn insert_compute_environment(&self, detail: ComputeEnvironmentDetail) {
        self.state()
            .compute_environments
            .insert(detail.name.clone(), detail);
    }

    pub fn compute_environment(&self, name: &str) -> Option<ComputeEnvironmentDetail> {
        self.state().compute_environments.get(name).cloned()
    }

    pub fn compute_environment_arn(name: &str) -> String {
        format!("arn:aws:batch:{REGION}:{ACCOUNT}:compute-environment/{name}")
    }

    /// Latest revision of a job definition
    pub fn job_definition(&self, name: &str) -> Option<JobDefinitionDetail> {
        self.state()
            .job_definitions
            .get(name)
            .and_then(|revisions| revisions.last().cloned())
    }

    pub fn job(&self, job_id: &str) -> Option<JobDetail> {
        self.state().jobs.get(job_id).cloned()
    }

    pub fn set_job_status(&self, job_id: &str, status: &str) {
        if let Some(job) = self.state().jobs.get_mut(job_id) {
            job.status = Some(status.to_string());
        }
    }

    pub fn job_id(name: &str) -> String {
        format!("job-{name}")
    }
}

#[async_trait]
impl BatchApi for FakeBatch {
    async fn describe_compute_environment(&self, name: &str) -> Result<ComputeEnvironmentDetail, AwsError> {
        self.state()
            .compute_environments
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("compute environment", name))
    }

    async fn create_compute_environment(
        &self,
        name: &str,
        params: &ComputeEnvironmentParameters,
    ) -> Result<String, AwsError> {
        let mut state = self.state();
        if state.compute_environments.contains_key(name) {
            return Err(AwsError::AlreadyExists {
                message: format!("compute environment {name} already exists"),
            });
        }
        let arn = Self::compute_environment_arn(name);
        state.compute_environments.insert(
            name.to_string(),
            ComputeEnvironmentDetail {
                name: name.to_string(),
                arn: Some(arn.clone()),
                environment_type: Some(params.environment_type.clone()),
                state: Some(params.desired_state.clone().unwrap_or_else(|| "ENABLED".to_string())),
                status: Some("VALID".to_string()),
                service_role: params.service_role_arn.clone(),
                compute_resources: params.compute_resources.clone(),
                unmanaged_vcpus: params.unmanaged_vcpus,
                tags: params.tags.iter().map(|t| (t.key.clone(), t.value.clone())).collect(),
                ..ComputeEnvironmentDetail::default()
            },
        );
        state.calls.push(BatchCall::CreateComputeEnvironment { name: name.to_string() });
        Ok(arn)
    }

    async fn update_compute_environment(
        &self,
        name: &str,
        params: &ComputeEnvironmentParameters,
    ) -> Result<(), AwsError> {
        let mut state = self.state();
        let ce = state
            .compute_environments
            .get_mut(name)
            .ok_or_else(|| not_found("compute environment", name))?;
        if let Some(desired) = &params.desired_state {
            ce.state = Some(desired.clone());
        }
        if params.unmanaged_vcpus.is_some() {
            ce.unmanaged_vcpus = params.unmanaged_vcpus;
        }
        state.calls.push(BatchCall::UpdateComputeEnvironment { name: name.to_string() });
        Ok(())
    }

    async fn set_compute_environment_state(&self, name: &str, desired: &str) -> Result<(), AwsError> {
        let mut state = self.state();
        let ce = state
            .compute_environments
            .get_mut(name)
            .ok_or_else(|| not_found("compute environment", name))?;
        ce.state = Some(desired.to_string());
        state.calls.push(BatchCall::SetComputeEnvironmentState {
            name: name.to_string(),
            state: desired.to_string(),
        });
        Ok(())
    }

    async fn delete_compute_environment(&self, name: &str) -> Result<(), AwsError> {
        let mut state = self.state();
        let ce = state
            .compute_environments
            .get(name)
            .ok_or_else(|| not_found("compute environment", name))?;
        if ce.state.as_deref() != Some("DISABLED") {
            return Err(AwsError::InvalidState {
                message: format!("compute environment {name} must be DISABLED before deletion"),
            });
        }
        state.compute_environments.remove(name);
        state.calls.push(BatchCall::DeleteComputeEnvironment { name: name.to_string() });
        Ok(())
    }

    async fn describe_job_queue(&self, _name: &str) -> Result<JobQueueDetail, AwsError> {
        Err(unsupported("DescribeJobQueues"))
    }

    async fn create_job_queue(&self, _name: &str, _params: &JobQueueParameters) -> Result<String, AwsError> {
        Err(unsupported("CreateJobQueue"))
    }

    async fn update_job_queue(&self, _name: &str, _params: &JobQueueParameters) -> Result<(), AwsError> {
        Err(unsupported("UpdateJobQueue"))
    }

    async fn set_job_queue_state(&self, _name: &str, _state: &str) -> Result<(), AwsError> {
        Err(unsupported("UpdateJobQueue"))
    }

    async fn delete_job_queue(&self, _name: &str) -> Result<(), AwsError> {
        Err(unsupported("DeleteJobQueue"))
    }

    async fn describe_job_definition(&self, name: &str) -> Result<JobDefinitionDetail, AwsError> {
        self.job_definition(name)
            .ok_or_else(|| not_found("job definition", name))
    }

    async fn register_job_definition(
        &self,
        name: &str,
        params: &JobDefinitionParameters,
    ) -> Result<JobDefinitionDetail, AwsError> {
        let mut state = self.state();
        let revisions = state.job_definitions.entry(name.to_string()).or_default();
        let revision = i32::try_from(revisions.len()).unwrap_or(i32::MAX) + 1;
        let detail = JobDefinitionDetail {
            name: name.to_string(),
            arn: format!("arn:aws:batch:{REGION}:{ACCOUNT}:job-definition/{name}:{revision}"),
            revision: Some(revision),
            status: Some("ACTIVE".to_string()),
            tags: params.tags.iter().map(|t| (t.key.clone(), t.value.clone())).collect(),
        };
        revisions.push(detail.clone());
        state.calls.push(BatchCall::RegisterJobDefinition { name: name.to_string() });
        Ok(detail)
    }

    async fn deregister_job_definition(&self, arn: &str) -> Result<(), AwsError> {
        let mut state = self.state();
        let detail = state
            .job_definitions
            .values_mut()
            .flatten()
            .find(|d| d.arn == arn)
            .ok_or_else(|| not_found("job definition", arn))?;
        detail.status = Some("INACTIVE".to_string());
        state.calls.push(BatchCall::DeregisterJobDefinition { arn: arn.to_string() });
        Ok(())
    }

    async fn describe_job(&self, job_id: &str) -> Result<JobDetail, AwsError> {
        self.job(job_id).ok_or_else(|| not_found("job", job_id))
    }

    async fn submit_job(&self, name: &str, params: &JobParameters) -> Result<JobDetail, AwsError> {
        let job_id = Self::job_id(name);
        let detail = JobDetail {
            job_id: job_id.clone(),
            job_arn: Some(format!("arn:aws:batch:{REGION}:{ACCOUNT}:job/{job_id}")),
            status: Some("SUBMITTED".to_string()),
            tags: params.tags.iter().map(|t| (t.key.clone(), t.value.clone())).collect(),
            ..JobDetail::default()
        };
        let mut state = self.state();
        state.jobs.insert(job_id, detail.clone());
        state.calls.push(BatchCall::SubmitJob { name: name.to_string() });
        Ok(detail)
    }

    async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<(), AwsError> {
        let mut state = self.state();
        let job = state.jobs.get_mut(job_id).ok_or_else(|| not_found("job", job_id))?;
        if !job.is_terminal() {
            job.status = Some("FAILED".to_string());
            job.status_reason = Some(reason.to_string());
        }
        state.calls.push(BatchCall::TerminateJob { job_id: job_id.to_string() });
        Ok(())
    }

    async fn tag_resource(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError> {
        let mut state = self.state();
        if let Some(ce) = state
            .compute_environments
            .values_mut()
            .find(|ce| ce.arn.as_deref() == Some(arn))
        {
            for tag in tags {
                ce.tags.insert(tag.key.clone(), tag.value.clone());
            }
        }
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), AwsError> {
        let mut state = self.state();
        if let Some(ce) = state
            .compute_environments
            .values_mut()
            .find(|ce| ce.arn.as_deref() == Some(arn))
        {
            ce.tags.retain(|k, _| !keys.contains(k));
        }
        Ok(())
    }
}

// ============================================================================
// DynamoDB
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum DynamoDbCall {
    CreateTable { name: String },
    UpdateTable { name: String, update: TableUpdate },
    DeleteTable { name: String },
    CreateBackup { table: String, name: String },
    DeleteBackup { arn: String },
}

#[derive(Debug, Default)]
pub struct DynamoDbState {
    pub tables: BTreeMap<String, TableDescription>,
    /// Backup ARN to backup
    pub backups: BTreeMap<String, BackupDescription>,
    pub tags: BTreeMap<String, Vec<Tag>>,
    pub calls: Vec<DynamoDbCall>,
}

#[derive(Debug, Default)]
pub struct FakeDynamoDb {
    state: Mutex<DynamoDbState>,
}

impl FakeDynamoDb {
    pub fn state(&self) -> MutexGuard<'_, DynamoDbState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<DynamoDbCall> {
        self.state().calls.clone()
    }

    pub fn set_table_status(&self, name: &str, status: &str) {
        if let Some(table) = self.state().tables.get_mut(name) {
            table.status = Some(status.to_string());
        }
    }

    pub fn table(&self, name: &str) -> Option<TableDescription> {
        self.state().tables.get(name).cloned()
    }
}

#[async_trait]
impl DynamoDbApi for FakeDynamoDb {
    async fn describe_table(&self, name: &str) -> Result<TableDescription, AwsError> {
        self.state()
            .tables
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("table", name))
    }

    async fn create_table(&self, name: &str, params: &TableParameters) -> Result<TableDescription, AwsError> {
        let mut state = self.state();
        if state.tables.contains_key(name) {
            return Err(AwsError::AlreadyExists {
                message: format!("table {name} already exists"),
            });
        }
        let arn = format!("arn:aws:dynamodb:{REGION}:{ACCOUNT}:table/{name}");
        let table = TableDescription {
            name: name.to_string(),
            arn: Some(arn.clone()),
            table_id: Some(format!("id-{name}")),
            status: Some("CREATING".to_string()),
            billing_mode: Some(
                params
                    .billing_mode
                    .clone()
                    .unwrap_or_else(|| "PROVISIONED".to_string()),
            ),
            provisioned_throughput: params.provisioned_throughput.clone(),
            stream_specification: params.stream_specification.clone(),
            sse_specification: params.sse_specification.clone(),
            global_secondary_indexes: params.global_secondary_indexes.clone(),
            table_class: Some(params.table_class.clone().unwrap_or_else(|| "STANDARD".to_string())),
            deletion_protection_enabled: Some(params.deletion_protection_enabled.unwrap_or(false)),
            ..TableDescription::default()
        };
        state.tables.insert(name.to_string(), table.clone());
        state.tags.insert(arn, params.tags.clone());
        state.calls.push(DynamoDbCall::CreateTable { name: name.to_string() });
        Ok(table)
    }

    async fn update_table(&self, name: &str, update: &TableUpdate) -> Result<(), AwsError> {
        let mut state = self.state();
        let table = state.tables.get_mut(name).ok_or_else(|| not_found("table", name))?;
        if let Some(billing) = &update.billing_mode {
            table.billing_mode = Some(billing.clone());
        }
        if let Some(throughput) = &update.provisioned_throughput {
            table.provisioned_throughput = Some(throughput.clone());
        }
        if let Some(class) = &update.table_class {
            table.table_class = Some(class.clone());
        }
        if let Some(protection) = update.deletion_protection_enabled {
            table.deletion_protection_enabled = Some(protection);
        }
        state.calls.push(DynamoDbCall::UpdateTable {
            name: name.to_string(),
            update: update.clone(),
        });
        Ok(())
    }

    async fn delete_table(&self, name: &str) -> Result<(), AwsError> {
        let mut state = self.state();
        state.tables.remove(name).ok_or_else(|| not_found("table", name))?;
        state.calls.push(DynamoDbCall::DeleteTable { name: name.to_string() });
        Ok(())
    }

    async fn list_tags(&self, arn: &str) -> Result<Vec<Tag>, AwsError> {
        Ok(self.state().tags.get(arn).cloned().unwrap_or_default())
    }

    async fn tag_resource(&self, arn: &str, tags: &[Tag]) -> Result<(), AwsError> {
        let mut state = self.state();
        let current = state.tags.entry(arn.to_string()).or_default();
        for tag in tags {
            current.retain(|t| t.key != tag.key);
            current.push(tag.clone());
        }
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), AwsError> {
        if let Some(current) = self.state().tags.get_mut(arn) {
            current.retain(|t| !keys.contains(&t.key));
        }
        Ok(())
    }

    async fn describe_backup(&self, arn: &str) -> Result<BackupDescription, AwsError> {
        self.state()
            .backups
            .get(arn)
            .cloned()
            .ok_or_else(|| not_found("backup", arn))
    }

    async fn create_backup(&self, table_name: &str, backup_name: &str) -> Result<BackupDescription, AwsError> {
        let mut state = self.state();
        let table_arn = state
            .tables
            .get(table_name)
            .ok_or_else(|| not_found("table", table_name))?
            .arn
            .clone()
            .unwrap_or_default();
        let backup = BackupDescription {
            arn: format!("{table_arn}/backup/{backup_name}"),
            name: Some(backup_name.to_string()),
            status: Some("AVAILABLE".to_string()),
            backup_type: Some("USER".to_string()),
            size_bytes: Some(0),
            table_name: Some(table_name.to_string()),
            table_arn: Some(table_arn),
        };
        state.backups.insert(backup.arn.clone(), backup.clone());
        state.calls.push(DynamoDbCall::CreateBackup {
            table: table_name.to_string(),
            name: backup_name.to_string(),
        });
        Ok(backup)
    }

    async fn delete_backup(&self, arn: &str) -> Result<(), AwsError> {
        let mut state = self.state();
        state.backups.remove(arn).ok_or_else(|| not_found("backup", arn))?;
        state.calls.push(DynamoDbCall::DeleteBackup { arn: arn.to_string() });
        Ok(())
    }

    async fn describe_global_table(&self, _name: &str) -> Result<GlobalTableDescription, AwsError> {
        Err(unsupported("DescribeGlobalTable"))
    }

    async fn create_global_table(&self, _name: &str, _regions: &[String]) -> Result<GlobalTableDescription, AwsError> {
        Err(unsupported("CreateGlobalTable"))
    }

    async fn update_global_table(&self, _name: &str, _add: &[String], _remove: &[String]) -> Result<(), AwsError> {
        Err(unsupported("UpdateGlobalTable"))
    }
}

// ============================================================================
// Lambda
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LambdaCall {
    AddPermission { function: String, sid: String },
    RemovePermission { function: String, sid: String },
}

#[derive(Debug, Default)]
pub struct LambdaState {
    /// Function name to policy statements
    pub policies: BTreeMap<String, Vec<Value>>,
    pub calls: Vec<LambdaCall>,
}

#[derive(Debug, Default)]
pub struct FakeLambda {
    state: Mutex<LambdaState>,
}

impl FakeLambda {
    pub fn state(&self) -> MutexGuard<'_, LambdaState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<LambdaCall> {
        self.state().calls.clone()
    }

    pub fn statement(&self, function: &str, sid: &str) -> Option<Value> {
        self.state()
            .policies
            .get(function)?
            .iter()
            .find(|s| s["Sid"] == sid)
            .cloned()
    }

    fn principal(principal: &str) -> Value {
        if principal.len() == 12 && principal.bytes().all(|b| b.is_ascii_digit()) {
            json!({"AWS": format!("arn:aws:iam::{principal}:root")})
        } else if principal.starts_with("arn:") {
            json!({"AWS": principal})
        } else {
            json!({"Service": principal})
        }
    }
}

#[async_trait]
impl LambdaApi for FakeLambda {
    async fn get_policy(&self, function_name: &str, _qualifier: Option<&str>) -> Result<String, AwsError> {
        let state = self.state();
        let statements = state
            .policies
            .get(function_name)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| not_found("policy of function", function_name))?;
        Ok(json!({
            "Version": "2012-10-17",
            "Id": "default",
            "Statement": statements,
        })
        .to_string())
    }

    async fn add_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        params: &PermissionParameters,
    ) -> Result<Option<String>, AwsError> {
        let mut state = self.state();
        let statements = state.policies.entry(function_name.to_string()).or_default();
        if statements.iter().any(|s| s["Sid"] == statement_id) {
            return Err(AwsError::AlreadyExists {
                message: format!("statement {statement_id} already exists"),
            });
        }
        let mut statement = json!({
            "Sid": statement_id,
            "Effect": "Allow",
            "Action": params.action,
            "Resource": format!("arn:aws:lambda:{REGION}:{ACCOUNT}:function:{function_name}"),
            "Principal": Self::principal(&params.principal),
        });
        let mut condition = serde_json::Map::new();
        if let Some(arn) = &params.source_arn {
            condition.insert("ArnLike".to_string(), json!({"AWS:SourceArn": arn}));
        }
        let mut equals = serde_json::Map::new();
        if let Some(account) = &params.source_account {
            equals.insert("AWS:SourceAccount".to_string(), json!(account));
        }
        if let Some(org) = &params.principal_org_id {
            equals.insert("aws:PrincipalOrgID".to_string(), json!(org));
        }
        if let Some(token) = &params.event_source_token {
            equals.insert("lambda:EventSourceToken".to_string(), json!(token));
        }
        if !equals.is_empty() {
            condition.insert("StringEquals".to_string(), Value::Object(equals));
        }
        if !condition.is_empty() {
            statement["Condition"] = Value::Object(condition);
        }
        let stored = statement.to_string();
        statements.push(statement);
        state.calls.push(LambdaCall::AddPermission {
            function: function_name.to_string(),
            sid: statement_id.to_string(),
        });
        Ok(Some(stored))
    }

    async fn remove_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        _qualifier: Option<&str>,
    ) -> Result<(), AwsError> {
        let mut state = self.state();
        let statements = state
            .policies
            .get_mut(function_name)
            .ok_or_else(|| not_found("policy of function", function_name))?;
        let before = statements.len();
        statements.retain(|s| s["Sid"] != statement_id);
        if statements.len() == before {
            return Err(not_found("statement", statement_id));
        }
        state.calls.push(LambdaCall::RemovePermission {
            function: function_name.to_string(),
            sid: statement_id.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

#[derive(Debug, Default)]
pub struct FakeServices {
    pub rds: Arc<FakeRds>,
    pub batch: Arc<FakeBatch>,
    pub dynamodb: Arc<FakeDynamoDb>,
    pub lambda: Arc<FakeLambda>,
}

#[async_trait]
impl ServiceFactory for FakeServices {
    async fn rds(&self, _provider_config: &str, _region: &str) -> Result<Arc<dyn RdsApi>, ExternalError> {
        Ok(Arc::clone(&self.rds) as Arc<dyn RdsApi>)
    }

    async fn batch(&self, _provider_config: &str, _region: &str) -> Result<Arc<dyn BatchApi>, ExternalError> {
        Ok(Arc::clone(&self.batch) as Arc<dyn BatchApi>)
    }

    async fn dynamodb(&self, _provider_config: &str, _region: &str) -> Result<Arc<dyn DynamoDbApi>, ExternalError> {
        Ok(Arc::clone(&self.dynamodb) as Arc<dyn DynamoDbApi>)
    }

    async fn lambda(&self, _provider_config: &str, _region: &str) -> Result<Arc<dyn LambdaApi>, ExternalError> {
        Ok(Arc::clone(&self.lambda) as Arc<dyn LambdaApi>)
    }
}

/// In-memory cluster plus fake AWS services
#[derive(Debug)]
pub struct Harness {
    pub objects: Arc<MemoryObjectStore>,
    pub secrets: Arc<MemorySecretStore>,
    pub services: Arc<FakeServices>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(MemoryObjectStore::new()),
            secrets: Arc::new(MemorySecretStore::new()),
            services: Arc::new(FakeServices::default()),
        }
    }

    pub fn rds(&self) -> &FakeRds {
        &self.services.rds
    }

    pub fn batch(&self) -> &FakeBatch {
        &self.services.batch
    }

    pub fn dynamodb(&self) -> &FakeDynamoDb {
        &self.services.dynamodb
    }

    pub fn lambda(&self) -> &FakeLambda {
        &self.services.lambda
    }

    pub fn connect_context(&self) -> Arc<ConnectContext> {
        let services: Arc<dyn ServiceFactory> = Arc::clone(&self.services) as Arc<dyn ServiceFactory>;
        let secrets: Arc<dyn SecretStore> = Arc::clone(&self.secrets) as Arc<dyn SecretStore>;
        Arc::new(ConnectContext {
            services,
            secrets,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
        })
    }

    /// Reconciler for the kind handled by `H`
    pub fn reconciler<H>(&self) -> ManagedReconciler<H::Resource>
    where
        H: BuildHooks,
        H::Resource: ResolveReferences,
    {
        let objects: Arc<dyn ObjectStore> = Arc::clone(&self.objects) as Arc<dyn ObjectStore>;
        let secrets: Arc<dyn SecretStore> = Arc::clone(&self.secrets) as Arc<dyn SecretStore>;
        reconciler_for::<H>(
            objects,
            Arc::new(SecretPublisher::new(secrets)),
            self.connect_context(),
            ReconcileTiming::default(),
        )
    }

    /// A value of a secret as UTF-8
    pub fn secret_value(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.secrets.value(namespace, name, key)
    }

    /// Password cache secret of a resource
    pub fn cache_value<R: Managed>(&self, cr: &R, key: &str) -> Option<String> {
        let uid = cr.meta().uid.clone()?;
        let name = format!("{}.{}", R::kind_name().to_lowercase(), uid);
        self.secrets.value(DEFAULT_CONTROLLER_NAMESPACE, &name, key)
    }
}
