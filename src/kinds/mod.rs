//! # Kind Adapters
//!
//! One [`KindHooks`] implementation per reconciled kind, plus the glue that
//! turns them into running watch loops.
//!
//! ## Module Structure
//!
//! - `rds/` - DBInstance, DBCluster, parameter groups and the password cache
//! - `batch/` - ComputeEnvironment, JobQueue, JobDefinition, Job
//! - `dynamodb/` - Table, Backup, GlobalTable
//! - `lambda/` - Permission and policy document parsing
//!
//! Every adapter is built per reconcile by [`BuildHooks::build`], which asks
//! the [`ServiceFactory`] for a client bound to the resource's region and
//! `ProviderConfig`. The [`KindRegistry`] maps kind names to watch-loop
//! spawners and is filtered by `ENABLED_KINDS` at startup.

pub mod batch;
pub mod dynamodb;
pub mod lambda;
pub mod rds;
mod targets;

use crate::config::ControllerConfig;
use crate::controller::server::ServerState;
use crate::crd::Managed;
use crate::managed::external::{Connector, ExternalClient, ExternalError, Hooked, KindHooks};
use crate::managed::{
    ConnectionPublisher, ExternalNameInitializer, ManagedReconciler, ReconcileTiming,
    ResolveReferences,
};
use crate::provider::batch::BatchApi;
use crate::provider::dynamodb::DynamoDbApi;
use crate::provider::lambda::LambdaApi;
use crate::provider::rds::RdsApi;
use crate::provider::ServiceFactory;
use crate::store::{ObjectStore, SecretStore};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// What an adapter needs to build its AWS clients
pub struct ConnectContext {
    pub services: Arc<dyn ServiceFactory>,
    pub secrets: Arc<dyn SecretStore>,
    /// Namespace of controller-owned secrets (password caches)
    pub controller_namespace: String,
}

impl std::fmt::Debug for ConnectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectContext")
            .field("controller_namespace", &self.controller_namespace)
            .finish_non_exhaustive()
    }
}

impl ConnectContext {
    fn provider_config<R: Managed>(cr: &R) -> &str {
        &cr.resource_spec().provider_config_ref.name
    }

    pub async fn rds<R: Managed>(&self, cr: &R, region: &str) -> Result<Arc<dyn RdsApi>, ExternalError> {
        self.services.rds(Self::provider_config(cr), region).await
    }

    pub async fn batch<R: Managed>(&self, cr: &R, region: &str) -> Result<Arc<dyn BatchApi>, ExternalError> {
        self.services.batch(Self::provider_config(cr), region).await
    }

    pub async fn dynamodb<R: Managed>(
        &self,
        cr: &R,
        region: &str,
    ) -> Result<Arc<dyn DynamoDbApi>, ExternalError> {
        self.services.dynamodb(Self::provider_config(cr), region).await
    }

    pub async fn lambda<R: Managed>(&self, cr: &R, region: &str) -> Result<Arc<dyn LambdaApi>, ExternalError> {
        self.services.lambda(Self::provider_config(cr), region).await
    }
}

/// Builds a kind's hooks for one resource
#[async_trait]
pub trait BuildHooks: KindHooks + Sized + 'static {
    /// How the external name is chosen before the first Create
    fn external_name_initializer() -> ExternalNameInitializer {
        ExternalNameInitializer::ResourceName
    }

    async fn build(ctx: &ConnectContext, cr: &Self::Resource) -> Result<Self, ExternalError>;

    /// Clean up controller-owned secrets once the resource is released
    async fn release(_ctx: &ConnectContext, _cr: &Self::Resource) -> Result<(), ExternalError> {
        Ok(())
    }
}

/// [`Connector`] that builds `H` and wraps it in [`Hooked`]
pub struct HookedConnector<H> {
    ctx: Arc<ConnectContext>,
    _hooks: PhantomData<fn() -> H>,
}

impl<H> std::fmt::Debug for HookedConnector<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookedConnector")
            .field("hooks", &std::any::type_name::<H>())
            .finish_non_exhaustive()
    }
}

impl<H> HookedConnector<H> {
    pub fn new(ctx: Arc<ConnectContext>) -> Self {
        Self {
            ctx,
            _hooks: PhantomData,
        }
    }
}

#[async_trait]
impl<H: BuildHooks> Connector<H::Resource> for HookedConnector<H> {
    async fn connect(&self, cr: &H::Resource) -> Result<Box<dyn ExternalClient<H::Resource>>, ExternalError> {
        let hooks = H::build(&self.ctx, cr).await?;
        Ok(Box::new(Hooked(hooks)))
    }

    async fn release(&self, cr: &H::Resource) -> Result<(), ExternalError> {
        H::release(&self.ctx, cr).await
    }
}

/// Process-wide dependencies shared by every kind's watch loop
pub struct KindContext {
    pub client: kube::Client,
    pub objects: Arc<dyn ObjectStore>,
    pub publisher: Arc<dyn ConnectionPublisher>,
    pub connect: Arc<ConnectContext>,
    pub config: Arc<ControllerConfig>,
    /// Probe state; its shutdown flag stops every watch loop
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for KindContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindContext")
            .field("connect", &self.connect)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Requeue intervals taken from the controller configuration
#[must_use]
pub fn timing(config: &ControllerConfig) -> ReconcileTiming {
    ReconcileTiming {
        poll_interval: config.poll_interval(),
        short_wait: config.short_wait(),
        create_grace_period: config.create_grace_period(),
    }
}

/// Reconciler for the kind handled by `H`
pub fn reconciler_for<H>(
    objects: Arc<dyn ObjectStore>,
    publisher: Arc<dyn ConnectionPublisher>,
    connect: Arc<ConnectContext>,
    timing: ReconcileTiming,
) -> ManagedReconciler<H::Resource>
where
    H: BuildHooks,
    H::Resource: ResolveReferences,
{
    ManagedReconciler::new(objects, Arc::new(HookedConnector::<H>::new(connect)), publisher)
        .with_initializer(H::external_name_initializer())
        .with_timing(timing)
}

/// Starts the watch loop of one kind
pub type SpawnFn = fn(Arc<KindContext>) -> BoxFuture<'static, anyhow::Result<()>>;

fn spawn_watch<H>(ctx: Arc<KindContext>) -> BoxFuture<'static, anyhow::Result<()>>
where
    H: BuildHooks,
    H::Resource: ResolveReferences,
{
    Box::pin(crate::runtime::watch_loop::run::<H>(ctx))
}

/// Kind name to watch-loop spawner
#[derive(Default)]
pub struct KindRegistry {
    loops: BTreeMap<String, SpawnFn>,
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.loops.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KindRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every kind this controller serves
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register::<rds::DBInstanceHooks>();
        registry.register::<rds::DBClusterHooks>();
        registry.register::<rds::ParameterGroupHooks<crate::crd::DBParameterGroup>>();
        registry.register::<rds::ParameterGroupHooks<crate::crd::DBClusterParameterGroup>>();
        registry.register::<batch::ComputeEnvironmentHooks>();
        registry.register::<batch::JobQueueHooks>();
        registry.register::<batch::JobDefinitionHooks>();
        registry.register::<batch::JobHooks>();
        registry.register::<dynamodb::TableHooks>();
        registry.register::<dynamodb::BackupHooks>();
        registry.register::<dynamodb::GlobalTableHooks>();
        registry.register::<lambda::PermissionHooks>();
        registry
    }

    pub fn register<H>(&mut self)
    where
        H: BuildHooks,
        H::Resource: ResolveReferences,
    {
        self.loops
            .insert(<H::Resource as Managed>::kind_name(), spawn_watch::<H> as SpawnFn);
    }

    /// Drop kinds not listed in `ENABLED_KINDS`
    pub fn retain_enabled(&mut self, config: &ControllerConfig) {
        self.loops.retain(|kind, _| config.is_kind_enabled(kind));
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.loops.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Spawn one task per registered kind
    pub fn spawn_all(&self, ctx: &Arc<KindContext>) -> Vec<(String, JoinHandle<anyhow::Result<()>>)> {
        self.loops
            .iter()
            .map(|(kind, spawn)| {
                info!("Starting watch loop for {}", kind);
                (kind.clone(), tokio::spawn(spawn(Arc::clone(ctx))))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_has_every_kind() {
        let registry = KindRegistry::builtin();
        let kinds: Vec<&str> = registry.kinds().collect();
        assert_eq!(
            kinds,
            vec![
                "Backup",
                "ComputeEnvironment",
                "DBCluster",
                "DBClusterParameterGroup",
                "DBInstance",
                "DBParameterGroup",
                "GlobalTable",
                "Job",
                "JobDefinition",
                "JobQueue",
                "Permission",
                "Table",
            ]
        );
    }

    #[test]
    fn test_retain_enabled_filters_kinds() {
        let mut registry = KindRegistry::builtin();
        let config = ControllerConfig {
            enabled_kinds: vec!["DBInstance".to_string(), "Table".to_string()],
            ..ControllerConfig::default()
        };
        registry.retain_enabled(&config);
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["DBInstance", "Table"]);
    }
}
