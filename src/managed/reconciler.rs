//! # Managed Resource Reconciler
//!
//! Drives one managed resource toward its desired state:
//!
//! 1. Deleted? Observe, delete remotely, wait for the resource to disappear,
//!    release controller-owned state, unpublish connection details and
//!    remove the finalizer. Orphaned resources skip straight to the release.
//! 2. Add the finalizer and assign the external name.
//! 3. Resolve references and persist any resolved values.
//! 4. Connect and observe.
//! 5. Absent: create, guarded by the create annotations so an interrupted
//!    Create is never blindly repeated.
//! 6. Present: persist late-initialized fields, publish connection details,
//!    update when out of date.
//!
//! Every write to the resource is a metadata/spec update followed, at the end
//! of the pass, by a status patch. Retryable failures are returned to the
//! controller runtime for backoff; everything else sets `Synced=False` and
//! waits for the next poll.

use crate::constants::ANNOTATION_EXTERNAL_CREATE_PENDING;
use crate::crd::{DeletionPolicy, Managed};
use crate::managed::conditions;
use crate::managed::error::ReconcilerError;
use crate::managed::external::{
    ConnectionDetails, Connector, ExternalClient, ExternalError, ExternalObservation,
};
use crate::managed::meta::{self, CreateGuard, ExternalNameInitializer};
use crate::managed::policy::ManagementAction;
use crate::managed::publisher::{ConnectionPublisher, PublishTarget};
use crate::managed::reference::{ReferenceResolver, ResolveReferences};
use crate::observability::metrics;
use crate::store::{self, api_resource, ObjectStore};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Requeue intervals used by the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileTiming {
    /// After a successful pass
    pub poll_interval: Duration,
    /// While a resource is creating or deleting
    pub short_wait: Duration,
    /// After a recorded successful Create
    pub create_grace_period: Duration,
}

impl Default for ReconcileTiming {
    fn default() -> Self {
        use crate::constants::{
            DEFAULT_CREATE_GRACE_PERIOD_SECS, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SHORT_WAIT_SECS,
        };
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            short_wait: Duration::from_secs(DEFAULT_SHORT_WAIT_SECS),
            create_grace_period: Duration::from_secs(DEFAULT_CREATE_GRACE_PERIOD_SECS),
        }
    }
}

/// Generic reconcile state machine for one managed kind.
///
/// Holds no per-object state; the controller runtime guarantees at most one
/// concurrent pass per object.
pub struct ManagedReconciler<R: Managed> {
    store: Arc<dyn ObjectStore>,
    connector: Arc<dyn Connector<R>>,
    publisher: Arc<dyn ConnectionPublisher>,
    resolver: ReferenceResolver,
    initializer: ExternalNameInitializer,
    timing: ReconcileTiming,
}

impl<R: Managed> std::fmt::Debug for ManagedReconciler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedReconciler")
            .field("kind", &R::kind_name())
            .field("initializer", &self.initializer)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

/// Tracks the last status written so only changes are patched
struct StatusWriter {
    last: serde_json::Value,
}

impl StatusWriter {
    fn new<R: Managed>(cr: &R) -> Result<Self, ReconcilerError> {
        Ok(Self {
            last: serde_json::to_value(cr.managed_status())?,
        })
    }

    async fn write<R: Managed>(&mut self, store: &dyn ObjectStore, cr: &R) -> Result<(), ReconcilerError> {
        let current = serde_json::to_value(cr.managed_status())?;
        if current == self.last {
            return Ok(());
        }
        let patch = if self.last.is_null() {
            current.clone()
        } else {
            store::diff_merge_patch(&self.last, &current)
        };
        store
            .update_status(&api_resource::<R>(), cr.resource_name(), &patch)
            .await?;
        self.last = current;
        Ok(())
    }
}

impl<R> ManagedReconciler<R>
where
    R: Managed + ResolveReferences,
{
    pub fn new(
        store: Arc<dyn ObjectStore>,
        connector: Arc<dyn Connector<R>>,
        publisher: Arc<dyn ConnectionPublisher>,
    ) -> Self {
        Self {
            resolver: ReferenceResolver::new(store.clone()),
            store,
            connector,
            publisher,
            initializer: ExternalNameInitializer::default(),
            timing: ReconcileTiming::default(),
        }
    }

    #[must_use]
    pub fn with_initializer(mut self, initializer: ExternalNameInitializer) -> Self {
        self.initializer = initializer;
        self
    }

    #[must_use]
    pub fn with_timing(mut self, timing: ReconcileTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> ReconcileTiming {
        self.timing
    }

    /// Reconcile the managed resource with the given name
    pub async fn reconcile(&self, name: &str) -> Result<Action, ReconcilerError> {
        let kind = R::kind_name();
        let span = info_span!("reconcile", resource.kind = %kind, resource.name = %name);
        let start = Instant::now();
        metrics::increment_reconciliations(&kind);
        let result = self.reconcile_inner(name).instrument(span).await;
        metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());
        result
    }

    async fn reconcile_inner(&self, name: &str) -> Result<Action, ReconcilerError> {
        let Some(mut cr) = store::get_typed::<R>(&*self.store, name).await? else {
            debug!("Managed resource no longer exists");
            return Ok(Action::await_change());
        };
        let mut status = StatusWriter::new(&cr)?;

        if meta::is_being_deleted(&cr) {
            return self.reconcile_delete(cr, &mut status).await;
        }

        if meta::add_finalizer(&mut cr) {
            self.persist(&mut cr).await?;
        }

        if self.initializer.initialize(&mut cr)? {
            self.persist(&mut cr).await?;
        }

        let before = cr.for_provider().clone();
        if let Err(e) = cr.resolve_references(&self.resolver).await {
            return self.fail(&mut cr, &mut status, ReconcilerError::Reference(e)).await;
        }
        if *cr.for_provider() != before {
            debug!("Persisting resolved references");
            self.persist(&mut cr).await?;
        }

        let client = match self.connector.connect(&cr).await {
            Ok(client) => client,
            Err(e) => return self.fail(&mut cr, &mut status, ReconcilerError::Connect(e)).await,
        };

        let desired = cr.for_provider().clone();
        let observation = match self.observe(client.as_ref(), &mut cr).await {
            Ok(observation) => observation,
            Err(e) => return self.fail(&mut cr, &mut status, ReconcilerError::Observe(e)).await,
        };

        if !observation.resource_exists {
            return self.reconcile_create(client.as_ref(), cr, &mut status).await;
        }

        let policy = cr.resource_spec().management_policy();
        if observation.resource_late_initialized {
            if policy.allows(ManagementAction::LateInitialize) {
                debug!("Persisting late-initialized parameters");
                self.persist(&mut cr).await?;
            } else {
                *cr.for_provider_mut() = desired;
            }
        }

        if let Err(e) = self.publish(&cr, &observation.connection_details).await {
            return self.fail(&mut cr, &mut status, e).await;
        }

        if !observation.resource_up_to_date {
            if policy.allows(ManagementAction::Update) {
                info!("External resource is out of date, updating");
                let result = client.update(&mut cr).await;
                metrics::record_external_operation(&R::kind_name(), "update", result.is_ok());
                match result {
                    Ok(update) => {
                        if let Err(e) = self.publish(&cr, &update.connection_details).await {
                            return self.fail(&mut cr, &mut status, e).await;
                        }
                    }
                    Err(e) => return self.fail(&mut cr, &mut status, ReconcilerError::Update(e)).await,
                }
            } else {
                debug!(?policy, "External resource is out of date; management policy forbids updates");
            }
        }

        cr.set_condition(conditions::reconcile_success());
        status.write(&*self.store, &cr).await?;
        Ok(Action::requeue(self.timing.poll_interval))
    }

    async fn reconcile_create(
        &self,
        client: &dyn ExternalClient<R>,
        mut cr: R,
        status: &mut StatusWriter,
    ) -> Result<Action, ReconcilerError> {
        let policy = cr.resource_spec().management_policy();
        if !policy.allows(ManagementAction::Create) {
            info!(?policy, "External resource does not exist; management policy forbids creating it");
            cr.set_condition(conditions::unavailable(
                "external resource does not exist and the management policy does not allow creating it",
            ));
            cr.set_condition(conditions::reconcile_success());
            status.write(&*self.store, &cr).await?;
            return Ok(Action::requeue(self.timing.poll_interval));
        }

        let now = chrono::Utc::now();
        match meta::create_guard(&cr, now, self.timing.create_grace_period) {
            CreateGuard::Proceed => {}
            CreateGuard::WithinGracePeriod => {
                debug!("External resource not yet visible after a recent create");
                return Ok(Action::requeue(self.timing.short_wait));
            }
            CreateGuard::Incomplete => {
                let err = ReconcilerError::Validation(format!(
                    "cannot determine creation result - remove the {ANNOTATION_EXTERNAL_CREATE_PENDING} annotation if it is safe to proceed"
                ));
                return self.fail(&mut cr, status, err).await;
            }
        }

        meta::set_create_pending(&mut cr, now);
        self.persist(&mut cr).await?;

        info!("Creating external resource");
        let result = client.create(&mut cr).await;
        metrics::record_external_operation(&R::kind_name(), "create", result.is_ok());
        let creation = match result {
            Ok(creation) => creation,
            Err(e) if e.is_already_exists() => {
                info!("External resource already exists, adopting it");
                Default::default()
            }
            Err(e) => {
                meta::set_create_failed(&mut cr, chrono::Utc::now());
                if let Err(persist_err) = self.persist(&mut cr).await {
                    warn!(error = %persist_err, "Failed to record create failure");
                }
                return self.fail(&mut cr, status, ReconcilerError::Create(e)).await;
            }
        };

        meta::set_create_succeeded(&mut cr, chrono::Utc::now());
        self.persist_after_create(&mut cr).await?;

        if let Err(e) = self.publish(&cr, &creation.connection_details).await {
            return self.fail(&mut cr, status, e).await;
        }

        cr.set_condition(conditions::creating());
        cr.set_condition(conditions::reconcile_success());
        status.write(&*self.store, &cr).await?;
        Ok(Action::requeue(self.timing.short_wait))
    }

    async fn reconcile_delete(&self, mut cr: R, status: &mut StatusWriter) -> Result<Action, ReconcilerError> {
        if !meta::has_finalizer(&cr) {
            return Ok(Action::await_change());
        }

        let policy = cr.resource_spec().management_policy();
        let orphan = cr.resource_spec().deletion_policy == DeletionPolicy::Orphan
            || !policy.allows(ManagementAction::Delete);

        if !orphan {
            let client = match self.connector.connect(&cr).await {
                Ok(client) => client,
                Err(e) => return self.fail(&mut cr, status, ReconcilerError::Connect(e)).await,
            };
            let observation = match self.observe(client.as_ref(), &mut cr).await {
                Ok(observation) => observation,
                Err(e) => return self.fail(&mut cr, status, ReconcilerError::Observe(e)).await,
            };
            if observation.resource_exists {
                info!("Deleting external resource");
                cr.set_condition(conditions::deleting());
                let result = client.delete(&mut cr).await;
                metrics::record_external_operation(&R::kind_name(), "delete", result.is_ok());
                match result {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return self.fail(&mut cr, status, ReconcilerError::Delete(e)).await,
                }
                cr.set_condition(conditions::reconcile_success());
                status.write(&*self.store, &cr).await?;
                return Ok(Action::requeue(self.timing.short_wait));
            }
        } else {
            info!(deletion_policy = ?cr.resource_spec().deletion_policy, ?policy, "Orphaning external resource");
        }

        if let Err(e) = self.connector.release(&cr).await {
            return self.fail(&mut cr, status, ReconcilerError::Delete(e)).await;
        }

        if let Err(e) = self.publisher.unpublish(&PublishTarget::of(&cr)).await {
            return self.fail(&mut cr, status, ReconcilerError::Publish(e)).await;
        }

        meta::remove_finalizer(&mut cr);
        self.persist(&mut cr).await?;
        info!("Managed resource released");
        Ok(Action::await_change())
    }

    async fn observe(&self, client: &dyn ExternalClient<R>, cr: &mut R) -> Result<ExternalObservation, ExternalError> {
        let result = client.observe(cr).await;
        metrics::record_external_operation(&R::kind_name(), "observe", result.is_ok());
        match result {
            Err(e) if e.is_not_found() => Ok(ExternalObservation::absent()),
            other => other,
        }
    }

    async fn publish(&self, cr: &R, details: &ConnectionDetails) -> Result<(), ReconcilerError> {
        if details.is_empty() {
            return Ok(());
        }
        self.publisher
            .publish(&PublishTarget::of(cr), details)
            .await
            .map_err(ReconcilerError::Publish)
    }

    /// Write metadata and spec, keeping the in-memory status
    async fn persist(&self, cr: &mut R) -> Result<(), ReconcilerError> {
        let status = cr.managed_status().cloned();
        let mut updated = store::update_typed(&*self.store, cr).await?;
        if let Some(status) = status {
            *updated.managed_status_mut() = status;
        }
        *cr = updated;
        Ok(())
    }

    /// The external name assigned by a Create must not be lost to a write
    /// conflict; retry against the latest version a few times
    async fn persist_after_create(&self, cr: &mut R) -> Result<(), ReconcilerError> {
        const ATTEMPTS: usize = 3;
        let annotations = cr.meta().annotations.clone();
        let desired = cr.for_provider().clone();
        let mut attempt = 1;
        loop {
            match self.persist(cr).await {
                Ok(()) => return Ok(()),
                Err(ReconcilerError::Store(e)) if e.is_conflict() && attempt < ATTEMPTS => {
                    warn!(attempt, error = %e, "Conflict recording create result, retrying");
                    attempt += 1;
                    let status = cr.managed_status().cloned();
                    let Some(mut latest) = store::get_typed::<R>(&*self.store, cr.resource_name()).await? else {
                        return Err(ReconcilerError::Store(e));
                    };
                    let merged = latest.meta_mut().annotations.get_or_insert_with(Default::default);
                    for (k, v) in annotations.iter().flatten() {
                        merged.insert(k.clone(), v.clone());
                    }
                    *latest.for_provider_mut() = desired.clone();
                    if let Some(status) = status {
                        *latest.managed_status_mut() = status;
                    }
                    *cr = latest;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fail(
        &self,
        cr: &mut R,
        status: &mut StatusWriter,
        err: ReconcilerError,
    ) -> Result<Action, ReconcilerError> {
        warn!(error = %err, reason = err.reason(), retryable = err.is_retryable(), "Reconcile failed");
        metrics::increment_reconciliation_errors(&R::kind_name(), err.metric_reason());
        cr.set_condition(conditions::reconcile_error(err.reason(), err.to_string()));
        if let Err(e) = status.write(&*self.store, cr).await {
            warn!(error = %e, "Failed to record reconcile error in status");
        }
        if err.is_retryable() {
            Err(err)
        } else {
            Ok(Action::requeue(self.timing.poll_interval))
        }
    }
}
