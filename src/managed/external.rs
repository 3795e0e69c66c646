//! # External Client Contract
//!
//! [`ExternalClient`] is the four-operation seam between the generic
//! reconciler and a kind's AWS calls. Most kinds do not implement it by hand:
//! they implement [`KindHooks`], and [`Hooked`] turns the hooks into a client.
//!
//! ## Hook Order
//!
//! ```text
//! observe: validate -> pre_observe -> describe -> filter_list
//!          -> generate_observation -> late_initialize -> is_up_to_date
//!          -> post_observe
//! create:  pre_create -> create_remote -> post_create
//! update:  pre_update -> update_remote -> post_update
//! delete:  pre_delete -> delete_remote (skipped when pre_delete says so)
//! ```
//!
//! `describe` returning a not-found error is translated into
//! "resource does not exist" so adapters never special-case it.

use crate::crd::Managed;
use crate::managed::{conditions, patch};
use crate::provider::AwsError;
use crate::store::{SecretData, StoreError};
use async_trait::async_trait;
use thiserror::Error;

/// Connection details published to the connection secret
pub type ConnectionDetails = SecretData;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalObservation {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
    /// `forProvider` was filled from observed values and must be persisted
    pub resource_late_initialized: bool,
    pub connection_details: ConnectionDetails,
}

impl ExternalObservation {
    /// The external resource does not exist
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    /// The external resource exists and matches the spec
    #[must_use]
    pub fn up_to_date() -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalCreation {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error(transparent)]
    Aws(#[from] AwsError),

    #[error("invalid spec: {0}")]
    Validation(String),

    #[error("secret {namespace}/{name}: {message}")]
    Secret {
        namespace: String,
        name: String,
        message: String,
    },

    #[error("invalid policy document: {0}")]
    Policy(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ExternalError {
    pub fn validation(message: impl Into<String>) -> Self {
        ExternalError::Validation(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ExternalError::Aws(e) if e.is_not_found())
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ExternalError::Aws(e) if e.is_already_exists())
    }

    /// Whether retrying with backoff may succeed without a spec change
    pub fn is_retryable(&self) -> bool {
        match self {
            ExternalError::Aws(e) => e.is_retryable(),
            ExternalError::Store(_) => true,
            ExternalError::Validation(_)
            | ExternalError::Secret { .. }
            | ExternalError::Policy(_)
            | ExternalError::Serialization(_) => false,
        }
    }
}

/// CRUD against one external resource
#[async_trait]
pub trait ExternalClient<R: Managed>: Send + Sync {
    /// Describe the resource and record `status.atProvider`.
    async fn observe(&self, cr: &mut R) -> Result<ExternalObservation, ExternalError>;
    async fn create(&self, cr: &mut R) -> Result<ExternalCreation, ExternalError>;
    async fn update(&self, cr: &mut R) -> Result<ExternalUpdate, ExternalError>;
    async fn delete(&self, cr: &mut R) -> Result<(), ExternalError>;
}

/// Builds an [`ExternalClient`] with credentials and region for one resource
#[async_trait]
pub trait Connector<R: Managed>: Send + Sync {
    async fn connect(&self, cr: &R) -> Result<Box<dyn ExternalClient<R>>, ExternalError>;

    /// Drop controller-owned state of a resource that is being released.
    ///
    /// Runs on every deletion path, orphaned or not, right before the
    /// finalizer is removed. Needs no AWS credentials.
    async fn release(&self, _cr: &R) -> Result<(), ExternalError> {
        Ok(())
    }
}

/// Per-kind customization points around the AWS request builders.
///
/// Every hook except the describe/create/update/delete calls has a default
/// that does nothing.
#[async_trait]
pub trait KindHooks: Send + Sync {
    type Resource: Managed;
    /// Crate-owned model of the describe response
    type Described: Send + Sync;

    /// Reject specs AWS would refuse, before any call is made
    fn validate(&self, _cr: &Self::Resource) -> Result<(), ExternalError> {
        Ok(())
    }

    async fn pre_observe(&self, _cr: &mut Self::Resource) -> Result<(), ExternalError> {
        Ok(())
    }

    /// Describe the remote resource. A not-found error or an empty list
    /// both mean the resource does not exist.
    async fn describe(&self, cr: &Self::Resource) -> Result<Vec<Self::Described>, ExternalError>;

    /// Pick the item describing this resource
    fn filter_list(
        &self,
        _cr: &Self::Resource,
        items: Vec<Self::Described>,
    ) -> Option<Self::Described> {
        items.into_iter().next()
    }

    fn generate_observation(
        &self,
        described: &Self::Described,
    ) -> <Self::Resource as Managed>::Observation;

    /// Parameters derived from the remote resource; unset desired fields
    /// are filled from it
    fn late_initialize(
        &self,
        _cr: &Self::Resource,
        _described: &Self::Described,
    ) -> Option<<Self::Resource as Managed>::Parameters> {
        None
    }

    async fn is_up_to_date(
        &self,
        _cr: &Self::Resource,
        _described: &Self::Described,
    ) -> Result<bool, ExternalError> {
        Ok(true)
    }

    /// Set `Ready` and fill connection details. The default marks the
    /// resource available.
    async fn post_observe(
        &self,
        cr: &mut Self::Resource,
        _described: &Self::Described,
        observation: ExternalObservation,
    ) -> Result<ExternalObservation, ExternalError> {
        cr.set_condition(conditions::available());
        Ok(observation)
    }

    async fn pre_create(&self, _cr: &mut Self::Resource) -> Result<(), ExternalError> {
        Ok(())
    }

    async fn create_remote(&self, cr: &mut Self::Resource) -> Result<ExternalCreation, ExternalError>;

    async fn post_create(
        &self,
        _cr: &mut Self::Resource,
        creation: ExternalCreation,
    ) -> Result<ExternalCreation, ExternalError> {
        Ok(creation)
    }

    async fn pre_update(&self, _cr: &mut Self::Resource) -> Result<(), ExternalError> {
        Ok(())
    }

    async fn update_remote(&self, cr: &mut Self::Resource) -> Result<ExternalUpdate, ExternalError>;

    async fn post_update(
        &self,
        _cr: &mut Self::Resource,
        update: ExternalUpdate,
    ) -> Result<ExternalUpdate, ExternalError> {
        Ok(update)
    }

    /// Returns `true` when the delete call must be skipped this round, for
    /// example while a prerequisite state change is still in flight
    async fn pre_delete(&self, _cr: &mut Self::Resource) -> Result<bool, ExternalError> {
        Ok(false)
    }

    async fn delete_remote(&self, cr: &mut Self::Resource) -> Result<(), ExternalError>;
}

/// Adapts a [`KindHooks`] implementation into an [`ExternalClient`]
#[derive(Debug)]
pub struct Hooked<H>(pub H);

#[async_trait]
impl<H> ExternalClient<H::Resource> for Hooked<H>
where
    H: KindHooks,
{
    async fn observe(&self, cr: &mut H::Resource) -> Result<ExternalObservation, ExternalError> {
        let hooks = &self.0;
        hooks.validate(cr)?;
        hooks.pre_observe(cr).await?;

        let items = match hooks.describe(cr).await {
            Ok(items) => items,
            Err(e) if e.is_not_found() => return Ok(ExternalObservation::absent()),
            Err(e) => return Err(e),
        };
        let Some(described) = hooks.filter_list(cr, items) else {
            return Ok(ExternalObservation::absent());
        };

        cr.set_at_provider(hooks.generate_observation(&described));

        let mut late_initialized = false;
        if let Some(derived) = hooks.late_initialize(cr, &described) {
            if let Some(merged) = patch::late_initialize(cr.for_provider(), &derived)? {
                *cr.for_provider_mut() = merged;
                late_initialized = true;
            }
        }

        let up_to_date = hooks.is_up_to_date(cr, &described).await?;
        let observation = ExternalObservation {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            resource_late_initialized: late_initialized,
            connection_details: ConnectionDetails::new(),
        };
        hooks.post_observe(cr, &described, observation).await
    }

    async fn create(&self, cr: &mut H::Resource) -> Result<ExternalCreation, ExternalError> {
        let hooks = &self.0;
        hooks.validate(cr)?;
        hooks.pre_create(cr).await?;
        let creation = hooks.create_remote(cr).await?;
        hooks.post_create(cr, creation).await
    }

    async fn update(&self, cr: &mut H::Resource) -> Result<ExternalUpdate, ExternalError> {
        let hooks = &self.0;
        hooks.pre_update(cr).await?;
        let update = hooks.update_remote(cr).await?;
        hooks.post_update(cr, update).await
    }

    async fn delete(&self, cr: &mut H::Resource) -> Result<(), ExternalError> {
        let hooks = &self.0;
        if hooks.pre_delete(cr).await? {
            return Ok(());
        }
        hooks.delete_remote(cr).await
    }
}
