//! # Connection Publishing
//!
//! Connection details (endpoint, port, username, password, ...) are written
//! to the secret named by `spec.writeConnectionSecretToRef`, and optionally
//! mirrored elsewhere through additional [`ConnectionPublisher`]s.

use crate::crd::{Managed, SecretReference};
use crate::managed::external::{ConnectionDetails, ExternalError};
use crate::store::SecretStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Identity of the managed resource whose details are published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub kind: String,
    pub name: String,
    pub secret_ref: Option<SecretReference>,
}

impl PublishTarget {
    pub fn of<R: Managed>(cr: &R) -> Self {
        Self {
            kind: R::kind_name(),
            name: cr.resource_name().to_string(),
            secret_ref: cr.resource_spec().write_connection_secret_to_ref.clone(),
        }
    }
}

#[async_trait]
pub trait ConnectionPublisher: Send + Sync {
    /// Merge the details into the destination; empty details are a no-op
    async fn publish(
        &self,
        target: &PublishTarget,
        details: &ConnectionDetails,
    ) -> Result<(), ExternalError>;

    /// Remove whatever `publish` wrote
    async fn unpublish(&self, target: &PublishTarget) -> Result<(), ExternalError>;
}

/// Writes connection details to a Kubernetes secret
pub struct SecretPublisher {
    secrets: Arc<dyn SecretStore>,
}

impl std::fmt::Debug for SecretPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretPublisher").finish_non_exhaustive()
    }
}

impl SecretPublisher {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl ConnectionPublisher for SecretPublisher {
    async fn publish(
        &self,
        target: &PublishTarget,
        details: &ConnectionDetails,
    ) -> Result<(), ExternalError> {
        let Some(secret) = target.secret_ref.as_ref() else {
            return Ok(());
        };
        if details.is_empty() {
            return Ok(());
        }
        debug!(
            secret.namespace = %secret.namespace,
            secret.name = %secret.name,
            keys = details.len(),
            "Publishing connection details"
        );
        self.secrets
            .apply(&secret.namespace, &secret.name, details)
            .await?;
        Ok(())
    }

    async fn unpublish(&self, target: &PublishTarget) -> Result<(), ExternalError> {
        let Some(secret) = target.secret_ref.as_ref() else {
            return Ok(());
        };
        self.secrets.delete(&secret.namespace, &secret.name).await?;
        Ok(())
    }
}

/// Runs publishers in order, stopping at the first error
#[derive(Default)]
pub struct PublisherChain {
    publishers: Vec<Arc<dyn ConnectionPublisher>>,
}

impl std::fmt::Debug for PublisherChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherChain")
            .field("publishers", &self.publishers.len())
            .finish()
    }
}

impl PublisherChain {
    pub fn new(publishers: Vec<Arc<dyn ConnectionPublisher>>) -> Self {
        Self { publishers }
    }

    #[must_use]
    pub fn with(mut self, publisher: Arc<dyn ConnectionPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }
}

#[async_trait]
impl ConnectionPublisher for PublisherChain {
    async fn publish(
        &self,
        target: &PublishTarget,
        details: &ConnectionDetails,
    ) -> Result<(), ExternalError> {
        for publisher in &self.publishers {
            publisher.publish(target, details).await?;
        }
        Ok(())
    }

    async fn unpublish(&self, target: &PublishTarget) -> Result<(), ExternalError> {
        for publisher in &self.publishers {
            publisher.unpublish(target).await?;
        }
        Ok(())
    }
}
